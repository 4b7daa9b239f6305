//! The geometry of the scan line groups of a file:
//! which lines belong to which group, and where each line
//! starts inside the packed bytes of its group.

use std::ops::Range;

use crate::math::compute_block_count;
use crate::meta::attribute::{ChannelList, IntegerBounds, LineOrder};
use crate::meta::header::Header;


/// Immutable layout tables, computed once when a file is opened
/// and shared read-only with all compression tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineLayout {

    /// The data window of the file.
    pub data_window: IntegerBounds,

    /// The channels of the file, in the order they are packed into each line.
    pub channels: ChannelList,

    /// The order in which the groups are produced.
    pub line_order: LineOrder,

    /// The number of scan lines in each group. The last group may contain fewer lines.
    pub lines_per_group: usize,

    /// The packed byte count of each line, indexed by `y - data_window.position.y`.
    pub bytes_per_line: Vec<usize>,

    /// The byte offset of each line inside the packed bytes of its group,
    /// indexed by `y - data_window.position.y`.
    pub offset_in_line_buffer: Vec<usize>,

    /// The capacity of each line buffer.
    pub line_buffer_byte_size: usize,
}


impl LineLayout {

    /// Compute the layout tables of a header.
    pub fn new(header: &Header) -> Self {
        let data_window = header.data_window;
        let lines_per_group = header.compression.scan_lines_per_block();
        let first_y = data_window.position.y();

        let bytes_per_line: Vec<usize> = (0 .. data_window.size.height())
            .map(|line_index| {
                let y = first_y + line_index as i32;

                header.channels.list.iter()
                    .filter(|channel| channel.is_sampled_on_line(y))
                    .map(|channel| channel.samples_per_line(data_window) * channel.sample_type.bytes_per_sample())
                    .sum()
            })
            .collect();

        let offset_in_line_buffer = bytes_per_line.iter().enumerate()
            .scan(0, |offset, (line_index, &byte_count)| {
                if line_index % lines_per_group == 0 { *offset = 0; }

                let line_offset = *offset;
                *offset += byte_count;
                Some(line_offset)
            })
            .collect();

        let max_bytes_per_line = bytes_per_line.iter().copied().max().unwrap_or(0);

        LineLayout {
            data_window,
            channels: header.channels.clone(),
            line_order: header.line_order,
            lines_per_group,
            line_buffer_byte_size: max_bytes_per_line * lines_per_group,
            bytes_per_line,
            offset_in_line_buffer,
        }
    }

    /// The number of scan line groups in the data window.
    pub fn group_count(&self) -> usize {
        compute_block_count(self.data_window.size.height(), self.lines_per_group)
    }

    /// The group that contains the absolute scan line.
    pub fn group_index(&self, y: i32) -> usize {
        debug_assert!(self.contains_line(y), "line index bug");
        (y - self.data_window.position.y()) as usize / self.lines_per_group
    }

    /// The first and last absolute scan line of a group, both inclusive.
    pub fn group_lines(&self, group_index: usize) -> (i32, i32) {
        let min_y = self.data_window.position.y() + (group_index * self.lines_per_group) as i32;
        let max_y = (min_y + self.lines_per_group as i32 - 1).min(self.data_window.max().y());
        (min_y, max_y)
    }

    /// Whether the absolute scan line is inside the data window.
    pub fn contains_line(&self, y: i32) -> bool {
        let first = self.data_window.position.y();
        y >= first && y <= self.data_window.max().y()
    }

    /// The byte range of a line inside the packed bytes of its group.
    pub fn line_byte_range(&self, y: i32) -> Range<usize> {
        let line_index = (y - self.data_window.position.y()) as usize;
        let start = self.offset_in_line_buffer[line_index];
        start .. start + self.bytes_per_line[line_index]
    }

    /// The packed byte count of all lines of a group.
    pub fn group_byte_size(&self, group_index: usize) -> usize {
        let (min_y, max_y) = self.group_lines(group_index);
        self.line_byte_range(max_y).end - self.line_byte_range(min_y).start
    }

    /// Whether groups are produced from the bottom to the top.
    pub fn is_decreasing(&self) -> bool {
        self.line_order.is_decreasing()
    }

    /// The first scan line written to a file with this layout.
    pub fn first_line_in_order(&self) -> i32 {
        if self.is_decreasing() { self.data_window.max().y() }
        else { self.data_window.position.y() }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::meta::attribute::{ChannelDescription, SampleType};

    fn header(compression: Compression) -> Header {
        Header::new(
            (6, 38),
            smallvec![
                ChannelDescription::named("R", SampleType::F32),
                ChannelDescription::named("Y", SampleType::F16).with_sampling((2, 2)),
            ]
        ).with_compression(compression)
    }

    #[test]
    fn subsampled_lines_have_fewer_bytes() {
        let layout = LineLayout::new(&header(Compression::Uncompressed));

        assert_eq!(layout.bytes_per_line[0], 6*4 + 3*2);
        assert_eq!(layout.bytes_per_line[1], 6*4);
        assert_eq!(layout.group_count(), 38);
        assert_eq!(layout.offset_in_line_buffer, vec![0; 38]);
        assert_eq!(layout.line_buffer_byte_size, 6*4 + 3*2);
    }

    #[test]
    fn offsets_restart_in_each_group() {
        let layout = LineLayout::new(&header(Compression::ZIP16));

        assert_eq!(layout.group_count(), 3);
        assert_eq!(layout.group_lines(2), (32, 37));
        assert_eq!(layout.group_index(15), 0);
        assert_eq!(layout.group_index(16), 1);

        assert_eq!(layout.offset_in_line_buffer[16], 0);
        assert_eq!(layout.offset_in_line_buffer[17], 6*4 + 3*2);
        assert_eq!(layout.offset_in_line_buffer[18], 2 * (6*4) + 3*2);

        assert_eq!(layout.group_byte_size(0), 16 * 6*4 + 8 * 3*2);
        assert_eq!(layout.group_byte_size(2), 6 * 6*4 + 3 * 3*2);
        assert!(layout.group_byte_size(0) <= layout.line_buffer_byte_size);
    }
}
