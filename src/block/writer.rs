
//! Drives the line buffers of one file part:
//! fills them with packed lines, hands them to the workers,
//! and writes the finished chunks strictly in line order.

use crate::block::chunk::write_chunk;
use crate::block::lines::LineLayout;
use crate::block::pool::LineBufferPool;
use crate::block::task::{PackTask, Workers};
use crate::compression::{new_compressor, CompressorFactory};
use crate::error::*;
use crate::frame_buffer::SliceTable;
use crate::io::*;
use crate::meta::header::Header;


/// The scan line encoder of one file part.
///
/// Remembers which line comes next, how many lines are still missing,
/// and where each finished chunk was written.
#[derive(Debug)]
pub struct LineEncoder {
    layout: LineLayout,
    buffers: LineBufferPool,
    workers: Workers,

    /// `Some` in multi-part files, where each chunk starts with the part number.
    part_number: Option<usize>,

    current_scan_line: i32,
    missing_scan_lines: usize,

    /// The byte position of each chunk, zero until the chunk has been written.
    line_offsets: Vec<u64>,
}

impl LineEncoder {

    /// Create the line buffers and their compressors.
    pub fn new(
        header: &Header, part_number: Option<usize>, workers: Workers,
        buffer_count: usize, factory: Option<&CompressorFactory>
    ) -> Result<Self>
    {
        let layout = LineLayout::new(header);
        let buffers = LineBufferPool::new(buffer_count, layout.line_buffer_byte_size, || new_compressor(header, factory))?;

        log::debug!(
            "encoding {} groups of {} lines with {} buffers and {} threads",
            layout.group_count(), layout.lines_per_group, buffers.len(), workers.thread_count()
        );

        Ok(LineEncoder {
            current_scan_line: layout.first_line_in_order(),
            missing_scan_lines: layout.data_window.size.height(),
            line_offsets: vec![0; layout.group_count()],
            part_number, workers, buffers, layout,
        })
    }

    /// The geometry of the scan line groups.
    pub fn layout(&self) -> &LineLayout { &self.layout }

    /// The next scan line that will be written.
    pub fn current_scan_line(&self) -> i32 { self.current_scan_line }

    /// The number of lines that have not been written yet.
    pub fn missing_scan_lines(&self) -> usize { self.missing_scan_lines }

    /// The chunk positions, zero for chunks that have not been written yet.
    pub fn line_offsets(&self) -> &[u64] { &self.line_offsets }

    /// Whether any scan line has been written or packed yet.
    pub fn has_started(&self) -> bool {
        self.missing_scan_lines != self.layout.data_window.size.height()
    }

    /// Pack the next `line_count` lines from the frame buffer,
    /// compress them, and write every group that is complete.
    ///
    /// The current line and the missing line count only advance
    /// past a group once it is written, or once its lines wait in a partial buffer.
    /// After an error, the lines from the current line onwards can be written again.
    /// Errors of the workers are reported as `Error::Io`, keeping their message.
    pub fn write_pixels<W: Write + Seek>(
        &mut self, stream: &mut StreamState<W>,
        slices: &SliceTable<'_>, line_count: usize
    ) -> UnitResult
    {
        if line_count == 0 {
            return Ok(());
        }

        if line_count > self.missing_scan_lines {
            return Err(Error::sequence(format!(
                "cannot write {} more scan lines, as only {} scan lines are missing",
                line_count, self.missing_scan_lines
            )));
        }

        let LineEncoder {
            layout, buffers, workers, part_number,
            current_scan_line, missing_scan_lines, line_offsets,
        } = self;

        let (layout, buffers, part_number) = (&*layout, &*buffers, *part_number);
        let decreasing = layout.is_decreasing();
        let last_offset = usize_to_i32(line_count - 1, "scan line count")?;

        let lines =
            if decreasing { *current_scan_line - last_offset ..= *current_scan_line }
            else { *current_scan_line ..= *current_scan_line + last_offset };

        let first_group = layout.group_index(*current_scan_line);
        let last_group = layout.group_index(if decreasing { *lines.start() } else { *lines.end() });
        let group_count = if decreasing { first_group - last_group + 1 } else { last_group - first_group + 1 };
        let group_at = move |index: usize| if decreasing { first_group - index } else { first_group + index };

        // the stream may have been moved by someone else since the last call
        stream.invalidate_position();

        let drained = workers.run(|tasks| -> UnitResult {
            let submit = move |index: usize| {
                let group_index = group_at(index);
                let task = PackTask::new(buffers.slot(group_index), layout, group_index, lines.clone());
                tasks.submit(move || task.run(layout, slices));
            };

            let initial_task_count = group_count.min(buffers.len());
            for index in 0 .. initial_task_count {
                submit(index);
            }

            for index in 0 .. group_count {
                let group_index = group_at(index);
                let mut buffer = buffers.slot(group_index).acquire();

                // reported after all tasks have finished
                if buffer.captured_error.is_some() {
                    return Ok(());
                }

                let packed_line_count = (buffer.scan_line_max - buffer.scan_line_min + 1) as usize;
                if packed_line_count > *missing_scan_lines {
                    return Err(Error::sequence("tried to write more scan lines than the data window contains"));
                }

                if !buffer.partially_full {
                    match write_chunk(stream, part_number, buffer.min_y, buffer.payload()) {
                        Ok(offset) => line_offsets[group_index] = offset,
                        Err(error) => {
                            // keep the lines of earlier calls, the lines of this call are packed again
                            buffer.partially_full = true;
                            return Err(error);
                        }
                    }
                }

                *missing_scan_lines -= packed_line_count;

                let step = packed_line_count as i32;
                *current_scan_line += if decreasing { -step } else { step };

                // the remaining lines of this group will come with a later call
                if buffer.partially_full {
                    return Ok(());
                }

                drop(buffer);

                let next_index = index + initial_task_count;
                if next_index < group_count {
                    submit(next_index);
                }
            }

            Ok(())
        });

        let captured = buffers.take_first_captured_error();

        if let Err(error) = drained {
            if let Some(captured) = captured {
                log::debug!("dropping captured error: {}", captured);
            }

            return Err(error);
        }

        match captured {
            Some(error) => Err(error.into_io()),
            None => Ok(()),
        }
    }

    /// Write an already compressed chunk as the next group in line order.
    pub fn write_raw_chunk<W: Write + Seek>(&mut self, stream: &mut StreamState<W>, payload: &[u8]) -> UnitResult {
        if self.missing_scan_lines == 0 {
            return Err(Error::sequence("all scan lines have been written already"));
        }

        let group_index = self.layout.group_index(self.current_scan_line);
        let (min_y, max_y) = self.layout.group_lines(group_index);

        let group_start = if self.layout.is_decreasing() { max_y } else { min_y };
        if self.current_scan_line != group_start {
            return Err(Error::sequence("raw chunks cannot be written after a partial group"));
        }

        self.line_offsets[group_index] = write_chunk(stream, self.part_number, min_y, payload)?;

        let line_count = max_y - min_y + 1;
        self.missing_scan_lines -= line_count as usize;
        self.current_scan_line += if self.layout.is_decreasing() { -line_count } else { line_count };

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Cursor, ErrorKind};
    use crate::compression::Compression;
    use crate::frame_buffer::{FrameBuffer, Slice};
    use crate::meta::attribute::{ChannelDescription, LineOrder, SampleType};

    fn header(size: (usize, usize), compression: Compression) -> Header {
        Header::new(size, smallvec![ ChannelDescription::named("Y", SampleType::F32) ])
            .with_compression(compression)
    }

    fn ramp(header: &Header) -> Vec<f32> {
        (0 .. header.data_window.size.area()).map(|index| index as f32).collect()
    }

    fn write_in_steps(header: &Header, samples: &[f32], workers: Workers, steps: &[usize]) -> (Vec<u8>, Vec<u64>) {
        let frame_buffer = FrameBuffer::new().with_slice("Y", Slice::packed(samples, header.data_window));
        let slices = SliceTable::resolve(&header.channels, header.data_window, &frame_buffer).unwrap();

        let buffer_count = LineBufferPool::size_for_workers(workers.thread_count());
        let mut encoder = LineEncoder::new(header, None, workers, buffer_count, None).unwrap();
        let mut stream = StreamState::new(Cursor::new(Vec::new()));

        for &step in steps {
            encoder.write_pixels(&mut stream, &slices, step).unwrap();
        }

        assert_eq!(encoder.missing_scan_lines(), 0);
        let offsets = encoder.line_offsets().to_vec();
        (stream.into_inner().into_inner(), offsets)
    }

    #[test]
    fn uncompressed_lines_are_written_immediately() {
        let header = header((3, 5), Compression::Uncompressed);
        let (bytes, offsets) = write_in_steps(&header, &ramp(&header), Workers::inline(), &[2, 3]);

        assert_eq!(offsets, vec![0, 20, 40, 60, 80]);
        assert_eq!(&bytes[40 .. 48], &[2, 0, 0, 0, 12, 0, 0, 0]);
        assert_eq!(&bytes[48 .. 52], &6.0_f32.to_le_bytes());
    }

    #[test]
    fn partial_groups_wait_for_the_remaining_lines() {
        let header = header((4, 20), Compression::ZIP16);
        let samples = ramp(&header);

        let frame_buffer = FrameBuffer::new().with_slice("Y", Slice::packed(samples.as_slice(), header.data_window));
        let slices = SliceTable::resolve(&header.channels, header.data_window, &frame_buffer).unwrap();

        let mut encoder = LineEncoder::new(&header, None, Workers::inline(), 2, None).unwrap();
        let mut stream = StreamState::new(Cursor::new(Vec::new()));

        encoder.write_pixels(&mut stream, &slices, 10).unwrap();
        assert_eq!(encoder.current_scan_line(), 10);
        assert_eq!(encoder.line_offsets(), &[0, 0]);
        assert_eq!(stream.query_position().unwrap(), 0);

        encoder.write_pixels(&mut stream, &slices, 10).unwrap();
        assert_eq!(encoder.line_offsets()[0], 0);
        assert!(encoder.line_offsets()[1] > 0);

        let all_at_once = write_in_steps(&header, &samples, Workers::inline(), &[20]);
        assert_eq!(stream.into_inner().into_inner(), all_at_once.0);
    }

    #[test]
    fn threads_produce_the_same_bytes() {
        for &line_order in &[LineOrder::Increasing, LineOrder::Decreasing] {
            let header = header((7, 70), Compression::ZIP16).with_line_order(line_order);
            let samples = ramp(&header);

            let inline = write_in_steps(&header, &samples, Workers::inline(), &[70]);
            let threaded = write_in_steps(&header, &samples, Workers::create(3), &[1, 20, 33, 16]);
            assert_eq!(inline, threaded);
        }
    }

    #[test]
    fn decreasing_files_start_at_the_bottom() {
        let header = header((2, 3), Compression::Uncompressed).with_line_order(LineOrder::Decreasing);
        let (bytes, offsets) = write_in_steps(&header, &ramp(&header), Workers::inline(), &[1, 1, 1]);

        assert_eq!(offsets, vec![32, 16, 0]);
        assert_eq!(&bytes[0 .. 4], &2_i32.to_le_bytes());
    }

    #[test]
    fn too_many_lines_are_rejected_without_side_effects() {
        let header = header((2, 4), Compression::RLE);
        let samples = ramp(&header);
        let frame_buffer = FrameBuffer::new().with_slice("Y", Slice::packed(samples.as_slice(), header.data_window));
        let slices = SliceTable::resolve(&header.channels, header.data_window, &frame_buffer).unwrap();

        let mut encoder = LineEncoder::new(&header, None, Workers::inline(), 1, None).unwrap();
        let mut stream = StreamState::new(Cursor::new(Vec::new()));

        encoder.write_pixels(&mut stream, &slices, 3).unwrap();
        let error = encoder.write_pixels(&mut stream, &slices, 2).unwrap_err();

        assert!(error.is_sequence_error());
        assert_eq!(encoder.current_scan_line(), 3);
        assert_eq!(encoder.missing_scan_lines(), 1);

        encoder.write_pixels(&mut stream, &slices, 0).unwrap();
        encoder.write_pixels(&mut stream, &slices, 1).unwrap();
        assert!(encoder.write_pixels(&mut stream, &slices, 1).unwrap_err().is_sequence_error());
    }

    #[test]
    fn failed_lines_can_be_written_again() {
        let header = header((3, 5), Compression::Uncompressed);
        let samples = ramp(&header);

        let two_rows = FrameBuffer::new().with_slice("Y", Slice::packed(&samples[.. 6], header.data_window));
        let short = SliceTable::resolve(&header.channels, header.data_window, &two_rows).unwrap();

        let mut encoder = LineEncoder::new(&header, None, Workers::inline(), 1, None).unwrap();
        let mut stream = StreamState::new(Cursor::new(Vec::new()));

        match encoder.write_pixels(&mut stream, &short, 5) {
            Err(Error::Io(error)) => assert!(error.to_string().contains("incompatible configuration"), "{}", error),
            other => panic!("expected the packing error, got {:?}", other),
        }

        assert_eq!(encoder.current_scan_line(), 2);
        assert_eq!(encoder.missing_scan_lines(), 3);
        assert_eq!(encoder.line_offsets(), &[0, 20, 0, 0, 0]);

        let all_rows = FrameBuffer::new().with_slice("Y", Slice::packed(samples.as_slice(), header.data_window));
        let complete = SliceTable::resolve(&header.channels, header.data_window, &all_rows).unwrap();

        encoder.write_pixels(&mut stream, &complete, 3).unwrap();
        assert_eq!(encoder.line_offsets(), &[0, 20, 40, 60, 80]);
    }

    /// Fails the write call with the specified index, counting from zero.
    struct FailingWrite {
        bytes: Cursor<Vec<u8>>,
        failing_write: usize,
        write_count: usize,
    }

    impl FailingWrite {
        fn after_eight_bytes(failing_write: usize) -> Self {
            let mut bytes = Cursor::new(vec![ 0xaa; 8 ]);
            bytes.set_position(8);
            FailingWrite { bytes, failing_write, write_count: 0 }
        }
    }

    impl Write for FailingWrite {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.write_count += 1;

            if self.write_count - 1 == self.failing_write {
                return Err(std::io::Error::new(ErrorKind::Other, "disk full"));
            }

            self.bytes.write(bytes)
        }

        fn flush(&mut self) -> std::io::Result<()> { self.bytes.flush() }
    }

    impl Seek for FailingWrite {
        fn seek(&mut self, position: SeekFrom) -> std::io::Result<u64> { self.bytes.seek(position) }
    }

    #[test]
    fn lines_of_a_failed_chunk_are_not_counted() {
        let header = header((2, 4), Compression::Uncompressed);
        let samples = ramp(&header);
        let frame_buffer = FrameBuffer::new().with_slice("Y", Slice::packed(samples.as_slice(), header.data_window));
        let slices = SliceTable::resolve(&header.channels, header.data_window, &frame_buffer).unwrap();

        let mut encoder = LineEncoder::new(&header, None, Workers::inline(), 1, None).unwrap();

        // the first chunk takes two writes, the header of the second chunk fails
        let mut stream = StreamState::new(FailingWrite::after_eight_bytes(2));

        encoder.write_pixels(&mut stream, &slices, 1).unwrap();

        match encoder.write_pixels(&mut stream, &slices, 1) {
            Err(Error::Io(error)) => assert_eq!(error.to_string(), "disk full"),
            other => panic!("expected the stream error, got {:?}", other),
        }

        assert_eq!(encoder.current_scan_line(), 1);
        assert_eq!(encoder.missing_scan_lines(), 3);
        assert_eq!(encoder.line_offsets(), &[8, 0, 0, 0]);

        encoder.write_pixels(&mut stream, &slices, 3).unwrap();
        assert_eq!(encoder.missing_scan_lines(), 0);
        assert_eq!(encoder.line_offsets(), &[8, 24, 40, 56]);

        let bytes = stream.into_inner().bytes.into_inner();
        assert_eq!(&bytes[24 .. 28], &1_i32.to_le_bytes());
        assert_eq!(&bytes[32 .. 36], &2.0_f32.to_le_bytes());
    }

    #[test]
    fn partial_group_survives_a_failed_chunk() {
        let header = header((4, 16), Compression::ZIP16);
        let samples = ramp(&header);
        let frame_buffer = FrameBuffer::new().with_slice("Y", Slice::packed(samples.as_slice(), header.data_window));
        let slices = SliceTable::resolve(&header.channels, header.data_window, &frame_buffer).unwrap();

        let mut encoder = LineEncoder::new(&header, None, Workers::inline(), 1, None).unwrap();
        let mut stream = StreamState::new(FailingWrite::after_eight_bytes(0));

        encoder.write_pixels(&mut stream, &slices, 10).unwrap();
        assert!(encoder.write_pixels(&mut stream, &slices, 6).is_err());
        assert_eq!(encoder.current_scan_line(), 10);
        assert_eq!(encoder.missing_scan_lines(), 6);
        assert_eq!(encoder.line_offsets(), &[0]);

        encoder.write_pixels(&mut stream, &slices, 6).unwrap();
        assert_eq!(encoder.line_offsets(), &[8]);

        let all_at_once = write_in_steps(&header, &samples, Workers::inline(), &[16]);
        assert_eq!(&stream.into_inner().bytes.into_inner()[8 ..], all_at_once.0.as_slice());
    }
}
