
//! Describes where the pixels of each channel are located in memory,
//! and resolves these descriptions against the channels of a file.

use half::f16;
use std::ops::Range;

use crate::math::*;
use crate::error::{Error, Result, UnitResult};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType, Text};
use crate::block::samples::{SampleByteOrder, PackedSample};


/// The samples of one channel, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'fb> {

    /// 16-bit float samples.
    F16(&'fb [f16]),

    /// 32-bit float samples.
    F32(&'fb [f32]),

    /// 32-bit unsigned integer samples.
    U32(&'fb [u32]),
}

/// A strided view into the samples of a single channel.
///
/// The sample at the full resolution pixel `(x, y)` is located at the index
/// `(y / y_sampling - origin.y / y_sampling) * stride.y + (x / x_sampling - origin.x / x_sampling) * stride.x`.
/// Strides are counted in samples, not in bytes.
#[derive(Debug, Clone, Copy)]
pub struct Slice<'fb> {

    /// The borrowed samples.
    pub samples: Samples<'fb>,

    /// The full resolution pixel coordinate of the sample at index zero.
    /// Must be divisible by the sampling factors.
    pub origin: Vec2<i32>,

    /// The distance between two horizontally and two vertically neighbouring samples.
    pub stride: Vec2<usize>,

    /// Must match the sampling of the channel in the file.
    pub sampling: Vec2<usize>,
}

/// Maps channel names to the slices that contain their samples.
/// Channels of the file that are not contained here are written as zeroes.
/// Slices for channels that the file does not contain are ignored.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer<'fb> {
    slices: Vec<(Text, Slice<'fb>)>,
}


impl<'fb> Samples<'fb> {

    /// The type of the contained samples.
    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::F16(_) => SampleType::F16,
            Samples::F32(_) => SampleType::F32,
            Samples::U32(_) => SampleType::U32,
        }
    }

    /// The number of samples.
    pub fn len(&self) -> usize {
        match self {
            Samples::F16(samples) => samples.len(),
            Samples::F32(samples) => samples.len(),
            Samples::U32(samples) => samples.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'fb> From<&'fb [f16]> for Samples<'fb> {
    fn from(samples: &'fb [f16]) -> Self { Samples::F16(samples) }
}

impl<'fb> From<&'fb [f32]> for Samples<'fb> {
    fn from(samples: &'fb [f32]) -> Self { Samples::F32(samples) }
}

impl<'fb> From<&'fb [u32]> for Samples<'fb> {
    fn from(samples: &'fb [u32]) -> Self { Samples::U32(samples) }
}


impl<'fb> Slice<'fb> {

    /// Create a view with explicit origin and strides, and a sampling rate of (1,1).
    pub fn new(samples: impl Into<Samples<'fb>>, origin: impl Into<Vec2<i32>>, stride: impl Into<Vec2<usize>>) -> Self {
        Slice {
            samples: samples.into(),
            origin: origin.into(),
            stride: stride.into(),
            sampling: Vec2(1, 1),
        }
    }

    /// Create a view of samples that tightly cover the rectangle, row by row.
    pub fn packed(samples: impl Into<Samples<'fb>>, bounds: IntegerBounds) -> Self {
        Self::new(samples, bounds.position, (1, bounds.size.width()))
    }

    /// Create a view of samples that tightly cover the rectangle, row by row,
    /// containing only every n-th sample in each dimension.
    pub fn packed_subsampled(samples: impl Into<Samples<'fb>>, bounds: IntegerBounds, sampling: impl Into<Vec2<usize>>) -> Self {
        let sampling = sampling.into();
        let row_length = bounds.size.width() / sampling.x().max(1);
        Self::new(samples, bounds.position, (1, row_length)).with_sampling(sampling)
    }

    /// Only every n-th sample of the channel is contained in the view.
    pub fn with_sampling(self, sampling: impl Into<Vec2<usize>>) -> Self {
        Slice { sampling: sampling.into(), ..self }
    }
}


impl<'fb> FrameBuffer<'fb> {

    /// Create a frame buffer without any slices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slice, replacing a previous slice with the same name.
    pub fn insert(&mut self, name: impl Into<Text>, slice: Slice<'fb>) {
        let name = name.into();

        match self.slices.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = slice,
            None => self.slices.push((name, slice)),
        }
    }

    /// Add a slice, replacing a previous slice with the same name.
    pub fn with_slice(mut self, name: impl Into<Text>, slice: Slice<'fb>) -> Self {
        self.insert(name, slice);
        self
    }

    /// The slice registered for the channel name, if any.
    pub fn get(&self, name: &[u8]) -> Option<&Slice<'fb>> {
        self.slices.iter()
            .find(|(existing, _)| existing.bytes() == name)
            .map(|(_, slice)| slice)
    }
}


/// A validated slice, with all offsets computed for one data window.
#[derive(Debug, Clone)]
pub struct SourceView<'fb> {
    samples: Samples<'fb>,

    /// Index offset of the first sample of the data window inside a row.
    first_column: usize,

    /// Index distance between two samples in a row.
    x_stride: usize,

    /// Index distance between two rows.
    y_stride: usize,

    /// The first sampled row of this view.
    first_row: i64,

    /// The sampled rows of which all samples of the data window are inside the view.
    readable_rows: Range<i64>,
}

/// The resolved binding of one file channel.
#[derive(Debug, Clone)]
pub struct ChannelSlice<'fb> {

    /// The type of the channel in the file.
    pub sample_type: SampleType,

    /// The sampling of the channel in the file.
    pub sampling: Vec2<usize>,

    /// The name of the channel, for diagnostics.
    pub name: Text,

    /// `None` if the channel is filled with zeroes.
    pub source: Option<SourceView<'fb>>,
}

/// One resolved slice per channel of the file, in channel order.
#[derive(Debug, Clone)]
pub struct SliceTable<'fb> {
    slices: Vec<ChannelSlice<'fb>>,
}


impl<'fb> SliceTable<'fb> {

    /// Resolve the frame buffer against the channels of a file.
    /// Fails without side effects if any matching slice does not fit the channel.
    pub fn resolve(channels: &ChannelList, data_window: IntegerBounds, frame_buffer: &FrameBuffer<'fb>) -> Result<Self> {
        let slices = channels.list.iter().map(|channel| {
            let source = match frame_buffer.get(channel.name.bytes()) {
                None => None,
                Some(slice) => Some(SourceView::validate(&channel.name, channel.sample_type, channel.sampling, slice, data_window)?),
            };

            Ok(ChannelSlice {
                sample_type: channel.sample_type,
                sampling: channel.sampling,
                name: channel.name.clone(),
                source,
            })
        }).collect::<Result<Vec<_>>>()?;

        Ok(SliceTable { slices })
    }

    /// The slices, one per file channel, in channel order.
    pub fn slices(&self) -> &[ChannelSlice<'fb>] {
        &self.slices
    }

    /// The number of channels that have no source and are filled with zeroes.
    pub fn zero_filled_count(&self) -> usize {
        self.slices.iter().filter(|slice| slice.source.is_none()).count()
    }
}


impl<'fb> SourceView<'fb> {

    fn validate(name: &Text, sample_type: SampleType, sampling: Vec2<usize>, slice: &Slice<'fb>, data_window: IntegerBounds) -> Result<Self> {
        if slice.samples.sample_type() != sample_type {
            return Err(Error::configuration(format!(
                "pixel type of channel \"{}\" is {:?} in the file, but {:?} in the frame buffer",
                name, sample_type, slice.samples.sample_type()
            )));
        }

        if slice.sampling != sampling {
            return Err(Error::configuration(format!(
                "sampling of channel \"{}\" is {:?} in the file, but {:?} in the frame buffer",
                name, sampling, slice.sampling
            )));
        }

        let sampling = sampling.to_i32("channel sampling")?;
        if mod_p(slice.origin.x(), sampling.x()) != 0 || mod_p(slice.origin.y(), sampling.y()) != 0 {
            return Err(Error::configuration(format!(
                "frame buffer origin of channel \"{}\" is not divisible by its sampling", name
            )));
        }

        let origin = Vec2(
            div_p(slice.origin.x(), sampling.x()) as i64,
            div_p(slice.origin.y(), sampling.y()) as i64,
        );

        let first_x = div_p(data_window.position.x(), sampling.x()) as i64;
        let samples_per_row = (data_window.size.width() / sampling.x() as usize) as i64;

        if first_x < origin.x() {
            return Err(Error::configuration(format!(
                "frame buffer of channel \"{}\" starts right of the data window", name
            )));
        }

        let first_column = (first_x - origin.x()) as u128 * slice.stride.x() as u128;
        let last_column = first_column + (samples_per_row.max(1) - 1) as u128 * slice.stride.x() as u128;
        let len = slice.samples.len() as u128;

        // rows are readable while their last sample is inside the samples
        let readable_row_count = if last_column >= len { 0 }
            else if slice.stride.y() == 0 { i64::MAX / 2 }
            else { ((len - 1 - last_column) / slice.stride.y() as u128 + 1).min(i64::MAX as u128 / 2) as i64 };

        if readable_row_count == 0 {
            return Err(Error::configuration(format!(
                "frame buffer of channel \"{}\" is too small for one row of the data window", name
            )));
        }

        Ok(SourceView {
            samples: slice.samples,
            first_column: first_column as usize,
            x_stride: slice.stride.x(),
            y_stride: slice.stride.y(),
            first_row: origin.y(),
            readable_rows: origin.y() .. origin.y() + readable_row_count,
        })
    }

    /// Write the samples of one sampled row into the target, in the requested byte order.
    /// The target must hold exactly the samples of one row of the data window.
    pub fn pack_row(&self, sampled_y: i64, byte_order: SampleByteOrder, target: &mut [u8]) -> UnitResult {
        if !self.readable_rows.contains(&sampled_y) {
            return Err(Error::configuration(format!(
                "frame buffer does not contain sampled row {}", sampled_y
            )));
        }

        let row_start = (sampled_y - self.first_row) as usize * self.y_stride + self.first_column;

        match self.samples {
            Samples::F16(samples) => pack_strided(samples, row_start, self.x_stride, byte_order, target),
            Samples::F32(samples) => pack_strided(samples, row_start, self.x_stride, byte_order, target),
            Samples::U32(samples) => pack_strided(samples, row_start, self.x_stride, byte_order, target),
        }
    }
}

fn pack_strided<T: PackedSample>(samples: &[T], start: usize, stride: usize, byte_order: SampleByteOrder, target: &mut [u8]) -> UnitResult {
    for (index, target) in target.chunks_exact_mut(T::BYTE_SIZE).enumerate() {
        let sample = samples.get(start + index * stride).copied()
            .ok_or_else(|| Error::logic("frame buffer row bounds"))?;

        sample.write_packed(byte_order, target);
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::ChannelDescription;

    fn channels() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::named("A", SampleType::F32),
            ChannelDescription::named("B", SampleType::U32),
            ChannelDescription::named("Y", SampleType::F16).with_sampling((2, 2)),
        ])
    }

    #[test]
    fn absent_channels_are_zero_filled() {
        let window = IntegerBounds::new((0, 0), (4, 4));
        let samples = vec![0.0_f32; 16];
        let unused = vec![0_u32; 16];

        let frame_buffer = FrameBuffer::new()
            .with_slice("A", Slice::packed(samples.as_slice(), window))
            .with_slice("Unknown", Slice::packed(unused.as_slice(), window));

        let table = SliceTable::resolve(&channels(), window, &frame_buffer).unwrap();
        assert_eq!(table.slices().len(), 3);
        assert!(table.slices()[0].source.is_some());
        assert_eq!(table.zero_filled_count(), 2);
    }

    #[test]
    fn mismatches_are_configuration_errors() {
        let window = IntegerBounds::new((0, 0), (4, 4));
        let floats = vec![0.0_f32; 16];
        let halfs = vec![f16::ZERO; 4];

        let wrong_type = FrameBuffer::new().with_slice("B", Slice::packed(floats.as_slice(), window));
        assert!(SliceTable::resolve(&channels(), window, &wrong_type).unwrap_err().is_configuration_error());

        let wrong_sampling = FrameBuffer::new().with_slice("Y", Slice::packed(halfs.as_slice(), window));
        assert!(SliceTable::resolve(&channels(), window, &wrong_sampling).unwrap_err().is_configuration_error());

        let subsampled = FrameBuffer::new().with_slice("Y", Slice::packed_subsampled(halfs.as_slice(), window, (2, 2)));
        assert!(SliceTable::resolve(&channels(), window, &subsampled).is_ok());

        let misaligned = FrameBuffer::new().with_slice("Y", Slice::new(halfs.as_slice(), (1, 0), (1, 2)).with_sampling((2, 2)));
        assert!(SliceTable::resolve(&channels(), window, &misaligned).unwrap_err().is_configuration_error());

        let too_narrow = FrameBuffer::new().with_slice("A", Slice::packed(&floats[..3], window));
        assert!(SliceTable::resolve(&channels(), window, &too_narrow).unwrap_err().is_configuration_error());
    }

    #[test]
    fn rows_outside_the_view_are_rejected() {
        let window = IntegerBounds::new((-1, 10), (2, 3));
        let samples: Vec<f32> = (0 .. 4).map(|index| index as f32).collect();

        // only two of the three rows are covered
        let slice = Slice::packed(samples.as_slice(), window);
        let view = SourceView::validate(&Text::from("A"), SampleType::F32, Vec2(1, 1), &slice, window).unwrap();

        let mut row = [0_u8; 8];
        view.pack_row(11, SampleByteOrder::LittleEndian, &mut row).unwrap();
        assert_eq!(&row[0..4], &2.0_f32.to_le_bytes());
        assert_eq!(&row[4..8], &3.0_f32.to_le_bytes());

        assert!(view.pack_row(12, SampleByteOrder::LittleEndian, &mut row).unwrap_err().is_configuration_error());
        assert!(view.pack_row(9, SampleByteOrder::LittleEndian, &mut row).is_err());
    }

    #[test]
    fn interleaved_and_offset_views() {
        // two channels interleaved in one buffer, the view starts left of the data window
        let window = IntegerBounds::new((2, 0), (2, 2));
        let interleaved: Vec<u32> = (0 .. 16).collect();

        let slice = Slice::new(&interleaved[1..], (0, 0), (2, 8));
        let view = SourceView::validate(&Text::from("B"), SampleType::U32, Vec2(1, 1), &slice, window).unwrap();

        let mut row = [0_u8; 8];
        view.pack_row(1, SampleByteOrder::Native, &mut row).unwrap();
        assert_eq!(&row[0..4], &13_u32.to_ne_bytes());
        assert_eq!(&row[4..8], &15_u32.to_ne_bytes());
    }
}
