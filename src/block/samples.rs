//! Write pixel samples into packed line buffers,
//! in the byte order that the compressor asks for.

use half::f16;
use std::ops::RangeInclusive;

use crate::error::{Error, UnitResult};
use crate::meta::attribute::{ChannelList, IntegerBounds};


/// The byte order of the samples in a packed line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleByteOrder {

    /// The byte order of the machine running this code.
    /// Compressors that reorder bytes themselves prefer this.
    Native,

    /// The byte order of the file format.
    /// Uncompressed data is always packed like this.
    LittleEndian,
}

/// A sample type that can be packed into a line buffer.
/// Native and little endian representations have the same size.
pub trait PackedSample: Copy {

    /// Number of bytes in a line buffer.
    const BYTE_SIZE: usize;

    /// Write this sample into the target, which has exactly `BYTE_SIZE` bytes.
    fn write_packed(self, byte_order: SampleByteOrder, target: &mut [u8]);
}

macro_rules! implement_packed_sample {
    ($kind: ty, $size: expr) => {
        impl PackedSample for $kind {
            const BYTE_SIZE: usize = $size;

            #[inline]
            fn write_packed(self, byte_order: SampleByteOrder, target: &mut [u8]) {
                let bytes = match byte_order {
                    SampleByteOrder::Native => self.to_ne_bytes(),
                    SampleByteOrder::LittleEndian => self.to_le_bytes(),
                };

                target.copy_from_slice(&bytes);
            }
        }
    };
}

implement_packed_sample!(f16, 2);
implement_packed_sample!(f32, 4);
implement_packed_sample!(u32, 4);


/// Convert a packed line buffer from native to little endian byte order, in place.
/// The buffer must contain exactly the packed lines of the specified range.
/// Does not modify any bytes on little endian machines.
pub fn convert_native_to_little_endian(
    bytes: &mut [u8], channels: &ChannelList,
    data_window: IntegerBounds, lines: RangeInclusive<i32>
) -> UnitResult
{
    let mut remaining = bytes;

    for y in lines {
        for channel in &channels.list {
            if !channel.is_sampled_on_line(y) { continue; }

            let sample_size = channel.sample_type.bytes_per_sample();
            let byte_count = channel.samples_per_line(data_window) * sample_size;

            if byte_count > remaining.len() {
                return Err(Error::logic("packed line buffer is smaller than its lines"));
            }

            let (line, rest) = std::mem::take(&mut remaining).split_at_mut(byte_count);
            remaining = rest;

            if cfg!(target_endian = "big") {
                for sample in line.chunks_exact_mut(sample_size) {
                    sample.reverse();
                }
            }
        }
    }

    if !remaining.is_empty() {
        return Err(Error::logic("packed line buffer is larger than its lines"));
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, SampleType};

    #[test]
    fn pack_in_both_orders() {
        let mut native = [0_u8; 4];
        let mut little = [0_u8; 4];

        1.5_f32.write_packed(SampleByteOrder::Native, &mut native);
        1.5_f32.write_packed(SampleByteOrder::LittleEndian, &mut little);

        assert_eq!(f32::from_ne_bytes(native), 1.5);
        assert_eq!(f32::from_le_bytes(little), 1.5);

        let mut half = [0_u8; 2];
        f16::from_f32(-2.0).write_packed(SampleByteOrder::LittleEndian, &mut half);
        assert_eq!(half, f16::from_f32(-2.0).to_le_bytes());
    }

    #[test]
    fn in_place_conversion_matches_little_endian_packing() {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::named("U", SampleType::U32),
            ChannelDescription::named("Y", SampleType::F16).with_sampling((1, 2)),
        ]);

        let window = IntegerBounds::new((0, 0), (2, 4));
        let mut packed = Vec::new();
        let mut expected = Vec::new();

        for y in 1 ..= 2 {
            for x in 0 .. 2_u32 {
                let value = 0x01020304 * (y as u32 + 1) + x;
                packed.extend_from_slice(&value.to_ne_bytes());
                expected.extend_from_slice(&value.to_le_bytes());
            }

            if y % 2 == 0 {
                for x in 0 .. 2 {
                    let value = f16::from_f32(x as f32 + 0.25);
                    packed.extend_from_slice(&value.to_ne_bytes());
                    expected.extend_from_slice(&value.to_le_bytes());
                }
            }
        }

        convert_native_to_little_endian(&mut packed, &channels, window, 1 ..= 2).unwrap();
        assert_eq!(packed, expected);

        assert!(convert_native_to_little_endian(&mut packed, &channels, window, 1 ..= 1).is_err());
    }
}
