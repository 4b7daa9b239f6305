
//! Contains the compression attribute definition,
//! the compressor interface used by the line buffers,
//! and the built-in lossless compressors.


// private modules make non-breaking changes easier
mod zip;
mod rle;

use std::sync::Arc;

use crate::meta::attribute::{ChannelList, IntegerBounds};
use crate::meta::header::Header;
use crate::block::samples::{SampleByteOrder, convert_native_to_little_endian};
use crate::error::{Result, Error, UnitResult};
use crate::io::{Data, Read, Write};


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// Creates a compressor for each line buffer of a file.
/// Consulted for every compression method except `Uncompressed`.
/// Use this to plug in codecs that this crate does not contain.
pub type CompressorFactory = Arc<dyn Fn(&Header) -> Result<Box<dyn Compressor>> + Send + Sync>;

/// Compresses the packed samples of one scan line group.
///
/// Every line buffer owns its own compressor,
/// so implementations may keep scratch memory between calls.
pub trait Compressor: Send {

    /// Compress the packed bytes of the group starting at scan line `group_start_y`.
    /// The bytes are packed in the order returned by `byte_order`.
    /// May return more bytes than the input contains,
    /// in which case the caller stores the input instead.
    fn compress(&mut self, packed: Bytes<'_>, group_start_y: i32) -> Result<ByteVec>;

    /// The byte order in which this compressor wants its input samples.
    fn byte_order(&self) -> SampleByteOrder;

    /// How many consecutive scan lines this compressor processes at once.
    fn lines_per_group(&self) -> usize;
}


/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    Uncompressed,

    /// Run length encoding of the byte-separated, delta-predicted samples.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each line.
    /// This compression method is lossless.
    ZIP1,

    /// Uses ZIP compression to compress blocks of 16 lines.
    /// This compression method is lossless.
    ZIP16,

    /// Wavelet transform and huffman coding in blocks of 32 lines.
    /// Requires a custom compressor factory.
    PIZ,

    /// Like `ZIP16`, but reduces `f32` samples to 24 bits.
    /// Requires a custom compressor factory.
    PXR24,

    /// Lossy 4x4 block compression of `f16` samples.
    /// Requires a custom compressor factory.
    B44,

    /// Like `B44`, with smaller blocks for uniform areas.
    /// Requires a custom compressor factory.
    B44A,

    /// Lossy DCT based compression in blocks of 32 lines.
    /// Requires a custom compressor factory.
    DWAA,

    /// Lossy DCT based compression in blocks of 256 lines.
    /// Requires a custom compressor factory.
    DWAB,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA => "dwaa",
            Compression::DWAB => "dwab",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
        })
    }
}


impl Compression {

    /// For scan line images, how many scan lines are grouped into one chunk.
    pub fn scan_lines_per_block(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE   | ZIP1 => 1,
            ZIP16 | PXR24               => 16,
            PIZ   | B44   | B44A | DWAA => 32,
            DWAB                        => 256,
        }
    }

    /// Whether this crate contains a compressor for this method.
    pub fn has_builtin_compressor(self) -> bool {
        matches!(self, Compression::Uncompressed | Compression::RLE | Compression::ZIP1 | Compression::ZIP16)
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::Compression::*;
        match self {
            Uncompressed => 0_u8,
            RLE => 1_u8,
            ZIP1 => 2_u8,
            ZIP16 => 3_u8,
            PIZ => 4_u8,
            PXR24 => 5_u8,
            B44 => 6_u8,
            B44A => 7_u8,
            DWAA => 8_u8,
            DWAB => 9_u8,
        }.write_le(write)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;
        Ok(match u8::read_le(read)? {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIP1,
            3 => ZIP16,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            8 => DWAA,
            9 => DWAB,
            _ => return Err(Error::unsupported("unknown compression method")),
        })
    }

    /// Undo the compression of one chunk produced by a built-in compressor.
    /// Returns the samples packed in little endian byte order.
    /// A payload that is as large as the expected data is stored without compression.
    pub fn decompress_to_little_endian(self, compressed: ByteVec, expected_byte_size: usize) -> Result<ByteVec> {
        if compressed.len() == expected_byte_size {
            return Ok(compressed);
        }

        let decompressed = match self {
            Compression::Uncompressed => return Err(Error::invalid("uncompressed chunk size")),
            Compression::RLE => rle::decompress_bytes(&compressed, expected_byte_size)?,
            Compression::ZIP1 | Compression::ZIP16 => zip::decompress_bytes(&compressed, expected_byte_size)?,
            other => return Err(Error::unsupported(format!("decompressing {}", other))),
        };

        if decompressed.len() != expected_byte_size {
            return Err(Error::invalid("decompressed chunk size"));
        }

        Ok(decompressed)
    }
}


/// Create the compressor for one line buffer of a file with the specified header.
/// Returns `None` for uncompressed files, which are packed in little endian directly.
pub fn new_compressor(header: &Header, factory: Option<&CompressorFactory>) -> Result<Option<Box<dyn Compressor>>> {
    let compression = header.compression;
    if compression == Compression::Uncompressed {
        return Ok(None);
    }

    let compressor: Box<dyn Compressor> = match factory {
        Some(factory) => factory(header)?,

        None if compression.has_builtin_compressor() => Box::new(BuiltinCompressor {
            compression,
            channels: header.channels.clone(),
            data_window: header.data_window,
        }),

        None => return Err(Error::unsupported(format!(
            "{} requires a custom compressor factory", compression
        ))),
    };

    if compressor.lines_per_group() != compression.scan_lines_per_block() {
        return Err(Error::configuration(format!(
            "compressor groups {} lines, but {} requires {}",
            compressor.lines_per_group(), compression, compression.scan_lines_per_block()
        )));
    }

    Ok(Some(compressor))
}


/// RLE and ZIP compression of native-endian input.
#[derive(Debug)]
struct BuiltinCompressor {
    compression: Compression,
    channels: ChannelList,
    data_window: IntegerBounds,
}

impl Compressor for BuiltinCompressor {
    fn compress(&mut self, packed: Bytes<'_>, group_start_y: i32) -> Result<ByteVec> {
        let lines = self.lines_per_group() as i32;
        let last_y = (group_start_y + lines - 1).min(self.data_window.max().y());

        let mut little_endian = packed.to_vec();
        convert_native_to_little_endian(&mut little_endian, &self.channels, self.data_window, group_start_y ..= last_y)?;

        match self.compression {
            Compression::RLE => rle::compress_bytes(little_endian),
            Compression::ZIP1 | Compression::ZIP16 => zip::compress_bytes(little_endian),
            other => Err(Error::logic(format!("no built-in compressor for {}", other))),
        }
    }

    fn byte_order(&self) -> SampleByteOrder {
        SampleByteOrder::Native
    }

    fn lines_per_group(&self) -> usize {
        self.compression.scan_lines_per_block()
    }
}


/// Byte reordering and delta prediction shared by RLE and ZIP.
mod optimize_bytes {

    /// Integrate over all differences to the previous value in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        let mut previous = match buffer.first() {
            Some(&first) => first,
            None => return,
        };

        for value in &mut buffer[1..] {
            previous = previous.wrapping_add(value.wrapping_sub(128));
            *value = previous;
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1..buffer.len()).rev() {
            buffer[index] = buffer[index].wrapping_sub(buffer[index - 1]).wrapping_add(128);
        }
    }

    /// Interleave the bytes such that the second half of the array is every other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

        let mut interleaved = Vec::with_capacity(separated.len());
        for (index, &first) in first_half.iter().enumerate() {
            interleaved.push(first);
            if let Some(&second) = second_half.get(index) {
                interleaved.push(second);
            }
        }

        separated.copy_from_slice(&interleaved);
    }

    /// Separate the bytes such that the second half contains every other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let even = source.iter().step_by(2);
        let odd = source.iter().skip(1).step_by(2);
        let separated: Vec<u8> = even.chain(odd).copied().collect();
        source.copy_from_slice(&separated);
    }


}
