
//! Describes the headers of a file, and how they are laid out
//! in front of the offset tables and the pixel chunks.

pub mod attribute;
pub mod header;

use smallvec::SmallVec;

use crate::io::*;
use crate::error::*;
use crate::meta::header::{Header, HeaderLayout};
use crate::meta::attribute::BlockType;
use ::bit_field::BitField;


/// The first four bytes of each exr file.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each exr file.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice_le(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether the file may be an exr file.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice_le(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate this image. If it is an exr file, return `Ok(())`.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read)? { Ok(()) }
        else { Err(Error::invalid("file identifier missing")) }
    }
}

/// A `0_u8` at the end of a sequence.
pub mod sequence_end {
    use super::*;

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        1
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write_le(write)
    }

    /// Peeks the next byte. If it is zero, consumes the byte and returns true.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}


/// The version field of a file, which follows the magic number.
/// Contains the format version and flags that tell a reader
/// which features it needs to support.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Requirements {

    /// This number should always be `2`.
    pub file_format_version: u8,

    /// A single-part file whose blocks are tiles. Never set by this crate.
    pub is_single_layer_and_tiled: bool,

    /// Whether any attribute name, type name or channel name is longer than 31 bytes.
    pub has_long_names: bool,

    /// Whether any part contains deep data. Never set by this crate.
    pub has_deep_data: bool,

    /// Whether the file contains multiple parts, each tagged in every chunk.
    pub has_multiple_layers: bool,
}

impl Requirements {

    /// Validate the headers and infer the flags they require.
    pub fn infer(headers: &[Header], is_multi_part: bool) -> Result<Self> {
        let mut has_long_names = false;

        for header in headers {
            header.validate(is_multi_part, &mut has_long_names)?;
        }

        Ok(Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: false,
            has_long_names,
            has_deep_data: false,
            has_multiple_layers: is_multi_part,
        })
    }

    /// The longest attribute name a reader should accept for these requirements.
    pub fn max_name_length(&self) -> usize {
        if self.has_long_names { 255 } else { 31 }
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let version_and_flags = u32::read_le(read)?;

        // all bits above the flags we know are reserved and should be 0
        if version_and_flags >> 13 != 0 {
            return Err(Error::unsupported("too new file feature flags"));
        }

        Ok(Requirements {
            file_format_version: version_and_flags.get_bits(0..8) as u8,
            is_single_layer_and_tiled: version_and_flags.get_bit(9),
            has_long_names: version_and_flags.get_bit(10),
            has_deep_data: version_and_flags.get_bit(11),
            has_multiple_layers: version_and_flags.get_bit(12),
        })
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        // the 8 least significant bits contain the file format version number
        let mut version_and_flags = self.file_format_version as u32;

        version_and_flags.set_bit(9, self.is_single_layer_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.has_multiple_layers);

        version_and_flags.write_le(write)
    }
}


/// The serialized beginning of a file: magic number, version field and all headers.
#[derive(Debug, Clone)]
pub struct MetaDataBytes {

    /// The bytes to write at the start of the file.
    pub bytes: Vec<u8>,

    /// The flags written into the version field.
    pub requirements: Requirements,

    /// Where the attribute values of each header landed, relative to the start of `bytes`.
    pub layouts: SmallVec<[HeaderLayout; 3]>,
}

impl MetaDataBytes {

    /// Validate and serialize all headers.
    /// In multi-part files, the header list is terminated by an additional null byte.
    pub fn write(headers: &[Header], is_multi_part: bool) -> Result<Self> {
        if headers.is_empty() {
            return Err(Error::invalid("at least one header is required"));
        }

        if headers.len() > 1 && !is_multi_part {
            return Err(Error::invalid("multiple headers require a multi-part file"));
        }

        let requirements = Requirements::infer(headers, is_multi_part)?;

        let mut bytes = Vec::with_capacity(512);
        magic_number::write(&mut bytes)?;
        requirements.write(&mut bytes)?;

        let mut layouts = SmallVec::new();
        for header in headers {
            let header_start = bytes.len();
            let mut layout = header.write_to_buffer(&mut bytes, is_multi_part)?;
            layout.preview_value_offset = layout.preview_value_offset.map(|offset| header_start + offset);
            layouts.push(layout);
        }

        if is_multi_part {
            sequence_end::write(&mut bytes)?;
        }

        Ok(MetaDataBytes { bytes, requirements, layouts })
    }
}


/// Read the magic number, the version field and the header of a single-part file.
/// Multi-part and deep files are not supported.
pub fn read_single_part(read: &mut PeekRead<impl Read>) -> Result<(Requirements, Header)> {
    magic_number::validate_exr(read)?;
    let requirements = Requirements::read(read)?;

    if requirements.has_multiple_layers {
        return Err(Error::unsupported("reading multi-part files"));
    }

    if requirements.has_deep_data {
        return Err(Error::unsupported("reading deep data"));
    }

    let mut header = Header::read(read, requirements.max_name_length())?;

    if requirements.is_single_layer_and_tiled {
        header.block_type = Some(BlockType::Tile);
    }

    Ok((requirements, header))
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::*;
    use crate::compression::Compression;

    fn header() -> Header {
        Header::new((2, 3), smallvec![ ChannelDescription::named("Z", SampleType::F32) ])
            .with_compression(Compression::RLE)
    }

    #[test]
    fn version_field_bits() {
        let requirements = Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: false,
            has_long_names: true,
            has_deep_data: false,
            has_multiple_layers: true,
        };

        let mut bytes = Vec::new();
        requirements.write(&mut bytes).unwrap();
        assert_eq!(bytes, vec![ 2, 0b0001_0100, 0, 0 ]);
        assert_eq!(Requirements::read(&mut bytes.as_slice()).unwrap(), requirements);

        let reserved_flag: &[u8] = &[ 2, 0, 1, 0 ];
        assert!(Requirements::read(&mut { reserved_flag }).is_err());
    }

    #[test]
    fn single_part_meta_data() {
        let meta = MetaDataBytes::write(&[header()], false).unwrap();
        assert_eq!(&meta.bytes[0..4], &magic_number::BYTES);
        assert_eq!(&meta.bytes[4..8], &[2, 0, 0, 0], "short names, single part, version 2");
        assert!(!meta.requirements.has_long_names);

        let (requirements, read) = read_single_part(&mut PeekRead::new(meta.bytes.as_slice())).unwrap();
        assert_eq!(requirements, meta.requirements);
        assert_eq!(read, header());
    }

    #[test]
    fn multi_part_meta_data() {
        let mut left = header().with_name("left").with_preview(Preview::with_size((1, 1)));
        left.block_type = Some(BlockType::ScanLine);

        let mut right = header().with_name("right");
        right.block_type = Some(BlockType::ScanLine);

        let meta = MetaDataBytes::write(&[left, right], true).unwrap();
        assert!(meta.requirements.has_multiple_layers);
        assert_eq!(*meta.bytes.last().unwrap(), 0);
        assert_eq!(meta.bytes[meta.bytes.len() - 2], 0, "second header and header list both end with a null byte");

        let preview_offset = meta.layouts[0].preview_value_offset.unwrap();
        assert_eq!(&meta.bytes[preview_offset .. preview_offset + 8], &[1, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(meta.layouts[1].preview_value_offset, None);

        assert!(MetaDataBytes::write(&[header(), header()], false).is_err());
        assert!(read_single_part(&mut PeekRead::new(meta.bytes.as_slice())).is_err());
    }
}
