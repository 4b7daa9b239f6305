
//! Contains the header of a scan line image part, and the functions to write and read it.

use smallvec::SmallVec;

use crate::io::*;
use crate::math::*;
use crate::error::*;
use crate::compression::Compression;
use crate::meta::sequence_end;
use crate::meta::attribute::*;


/// Describes a single scan line image part of a file.
/// Immutable once a file has been opened, except for the preview pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// The channels of the image, sorted by name.
    pub channels: ChannelList,

    /// How the pixel data of all channels is compressed.
    pub compression: Compression,

    /// The rectangle of pixels that are actually stored in the file.
    pub data_window: IntegerBounds,

    /// The rectangle that should be displayed by viewers.
    pub display_window: IntegerBounds,

    /// In what order the scan line groups appear in the file.
    pub line_order: LineOrder,

    /// Aspect ratio of each pixel in this header.
    pub pixel_aspect: f32,

    /// Part of the perspective projection. Default should be `(0, 0)`.
    pub screen_window_center: Vec2<f32>,

    /// Part of the perspective projection. Default should be `1`.
    pub screen_window_width: f32,

    /// A small rgba image of the full image, with opaque pixel bytes.
    /// Reserves space in the file that can be updated after writing pixels.
    pub preview: Option<Preview>,

    /// The name of this part. Required in multi-part files.
    pub name: Option<Text>,

    /// The type of the blocks in this part. Required in multi-part files.
    pub block_type: Option<BlockType>,
}

/// Where the values of the written header attributes landed,
/// relative to the first byte of the written header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderLayout {

    /// The byte offset of the preview attribute value, if the header has a preview.
    pub preview_value_offset: Option<usize>,
}


impl Header {

    /// Create a header for an image of the specified size, positioned at the origin,
    /// without compression, in increasing line order.
    pub fn new(size: impl Into<Vec2<usize>>, channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let data_window = IntegerBounds::from_dimensions(size);

        Header {
            channels: ChannelList::new(channels),
            compression: Compression::Uncompressed,
            data_window,
            display_window: data_window,
            line_order: LineOrder::Increasing,
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,
            preview: None,
            name: None,
            block_type: None,
        }
    }

    /// Set the compression method.
    pub fn with_compression(self, compression: Compression) -> Self {
        Header { compression, ..self }
    }

    /// Set the line order.
    pub fn with_line_order(self, line_order: LineOrder) -> Self {
        Header { line_order, ..self }
    }

    /// Move the data window, keeping its size. The display window is moved as well.
    pub fn with_position(self, position: impl Into<Vec2<i32>>) -> Self {
        let position = position.into();

        Header {
            data_window: IntegerBounds { position, ..self.data_window },
            display_window: IntegerBounds { position, ..self.display_window },
            ..self
        }
    }

    /// Reserve space for a preview image.
    pub fn with_preview(self, preview: Preview) -> Self {
        Header { preview: Some(preview), ..self }
    }

    /// Set the name of this part.
    pub fn with_name(self, name: impl Into<Text>) -> Self {
        Header { name: Some(name.into()), ..self }
    }

    /// The number of scan line groups, which is the number of chunks of this part.
    pub fn chunk_count(&self) -> usize {
        compute_block_count(self.data_window.size.height(), self.compression.scan_lines_per_block())
    }

    /// The number of scan lines in the data window.
    pub fn scan_line_count(&self) -> usize {
        self.data_window.size.height()
    }

    /// Check whether this header can be written, and whether it requires long names.
    pub fn validate(&self, is_multi_part: bool, long_names: &mut bool) -> UnitResult {
        self.data_window.validate()?;
        self.display_window.validate()?;
        self.channels.validate(self.data_window, long_names)?;

        if let Some(preview) = &self.preview {
            preview.validate()?;
        }

        if let Some(name) = &self.name {
            name.validate(false, Some(long_names))?;
        }

        if is_multi_part {
            if self.name.is_none() {
                return Err(Error::invalid("headers of multi-part files must have a name"));
            }

            if self.block_type.is_none() {
                return Err(Error::invalid("headers of multi-part files must have a type"));
            }
        }

        if !self.pixel_aspect.is_normal() || self.pixel_aspect < 0.0 {
            return Err(Error::invalid("pixel aspect ratio"));
        }

        if self.screen_window_width < 0.0 {
            return Err(Error::invalid("screen window width"));
        }

        Ok(())
    }

    /// Without validation, write the attributes of this header and the terminating null byte.
    /// Attributes are written in alphabetical order.
    pub fn write_to_buffer(&self, bytes: &mut Vec<u8>, is_multi_part: bool) -> Result<HeaderLayout> {
        use self::attribute_names as name;
        use self::type_names as ty;

        let header_start = bytes.len();
        let mut layout = HeaderLayout::default();

        write_attribute_head(name::CHANNELS, ty::CHANNEL_LIST, self.channels.byte_size(), bytes)?;
        self.channels.write(bytes)?;

        if is_multi_part {
            write_attribute_head(name::CHUNK_COUNT, ty::I32, i32::BYTE_SIZE, bytes)?;
            usize_to_i32(self.chunk_count(), "chunk count")?.write_le(bytes)?;
        }

        write_attribute_head(name::COMPRESSION, ty::COMPRESSION, u8::BYTE_SIZE, bytes)?;
        self.compression.write(bytes)?;

        write_attribute_head(name::DATA_WINDOW, ty::I32BOX2, IntegerBounds::byte_size(), bytes)?;
        self.data_window.write(bytes)?;

        write_attribute_head(name::DISPLAY_WINDOW, ty::I32BOX2, IntegerBounds::byte_size(), bytes)?;
        self.display_window.write(bytes)?;

        write_attribute_head(name::LINE_ORDER, ty::LINE_ORDER, u8::BYTE_SIZE, bytes)?;
        self.line_order.write(bytes)?;

        if let Some(part_name) = &self.name {
            write_attribute_head(name::NAME, ty::TEXT, part_name.bytes().len(), bytes)?;
            u8::write_slice_le(bytes, part_name.bytes())?;
        }

        write_attribute_head(name::PIXEL_ASPECT, ty::F32, f32::BYTE_SIZE, bytes)?;
        self.pixel_aspect.write_le(bytes)?;

        if let Some(preview) = &self.preview {
            write_attribute_head(name::PREVIEW, ty::PREVIEW, preview.byte_size(), bytes)?;
            layout.preview_value_offset = Some(bytes.len() - header_start);
            preview.write(bytes)?;
        }

        write_attribute_head(name::WINDOW_CENTER, ty::F32VEC2, 2 * f32::BYTE_SIZE, bytes)?;
        self.screen_window_center.x().write_le(bytes)?;
        self.screen_window_center.y().write_le(bytes)?;

        write_attribute_head(name::WINDOW_WIDTH, ty::F32, f32::BYTE_SIZE, bytes)?;
        self.screen_window_width.write_le(bytes)?;

        if let Some(block_type) = self.block_type {
            let text = block_type.to_text_bytes();
            write_attribute_head(name::BLOCK_TYPE, ty::TEXT, text.len(), bytes)?;
            u8::write_slice_le(bytes, text)?;
        }

        sequence_end::write(bytes)?;
        Ok(layout)
    }

    /// Read the attributes of a header, up to and including the terminating null byte.
    /// Skips attributes that this crate does not know.
    /// A part with a `tiles` attribute but without a type is reported as tiled.
    pub fn read(read: &mut PeekRead<impl Read>, max_name_len: usize) -> Result<Self> {
        use self::attribute_names as name;
        use self::type_names as ty;

        let mut channels = None;
        let mut compression = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut line_order = None;
        let mut pixel_aspect = 1.0;
        let mut screen_window_center = Vec2(0.0, 0.0);
        let mut screen_window_width = 1.0;
        let mut preview = None;
        let mut part_name = None;
        let mut block_type = None;
        let mut has_tiles = false;

        while !sequence_end::has_come(read)? {
            let (attribute, kind, size) = read_attribute_head(read, max_name_len)?;

            match attribute.bytes() {
                name::CHANNELS => { expect_type(&kind, ty::CHANNEL_LIST)?; channels = Some(ChannelList::read(read)?); },
                name::COMPRESSION => { expect_type(&kind, ty::COMPRESSION)?; compression = Some(Compression::read(read)?); },
                name::DATA_WINDOW => { expect_type(&kind, ty::I32BOX2)?; data_window = Some(IntegerBounds::read(read)?); },
                name::DISPLAY_WINDOW => { expect_type(&kind, ty::I32BOX2)?; display_window = Some(IntegerBounds::read(read)?); },
                name::LINE_ORDER => { expect_type(&kind, ty::LINE_ORDER)?; line_order = Some(LineOrder::read(read)?); },
                name::PIXEL_ASPECT => { expect_type(&kind, ty::F32)?; pixel_aspect = f32::read_le(read)?; },
                name::WINDOW_WIDTH => { expect_type(&kind, ty::F32)?; screen_window_width = f32::read_le(read)?; },
                name::PREVIEW => { expect_type(&kind, ty::PREVIEW)?; preview = Some(Preview::read(read)?); },
                name::NAME => { expect_type(&kind, ty::TEXT)?; part_name = Some(Text::read_sized(read, size)?); },
                name::BLOCK_TYPE => { expect_type(&kind, ty::TEXT)?; block_type = Some(BlockType::parse(Text::read_sized(read, size)?)?); },

                name::WINDOW_CENTER => {
                    expect_type(&kind, ty::F32VEC2)?;
                    screen_window_center = Vec2(f32::read_le(read)?, f32::read_le(read)?);
                },

                name::TILES => {
                    has_tiles = true;
                    skip_bytes(read, size)?;
                },

                _ => skip_bytes(read, size)?,
            }
        }

        let missing = |attribute: &str| Error::invalid(format!("missing or invalid {} attribute", attribute));
        let data_window = data_window.ok_or_else(|| missing("data window"))?;

        if has_tiles && block_type.is_none() {
            block_type = Some(BlockType::Tile);
        }

        Ok(Header {
            channels: channels.ok_or_else(|| missing("channels"))?,
            compression: compression.ok_or_else(|| missing("compression"))?,
            display_window: display_window.unwrap_or(data_window),
            line_order: line_order.ok_or_else(|| missing("line order"))?,
            data_window,
            pixel_aspect,
            screen_window_center,
            screen_window_width,
            preview,
            name: part_name,
            block_type,
        })
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn header() -> Header {
        Header::new((7, 5), smallvec![
            ChannelDescription::named("G", SampleType::F16),
            ChannelDescription::named("A", SampleType::U32),
        ])
            .with_position((-3, 2))
            .with_compression(Compression::ZIP16)
            .with_line_order(LineOrder::Decreasing)
    }

    #[test]
    fn attributes_survive_writing() {
        let header = header().with_preview(Preview::with_size((2, 1))).with_name("beauty");

        let mut bytes = Vec::new();
        let layout = header.write_to_buffer(&mut bytes, false).unwrap();

        let read = Header::read(&mut PeekRead::new(Cursor::new(&bytes)), 256).unwrap();
        assert_eq!(read, header);

        let preview_offset = layout.preview_value_offset.unwrap();
        assert_eq!(&bytes[preview_offset .. preview_offset + 8], &[2, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn multi_part_headers_need_names() {
        let mut long_names = false;
        assert!(header().validate(true, &mut long_names).is_err());

        let mut named = header().with_name("left");
        named.block_type = Some(BlockType::ScanLine);
        named.validate(true, &mut long_names).unwrap();
        assert!(!long_names);
    }

    #[test]
    fn long_channel_names_are_flagged() {
        let header = Header::new((1, 1), smallvec![
            ChannelDescription::named("diffuse.indirect.contribution.red", SampleType::F32),
        ]);

        let mut long_names = false;
        header.validate(false, &mut long_names).unwrap();
        assert!(long_names);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(header().chunk_count(), 1);
        assert_eq!(header().with_compression(Compression::RLE).chunk_count(), 5);
        assert_eq!(Header { data_window: IntegerBounds::from_dimensions((1, 33)), ..header() }.chunk_count(), 3);
    }
}
