
//! Contains all the header attribute value types this encoder writes,
//! and the functions to write and read them.

use smallvec::SmallVec;
use half::f16;
use std::convert::TryFrom;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

use crate::io::*;
use crate::math::*;
use crate::error::*;
use crate::meta::sequence_end;


/// The byte-string names of the attribute types as they appear in an exr file.
pub mod type_names {
    macro_rules! define_attribute_type_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte-string name of this attribute type as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_type_names! {
        I32BOX2:        b"box2i",
        I32:            b"int",
        F32:            b"float",
        F32VEC2:        b"v2f",
        CHANNEL_LIST:   b"chlist",
        COMPRESSION:    b"compression",
        LINE_ORDER:     b"lineOrder",
        PREVIEW:        b"preview",
        TEXT:           b"string"
    }
}

/// The byte-string names of the attributes as they appear in an exr file.
pub mod attribute_names {
    macro_rules! define_attribute_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte-string name of this attribute as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_names! {
        CHANNELS:               b"channels",
        COMPRESSION:            b"compression",
        DATA_WINDOW:            b"dataWindow",
        DISPLAY_WINDOW:         b"displayWindow",
        LINE_ORDER:             b"lineOrder",
        PIXEL_ASPECT:           b"pixelAspectRatio",
        WINDOW_CENTER:          b"screenWindowCenter",
        WINDOW_WIDTH:           b"screenWindowWidth",
        NAME:                   b"name",
        BLOCK_TYPE:             b"type",
        CHUNK_COUNT:            b"chunkCount",
        PREVIEW:                b"preview",
        TILES:                  b"tiles",
        VERSION:                b"version"
    }
}

/// The string literals used to represent a `BlockType` in a file.
pub mod block_type_strings {

    /// Type attribute text value of flat scan lines
    pub const SCAN_LINE: &'static [u8] = b"scanlineimage";

    /// Type attribute text value of flat tiles
    pub const TILE: &'static [u8] = b"tiledimage";

    /// Type attribute text value of deep scan lines
    pub const DEEP_SCAN_LINE: &'static [u8] = b"deepscanline";

    /// Type attribute text value of deep tiles
    pub const DEEP_TILE: &'static [u8] = b"deeptile";
}


/// The bytes that make up a `Text`. Most names fit without heap allocation.
pub type TextBytes = SmallVec<[u8; 24]>;

/// A byte array with each byte being a char.
/// This is not UTF and must be constructed from a standard string.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Default)] // hash implemented manually
pub struct Text {
    bytes: TextBytes,
}

/// The type of samples in a channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

/// A single channel of an image.
/// Does not contain the actual pixel data, but merely describes it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// One of "R", "G", or "B" most of the time.
    pub name: Text,

    /// U32, F16 or F32.
    pub sample_type: SampleType,

    /// Tells lossy compression methods whether this channel should be quantized linearly.
    pub quantize_linearly: bool,

    /// Only every n-th sample of this channel is stored, in each dimension.
    /// Both factors must divide the data window position and size.
    pub sampling: Vec2<usize>,
}

/// A list of channels, sorted alphabetically by name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelList {

    /// The channels in this list, sorted by name.
    pub list: SmallVec<[ChannelDescription; 5]>,
}

/// A rectangular section anywhere in 2D integer space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle.
    pub position: Vec2<i32>,

    /// How many pixels to include in this rectangle.
    /// Does not include the actual boundary, just like `Vec::len()`.
    pub size: Vec2<usize>,
}

/// In what order the scan line groups of pixel data appear in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// The groups are written from the top of the image to the bottom.
    Increasing,

    /// The groups are written from the bottom of the image to the top.
    Decreasing,

    /// The file makes no promise about the order.
    /// This encoder writes such files like `Increasing`.
    Unspecified,
}

/// Specifies the block type and deepness of an image part.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BlockType {

    /// Corresponds to the string value `scanlineimage`.
    ScanLine,

    /// Corresponds to the string value `tiledimage`.
    Tile,

    /// Corresponds to the string value `deepscanline`.
    DeepScanLine,

    /// Corresponds to the string value `deeptile`.
    DeepTile,
}

/// A small rgba image that approximates the real image.
/// The pixels are carried as opaque bytes, four per pixel.
#[derive(Clone, Eq, PartialEq)]
pub struct Preview {

    /// The dimensions of the preview image.
    pub size: Vec2<usize>,

    /// An array with a length of 4 × width × height.
    pub pixel_data: Vec<u8>,
}


impl Text {

    /// Create a `Text` from an `str` reference.
    /// Returns `None` if this string contains unsupported chars.
    pub fn new_or_none(string: impl AsRef<str>) -> Option<Self> {
        let bytes: Option<TextBytes> = string.as_ref().chars()
            .map(|character| u8::try_from(character as u64).ok())
            .collect();

        bytes.map(Self::from_bytes_unchecked)
    }

    /// Create a `Text` from an `str` reference.
    /// Panics if this string contains unsupported chars.
    pub fn new_or_panic(string: impl AsRef<str>) -> Self {
        Self::new_or_none(string).expect("exr text contains unsupported characters")
    }

    /// Create a `Text` from the specified bytes object, without checking any of the bytes.
    pub fn from_bytes_unchecked(bytes: TextBytes) -> Self {
        Text { bytes }
    }

    /// The underlying bytes that represent this text.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Iterate over the individual chars in this text, similar to `String::chars()`.
    pub fn chars(&self) -> impl '_ + Iterator<Item = char> {
        self.bytes.iter().map(|&byte| byte as char)
    }

    /// Compare this text with a plain `&str`.
    pub fn eq(&self, string: &str) -> bool {
        string.chars().eq(self.chars())
    }

    /// Check whether this text can be stored in a file.
    /// Sets `long_names` if the text does not fit into 31 bytes.
    pub fn validate(&self, null_terminated: bool, long_names: Option<&mut bool>) -> UnitResult {
        if null_terminated && self.bytes.is_empty() {
            return Err(Error::invalid("text must not be empty"));
        }

        if null_terminated && self.bytes.contains(&0) {
            return Err(Error::invalid("text must not contain null bytes"));
        }

        if let Some(long) = long_names {
            if self.bytes.len() >= 256 { return Err(Error::invalid("text must not be longer than 255")); }
            if self.bytes.len() >= 32 { *long = true; }
        }

        Ok(())
    }

    /// The byte count this string would occupy if it were encoded as a null-terminated string.
    pub fn null_terminated_byte_size(&self) -> usize {
        self.bytes.len() + sequence_end::byte_size()
    }

    /// Write the string contents and a null-terminator.
    pub fn write_null_terminated<W: Write>(&self, write: &mut W) -> UnitResult {
        write_null_terminated_bytes(self.bytes(), write)
    }

    /// Read a string until the null-terminator is found. Then skips the null-terminator.
    pub fn read_null_terminated<R: Read>(read: &mut R, max_len: usize) -> Result<Self> {
        let mut bytes: TextBytes = smallvec![ u8::read_le(read)? ]; // null-terminated strings are always at least 1 byte

        loop {
            match u8::read_le(read)? {
                0 => break,
                non_terminator => bytes.push(non_terminator),
            }

            if bytes.len() > max_len {
                return Err(Error::invalid("text too long"))
            }
        }

        Ok(Text { bytes })
    }

    /// Read the contents with the specified length.
    pub fn read_sized<R: Read>(read: &mut R, size: usize) -> Result<Self> {
        let bytes = u8::read_vec_le(read, size, 1024, None, "text attribute length")?;
        Ok(Text::from_bytes_unchecked(SmallVec::from_vec(bytes)))
    }
}

/// Write the bytes and a null-terminator.
fn write_null_terminated_bytes<W: Write>(bytes: &[u8], write: &mut W) -> UnitResult {
    debug_assert!(!bytes.is_empty(), "text is empty bug"); // would be mistaken for a sequence end
    u8::write_slice_le(write, bytes)?;
    sequence_end::write(write)
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        Text::eq(self, other)
    }
}

impl PartialEq<Text> for str {
    fn eq(&self, other: &Text) -> bool {
        Text::eq(other, self)
    }
}

impl Borrow<[u8]> for Text {
    fn borrow(&self) -> &[u8] {
        self.bytes()
    }
}

// forwarding implementation. guarantees `text.borrow().hash() == text.hash()` (required for Borrow)
impl Hash for Text {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state)
    }
}

impl<'s> From<&'s str> for Text {

    /// Panics if the string contains an unsupported character
    fn from(str: &'s str) -> Self {
        Self::new_or_panic(str)
    }
}

impl ::std::fmt::Debug for Text {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(f, "exr::Text(\"{}\")", self)
    }
}

impl ::std::fmt::Display for Text {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        use std::fmt::Write;

        for &byte in self.bytes.iter() {
            f.write_char(byte as char)?;
        }

        Ok(())
    }
}


impl SampleType {

    /// How many bytes a single sample takes up, both in memory and in the file.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::F16 => f16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
            SampleType::U32 => u32::BYTE_SIZE,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            SampleType::U32 => 0_i32,
            SampleType::F16 => 1_i32,
            SampleType::F32 => 2_i32,
        }.write_le(write)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(match i32::read_le(read)? {
            0 => SampleType::U32,
            1 => SampleType::F16,
            2 => SampleType::F32,
            _ => return Err(Error::invalid("pixel type attribute value")),
        })
    }
}


impl ChannelDescription {

    /// Create a new channel with the specified properties and a sampling rate of (1,1).
    pub fn new(name: impl Into<Text>, sample_type: SampleType, quantize_linearly: bool) -> Self {
        Self { name: name.into(), sample_type, quantize_linearly, sampling: Vec2(1, 1) }
    }

    /// Create a new channel with a sampling rate of (1,1) that is quantized logarithmically.
    pub fn named(name: impl Into<Text>, sample_type: SampleType) -> Self {
        Self::new(name, sample_type, false)
    }

    /// Only store every n-th sample of this channel in each dimension.
    pub fn with_sampling(self, sampling: impl Into<Vec2<usize>>) -> Self {
        Self { sampling: sampling.into(), ..self }
    }

    /// The number of samples that one full scan line of the data window
    /// contains for this channel, respecting subsampling.
    pub fn samples_per_line(&self, data_window: IntegerBounds) -> usize {
        data_window.size.width() / self.sampling.x()
    }

    /// Whether this channel has any samples on the specified absolute scan line.
    pub fn is_sampled_on_line(&self, y: i32) -> bool {
        mod_p(y, self.sampling.y() as i32) == 0
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size()
            + i32::BYTE_SIZE // sample type
            + 1 // is_linear
            + 3 // reserved bytes
            + 2 * i32::BYTE_SIZE // sampling x, y
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;

        match self.quantize_linearly {
            false => 0_u8,
            true  => 1_u8,
        }.write_le(write)?;

        u8::write_slice_le(write, &[0_u8, 0_u8, 0_u8])?;
        i32::write_le(usize_to_i32(self.sampling.x(), "x sampling")?, write)?;
        i32::write_le(usize_to_i32(self.sampling.y(), "y sampling")?, write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let name = Text::read_null_terminated(read, 256)?;
        let sample_type = SampleType::read(read)?;

        let quantize_linearly = match u8::read_le(read)? {
            1 => true,
            0 => false,
            _ => return Err(Error::invalid("channel linearity attribute value")),
        };

        let mut reserved = [0_u8; 3];
        u8::read_slice_le(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read_le(read)?, "x channel sampling")?;
        let y_sampling = i32_to_usize(i32::read_le(read)?, "y channel sampling")?;

        Ok(ChannelDescription {
            name, sample_type, quantize_linearly,
            sampling: Vec2(x_sampling, y_sampling),
        })
    }

    /// Check that the sampling factors fit the data window.
    pub fn validate(&self, data_window: IntegerBounds, long_names: &mut bool) -> UnitResult {
        self.name.validate(true, Some(long_names))?;

        if self.sampling.x() == 0 || self.sampling.y() == 0 {
            return Err(Error::configuration(format!("channel \"{}\" has a zero sampling factor", self.name)));
        }

        let sampling = self.sampling.to_i32("channel sampling")?;

        if mod_p(data_window.position.x(), sampling.x()) != 0 || mod_p(data_window.position.y(), sampling.y()) != 0 {
            return Err(Error::configuration(format!(
                "sampling factors of channel \"{}\" do not divide the data window position", self.name
            )));
        }

        if data_window.size.width() % self.sampling.x() != 0 || data_window.size.height() % self.sampling.y() != 0 {
            return Err(Error::configuration(format!(
                "sampling factors of channel \"{}\" do not divide the data window size", self.name
            )));
        }

        Ok(())
    }
}


impl ChannelList {

    /// Sorts the channels by name, as required by the file format.
    pub fn new(channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let mut list = channels;
        list.sort_by(|a, b| a.name.cmp(&b.name));
        ChannelList { list }
    }

    /// Return the index of the channel with the exact name, case sensitive, or none.
    pub fn find_index_of_channel(&self, exact_name: &[u8]) -> Option<usize> {
        self.list.binary_search_by(|channel| channel.name.bytes().cmp(exact_name)).ok()
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.list.iter().map(ChannelDescription::byte_size).sum::<usize>() + sequence_end::byte_size()
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for channel in &self.list {
            channel.write(write)?;
        }

        sequence_end::write(write)
    }

    /// Read the value without validating.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut channels = SmallVec::new();
        while !sequence_end::has_come(read)? {
            channels.push(ChannelDescription::read(read)?);
        }

        Ok(ChannelList { list: channels })
    }

    /// Check if channels are valid, unique, and sorted.
    pub fn validate(&self, data_window: IntegerBounds, long_names: &mut bool) -> UnitResult {
        if self.list.is_empty() {
            return Err(Error::invalid("at least one channel is required"));
        }

        for channel in &self.list {
            channel.validate(data_window, long_names)?;
        }

        for pair in self.list.windows(2) {
            if pair[0].name == pair[1].name { return Err(Error::invalid("channel names are not unique")); }
            if pair[0].name > pair[1].name { return Err(Error::invalid("channel names are not sorted alphabetically")); }
        }

        Ok(())
    }
}


impl IntegerBounds {

    /// Create a box with a size starting at zero.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0,0), size)
    }

    /// Create a box with a size and an origin point.
    pub fn new(start: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        Self { position: start.into(), size: size.into() }
    }

    /// Returns the maximum coordinate that a value in this rectangle may have.
    /// Only valid for validated, non-empty rectangles.
    pub fn max(self) -> Vec2<i32> {
        Vec2(
            self.position.x() + self.size.width() as i32 - 1,
            self.position.y() + self.size.height() as i32 - 1,
        )
    }

    /// Check that the rectangle is not empty and fits the integer range of the file format.
    pub fn validate(&self) -> UnitResult {
        if self.size.width() == 0 || self.size.height() == 0 {
            return Err(Error::invalid("window attribute must not be empty"));
        }

        let max_box_size_as_i64 = (i32::MAX / 2) as i64; // as defined in the original c++ library
        let min = Vec2(self.position.x() as i64, self.position.y() as i64);
        let end = Vec2(min.x() + self.size.width() as i64, min.y() + self.size.height() as i64);

        if     end.x() >=  max_box_size_as_i64
            || end.y() >=  max_box_size_as_i64
            || min.x() <= -max_box_size_as_i64
            || min.y() <= -max_box_size_as_i64
        {
            return Err(Error::invalid("window size exceeding integer maximum"));
        }

        Ok(())
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        4 * i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let Vec2(x_min, y_min) = self.position;
        let Vec2(x_max, y_max) = self.max();

        x_min.write_le(write)?;
        y_min.write_le(write)?;
        x_max.write_le(write)?;
        y_max.write_le(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let x_min = i32::read_le(read)?;
        let y_min = i32::read_le(read)?;
        let x_max = i32::read_le(read)?;
        let y_max = i32::read_le(read)?;

        let min = Vec2(x_min.min(x_max), y_min.min(y_max));
        let max = Vec2(x_min.max(x_max), y_min.max(y_max));

        // computed in i64 to prevent addition overflow
        let width = max.x() as i64 + 1 - min.x() as i64;
        let height = max.y() as i64 + 1 - min.y() as i64;

        let size = Vec2(
            usize::try_from(width).map_err(|_| Error::invalid("box coordinates"))?,
            usize::try_from(height).map_err(|_| Error::invalid("box coordinates"))?,
        );

        Ok(IntegerBounds { position: min, size })
    }
}


impl LineOrder {

    /// Whether scan lines are produced from the bottom to the top.
    pub fn is_decreasing(self) -> bool {
        self == LineOrder::Decreasing
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            LineOrder::Increasing => 0_u8,
            LineOrder::Decreasing => 1_u8,
            LineOrder::Unspecified => 2_u8,
        }.write_le(write)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(match u8::read_le(read)? {
            0 => LineOrder::Increasing,
            1 => LineOrder::Decreasing,
            2 => LineOrder::Unspecified,
            _ => return Err(Error::invalid("line order attribute value")),
        })
    }
}


impl BlockType {

    /// Return a `BlockType` object from the specified attribute text value.
    pub fn parse(text: Text) -> Result<Self> {
        match text.bytes() {
            block_type_strings::SCAN_LINE => Ok(BlockType::ScanLine),
            block_type_strings::TILE => Ok(BlockType::Tile),
            block_type_strings::DEEP_SCAN_LINE => Ok(BlockType::DeepScanLine),
            block_type_strings::DEEP_TILE => Ok(BlockType::DeepTile),
            _ => Err(Error::invalid("block type attribute value")),
        }
    }

    /// Returns the raw attribute text value this type is represented by in a file.
    pub fn to_text_bytes(self) -> &'static [u8] {
        match self {
            BlockType::ScanLine => block_type_strings::SCAN_LINE,
            BlockType::Tile => block_type_strings::TILE,
            BlockType::DeepScanLine => block_type_strings::DEEP_SCAN_LINE,
            BlockType::DeepTile => block_type_strings::DEEP_TILE,
        }
    }
}


impl Preview {

    /// Create a black, transparent preview image of the specified size.
    pub fn with_size(size: impl Into<Vec2<usize>>) -> Self {
        let size = size.into();
        Preview { size, pixel_data: vec![0; size.area() * 4] }
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        2 * u32::BYTE_SIZE + self.pixel_data.len()
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let width = u32::try_from(self.size.width()).map_err(|_| Error::invalid("preview width"))?;
        let height = u32::try_from(self.size.height()).map_err(|_| Error::invalid("preview height"))?;

        width.write_le(write)?;
        height.write_le(write)?;
        u8::write_slice_le(write, &self.pixel_data)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let width = u32::read_le(read)? as usize;
        let height = u32::read_le(read)? as usize;

        let pixel_count = width.checked_mul(height).and_then(|area| area.checked_mul(4))
            .ok_or_else(|| Error::invalid("preview attribute pixel count"))?;

        let pixel_data = u8::read_vec_le(read, pixel_count, 1024*1024*4, None, "preview attribute pixel count")?;
        Ok(Preview { size: Vec2(width, height), pixel_data })
    }

    /// Validate this instance.
    pub fn validate(&self) -> UnitResult {
        if self.size.area() * 4 != self.pixel_data.len() {
            return Err(Error::invalid("preview dimensions do not match content length"))
        }

        Ok(())
    }
}

impl ::std::fmt::Debug for Preview {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(f, "Preview ({}x{} px)", self.size.width(), self.size.height())
    }
}


/// Write the name, the type name, and the byte size of an attribute.
/// The value must follow with exactly `value_byte_size` bytes.
pub fn write_attribute_head<W: Write>(name: &[u8], type_name: &[u8], value_byte_size: usize, write: &mut W) -> UnitResult {
    write_null_terminated_bytes(name, write)?;
    write_null_terminated_bytes(type_name, write)?;
    i32::write_le(usize_to_i32(value_byte_size, "attribute size")?, write)
}

/// Read the name, the type name, and the value byte size of an attribute.
pub fn read_attribute_head(read: &mut impl Read, max_name_len: usize) -> Result<(Text, Text, usize)> {
    let name = Text::read_null_terminated(read, max_name_len)?;
    let kind = Text::read_null_terminated(read, max_name_len)?;
    let size = i32_to_usize(i32::read_le(read)?, "attribute size")?;
    Ok((name, kind, size))
}

/// Fail if an attribute in a file does not have the type this encoder expects.
pub fn expect_type(kind: &Text, expected: &[u8]) -> UnitResult {
    if kind.bytes() == expected { Ok(()) }
    else { Err(Error::invalid("attribute type mismatch")) }
}
