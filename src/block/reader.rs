
//! Read the compressed chunks of an existing scan line file,
//! for copying them into a new file without recompressing.

use crate::block::lines::LineLayout;
use crate::compression::ByteVec;
use crate::error::*;
use crate::io::*;
use crate::meta::attribute::BlockType;
use crate::meta::header::Header;
use crate::meta::read_single_part;


/// Anything that can provide the compressed chunks of a scan line image.
pub trait RawChunkSource {

    /// The header that describes the chunks.
    fn header(&self) -> &Header;

    /// The compressed payload of the group that starts at the specified line,
    /// without the chunk header.
    fn read_raw_chunk(&mut self, group_start_y: i32) -> Result<ByteVec>;
}


/// Reads the chunks of a single-part scan line file.
#[derive(Debug)]
pub struct RawChunkReader<R> {
    read: R,
    header: Header,
    layout: LineLayout,
    offsets: Vec<u64>,
}

impl<R: Read + Seek> RawChunkReader<R> {

    /// Read the header and the offset table.
    /// The reader must be positioned at the start of the file.
    pub fn new(read: R) -> Result<Self> {
        let mut read = PeekRead::new(read);
        let (_, header) = read_single_part(&mut read)?;

        if header.block_type == Some(BlockType::Tile) {
            return Err(Error::unsupported("reading chunks of tiled files"));
        }

        let mut read = read.into_inner()?;
        let chunk_count = header.chunk_count();
        let offsets = u64::read_vec_le(&mut read, chunk_count, u16::MAX as usize, None, "offset table size")?;

        Ok(RawChunkReader { layout: LineLayout::new(&header), read, header, offsets })
    }

    /// The position of each chunk in the file, zero for chunks that were never written.
    pub fn offsets(&self) -> &[u64] { &self.offsets }

    /// The geometry of the scan line groups.
    pub fn layout(&self) -> &LineLayout { &self.layout }

    /// Return the inner reader.
    pub fn into_inner(self) -> R { self.read }

    /// Read and decompress the group that contains the specified line.
    /// Returns all lines of the group, with each sample in little endian byte order.
    pub fn read_little_endian_group(&mut self, y: i32) -> Result<ByteVec> {
        let group_index = self.group_index(y)?;
        let (min_y, _) = self.layout.group_lines(group_index);

        let compressed = self.read_raw_chunk(min_y)?;
        self.header.compression.decompress_to_little_endian(compressed, self.layout.group_byte_size(group_index))
    }

    fn group_index(&self, y: i32) -> Result<usize> {
        if !self.layout.contains_line(y) {
            return Err(Error::invalid(format!("scan line {} outside of the data window", y)));
        }

        Ok(self.layout.group_index(y))
    }
}

impl<R: Read + Seek> RawChunkSource for RawChunkReader<R> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn read_raw_chunk(&mut self, group_start_y: i32) -> Result<ByteVec> {
        let group_index = self.group_index(group_start_y)?;
        let offset = self.offsets[group_index];

        if offset == 0 {
            return Err(Error::invalid(format!("offset table entry for scan line {}", group_start_y)));
        }

        self.read.seek(SeekFrom::Start(offset))?;

        let (min_y, _) = self.layout.group_lines(group_index);
        if i32::read_le(&mut self.read)? != min_y {
            return Err(Error::invalid(format!("chunk for scan line {}", min_y)));
        }

        let byte_count = i32_to_usize(i32::read_le(&mut self.read)?, "chunk byte count")?;
        let soft_max = self.layout.line_buffer_byte_size.max(1024);

        u8::read_vec_le(&mut self.read, byte_count, soft_max, None, "chunk byte count")
    }
}
