
//! Create scan line files and write pixels into them.
//! Lines are packed from a frame buffer, compressed by a pool of workers,
//! and written in line order. The offset table is patched when the file is closed.

use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use crate::block::chunk::OffsetTable;
use crate::block::pool::LineBufferPool;
use crate::block::reader::RawChunkSource;
use crate::block::task::Workers;
use crate::block::writer::LineEncoder;
use crate::compression::{Compressor, CompressorFactory};
use crate::error::*;
use crate::frame_buffer::{FrameBuffer, SliceTable};
use crate::io::*;
use crate::meta::attribute::{BlockType, Preview};
use crate::meta::header::Header;
use crate::meta::MetaDataBytes;


/// Controls how the pixels of a file are compressed.
#[derive(Clone, Default)]
pub struct WriteOptions {

    /// The number of threads that pack and compress line buffers.
    /// Zero means that everything happens on the calling thread.
    /// Twice as many line buffers as threads are allocated.
    pub worker_count: usize,

    /// Use these threads instead of creating new ones for each file.
    #[cfg(feature = "rayon")]
    pub thread_pool: Option<Arc<rayon_core::ThreadPool>>,

    /// The name used in error messages. Defaults to the path of the file.
    pub file_name: Option<String>,

    /// Creates the compressor for each line buffer.
    /// Required for compression methods without a built-in compressor.
    pub compressor_factory: Option<CompressorFactory>,
}

/// Presets for the write options.
pub mod write_options {
    use super::*;

    /// Compress every line group on the calling thread.
    pub fn sequential() -> WriteOptions {
        WriteOptions::default()
    }

    /// Compress with one thread per available processor core.
    pub fn parallel() -> WriteOptions {
        let worker_count = std::thread::available_parallelism()
            .map(|count| count.get()).unwrap_or(1);

        WriteOptions::default().with_worker_count(worker_count)
    }
}

impl WriteOptions {

    /// Set the number of compression threads.
    pub fn with_worker_count(self, worker_count: usize) -> Self {
        WriteOptions { worker_count, ..self }
    }

    /// Compress on an existing thread pool.
    #[cfg(feature = "rayon")]
    pub fn with_thread_pool(self, thread_pool: Arc<rayon_core::ThreadPool>) -> Self {
        WriteOptions { thread_pool: Some(thread_pool), ..self }
    }

    /// Set the name used in error messages.
    pub fn with_file_name(self, file_name: impl Into<String>) -> Self {
        WriteOptions { file_name: Some(file_name.into()), ..self }
    }

    /// Plug in a compressor for each line buffer.
    pub fn with_compressor_factory(
        self, factory: impl Fn(&Header) -> Result<Box<dyn Compressor>> + Send + Sync + 'static
    ) -> Self
    {
        WriteOptions { compressor_factory: Some(Arc::new(factory)), ..self }
    }

    fn workers(&self) -> Workers {
        #[cfg(feature = "rayon")] {
            if let Some(pool) = &self.thread_pool {
                return Workers::with_pool(pool.clone());
            }
        }

        Workers::create(self.worker_count)
    }
}

impl Debug for WriteOptions {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("WriteOptions")
            .field("worker_count", &self.worker_count)
            .field("file_name", &self.file_name)
            .field("compressor_factory", &self.compressor_factory.is_some())
            .finish()
    }
}


/// Where one part of a file lives in the stream.
/// Produced when the headers are written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPart {

    /// `Some` in multi-part files, where each chunk is tagged with the part number.
    pub part_number: Option<usize>,

    /// The header of this part, as written to the file.
    pub header: Header,

    /// The reserved offset table of this part.
    pub offset_table: OffsetTable,

    /// The byte position of the preview attribute value, if the header has a preview.
    pub preview_position: Option<u64>,
}


/// The headers and offset tables of a multi-part file,
/// from which one scan line file can be opened per part.
/// All parts write into the same stream.
#[derive(Debug)]
pub struct MultiPartOutput<W> {
    stream: SharedStream<W>,
    parts: Vec<OutputPart>,
}

impl<W: Write + Seek> MultiPartOutput<W> {

    /// Write the headers of all parts and reserve one offset table per part.
    /// Each header must have a unique name and a block type.
    pub fn create(stream: W, headers: Vec<Header>) -> Result<Self> {
        for (index, header) in headers.iter().enumerate() {
            let is_duplicate = headers[.. index].iter()
                .any(|previous| previous.name.is_some() && previous.name == header.name);

            if is_duplicate {
                return Err(Error::invalid("part names must be unique"));
            }
        }

        let meta = MetaDataBytes::write(&headers, true)?;
        let stream = StreamState::shared(stream);

        let parts = {
            let mut state = lock_stream(&stream);
            let start = write_meta_data(&mut *state, &meta)?;

            headers.into_iter().zip(&meta.layouts).enumerate()
                .map(|(part_number, (header, layout))| {
                    let offset_table = OffsetTable::write_placeholder(&mut *state, header.chunk_count())?;
                    let preview_position = layout.preview_value_offset.map(|offset| start + usize_to_u64(offset));
                    Ok(OutputPart { part_number: Some(part_number), header, offset_table, preview_position })
                })
                .collect::<Result<Vec<_>>>()?
        };

        log::debug!("created multi-part file with {} parts", parts.len());
        Ok(MultiPartOutput { stream, parts })
    }

    /// The parts, in the order of their headers.
    pub fn parts(&self) -> &[OutputPart] {
        &self.parts
    }

    /// The stream that all parts write into.
    pub fn shared_stream(&self) -> &SharedStream<W> {
        &self.stream
    }

    /// Open a scan line file that writes the pixels of one part.
    pub fn open_part<'fb>(&self, part_index: usize, options: WriteOptions) -> Result<ScanLineOutputFile<'fb, W>> {
        let part = self.parts.get(part_index)
            .ok_or_else(|| Error::configuration(format!("file has no part {}", part_index)))?;

        ScanLineOutputFile::from_part(self.stream.clone(), part.clone(), options)
    }
}

/// Write magic number, version and headers at the current position, returning that position.
fn write_meta_data<W: Write + Seek>(stream: &mut StreamState<W>, meta: &MetaDataBytes) -> Result<u64> {
    let start = stream.take_position()?;
    stream.write_raw(&meta.bytes)?;
    stream.restore_position(start + usize_to_u64(meta.bytes.len()));
    Ok(start)
}


/// A scan line file that is being written.
///
/// Set a frame buffer, then call `write_pixels` until all lines of the data window are written.
/// Lines must be written in the line order of the header.
/// The offset table is patched when the file is closed or dropped.
pub struct ScanLineOutputFile<'fb, W: Write + Seek> {
    stream: SharedStream<W>,
    header: Header,
    file_name: String,
    encoder: LineEncoder,
    slices: Option<SliceTable<'fb>>,
    offset_table: OffsetTable,
    preview_position: Option<u64>,
    closed: bool,
}

impl<'fb> ScanLineOutputFile<'fb, BufWriter<File>> {

    /// Create a file at the path and write the header and an empty offset table.
    pub fn create(path: impl AsRef<Path>, header: Header, options: WriteOptions) -> Result<Self> {
        let path = path.as_ref();
        let file_name = options.file_name.clone().unwrap_or_else(|| path.display().to_string());

        let file = File::create(path).map_err(|error| {
            Error::from(error).with_context(format_args!("cannot open image file \"{}\"", file_name))
        })?;

        Self::new(BufWriter::new(file), header, options.with_file_name(file_name))
    }
}

impl<'fb, W: Write + Seek> ScanLineOutputFile<'fb, W> {

    /// Write the header and an empty offset table to the stream,
    /// starting at its current position.
    ///
    /// An existing block type attribute is corrected to `scanlineimage`.
    pub fn new(stream: W, mut header: Header, options: WriteOptions) -> Result<Self> {
        let file_name = options.file_name.clone().unwrap_or_else(|| String::from("<stream>"));
        let context = |error: Error| error.with_context(format_args!("cannot open image file \"{}\"", file_name));

        if header.block_type.is_some() {
            header.block_type = Some(BlockType::ScanLine);
        }

        let meta = MetaDataBytes::write(std::slice::from_ref(&header), false).map_err(context)?;
        let stream = StreamState::shared(stream);

        let part = {
            let mut state = lock_stream(&stream);
            let start = write_meta_data(&mut *state, &meta).map_err(context)?;
            let offset_table = OffsetTable::write_placeholder(&mut *state, header.chunk_count()).map_err(context)?;

            let preview_position = meta.layouts[0].preview_value_offset
                .map(|offset| start + usize_to_u64(offset));

            OutputPart { part_number: None, header, offset_table, preview_position }
        };

        Self::open(stream, part, options, file_name)
    }

    /// Write the pixels of one part of a multi-part file,
    /// whose headers and offset tables have already been written.
    pub fn from_part(stream: SharedStream<W>, part: OutputPart, options: WriteOptions) -> Result<Self> {
        let file_name = options.file_name.clone().unwrap_or_else(|| match &part.header.name {
            Some(name) => format!("<stream>, part \"{}\"", name),
            None => String::from("<stream>"),
        });

        if part.header.block_type != Some(BlockType::ScanLine) {
            return Err(Error::configuration("cannot write pixels of a part that is not a scan line image")
                .with_context(format_args!("cannot open image file \"{}\"", file_name)));
        }

        Self::open(stream, part, options, file_name)
    }

    fn open(stream: SharedStream<W>, part: OutputPart, options: WriteOptions, file_name: String) -> Result<Self> {
        let workers = options.workers();
        let buffer_count = LineBufferPool::size_for_workers(workers.thread_count());

        let encoder = LineEncoder::new(
            &part.header, part.part_number, workers, buffer_count,
            options.compressor_factory.as_ref()
        ).map_err(|error| error.with_context(format_args!("cannot open image file \"{}\"", file_name)))?;

        log::debug!(
            "opened image file \"{}\" with {} scan lines and {}",
            file_name, part.header.scan_line_count(), part.header.compression
        );

        Ok(ScanLineOutputFile {
            stream,
            header: part.header,
            file_name,
            encoder,
            slices: None,
            offset_table: part.offset_table,
            preview_position: part.preview_position,
            closed: false,
        })
    }

    /// The header of this file.
    pub fn header(&self) -> &Header { &self.header }

    /// The name of this file, used in error messages.
    pub fn file_name(&self) -> &str { &self.file_name }

    /// The next scan line that `write_pixels` will write.
    /// For decreasing line order, this counts down from the bottom of the data window.
    pub fn current_scan_line(&self) -> i32 { self.encoder.current_scan_line() }

    /// The number of scan lines that have not been written yet.
    pub fn missing_scan_lines(&self) -> usize { self.encoder.missing_scan_lines() }

    /// The position of each chunk in the stream, zero for chunks not yet written.
    pub fn line_offsets(&self) -> &[u64] { self.encoder.line_offsets() }

    /// Use the frame buffer as the source of the following `write_pixels` calls.
    /// Channels of the file that the frame buffer does not contain are filled with zeroes.
    /// On error, the previous frame buffer stays in effect.
    pub fn set_frame_buffer(&mut self, frame_buffer: &FrameBuffer<'fb>) -> UnitResult {
        let slices = SliceTable::resolve(&self.header.channels, self.header.data_window, frame_buffer)
            .map_err(|error| error.with_context(format_args!("cannot set frame buffer of image file \"{}\"", self.file_name)))?;

        if slices.zero_filled_count() != 0 {
            log::debug!("filling {} channels of \"{}\" with zeroes", slices.zero_filled_count(), self.file_name);
        }

        self.slices = Some(slices);
        Ok(())
    }

    /// Write the next `line_count` scan lines from the frame buffer.
    pub fn write_pixels(&mut self, line_count: usize) -> UnitResult {
        log::debug!("writing {} scan lines of \"{}\" from line {}", line_count, self.file_name, self.current_scan_line());

        let result = match &self.slices {
            None => Err(Error::configuration("no frame buffer specified as pixel data source")),
            Some(slices) => {
                let mut stream = lock_stream(&self.stream);
                self.encoder.write_pixels(&mut *stream, slices, line_count)
            }
        };

        result.map_err(|error| error.with_context(format_args!("failed to write pixel data to image file \"{}\"", self.file_name)))
    }

    /// Copy the compressed chunks of another image without recompressing them.
    /// The source must have the same data window, line order, compression and channels,
    /// and no pixels may have been written to this file yet.
    /// The preview pixels are copied too if both files have a preview of the same size.
    pub fn copy_raw_pixels(&mut self, source: &mut impl RawChunkSource) -> UnitResult {
        self.copy_raw_chunks(source)
            .map_err(|error| error.with_context(format_args!("cannot copy pixels to image file \"{}\"", self.file_name)))
    }

    fn copy_raw_chunks(&mut self, source: &mut impl RawChunkSource) -> UnitResult {
        let source_header = source.header().clone();

        if source_header.block_type.map_or(false, |block_type| block_type != BlockType::ScanLine) {
            return Err(Error::configuration("the source is not a scan line image"));
        }

        let mismatch =
            if source_header.data_window != self.header.data_window { Some("data windows") }
            else if source_header.line_order.is_decreasing() != self.header.line_order.is_decreasing() { Some("line orders") }
            else if source_header.compression != self.header.compression { Some("compression methods") }
            else if source_header.channels != self.header.channels { Some("channel lists") }
            else { None };

        if let Some(mismatch) = mismatch {
            return Err(Error::configuration(format!("the source has different {}", mismatch)));
        }

        if self.encoder.has_started() {
            return Err(Error::sequence("the file already contains pixel data"));
        }

        let group_count = self.encoder.layout().group_count();
        let decreasing = self.encoder.layout().is_decreasing();

        {
            let mut stream = lock_stream(&self.stream);
            stream.invalidate_position();

            for index in 0 .. group_count {
                let group_index = if decreasing { group_count - 1 - index } else { index };
                let (group_start_y, _) = self.encoder.layout().group_lines(group_index);

                let chunk = source.read_raw_chunk(group_start_y)?;
                self.encoder.write_raw_chunk(&mut *stream, &chunk)?;
            }
        }

        log::debug!("copied {} raw chunks into \"{}\"", group_count, self.file_name);

        let has_same_preview_size = match (&source_header.preview, &self.header.preview) {
            (Some(source), Some(target)) => source.size == target.size,
            _ => false,
        };

        if let (true, Some(preview)) = (has_same_preview_size, &source_header.preview) {
            self.write_preview(&preview.pixel_data)?;
        }

        Ok(())
    }

    /// Replace the pixels of the preview image that was reserved in the header.
    /// The pixels are RGBA bytes, and must have the size of the preview.
    pub fn update_preview_pixels(&mut self, pixels: &[u8]) -> UnitResult {
        self.write_preview(pixels)
            .map_err(|error| error.with_context(format_args!("cannot update preview image pixels of image file \"{}\"", self.file_name)))
    }

    fn write_preview(&mut self, pixels: &[u8]) -> UnitResult {
        let (position, preview) = match (self.preview_position, &mut self.header.preview) {
            (Some(position), Some(preview)) => (position, preview),
            _ => return Err(Error::sequence("the file has no preview image")),
        };

        if pixels.len() != preview.pixel_data.len() {
            return Err(Error::configuration(format!(
                "expected {} preview bytes, but got {}", preview.pixel_data.len(), pixels.len()
            )));
        }

        let updated = Preview { size: preview.size, pixel_data: pixels.to_vec() };
        let mut value = Vec::with_capacity(updated.byte_size());
        updated.write(&mut value)?;

        {
            let mut stream = lock_stream(&self.stream);
            let previous_position = stream.query_position()?;

            stream.seek_to(position)?;
            stream.write_raw(&value)?;
            stream.seek_to(previous_position)?;
        }

        *preview = updated;
        Ok(())
    }

    /// Overwrite bytes of the chunk that contains the scan line,
    /// which must have been written already.
    /// Produces broken files for testing readers.
    pub fn break_scan_line_for_testing(&mut self, y: i32, byte_offset: usize, length: usize, fill_byte: u8) -> UnitResult {
        self.break_scan_line(y, byte_offset, length, fill_byte)
            .map_err(|error| error.with_context(format_args!("cannot break scan line {} of image file \"{}\"", y, self.file_name)))
    }

    fn break_scan_line(&mut self, y: i32, byte_offset: usize, length: usize, fill_byte: u8) -> UnitResult {
        let layout = self.encoder.layout();

        if !layout.contains_line(y) {
            return Err(Error::configuration("the scan line is outside of the data window"));
        }

        let chunk_position = self.encoder.line_offsets()[layout.group_index(y)];
        if chunk_position == 0 {
            return Err(Error::sequence("the scan line has not been written yet"));
        }

        let mut stream = lock_stream(&self.stream);
        let previous_position = stream.query_position()?;

        stream.seek_to(chunk_position + usize_to_u64(byte_offset))?;
        stream.write_raw(&vec![fill_byte; length])?;
        stream.seek_to(previous_position)?;

        log::debug!("overwrote {} bytes of scan line {} in \"{}\"", length, y, self.file_name);
        Ok(())
    }

    /// Patch the offset table and flush the stream.
    /// Unlike dropping the file, this reports errors.
    pub fn close(mut self) -> UnitResult {
        self.closed = true;

        self.finish()
            .map_err(|error| error.with_context(format_args!("cannot close image file \"{}\"", self.file_name)))
    }

    fn finish(&mut self) -> UnitResult {
        if self.missing_scan_lines() != 0 {
            log::warn!("closing image file \"{}\" with {} missing scan lines", self.file_name, self.missing_scan_lines());
        }

        let mut stream = lock_stream(&self.stream);
        self.offset_table.patch(&mut *stream, self.encoder.line_offsets())?;
        stream.flush()?;

        log::debug!("closed image file \"{}\"", self.file_name);
        Ok(())
    }
}

impl<W: Write + Seek> Drop for ScanLineOutputFile<'_, W> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;

            // dropping may happen while unwinding, so errors are never raised here
            if let Err(error) = self.finish() {
                log::warn!("cannot finish image file \"{}\": {}", self.file_name, error);
            }
        }
    }
}

impl<W: Write + Seek> Debug for ScanLineOutputFile<'_, W> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ScanLineOutputFile")
            .field("file_name", &self.file_name)
            .field("header", &self.header)
            .field("encoder", &self.encoder)
            .field("has_frame_buffer", &self.slices.is_some())
            .finish()
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn option_presets() {
        assert_eq!(write_options::sequential().worker_count, 0);
        assert!(write_options::parallel().worker_count >= 1);

        let options = WriteOptions::default()
            .with_worker_count(3)
            .with_file_name("beach.exr");

        assert_eq!(options.worker_count, 3);
        assert_eq!(options.file_name.as_deref(), Some("beach.exr"));
        assert!(options.compressor_factory.is_none());
    }
}
