
//! Write scan line OpenEXR files, line group by line group.
//!
//! Pixels are taken from a frame buffer of typed sample slices,
//! packed into a fixed number of line buffers, compressed on a thread pool,
//! and written to the stream strictly in the line order of the header.
//! The offset table is reserved when the file is created and patched when it is closed.
//!
//! ```no_run
//! use exr_scanline_writer::prelude::*;
//!
//! let header = Header::new((64, 32), smallvec::smallvec![ ChannelDescription::named("Y", SampleType::F32) ])
//!     .with_compression(Compression::ZIP16);
//!
//! let luma = vec![0.5_f32; 64 * 32];
//! let frame_buffer = FrameBuffer::new().with_slice("Y", Slice::packed(luma.as_slice(), header.data_window));
//!
//! let mut file = ScanLineOutputFile::create("luma.exr", header, write_options::parallel())?;
//! file.set_frame_buffer(&frame_buffer)?;
//! file.write_pixels(32)?;
//! file.close()?;
//! # Ok::<(), exr_scanline_writer::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]


pub mod io;
pub mod math;
pub mod error;
pub mod meta;
pub mod compression;
pub mod frame_buffer;
pub mod block;
pub mod output;

#[macro_use]
extern crate smallvec;


/// Re-exports of all types needed to write a file.
pub mod prelude {

    // main exports
    pub use crate::output::{
        ScanLineOutputFile, MultiPartOutput, OutputPart,
        WriteOptions, write_options,
    };

    // pixel sources
    pub use crate::frame_buffer::{ FrameBuffer, Slice, Samples };
    pub use crate::block::reader::{ RawChunkSource, RawChunkReader };

    // header
    pub use crate::meta::header::Header;
    pub use crate::meta::attribute::{
        ChannelDescription, ChannelList, SampleType,
        IntegerBounds, LineOrder, Preview, Text, BlockType,
    };

    pub use crate::compression::{ Compression, Compressor, CompressorFactory };
    pub use crate::block::samples::SampleByteOrder;

    // secondary data types
    pub use crate::meta;
    pub use crate::error::{ self, Error, Result, UnitResult };
    pub use crate::math::Vec2;

    // re-export external stuff
    pub use half::f16;
}
