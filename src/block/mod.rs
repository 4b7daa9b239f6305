//! Turn scan lines into compressed chunks.
//! Contains the line buffers, the tasks that fill and compress them,
//! and the encoder that writes the finished chunks in line order.

pub mod lines;
pub mod samples;
pub mod pool;
pub mod task;
pub mod chunk;
pub mod writer;
pub mod reader;
