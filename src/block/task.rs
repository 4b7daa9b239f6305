//! Packing and compressing one scan line group,
//! either on the calling thread or on a thread pool.

use std::marker::PhantomData;
use std::ops::RangeInclusive;

use crate::block::lines::LineLayout;
use crate::block::pool::{BufferGuard, BufferSlot};
use crate::block::samples::{convert_native_to_little_endian, SampleByteOrder};
use crate::error::UnitResult;
use crate::frame_buffer::SliceTable;
use crate::math::{div_p, mod_p};

#[cfg(feature = "rayon")]
use std::sync::Arc;


/// Owns the line buffer of one group until the packed lines are compressed.
/// Dropping the task puts the buffer back into its slot.
#[derive(Debug)]
pub struct PackTask<'p> {
    buffer: BufferGuard<'p>,
}

impl<'p> PackTask<'p> {

    /// Wait until the buffer of the slot is free and prepare it for the lines.
    /// A buffer that already holds some lines of the same group keeps them.
    pub fn new(slot: &'p BufferSlot, layout: &LineLayout, group_index: usize, lines: RangeInclusive<i32>) -> Self {
        let mut buffer = slot.acquire();
        let (min_y, max_y) = layout.group_lines(group_index);

        if buffer.partially_full && buffer.min_y != min_y {
            log::debug!("discarding partially packed lines {} to {}", buffer.min_y, buffer.max_y);
            buffer.partially_full = false;
        }

        if !buffer.partially_full {
            buffer.min_y = min_y;
            buffer.max_y = max_y;
            buffer.data_size = layout.group_byte_size(group_index);
            buffer.compressed = None;
            buffer.partially_full = true;
        }

        buffer.scan_line_min = (*lines.start()).max(min_y);
        buffer.scan_line_max = (*lines.end()).min(max_y);

        PackTask { buffer }
    }

    /// Pack the lines and, if the group is complete, compress it.
    /// Errors are captured in the buffer instead of being returned.
    pub fn run(mut self, layout: &LineLayout, slices: &SliceTable<'_>) {
        if let Err(error) = self.pack_and_compress(layout, slices) {
            self.buffer.capture_error(error);
        }
    }

    fn pack_and_compress(&mut self, layout: &LineLayout, slices: &SliceTable<'_>) -> UnitResult {
        let buffer = &mut *self.buffer;

        let byte_order = buffer.compressor.as_ref()
            .map_or(SampleByteOrder::LittleEndian, |compressor| compressor.byte_order());

        let (first, last) = (buffer.scan_line_min, buffer.scan_line_max);
        let group_start = layout.line_byte_range(buffer.min_y).start;

        let mut pack_line = |y: i32| -> UnitResult {
            let mut offset = layout.line_byte_range(y).start - group_start;

            for slice in slices.slices() {
                let sampling_y = slice.sampling.y() as i32;
                if mod_p(y, sampling_y) != 0 { continue; }

                let sample_count = layout.data_window.size.width() / slice.sampling.x();
                let byte_count = sample_count * slice.sample_type.bytes_per_sample();
                let target = &mut buffer.packed[offset .. offset + byte_count];

                match &slice.source {
                    None => target.fill(0),
                    Some(source) => source
                        .pack_row(div_p(y, sampling_y) as i64, byte_order, target)
                        .map_err(|error| error.with_context(format_args!("channel \"{}\"", slice.name)))?,
                }

                offset += byte_count;
            }

            debug_assert_eq!(offset, layout.line_byte_range(y).end - group_start, "line size bug");
            Ok(())
        };

        if layout.is_decreasing() {
            for y in (first ..= last).rev() { pack_line(y)?; }
        }
        else {
            for y in first ..= last { pack_line(y)?; }
        }

        let group_is_incomplete =
            if layout.is_decreasing() { first > buffer.min_y }
            else { last < buffer.max_y };

        if group_is_incomplete {
            return Ok(());
        }

        if let Some(compressor) = buffer.compressor.as_mut() {
            let packed = &buffer.packed[.. buffer.data_size];
            let compressed = compressor.compress(packed, buffer.min_y)?;

            if compressed.len() < packed.len() {
                buffer.compressed = Some(compressed);
            }
            else if compressor.byte_order() == SampleByteOrder::Native && cfg!(target_endian = "big") {
                // the packed lines stay native until the group is written
                let mut little_endian = packed.to_vec();
                let lines = buffer.min_y ..= buffer.max_y;
                convert_native_to_little_endian(&mut little_endian, &layout.channels, layout.data_window, lines)?;
                buffer.compressed = Some(little_endian);
            }
            else {
                buffer.compressed = None;
            }
        }

        buffer.partially_full = false;
        Ok(())
    }
}


/// Runs the tasks of one `write_pixels` call.
/// All tasks have finished when the group is dropped.
pub enum TaskGroup<'s, 'scope> {

    /// Each task runs on the calling thread as soon as it is submitted.
    Inline(PhantomData<&'s &'scope ()>),

    /// Tasks run on the thread pool.
    #[cfg(feature = "rayon")]
    Pool(&'s rayon_core::Scope<'scope>),
}

impl<'s, 'scope> TaskGroup<'s, 'scope> {

    /// Run the task now, or schedule it on the thread pool.
    pub fn submit(&self, task: impl FnOnce() + Send + 'scope) {
        match self {
            TaskGroup::Inline(_) => task(),

            #[cfg(feature = "rayon")]
            TaskGroup::Pool(scope) => scope.spawn(move |_| task()),
        }
    }
}


/// The threads that pack and compress the line buffers of a file.
#[derive(Debug, Clone, Default)]
pub struct Workers {
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon_core::ThreadPool>>,
}

impl Workers {

    /// Run every task on the calling thread.
    pub fn inline() -> Self {
        Workers::default()
    }

    /// Spawn tasks onto an existing thread pool.
    #[cfg(feature = "rayon")]
    pub fn with_pool(pool: Arc<rayon_core::ThreadPool>) -> Self {
        Workers { pool: Some(pool) }
    }

    /// Create a thread pool with the specified number of threads.
    /// Zero threads, or a pool that cannot be created, result in inline execution.
    pub fn create(worker_count: usize) -> Self {
        if worker_count == 0 {
            return Workers::inline();
        }

        #[cfg(feature = "rayon")] {
            let pool = rayon_core::ThreadPoolBuilder::new()
                .num_threads(worker_count)
                .thread_name(|index| format!("OpenEXR Line Compressor #{}", index))
                .build();

            // for example on wasm, where threads cannot be spawned
            match pool {
                Ok(pool) => return Workers::with_pool(Arc::new(pool)),
                Err(error) => log::warn!("cannot create line compressor threads, compressing on the calling thread: {}", error),
            }
        }

        #[cfg(not(feature = "rayon"))]
        log::warn!("compiled without the rayon feature, ignoring {} worker threads", worker_count);

        Workers::inline()
    }

    /// The number of threads running the tasks, zero for inline execution.
    pub fn thread_count(&self) -> usize {
        #[cfg(feature = "rayon")] {
            if let Some(pool) = &self.pool {
                return pool.current_num_threads();
            }
        }

        0
    }

    /// Run the operation with a task group.
    /// Returns after the operation and all submitted tasks have finished.
    /// Tasks run inline when called from a thread of the pool itself.
    pub fn run<'scope, R>(&self, operation: impl FnOnce(&TaskGroup<'_, 'scope>) -> R) -> R {
        #[cfg(feature = "rayon")] {
            if let Some(pool) = &self.pool {
                // waiting for a buffer would block the thread that should run its task
                if pool.current_thread_index().is_none() {
                    return pool.in_place_scope(|scope| operation(&TaskGroup::Pool(scope)));
                }

                log::debug!("called from a compressor thread, compressing on the calling thread");
            }
        }

        operation(&TaskGroup::Inline(PhantomData))
    }
}
