//! A fixed set of reusable line buffers.
//! Each buffer lives in its own slot, and a slot is empty
//! while a compression task owns its buffer.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::compression::{ByteVec, Compressor};
use crate::error::Error;


/// Packed scan lines of one group, and what happened to them.
pub struct LineBuffer {

    /// The packed samples. Has the capacity of the largest group.
    pub packed: ByteVec,

    /// The number of packed bytes of the current group.
    pub data_size: usize,

    /// The first scan line of the group this buffer currently holds.
    pub min_y: i32,

    /// The last scan line of the group this buffer currently holds, inclusive.
    pub max_y: i32,

    /// The first scan line packed by the current task.
    pub scan_line_min: i32,

    /// The last scan line packed by the current task, inclusive.
    pub scan_line_max: i32,

    /// Replaces the packed bytes in the file: the compressed bytes if compression
    /// made the group smaller, or a little endian copy of native packed bytes.
    pub compressed: Option<ByteVec>,

    /// Some, but not all, lines of the group have been packed.
    pub partially_full: bool,

    /// The first error of the current use of this buffer.
    pub captured_error: Option<Error>,

    /// `None` if the file is not compressed.
    pub compressor: Option<Box<dyn Compressor>>,
}

impl LineBuffer {

    /// An empty buffer, not assigned to any group.
    pub fn new(byte_size: usize, compressor: Option<Box<dyn Compressor>>) -> Self {
        LineBuffer {
            packed: vec![0; byte_size],
            data_size: 0,
            min_y: 0, max_y: -1,
            scan_line_min: 0, scan_line_max: -1,
            compressed: None,
            partially_full: false,
            captured_error: None,
            compressor,
        }
    }

    /// Remember an error, unless an earlier one has been captured already.
    pub fn capture_error(&mut self, error: Error) {
        if self.captured_error.is_none() {
            log::trace!("captured error in line buffer for lines {} to {}: {}", self.min_y, self.max_y, error);
            self.captured_error = Some(error);
        }
    }

    /// The bytes that will be written to the file for the current group.
    pub fn payload(&self) -> &[u8] {
        match &self.compressed {
            Some(compressed) => compressed,
            None => &self.packed[.. self.data_size],
        }
    }

    /// The number of scan lines of the current group.
    pub fn line_count(&self) -> usize {
        (self.max_y - self.min_y + 1) as usize
    }
}

impl std::fmt::Debug for LineBuffer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("LineBuffer")
            .field("lines", &(self.min_y ..= self.max_y))
            .field("data_size", &self.data_size)
            .field("compressed", &self.compressed.as_ref().map(Vec::len))
            .field("partially_full", &self.partially_full)
            .field("captured_error", &self.captured_error)
            .finish()
    }
}


/// Holds a line buffer while no task owns it.
/// Taking the buffer out closes the gate, putting it back opens it again.
#[derive(Debug)]
pub struct BufferSlot {
    buffer: Mutex<Option<LineBuffer>>,
    returned: Condvar,
}

impl BufferSlot {

    /// A slot that contains the buffer, so the gate is open.
    pub fn new(buffer: LineBuffer) -> Self {
        BufferSlot { buffer: Mutex::new(Some(buffer)), returned: Condvar::new() }
    }

    fn lock(&self) -> MutexGuard<'_, Option<LineBuffer>> {
        // buffers are returned by guards, even while a task is unwinding
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no task owns the buffer, then take it.
    /// The returned guard puts the buffer back when dropped.
    pub fn acquire(&self) -> BufferGuard<'_> {
        let mut content = self.lock();

        while content.is_none() {
            content = self.returned.wait(content).unwrap_or_else(PoisonError::into_inner);
        }

        let buffer = content.take();
        BufferGuard { slot: self, buffer }
    }

    fn release(&self, buffer: LineBuffer) {
        let mut content = self.lock();
        debug_assert!(content.is_none(), "line buffer released twice");

        *content = Some(buffer);
        self.returned.notify_all();
    }
}


/// Exclusive ownership of a line buffer, taken out of its slot.
#[derive(Debug)]
pub struct BufferGuard<'p> {
    slot: &'p BufferSlot,
    buffer: Option<LineBuffer>,
}

impl std::ops::Deref for BufferGuard<'_> {
    type Target = LineBuffer;

    fn deref(&self) -> &LineBuffer {
        self.buffer.as_ref().expect("line buffer guard is empty")
    }
}

impl std::ops::DerefMut for BufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut LineBuffer {
        self.buffer.as_mut().expect("line buffer guard is empty")
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.slot.release(buffer);
        }
    }
}


/// The line buffers of a file, twice as many as there are workers.
#[derive(Debug)]
pub struct LineBufferPool {
    slots: Vec<BufferSlot>,
}

impl LineBufferPool {

    /// The number of buffers for the worker count.
    pub fn size_for_workers(worker_count: usize) -> usize {
        (2 * worker_count).max(1)
    }

    /// Create the buffers, each with its own compressor.
    pub fn new(
        buffer_count: usize, byte_size: usize,
        mut new_compressor: impl FnMut() -> crate::error::Result<Option<Box<dyn Compressor>>>
    ) -> crate::error::Result<Self>
    {
        let slots = (0 .. buffer_count.max(1))
            .map(|_| Ok(BufferSlot::new(LineBuffer::new(byte_size, new_compressor()?))))
            .collect::<crate::error::Result<Vec<_>>>()?;

        Ok(LineBufferPool { slots })
    }

    /// The number of buffers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// The slot of a logical buffer index.
    pub fn slot(&self, logical_index: usize) -> &BufferSlot {
        &self.slots[logical_index % self.slots.len()]
    }

    /// Scan all buffers in slot order, clear every captured error,
    /// and return the first one found.
    /// Waits for buffers that are still owned by a task.
    pub fn take_first_captured_error(&self) -> Option<Error> {
        let mut first = None;

        for slot in &self.slots {
            let mut buffer = slot.acquire();

            if let Some(error) = buffer.captured_error.take() {
                if first.is_none() { first = Some(error); }
                else { log::debug!("dropping additional captured error: {}", error); }
            }
        }

        first
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn logical_indices_wrap_around() {
        let pool = LineBufferPool::new(LineBufferPool::size_for_workers(2), 16, || Ok(None)).unwrap();
        assert_eq!(pool.len(), 4);
        assert!(std::ptr::eq(pool.slot(1), pool.slot(5)));
        assert!(!std::ptr::eq(pool.slot(1), pool.slot(2)));

        assert_eq!(LineBufferPool::size_for_workers(0), 1);
    }

    #[test]
    fn first_error_wins_and_is_cleared() {
        let pool = LineBufferPool::new(3, 4, || Ok(None)).unwrap();

        {
            let mut second = pool.slot(1).acquire();
            second.capture_error(Error::invalid("first in slot 1"));
            second.capture_error(Error::invalid("second in slot 1"));

            let mut third = pool.slot(2).acquire();
            third.capture_error(Error::sequence("slot 2"));
        }

        let error = pool.take_first_captured_error().unwrap();
        assert_eq!(error.to_string(), "invalid first in slot 1");
        assert!(pool.take_first_captured_error().is_none());
    }

    #[test]
    fn gate_blocks_until_released() {
        let slot = Arc::new(BufferSlot::new(LineBuffer::new(4, None)));
        let mut guard = slot.acquire();
        guard.data_size = 3;

        let waiting = {
            let slot = slot.clone();
            std::thread::spawn(move || slot.acquire().data_size)
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiting.is_finished());

        drop(guard);
        assert_eq!(waiting.join().unwrap(), 3);
    }
}
