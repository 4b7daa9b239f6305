
//! Specialized binary input and output.
//! Uses the error handling for this crate.

#![doc(hidden)]
pub use ::std::io::{Read, Seek, SeekFrom, Write};

use half::slice::HalfFloatSliceExt;
use lebe::prelude::*;
use ::half::f16;
use crate::error::{Error, Result, UnitResult, IoResult};
use std::sync::{Arc, Mutex, MutexGuard};


/// Skip reading uninteresting bytes without allocating.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: usize) -> IoResult<()> {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count as u64),
        &mut std::io::sink()
    )?;

    // the reader may have ended before all bytes were skipped
    if skipped < count as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "cannot skip more bytes than exist"
        ));
    }

    debug_assert_eq!(skipped, count as u64, "skip bytes bug");
    Ok(())
}

/// Peek a single byte without consuming it.
#[derive(Debug)]
pub struct PeekRead<T> {

    /// Cannot be exposed as it will not contain peeked values anymore.
    inner: T,

    peeked: Option<IoResult<u8>>,
}

impl<T: Read> PeekRead<T> {

    /// Wrap a reader to make it peekable.
    #[inline]
    pub fn new(inner: T) -> Self {
        Self { inner, peeked: None }
    }

    /// Read a single byte and return that without consuming it.
    /// The next `read` call will include that byte.
    #[inline]
    pub fn peek_u8(&mut self) -> &IoResult<u8> {
        self.peeked = self.peeked.take().or_else(|| Some(u8::read_from_little_endian(&mut self.inner)));
        self.peeked.as_ref().unwrap() // unwrap cannot fail because we just set it
    }

    /// Skip a single byte if it equals the specified value.
    /// Returns whether the value was found.
    /// Consumes the peeked result if an error occurred.
    #[inline]
    pub fn skip_if_eq(&mut self, value: u8) -> IoResult<bool> {
        match self.peek_u8() {
            Ok(peeked) if *peeked == value =>  {
                self.peeked = None; // consume the byte
                Ok(true)
            },

            Ok(_) => Ok(false),

            // return the error otherwise.
            // unwrap is safe because this branch cannot be reached otherwise.
            // we need to take() from self because io errors cannot be cloned.
            Err(_) => Err(self.peeked.take().unwrap().err().unwrap())
        }
    }

    /// Return the wrapped reader. Fails if a byte has been peeked but not consumed.
    pub fn into_inner(self) -> Result<T> {
        if self.peeked.is_some() { Err(Error::logic("peeked byte would be lost")) }
        else { Ok(self.inner) }
    }
}


impl<T: Read> Read for PeekRead<T> {
    fn read(&mut self, target_buffer: &mut [u8]) -> IoResult<usize> {
        if target_buffer.is_empty() {
            return Ok(0)
        }

        match self.peeked.take() {
            None => self.inner.read(target_buffer),
            Some(peeked) => {
                target_buffer[0] = peeked?;

                // indexing [1..] is safe because an empty buffer already returned ok
                Ok(1 + self.inner.read(&mut target_buffer[1..])?)
            }
        }
    }
}


/// A byte stream shared by all parts of one output file.
/// Every operation that touches the stream or the encoder state holds this lock.
pub type SharedStream<W> = Arc<Mutex<StreamState<W>>>;

/// Lock the shared stream, ignoring panics of previous lock holders.
/// The stream state carries no invariants that a panic could break,
/// as the position cache is cleared before each write.
pub fn lock_stream<W>(stream: &SharedStream<W>) -> MutexGuard<'_, StreamState<W>> {
    stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keep track of what byte we are at, without asking the stream each time.
/// Asking the operating system for the position can be fairly expensive.
#[derive(Debug)]
pub struct StreamState<W> {

    /// Do not expose to prevent seeking without invalidating the position
    stream: W,

    /// Authoritative only while nobody seeked the stream behind our back.
    cached_position: Option<u64>,
}

impl<W> StreamState<W> {

    /// Wrap a stream. The position will be queried when it is first needed.
    pub fn new(stream: W) -> Self {
        Self { stream, cached_position: None }
    }

    /// Wrap a stream so that it can be shared by multiple parts of a file.
    pub fn shared(stream: W) -> SharedStream<W> {
        Arc::new(Mutex::new(Self::new(stream)))
    }

    /// Forget the cached position. The next position query will ask the stream.
    pub fn invalidate_position(&mut self) {
        self.cached_position = None;
    }

    /// The cached position, if it is currently known.
    pub fn cached_position(&self) -> Option<u64> {
        self.cached_position
    }

    /// Return the inner stream. Does not flush.
    pub fn into_inner(self) -> W {
        self.stream
    }
}

impl<W: Write + Seek> StreamState<W> {

    /// The current write cursor. Only asks the stream if the cache is not valid.
    pub fn position(&mut self) -> IoResult<u64> {
        match self.cached_position {
            Some(position) => Ok(position),
            None => {
                let position = self.stream.stream_position()?;
                self.cached_position = Some(position);
                Ok(position)
            }
        }
    }

    /// Take the current position out of the cache, querying the stream if necessary.
    /// The cache stays empty until `restore_position` is called,
    /// so that a write failing halfway forces the next writer to ask the stream again.
    pub fn take_position(&mut self) -> IoResult<u64> {
        let position = self.position()?;
        self.cached_position = None;
        Ok(position)
    }

    /// Remember a position that was computed arithmetically after a successful write.
    pub fn restore_position(&mut self, position: u64) {
        self.cached_position = Some(position);
    }

    /// Move the cursor. The position cache is invalidated,
    /// as every out-of-band seek makes it unreliable.
    pub fn seek_to(&mut self, position: u64) -> IoResult<()> {
        self.cached_position = None;
        self.stream.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Ask the stream for its position, ignoring the cache.
    pub fn query_position(&mut self) -> IoResult<u64> {
        self.stream.stream_position()
    }

    /// Write bytes without affecting the position cache.
    /// Only call between `take_position` and `restore_position`,
    /// or while the cache is invalid.
    pub fn write_raw(&mut self, bytes: &[u8]) -> IoResult<()> {
        debug_assert!(self.cached_position.is_none(), "writing would invalidate the position cache");
        self.stream.write_all(bytes)
    }

    /// Flush the inner stream.
    pub fn flush(&mut self) -> IoResult<()> {
        self.stream.flush()
    }

    /// The inner stream, for writing primitives with the `Data` trait.
    /// The position cache must not be valid while using this.
    pub fn uncached_writer(&mut self) -> &mut W {
        debug_assert!(self.cached_position.is_none(), "writing would invalidate the position cache");
        &mut self.stream
    }
}


/// Generic trait that defines common binary operations such as reading and writing for this type.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this would consume in an exr file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of type `Self`, in little-endian format.
    fn read_le(read: &mut impl Read) -> Result<Self>;

    /// Read as many values of type `Self` as fit into the specified slice, in little-endian format.
    /// If the slice cannot be filled completely, returns `Error::Invalid`.
    fn read_slice_le(read: &mut impl Read, slice: &mut[Self]) -> UnitResult;

    /// Write this value to the writer, in little-endian format.
    fn write_le(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of that slice to the writer, in little-endian format.
    fn write_slice_le(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Read as many values of type `Self` as specified with `data_size`.
    ///
    /// This method will not allocate more memory than `soft_max` at once.
    /// If `hard_max` is specified, it will never read any more than that.
    /// Returns `Error::Invalid` if reader does not contain the desired number of elements.
    #[inline]
    fn read_vec_le(read: &mut impl Read, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        if let Some(max) = hard_max {
            if data_size > max {
                return Err(Error::invalid(purpose))
            }
        }

        let soft_max = hard_max.unwrap_or(soft_max).min(soft_max).max(1);
        let mut vec = Vec::with_capacity(data_size.min(soft_max));

        // do not allocate more than $chunks memory at once
        // (most of the time, this loop will run only once)
        while vec.len() < data_size {
            let chunk_start = vec.len();
            let chunk_end = (chunk_start + soft_max).min(data_size);

            vec.resize(chunk_end, Self::default());
            Self::read_slice_le(read, &mut vec[chunk_start .. chunk_end])?;
        }

        Ok(vec)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read_le(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            #[inline]
            fn write_le(self, write: &mut impl Write) -> Result<()> {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice_le(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice_le(write: &mut impl Write, slice: &[Self]) -> Result<()> {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);


impl Data for f16 {
    #[inline]
    fn read_le(read: &mut impl Read) -> Result<Self> {
        u16::read_le(read).map(f16::from_bits)
    }

    #[inline]
    fn read_slice_le(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
        let bits = slice.reinterpret_cast_mut();
        u16::read_slice_le(read, bits)
    }

    #[inline]
    fn write_le(self, write: &mut impl Write) -> Result<()> {
        self.to_bits().write_le(write)
    }

    #[inline]
    fn write_slice_le(write: &mut impl Write, slice: &[Self]) -> Result<()> {
        let bits = slice.reinterpret_cast();
        u16::write_slice_le(write, bits)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn peek(){
        let buffer: &[u8] = &[0,1,2,3];
        let mut peek = PeekRead::new(buffer);

        assert_eq!(peek.peek_u8().as_ref().unwrap(), &0);
        assert_eq!(peek.peek_u8().as_ref().unwrap(), &0);
        assert_eq!(u8::read_le(&mut peek).unwrap(), 0_u8);

        assert_eq!(peek.read(&mut [0,0]).unwrap(), 2);

        assert!(peek.skip_if_eq(3).unwrap());
        assert!(peek.peek_u8().is_err());
        assert!(u8::read_le(&mut peek).is_err());
    }

    #[test]
    fn position_cache_is_taken_and_restored(){
        let mut state = StreamState::new(Cursor::new(Vec::new()));
        assert_eq!(state.cached_position(), None);

        let start = state.take_position().unwrap();
        assert_eq!(start, 0);
        assert_eq!(state.cached_position(), None, "write in progress must not leave a cached position");

        state.write_raw(&[1, 2, 3]).unwrap();
        state.restore_position(start + 3);
        assert_eq!(state.position().unwrap(), 3);

        state.seek_to(1).unwrap();
        assert_eq!(state.cached_position(), None);
        assert_eq!(state.position().unwrap(), 1);
    }

    #[derive(Default)]
    struct CountingSeeks {
        bytes: Cursor<Vec<u8>>,
        seek_count: usize,
    }

    impl Write for CountingSeeks {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> { self.bytes.write(bytes) }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    impl Seek for CountingSeeks {
        fn seek(&mut self, position: SeekFrom) -> std::io::Result<u64> {
            self.seek_count += 1;
            self.bytes.seek(position)
        }
    }

    #[test]
    fn consecutive_writes_ask_the_stream_once(){
        let mut state = StreamState::new(CountingSeeks::default());

        for _ in 0 .. 5 {
            let start = state.take_position().unwrap();
            state.write_raw(&[7; 12]).unwrap();
            state.restore_position(start + 12);
        }

        assert_eq!(state.position().unwrap(), 60);

        let stream = state.into_inner();
        assert_eq!(stream.seek_count, 1);
        assert_eq!(stream.bytes.into_inner().len(), 60);
    }

    #[test]
    fn vector_respects_hard_limit(){
        let bytes = [1_u8, 2, 3, 4];

        let read = u8::read_vec_le(&mut &bytes[..], 4, 2, Some(4), "test").unwrap();
        assert_eq!(read, vec![1, 2, 3, 4]);

        let too_large = u8::read_vec_le(&mut &bytes[..], 4, 2, Some(3), "test");
        assert!(too_large.is_err());
    }
}
