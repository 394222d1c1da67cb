//! The caller-supplied byte source and its bridge to the demuxer.
//!
//! Playback does not read files directly; the embedding application hands
//! over a random-access byte source (an archive member, a memory buffer, a
//! file). [`SourceStream`] presents that source to Symphonia as a
//! `MediaSource`, which is how the demuxer performs its reads and seeks.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Mutex, PoisonError};

use symphonia::core::io::MediaSource;

/// Buffer the demuxer streams through, in bytes.
pub(crate) const STREAM_BUFFER_LEN: usize = 64 * 1024;

/// A random-access byte source supplied by the caller.
///
/// The contract mirrors a classic read/seek handle:
/// - `read` fills up to `buf.len()` bytes and reports how many it wrote;
/// - `seek` supports set/current/end positioning;
/// - `byte_len` answers the size query when the total length is known.
///
/// There is no write side, and release happens on drop. The source is moved
/// into the decode thread by [`Media::start`](crate::Media::start) and never
/// shared, so `Send` is all it needs to be.
pub trait ByteSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Total length in bytes, when known.
    fn byte_len(&mut self) -> Option<u64>;
}

impl ByteSource for std::fs::File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }

    fn byte_len(&mut self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }
}

impl<T: AsRef<[u8]> + Send> ByteSource for io::Cursor<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }

    fn byte_len(&mut self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

/// Adapter presenting a [`ByteSource`] to Symphonia.
///
/// The length is queried once up front because `MediaSource::byte_len` takes
/// `&self` while the underlying source may need to move its cursor to
/// answer. The mutex exists only to satisfy `MediaSource`'s `Sync` bound
/// without widening the caller's contract past `Send`; the decode thread is
/// the sole accessor, so it is reached through `get_mut` and never locked.
pub(crate) struct SourceStream {
    inner: Mutex<Box<dyn ByteSource>>,
    len: Option<u64>,
}

impl SourceStream {
    pub fn new(mut inner: Box<dyn ByteSource>) -> Self {
        let len = inner.byte_len();
        Self {
            inner: Mutex::new(inner),
            len,
        }
    }

    fn source(&mut self) -> &mut Box<dyn ByteSource> {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source().read(buf)
    }
}

impl Seek for SourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.source().seek(pos)
    }
}

impl MediaSource for SourceStream {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}
