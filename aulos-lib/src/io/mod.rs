//! Byte-stream abstractions feeding the format dispatcher.
//!
//! A [`MusicReader`] is exclusively owned by exactly one holder at any time.
//! Ownership moves at well-defined hand-off points (into a backend factory,
//! into the decompression substitute) and whoever owns the reader closes it
//! exactly once, on every exit path.

pub mod gzip;

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use symphonia::core::io::MediaSource;

/// Seekable byte stream used to pull music and sample data.
///
/// After [`close`](MusicReader::close) the core makes no further calls on the
/// reader; implementations are free to release their handle there.
pub trait MusicReader: Send + Sync {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    fn tell(&mut self) -> u64;
    fn byte_len(&mut self) -> io::Result<u64>;
    fn close(&mut self);

    /// Read until `buf` is full or the stream ends, returning the byte count.
    fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let got = self.read(&mut buf[total..])?;
            if got == 0 {
                break;
            }
            total += got;
        }
        Ok(total)
    }

    /// Read from the current position to the end of the stream.
    fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let pos = self.tell();
        let len = self.byte_len()?;
        let mut data = vec![0_u8; len.saturating_sub(pos) as usize];
        let got = self.read_fully(&mut data)?;
        data.truncate(got);
        Ok(data)
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "reader is closed")
}

/// Buffered file reader.
pub struct FileReader {
    inner: Option<BufReader<File>>,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            inner: Some(BufReader::new(file)),
        })
    }
}

impl MusicReader for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Err(closed_error()),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.inner.as_mut() {
            Some(inner) => inner.seek(pos),
            None => Err(closed_error()),
        }
    }

    fn tell(&mut self) -> u64 {
        self.inner
            .as_mut()
            .and_then(|inner| inner.stream_position().ok())
            .unwrap_or(0)
    }

    fn byte_len(&mut self) -> io::Result<u64> {
        match self.inner.as_mut() {
            Some(inner) => {
                let pos = inner.stream_position()?;
                let end = inner.seek(SeekFrom::End(0))?;
                inner.seek(SeekFrom::Start(pos))?;
                Ok(end)
            }
            None => Err(closed_error()),
        }
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

/// Reader over an owned byte vector.
pub struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
    closed: bool,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            closed: false,
        }
    }
}

impl MusicReader for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(closed_error());
        }
        let remaining = self.data.len().saturating_sub(self.pos);
        let count = remaining.min(buf.len());
        buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.closed {
            return Err(closed_error());
        }
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn tell(&mut self) -> u64 {
        self.pos as u64
    }

    fn byte_len(&mut self) -> io::Result<u64> {
        if self.closed {
            return Err(closed_error());
        }
        Ok(self.data.len() as u64)
    }

    fn close(&mut self) {
        self.closed = true;
        self.data = Vec::new();
    }
}

/// Cheaply cloneable byte buffer for per-attempt probe cursors.
#[derive(Clone)]
pub(crate) struct SharedBuf(Arc<Vec<u8>>);

impl SharedBuf {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self(Arc::new(data))
    }
}

impl AsRef<[u8]> for SharedBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// In-memory `MediaSource` handed to codec probes.
pub(crate) struct BufferSource {
    cursor: Cursor<SharedBuf>,
}

impl BufferSource {
    pub(crate) fn new(buffer: SharedBuf) -> Self {
        Self {
            cursor: Cursor::new(buffer),
        }
    }
}

impl Read for BufferSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for BufferSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl MediaSource for BufferSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.cursor.get_ref().as_ref().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reader_reads_and_seeks() {
        let mut reader = MemoryReader::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0_u8; 3];
        assert_eq!(reader.read(&mut buf).expect("read"), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.tell(), 3);

        reader.seek(SeekFrom::Current(-2)).expect("seek");
        assert_eq!(reader.tell(), 1);
        assert_eq!(reader.byte_len().expect("len"), 5);

        let rest = reader.read_remaining().expect("remaining");
        assert_eq!(rest, vec![2, 3, 4, 5]);
    }

    #[test]
    fn memory_reader_rejects_use_after_close() {
        let mut reader = MemoryReader::new(vec![0; 8]);
        reader.close();
        let mut buf = [0_u8; 4];
        assert!(reader.read(&mut buf).is_err());
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn read_fully_stops_at_end_of_stream() {
        let mut reader = MemoryReader::new(vec![7; 10]);
        let mut buf = [0_u8; 32];
        assert_eq!(reader.read_fully(&mut buf).expect("read"), 10);
    }
}
