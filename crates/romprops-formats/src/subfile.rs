//! Byte-range views over a backing file
//!
//! [`SubFile`] exposes `[offset, offset + length)` of a backing stream as a
//! stream of its own, so an embedded executable or section can be handed
//! to a nested parser without copying it. [`SharedFile`] lets several
//! views (and the parser that created them) share one backing handle.

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// A byte range of a backing stream with its own cursor
///
/// Every access seeks the backing stream first, so the backing cursor is
/// moved as a side effect. Reads and writes are clamped to the range.
#[derive(Debug)]
pub struct SubFile<R> {
    inner: R,
    offset: u64,
    length: u64,
    pos: u64,
}

impl<R: Seek> SubFile<R> {
    /// View `length` bytes of `inner` starting at `offset`
    pub fn new(inner: R, offset: u64, length: u64) -> Self {
        Self {
            inner,
            offset,
            length,
            pos: 0,
        }
    }

    /// Length of the range
    pub fn size(&self) -> u64 {
        self.length
    }

    /// Start of the range in the backing stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current position inside the range
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Return the backing stream
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn remaining(&self, want: usize) -> usize {
        let left = self.length.saturating_sub(self.pos);
        usize::try_from(left).map_or(want, |left| want.min(left))
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(self.offset + self.pos))?;
        Ok(())
    }
}

impl<R: Read + Seek> Read for SubFile<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.remaining(buf.len());
        if n == 0 {
            return Ok(0);
        }
        self.sync()?;
        let read = self.inner.read(&mut buf[..n])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<R: Write + Seek> Write for SubFile<R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.remaining(buf.len());
        if n == 0 {
            return Ok(0);
        }
        self.sync()?;
        let written = self.inner.write(&buf[..n])?;
        self.pos += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<R: Seek> Seek for SubFile<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(d) => i128::from(self.pos) + i128::from(d),
            SeekFrom::End(d) => i128::from(self.length) + i128::from(d),
        };
        // Clamp to [0, length]
        self.pos = u64::try_from(target.clamp(0, i128::from(self.length))).unwrap_or(0);
        self.sync()?;
        Ok(self.pos)
    }
}

/// A reference-counted backing stream
///
/// Cloning gives another handle to the same stream. Each user must seek
/// before reading; [`SubFile`] always does.
#[derive(Debug)]
pub struct SharedFile<R>(Rc<RefCell<R>>);

impl<R> Clone for SharedFile<R> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<R> SharedFile<R> {
    /// Wrap a stream
    pub fn new(inner: R) -> Self {
        Self(Rc::new(RefCell::new(inner)))
    }

    /// Number of live handles
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl<R: Seek> SharedFile<R> {
    /// Total size of the backing stream
    pub fn len(&self) -> io::Result<u64> {
        let mut inner = self.0.try_borrow_mut().map_err(io::Error::other)?;
        let cur = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }
}

impl<R: Read> Read for SharedFile<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_borrow_mut().map_err(io::Error::other)?.read(buf)
    }
}

impl<R: Seek> Seek for SharedFile<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.try_borrow_mut().map_err(io::Error::other)?.seek(pos)
    }
}

/// Size of a stream, leaving its cursor at the start
pub fn stream_len<S: Seek>(stream: &mut S) -> io::Result<u64> {
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// Read up to `buf.len()` bytes at `offset`, returning how many were read
pub fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
