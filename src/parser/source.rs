//! Buffered byte window over a seekable source.
//!
//! The parser never reads the whole file at once: it positions a bounded,
//! rolling window over one region at a time (header, a body, an xref
//! section). Refilling the window preserves the unread suffix so that a
//! token may cross a window boundary.

use super::{ParseError, ParseResult};
use std::io::{Read, Seek, SeekFrom};

/// Rolling buffer capacity. Must exceed the largest legal token.
pub(crate) const INPUT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// A bounded, seekable, buffered view of an underlying reader.
///
/// `fill` establishes a window `[file_offset, file_offset + size)`; all
/// subsequent reads and refills stay inside it. After any `refill`, indices
/// into the previous buffer contents are invalid.
pub struct ByteSource<R> {
    inner: R,
    size: u64,
    b_start: u64,
    stop_at: u64,
    pub(crate) buffer: Vec<u8>,
    pub(crate) offset: usize,
    capacity: usize,
}

fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(m) => n += m,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

impl<R: Read + Seek> ByteSource<R> {
    pub fn new(inner: R) -> ParseResult<Self> {
        Self::with_capacity(inner, INPUT_BUFFER_SIZE)
    }

    pub(crate) fn with_capacity(mut inner: R, capacity: usize) -> ParseResult<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            size,
            b_start: 0,
            stop_at: 0,
            buffer: Vec::new(),
            offset: 0,
            capacity,
        })
    }

    /// Total size of the underlying source in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File offset of the next byte the consumer will see.
    pub fn file_pos(&self) -> u64 {
        self.b_start + self.offset as u64
    }

    /// Exclusive upper bound of the current window.
    pub fn stop_at(&self) -> u64 {
        self.stop_at
    }

    /// Position the window at `file_offset`, exposing up to `size` bytes.
    pub fn fill(&mut self, size: u64, file_offset: u64) -> ParseResult<()> {
        self.inner.seek(SeekFrom::Start(file_offset))?;
        self.b_start = file_offset;
        self.stop_at = file_offset + size;
        let want = size.min(self.capacity as u64) as usize;
        self.buffer.resize(want, 0);
        let n = read_full(&mut self.inner, &mut self.buffer)?;
        self.buffer.truncate(n);
        self.offset = 0;
        Ok(())
    }

    /// Slide the window forward, keeping the unread suffix at index 0.
    ///
    /// Returns `false` when no further bytes exist before `stop_at`.
    pub fn refill(&mut self) -> ParseResult<bool> {
        let remaining = self.buffer.len() - self.offset;
        if remaining > 0 {
            self.buffer.copy_within(self.offset.., 0);
        }
        self.buffer.truncate(remaining);
        self.b_start += self.offset as u64;
        self.offset = 0;

        let window = self.stop_at.saturating_sub(self.b_start);
        let want = window.min(self.capacity as u64) as usize;
        if want <= remaining {
            return Ok(false);
        }
        let old = self.buffer.len();
        self.buffer.resize(want, 0);
        let n = read_full(&mut self.inner, &mut self.buffer[old..])?;
        self.buffer.truncate(old + n);
        Ok(n > 0)
    }

    /// Move the read position to `file_offset` within the current window,
    /// re-reading from the source when the target is outside the buffer.
    pub fn seek_to(&mut self, file_offset: u64) -> ParseResult<()> {
        if file_offset > self.stop_at {
            return Err(ParseError::ObjectSyntax {
                offset: self.file_pos(),
                message: format!("seek target {file_offset:#x} outside current range"),
            });
        }
        if file_offset >= self.b_start && file_offset - self.b_start < self.buffer.len() as u64 {
            self.offset = (file_offset - self.b_start) as usize;
            Ok(())
        } else {
            self.fill(self.stop_at - file_offset, file_offset)
        }
    }

    /// Materialize exactly `n` bytes, crossing refills. The result is
    /// shorter than `n` if the window boundary is reached first.
    pub fn read_n(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        loop {
            let avail = self.buffer.len() - self.offset;
            let take = avail.min(n - out.len());
            out.extend_from_slice(&self.buffer[self.offset..self.offset + take]);
            self.offset += take;
            if out.len() == n || !self.refill()? {
                return Ok(out);
            }
        }
    }

    /// Collect bytes up to (and consuming) the next occurrence of
    /// `needle`. Returns `None` if the window ends first.
    pub fn read_until(&mut self, needle: &[u8]) -> ParseResult<Option<Vec<u8>>> {
        let mut out = Vec::new();
        loop {
            if let Some(pos) = find_bytes(&self.buffer[self.offset..], needle) {
                out.extend_from_slice(&self.buffer[self.offset..self.offset + pos]);
                self.offset += pos + needle.len();
                return Ok(Some(out));
            }
            // keep a needle-sized tail so an occurrence may straddle refills
            let tail = (needle.len() - 1).min(self.buffer.len() - self.offset);
            let consume_to = self.buffer.len() - tail;
            out.extend_from_slice(&self.buffer[self.offset..consume_to]);
            self.offset = consume_to;
            if !self.refill()? {
                return Ok(None);
            }
        }
    }

    pub fn get_byte(&mut self) -> ParseResult<Option<u8>> {
        loop {
            if self.offset < self.buffer.len() {
                let c = self.buffer[self.offset];
                self.offset += 1;
                return Ok(Some(c));
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }

    /// Undo the last `get_byte`. Guaranteed to work exactly once, since the
    /// byte just returned is still in the current buffer.
    pub fn unget_byte(&mut self) {
        debug_assert!(self.offset > 0);
        self.offset -= 1;
    }

    /// Consume one LF if it is the next byte.
    pub fn skip_current_lf(&mut self) -> ParseResult<bool> {
        loop {
            if self.offset < self.buffer.len() {
                if self.buffer[self.offset] == b'\n' {
                    self.offset += 1;
                    return Ok(true);
                }
                return Ok(false);
            }
            if !self.refill()? {
                return Ok(false);
            }
        }
    }

    /// Consume one EOL. With `cr_lf` a CR must be followed by LF.
    pub fn skip_current_eol(&mut self, cr_lf: bool) -> ParseResult<bool> {
        loop {
            if self.offset < self.buffer.len() {
                match self.buffer[self.offset] {
                    b'\r' => {
                        self.offset += 1;
                        if cr_lf {
                            return self.skip_current_lf();
                        }
                        self.skip_current_lf()?;
                        return Ok(true);
                    }
                    b'\n' => {
                        self.offset += 1;
                        return Ok(true);
                    }
                    _ => return Ok(false),
                }
            }
            if !self.refill()? {
                return Ok(false);
            }
        }
    }

    /// Skip whitespace and, unless `no_comment`, `%`-to-EOL comments.
    pub fn skip_spaces(&mut self, no_comment: bool) -> ParseResult<()> {
        let mut in_comment = false;
        loop {
            while self.offset < self.buffer.len() {
                match self.buffer[self.offset] {
                    b'\n' | b'\r' => in_comment = false,
                    b' ' | b'\t' | b'\x0c' => {}
                    b'%' => {
                        if no_comment {
                            return Ok(());
                        }
                        in_comment = true;
                    }
                    _ => {
                        if !in_comment {
                            return Ok(());
                        }
                    }
                }
                self.offset += 1;
            }
            if !self.refill()? {
                return Ok(());
            }
        }
    }

    /// True when the next five bytes are `%%EOF`. Does not consume.
    pub fn eof_comment(&mut self) -> ParseResult<bool> {
        if self.offset + 5 > self.buffer.len() {
            self.refill()?;
        }
        if self.offset + 5 > self.buffer.len() {
            return Ok(false);
        }
        Ok(&self.buffer[self.offset..self.offset + 5] == b"%%EOF")
    }

    /// Read up to `len` bytes at an arbitrary file offset without
    /// disturbing the current window or read position.
    pub fn peek_at(&mut self, file_offset: u64, len: usize) -> ParseResult<Vec<u8>> {
        let pos = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(file_offset))?;
        let mut buf = vec![0u8; len];
        let n = read_full(&mut self.inner, &mut buf)?;
        buf.truncate(n);
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(buf)
    }
}

pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
