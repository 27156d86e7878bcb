//! Binary Cursor
//!
//! Bounds-checked, big-endian reads over a byte slice. Used by the multiSend
//! packed-format scanner, which is not ABI encoded.

use alloy::primitives::U256;
use thiserror::Error;

/// Errors that can occur while reading from a cursor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Read of {requested} bytes at offset {offset} exceeds buffer ({remaining} remaining)")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        remaining: usize,
    },

    #[error("Unsupported integer width: {0} bytes")]
    InvalidWidth(usize),
}

/// Cursor over a borrowed byte sequence
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move to an absolute offset. Seeking to the end of the buffer is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<(), CursorError> {
        if offset > self.buf.len() {
            return Err(CursorError::OutOfBounds {
                offset,
                requested: 0,
                remaining: 0,
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Read `n` raw bytes and advance. The offset is unchanged on failure.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CursorError::OutOfBounds {
                offset: self.offset,
                requested: n,
                remaining,
            });
        }
        let start = self.offset;
        self.offset += n;
        Ok(&self.buf[start..start + n])
    }

    /// Read a big-endian unsigned integer of `n` bytes (at most 8)
    pub fn read_uint(&mut self, n: usize) -> Result<u64, CursorError> {
        if n == 0 || n > 8 {
            return Err(CursorError::InvalidWidth(n));
        }
        let bytes = self.read_bytes(n)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Read a big-endian unsigned integer of `n` bytes (at most 32)
    pub fn read_big_uint(&mut self, n: usize) -> Result<U256, CursorError> {
        if n == 0 || n > 32 {
            return Err(CursorError::InvalidWidth(n));
        }
        let bytes = self.read_bytes(n)?;
        Ok(U256::from_be_slice(bytes))
    }
}
