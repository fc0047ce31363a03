//! Frame reader: pulls one length-prefixed frame at a time and serves
//! successive typed fields from it.

use std::io::Read;

use sqinn_core::error::{Error, Result, TransportError, TransportErrorKind};

/// Buffer-owning reader for protocol response frames.
///
/// A typed read tops up the internal buffer with the next frame only
/// when the current one is exhausted; asking for more bytes than the
/// current frame still holds means the stream is corrupt and fails with
/// a transport error. Partial reads of the underlying stream are retried
/// until the exact count arrives or the stream ends.
#[derive(Debug)]
pub struct FrameReader<R: Read> {
    source: R,
    frame: Vec<u8>,
    pos: usize,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader around a byte source.
    pub fn new(source: R) -> Self {
        Self {
            source,
            frame: Vec::new(),
            pos: 0,
        }
    }

    /// Number of unread bytes remaining in the current frame.
    pub fn remaining(&self) -> usize {
        self.frame.len() - self.pos
    }

    /// Fail unless the current frame has been fully consumed.
    ///
    /// Trailing bytes mean request and response decoding have drifted
    /// apart, which would silently corrupt the next call.
    pub fn expect_drained(&self) -> Result<()> {
        let left = self.remaining();
        if left == 0 {
            Ok(())
        } else {
            Err(Error::transport(
                TransportErrorKind::Frame,
                format!("{left} undecoded bytes left in response frame"),
            ))
        }
    }

    /// Read the next frame into the buffer.
    fn fill(&mut self) -> Result<()> {
        let mut prefix = [0_u8; 4];
        self.source.read_exact(&mut prefix).map_err(|e| {
            read_error("cannot read frame length", e)
        })?;
        let len = i32::from_be_bytes(prefix);
        if len <= 0 {
            return Err(Error::transport(
                TransportErrorKind::Frame,
                format!("invalid frame length {len}"),
            ));
        }
        self.frame.clear();
        self.frame.resize(len as usize, 0);
        self.pos = 0;
        self.source.read_exact(&mut self.frame).map_err(|e| {
            read_error(&format!("cannot read {len} byte frame payload"), e)
        })
    }

    /// Serve `n` bytes from the current frame, topping up first when it
    /// is exhausted.
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if n == 0 {
            return Ok(&[]);
        }
        if self.pos == self.frame.len() {
            self.fill()?;
        }
        let avail = self.frame.len() - self.pos;
        if avail < n {
            return Err(Error::transport(
                TransportErrorKind::Frame,
                format!("want {n} bytes but frame has only {avail}"),
            ));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.frame[start..self.pos])
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a bool encoded as one byte (nonzero = true).
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a 32-bit big-endian two's-complement integer.
    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit big-endian two's-complement integer.
    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(buf))
    }

    /// Read a double from its 8-byte IEEE-754 big-endian bit pattern.
    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_bits(u64::from_be_bytes(buf)))
    }

    /// Read a blob: `[i32 len][raw bytes]`. A zero length is an empty
    /// blob.
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::transport(
                TransportErrorKind::Decode,
                format!("invalid blob length {len}"),
            ));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// Read a string: `[i32 len+1][utf8 bytes][0x00]`. The declared
    /// length covers the terminator, which must be present.
    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 1 {
            return Err(Error::transport(
                TransportErrorKind::Decode,
                format!("invalid string length {len}"),
            ));
        }
        let bytes = self.take(len as usize)?;
        let (text, terminator) = bytes.split_at(bytes.len() - 1);
        if terminator[0] != 0 {
            return Err(Error::transport(
                TransportErrorKind::Decode,
                "string is not null-terminated",
            ));
        }
        String::from_utf8(text.to_vec()).map_err(|e| {
            Error::transport(
                TransportErrorKind::Decode,
                format!("string is not valid UTF-8: {e}"),
            )
        })
    }
}

fn read_error(message: &str, source: std::io::Error) -> Error {
    Error::Transport(TransportError {
        kind: TransportErrorKind::Io,
        message: format!("{message}: {source}"),
        source: Some(source),
    })
}
