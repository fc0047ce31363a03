//! Frame writer: accumulates one request and flushes it as a single
//! length-prefixed frame.
//!
//! All multi-byte integers are written in big-endian (network) byte
//! order. One logical call is exactly one frame: the buffer grows as
//! needed and is never split across flushes.

use std::io::Write;

use sqinn_core::error::{Error, Result, TransportError, TransportErrorKind};

/// Size of the frame length prefix in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Buffer-owning writer for protocol request frames.
///
/// Typed appenders build up the request payload; [`FrameWriter::flush`]
/// prefixes it with its 4-byte length and hands prefix plus payload to
/// the sink in one write. After a successful flush the buffer is empty
/// and ready for the next request.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    sink: W,
    /// Pending frame, with the length prefix reserved at the front.
    buf: Vec<u8>,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer around a byte sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            buf: vec![0; LEN_PREFIX_SIZE],
        }
    }

    /// Number of payload bytes accumulated for the pending frame.
    pub fn pending(&self) -> usize {
        self.buf.len() - LEN_PREFIX_SIZE
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Consume the writer, yielding the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append a bool as one byte (1 or 0).
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Append a 32-bit integer, big-endian two's-complement.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append a 64-bit integer, big-endian two's-complement.
    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Append a double as its 8-byte IEEE-754 big-endian bit pattern.
    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    /// Append a string: `[i32 len+1][utf8 bytes][0x00]`.
    pub fn write_str(&mut self, v: &str) {
        self.write_i32(v.len() as i32 + 1);
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0);
    }

    /// Append a blob: `[i32 len][raw bytes]`.
    pub fn write_blob(&mut self, v: &[u8]) {
        self.write_i32(v.len() as i32);
        self.buf.extend_from_slice(v);
    }

    /// Flush the pending frame: patch the length prefix and write
    /// prefix plus payload to the sink as one unit.
    ///
    /// A frame must carry at least one payload byte; flushing an empty
    /// buffer is a no-op. The sink is flushed so the worker sees the
    /// request immediately.
    pub fn flush(&mut self) -> Result<()> {
        let payload = self.pending();
        if payload == 0 {
            return Ok(());
        }
        let Ok(len) = i32::try_from(payload) else {
            return Err(Error::transport(
                TransportErrorKind::Frame,
                format!("request of {payload} bytes exceeds the frame size limit"),
            ));
        };
        self.buf[..LEN_PREFIX_SIZE].copy_from_slice(&len.to_be_bytes());
        self.sink.write_all(&self.buf).map_err(|e| write_error(payload, e))?;
        self.sink.flush().map_err(|e| write_error(payload, e))?;
        self.buf.clear();
        self.buf.resize(LEN_PREFIX_SIZE, 0);
        Ok(())
    }

    /// Write the zero-length terminate sentinel: a length prefix of 0
    /// with no payload. No response follows it.
    ///
    /// Any pending unflushed payload is discarded first; the sentinel is
    /// only ever sent between calls.
    pub fn write_sentinel(&mut self) -> Result<()> {
        self.buf.clear();
        self.buf.resize(LEN_PREFIX_SIZE, 0);
        self.sink
            .write_all(&0_i32.to_be_bytes())
            .map_err(|e| write_error(0, e))?;
        self.sink.flush().map_err(|e| write_error(0, e))?;
        Ok(())
    }
}

fn write_error(payload: usize, source: std::io::Error) -> Error {
    Error::Transport(TransportError {
        kind: TransportErrorKind::Io,
        message: format!("cannot write {payload} byte frame: {source}"),
        source: Some(source),
    })
}
