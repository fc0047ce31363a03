//! Wire protocol building blocks.
//!
//! The worker speaks a length-framed binary protocol over its standard
//! streams: every request and every response is `[4-byte big-endian
//! length][payload]`. A request payload starts with a one-byte function
//! code; a response payload starts with a one-byte success flag followed
//! by results, or by an error string on failure. A length field of zero
//! is the terminate sentinel and has no payload and no reply.

pub mod codes;
pub mod reader;
pub mod value_codec;
pub mod writer;

pub use codes::{FunctionCode, ProtocolVersion};
pub use reader::FrameReader;
pub use value_codec::{read_value, write_value};
pub use writer::FrameWriter;
