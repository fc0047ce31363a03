//! Tagged values on the wire.
//!
//! A value travels as `[tag byte][payload]`; NULL is just its tag byte.
//! The same encoding serves parameter binding and column decoding.

use std::io::{Read, Write};

use sqinn_core::error::{Error, Result, TransportErrorKind};
use sqinn_core::{Value, ValueType};

use super::reader::FrameReader;
use super::writer::FrameWriter;

/// Append one tagged value to the pending request frame.
pub fn write_value<W: Write>(w: &mut FrameWriter<W>, value: &Value) {
    w.write_u8(value.value_type().tag());
    match value {
        Value::Null => {}
        Value::Int32(v) => w.write_i32(*v),
        Value::Int64(v) => w.write_i64(*v),
        Value::Double(v) => w.write_f64(*v),
        Value::Text(v) => w.write_str(v),
        Value::Blob(v) => w.write_blob(v),
    }
}

/// Decode one tagged value, enforcing the declared column type.
///
/// The decoded tag must equal `expected` or be NULL; anything else means
/// the stream has desynchronized from the declared column layout.
pub fn read_value<R: Read>(r: &mut FrameReader<R>, expected: ValueType) -> Result<Value> {
    let tag = r.read_u8()?;
    let Some(actual) = ValueType::from_tag(tag) else {
        return Err(Error::transport(
            TransportErrorKind::Decode,
            format!("unknown value tag {tag}"),
        ));
    };
    if actual == ValueType::Null {
        return Ok(Value::Null);
    }
    if actual != expected {
        return Err(Error::transport(
            TransportErrorKind::Decode,
            format!(
                "want column type {} but worker sent {}",
                expected.name(),
                actual.name()
            ),
        ));
    }
    match actual {
        ValueType::Null => unreachable!("handled above"),
        ValueType::Int32 => Ok(Value::Int32(r.read_i32()?)),
        ValueType::Int64 => Ok(Value::Int64(r.read_i64()?)),
        ValueType::Double => Ok(Value::Double(r.read_f64()?)),
        ValueType::Text => Ok(Value::Text(r.read_str()?)),
        ValueType::Blob => Ok(Value::Blob(r.read_blob()?)),
    }
}
