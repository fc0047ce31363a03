//! SQLite in Rust without FFI, by driving the `sqinn` worker subprocess
//! over a binary stdin/stdout protocol.
//!
//! A [`SqinnConnection`] launches one worker process and serializes
//! blocking request/response calls onto its pipe pair. The worker wraps
//! SQLite; this crate only speaks the wire protocol: length-prefixed
//! frames carrying a typed-value codec, batched execution ([`exec`])
//! and streamed query results ([`query`]).
//!
//! [`exec`]: SqinnConnection::exec
//! [`query`]: SqinnConnection::query
//!
//! # Example
//!
//! ```no_run
//! use sqinn::{SqinnConfig, SqinnConnection, Value, ValueType};
//!
//! fn main() -> sqinn::Result<()> {
//!     let conn = SqinnConnection::launch(SqinnConfig::new())?;
//!     conn.open(":memory:")?;
//!     conn.exec_sql("CREATE TABLE users (id INTEGER, name TEXT)")?;
//!     conn.exec(
//!         "INSERT INTO users (id, name) VALUES (?, ?)",
//!         3,
//!         2,
//!         |iteration, params| {
//!             params[0] = Value::Int32(iteration as i32 + 1);
//!             params[1] = Value::Text(format!("user {iteration}"));
//!         },
//!     )?;
//!     conn.query(
//!         "SELECT id, name FROM users ORDER BY id",
//!         &[],
//!         &[ValueType::Int32, ValueType::Text],
//!         |_, values| {
//!             println!("{:?} {:?}", values[0], values[1]);
//!         },
//!     )?;
//!     conn.terminate()
//! }
//! ```
//!
//! # Concurrency
//!
//! One connection means one in-flight call: every call holds the
//! connection's lock for its full round trip, so concurrent callers are
//! safe but strictly serialized. Throughput scales by launching more
//! connections, one worker process each — not by multiplexing one pipe
//! pair. There is no transport-level timeout; if a deadline is needed,
//! enforce it above this crate and terminate the connection.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod session;

mod process;

pub use config::{LogSink, SqinnConfig};
pub use connection::SqinnConnection;
pub use protocol::ProtocolVersion;
pub use session::Session;
pub use sqinn_core::{
    ApplicationError, ContractViolation, Error, LaunchError, Result, Row, TransportError,
    TransportErrorKind, TypeMismatch, Value, ValueType,
};
