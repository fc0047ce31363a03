//! Core types for the sqinn client.
//!
//! This crate provides the foundational types shared by the sqinn wire
//! protocol and its callers:
//!
//! - [`Value`] / [`ValueType`] — the tagged union carried by parameter
//!   binding and column decoding
//! - [`Row`] — an ordered sequence of values, one per queried column
//! - [`Error`] and its taxonomy — launch, transport, application, and
//!   contract failures

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    ApplicationError, ContractViolation, Error, LaunchError, Result, TransportError,
    TransportErrorKind, TypeMismatch,
};
pub use row::Row;
pub use value::{Value, ValueType};
