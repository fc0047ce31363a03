//! Query result rows.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::{Error, TypeMismatch};
use crate::value::Value;

/// A single row returned from a query.
///
/// A row holds one [`Value`] per requested column, in column order. Rows
/// are owned by the caller once returned; the transport does not retain
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from its column values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, yielding its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Extract the value at `index` into a concrete Rust type.
    ///
    /// `Option<T>` targets map NULL to `None`; non-optional targets fail
    /// on NULL with a type error.
    pub fn try_get<T>(&self, index: usize) -> Result<T>
    where
        T: TryFrom<Value, Error = Error>,
    {
        let value = self.values.get(index).ok_or_else(|| {
            Error::Type(TypeMismatch {
                expected: "a column at this index",
                actual: "out of range",
            })
        })?;
        T::try_from(value.clone())
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}
