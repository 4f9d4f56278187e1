use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type of a column, a transition state, or an output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Utf8,
    Binary,
    /// Opaque aggregate state. Never surfaces in final output, only in
    /// partial output after serialization.
    Internal,
}

impl DataType {
    /// If values of this type are held inline rather than owned on the heap.
    ///
    /// By-reference transition values are tracked by the group's memory
    /// scope.
    pub const fn is_pass_by_value(&self) -> bool {
        matches!(
            self,
            DataType::Boolean | DataType::Int32 | DataType::Int64 | DataType::Float64
        )
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "Boolean"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Utf8 => write!(f, "Utf8"),
            Self::Binary => write!(f, "Binary"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}
