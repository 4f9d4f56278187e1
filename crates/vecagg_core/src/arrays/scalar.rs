use std::cmp::Ordering;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use vecagg_error::{DbError, Result};

use super::datatype::DataType;

/// State used for all hashing of grouping keys.
pub const HASH_RANDOM_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

const NULL_HASH: u64 = 0xA21258D088C87A13;

/// A single owned value.
///
/// `Struct` holds aggregate states of type `Internal`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ScalarValue {
    #[default]
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    Struct(Vec<ScalarValue>),
}

impl ScalarValue {
    /// Get the data type for this value, None for untyped null.
    pub fn datatype(&self) -> Option<DataType> {
        Some(match self {
            Self::Null => return None,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::Binary(_) => DataType::Binary,
            Self::Struct(_) => DataType::Internal,
        })
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Bytes owned on the heap by this value.
    pub fn heap_size(&self) -> usize {
        match self {
            Self::Utf8(s) => s.capacity(),
            Self::Binary(b) => b.capacity(),
            Self::Struct(vals) => {
                vals.capacity() * std::mem::size_of::<ScalarValue>()
                    + vals.iter().map(|v| v.heap_size()).sum::<usize>()
            }
            _ => 0,
        }
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            other => Err(DbError::new("Not a bool").with_field("value", other)),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int32(v) => Ok(*v as i64),
            Self::Int64(v) => Ok(*v),
            other => Err(DbError::new("Not an integer").with_field("value", other)),
        }
    }

    pub fn try_as_f64(&self) -> Result<f64> {
        match self {
            Self::Int32(v) => Ok(*v as f64),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            other => Err(DbError::new("Not a number").with_field("value", other)),
        }
    }

    pub fn try_as_str(&self) -> Result<&str> {
        match self {
            Self::Utf8(v) => Ok(v.as_str()),
            other => Err(DbError::new("Not a string").with_field("value", other)),
        }
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        let v = self.try_as_i64()?;
        usize::try_from(v)
            .map_err(|_| DbError::new("Value does not fit in usize").with_field("value", v))
    }

    /// Grouping equality. Nulls are equal to each other, NaN equals NaN and
    /// negative zero equals zero.
    pub fn is_not_distinct_from(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Struct(a), Self::Struct(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(a, b)| a.is_not_distinct_from(b))
            }
            (a, b) => a == b,
        }
    }

    /// Hash consistent with `is_not_distinct_from`.
    pub fn hash_value(&self) -> u64 {
        let mut hasher = HASH_RANDOM_STATE.build_hasher();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => NULL_HASH.hash(state),
            Self::Boolean(v) => v.hash(state),
            Self::Int32(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => normalize_float(*v).to_bits().hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Binary(v) => v.hash(state),
            Self::Struct(vals) => {
                vals.len().hash(state);
                for v in vals {
                    v.hash_into(state);
                }
            }
        }
    }

    /// Total order between non-null values of the same type.
    ///
    /// Values equal under `is_not_distinct_from` compare equal. Nulls sort
    /// after everything, callers apply their own null placement.
    pub fn compare_for_sort(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Int32(a), Self::Int32(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => {
                normalize_float(*a).total_cmp(&normalize_float(*b))
            }
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Struct(a), Self::Struct(b)) => {
                for (a, b) in a.iter().zip(b.iter()) {
                    match a.compare_for_sort(b) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => a.variant_ordinal().cmp(&b.variant_ordinal()),
        }
    }

    const fn variant_ordinal(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Int32(_) => 2,
            Self::Int64(_) => 3,
            Self::Float64(_) => 4,
            Self::Utf8(_) => 5,
            Self::Binary(_) => 6,
            Self::Struct(_) => 7,
        }
    }
}

fn normalize_float(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Binary(v) => write!(f, "{v:?}"),
            Self::Struct(vals) => {
                write!(f, "{{")?;
                for (idx, v) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}
