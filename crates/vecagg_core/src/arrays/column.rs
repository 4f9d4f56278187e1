use vecagg_error::{DbError, Result};

use super::bitmap::Bitmap;
use super::datatype::DataType;
use super::scalar::ScalarValue;

/// Typed value storage for a column. Always `capacity` long.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
    Binary(Vec<Vec<u8>>),
    Internal(Vec<ScalarValue>),
}

impl ColumnValues {
    fn with_capacity(datatype: DataType, capacity: usize) -> Self {
        match datatype {
            DataType::Boolean => Self::Boolean(vec![false; capacity]),
            DataType::Int32 => Self::Int32(vec![0; capacity]),
            DataType::Int64 => Self::Int64(vec![0; capacity]),
            DataType::Float64 => Self::Float64(vec![0.0; capacity]),
            DataType::Utf8 => Self::Utf8(vec![String::new(); capacity]),
            DataType::Binary => Self::Binary(vec![Vec::new(); capacity]),
            DataType::Internal => Self::Internal(vec![ScalarValue::Null; capacity]),
        }
    }
}

/// A fixed capacity vector of typed values with a parallel validity mask.
///
/// Owned by exactly one batch. Storage is allocated once and overwritten in
/// place as the batch is reused.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    datatype: DataType,
    values: ColumnValues,
    validity: Bitmap,
    logical_len: usize,
}

impl Column {
    pub fn new(datatype: DataType, capacity: usize) -> Self {
        Column {
            datatype,
            values: ColumnValues::with_capacity(datatype, capacity),
            validity: Bitmap::new_with_all_true(capacity),
            logical_len: 0,
        }
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn capacity(&self) -> usize {
        self.validity.len()
    }

    pub fn logical_len(&self) -> usize {
        self.logical_len
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn set_logical_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(DbError::capacity_exceeded("Column length exceeds capacity")
                .with_field("len", len)
                .with_field("capacity", self.capacity()));
        }
        self.logical_len = len;
        Ok(())
    }

    /// Get an owned copy of the value at `idx`.
    pub fn get_value(&self, idx: usize) -> Result<ScalarValue> {
        self.check_index(idx)?;
        if !self.validity.value(idx) {
            return Ok(ScalarValue::Null);
        }

        Ok(match &self.values {
            ColumnValues::Boolean(v) => ScalarValue::Boolean(v[idx]),
            ColumnValues::Int32(v) => ScalarValue::Int32(v[idx]),
            ColumnValues::Int64(v) => ScalarValue::Int64(v[idx]),
            ColumnValues::Float64(v) => ScalarValue::Float64(v[idx]),
            ColumnValues::Utf8(v) => ScalarValue::Utf8(v[idx].clone()),
            ColumnValues::Binary(v) => ScalarValue::Binary(v[idx].clone()),
            ColumnValues::Internal(v) => v[idx].clone(),
        })
    }

    /// Write a value at `idx`, reusing existing heap storage for by-reference
    /// types.
    pub fn set_value(&mut self, idx: usize, value: &ScalarValue) -> Result<()> {
        self.check_index(idx)?;

        match (&mut self.values, value) {
            (_, ScalarValue::Null) => {
                self.validity.set_unchecked(idx, false);
                return Ok(());
            }
            (ColumnValues::Boolean(v), ScalarValue::Boolean(val)) => v[idx] = *val,
            (ColumnValues::Int32(v), ScalarValue::Int32(val)) => v[idx] = *val,
            (ColumnValues::Int64(v), ScalarValue::Int64(val)) => v[idx] = *val,
            (ColumnValues::Float64(v), ScalarValue::Float64(val)) => v[idx] = *val,
            (ColumnValues::Utf8(v), ScalarValue::Utf8(val)) => {
                v[idx].clear();
                v[idx].push_str(val);
            }
            (ColumnValues::Binary(v), ScalarValue::Binary(val)) => {
                v[idx].clear();
                v[idx].extend_from_slice(val);
            }
            (ColumnValues::Internal(v), val @ ScalarValue::Struct(_)) => v[idx] = val.clone(),
            (_, other) => {
                return Err(DbError::new("Value type does not match column type")
                    .with_field("column_type", self.datatype)
                    .with_field("value", other));
            }
        }

        self.validity.set_unchecked(idx, true);
        Ok(())
    }

    /// Reset for reuse without reallocating.
    pub fn reset(&mut self) {
        self.logical_len = 0;
        self.validity.reset(true);
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx >= self.capacity() {
            return Err(DbError::new("Column index out of bounds")
                .with_field("idx", idx)
                .with_field("capacity", self.capacity()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut col = Column::new(DataType::Utf8, 4);
        col.set_value(0, &"a".into()).unwrap();
        col.set_value(1, &ScalarValue::Null).unwrap();
        col.set_value(2, &"ccc".into()).unwrap();

        assert_eq!(ScalarValue::from("a"), col.get_value(0).unwrap());
        assert_eq!(ScalarValue::Null, col.get_value(1).unwrap());
        assert_eq!(ScalarValue::from("ccc"), col.get_value(2).unwrap());

        col.set_value(1, &"b".into()).unwrap();
        assert_eq!(ScalarValue::from("b"), col.get_value(1).unwrap());
    }

    #[test]
    fn type_mismatch() {
        let mut col = Column::new(DataType::Int64, 2);
        col.set_value(0, &ScalarValue::Int32(4)).unwrap_err();
    }

    #[test]
    fn out_of_bounds() {
        let mut col = Column::new(DataType::Int64, 2);
        col.set_value(2, &ScalarValue::Int64(4)).unwrap_err();
        col.set_logical_len(3).unwrap_err();
    }
}
