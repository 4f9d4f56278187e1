use super::scalar::ScalarValue;

static NULL_VALUE: ScalarValue = ScalarValue::Null;

/// A row of owned values.
///
/// Used for group representatives, sort buffer entries, and raw backing rows
/// waiting for deformation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarRow {
    pub columns: Vec<ScalarValue>,
}

impl ScalarRow {
    /// Create a row with `width` null values.
    pub fn all_null(width: usize) -> Self {
        ScalarRow {
            columns: vec![ScalarValue::Null; width],
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Value at `idx`, reading past the end as null.
    pub fn value(&self, idx: usize) -> &ScalarValue {
        self.columns.get(idx).unwrap_or(&NULL_VALUE)
    }

    /// Compare a subset of columns with grouping equality.
    pub fn columns_not_distinct(&self, other: &ScalarRow, cols: &[usize]) -> bool {
        cols.iter()
            .all(|&col| self.value(col).is_not_distinct_from(other.value(col)))
    }
}

impl<V> FromIterator<V> for ScalarRow
where
    V: Into<ScalarValue>,
{
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        ScalarRow {
            columns: iter.into_iter().map(|v| v.into()).collect(),
        }
    }
}

impl From<Vec<ScalarValue>> for ScalarRow {
    fn from(columns: Vec<ScalarValue>) -> Self {
        ScalarRow { columns }
    }
}
