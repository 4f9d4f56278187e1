use std::cmp::Ordering;

use super::row::ScalarRow;

/// Ordering for one column of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub const fn asc(column: usize) -> Self {
        SortKey {
            column,
            descending: false,
            nulls_first: false,
        }
    }

    pub const fn desc(column: usize) -> Self {
        SortKey {
            column,
            descending: true,
            nulls_first: true,
        }
    }
}

/// Compare two rows on the given keys.
pub fn compare_rows(a: &ScalarRow, b: &ScalarRow, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.value(key.column);
        let right = b.value(key.column);

        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if key.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if key.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = left.compare_for_sort(right);
                if key.descending { ord.reverse() } else { ord }
            }
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort of rows.
pub fn sort_rows(rows: &mut [ScalarRow], keys: &[SortKey]) {
    rows.sort_by(|a, b| compare_rows(a, b, keys));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;

    #[test]
    fn stable_with_nulls_last() {
        let mut rows = vec![
            ScalarRow::from_iter([ScalarValue::Int32(2), "a".into()]),
            ScalarRow::from_iter([ScalarValue::Null, "b".into()]),
            ScalarRow::from_iter([ScalarValue::Int32(1), "c".into()]),
            ScalarRow::from_iter([ScalarValue::Int32(2), "d".into()]),
        ];
        sort_rows(&mut rows, &[SortKey::asc(0)]);

        let tags: Vec<_> = rows.iter().map(|r| r.value(1).to_string()).collect();
        assert_eq!(vec!["c", "a", "d", "b"], tags);
    }

    #[test]
    fn descending_nulls_first() {
        let mut rows = vec![
            ScalarRow::from_iter([ScalarValue::Int32(1)]),
            ScalarRow::from_iter([ScalarValue::Null]),
            ScalarRow::from_iter([ScalarValue::Int32(3)]),
        ];
        sort_rows(&mut rows, &[SortKey::desc(0)]);
        assert_eq!(
            vec![
                ScalarRow::from_iter([ScalarValue::Null]),
                ScalarRow::from_iter([ScalarValue::Int32(3)]),
                ScalarRow::from_iter([ScalarValue::Int32(1)]),
            ],
            rows
        );
    }
}
