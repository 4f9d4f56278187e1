//! Test utilities.
//!
//! Not behind `#[cfg(test)]` so that integration tests can use them.
//!
//! Should not be used outside of tests.

use crate::arrays::batch::{Batch, RowSource};
use crate::arrays::datatype::DataType;
use crate::arrays::row::ScalarRow;
use crate::arrays::sort::{SortKey, sort_rows};
use crate::execution::operators::aggregate::PhysicalAggregate;

/// Create a batch holding `rows`, sized to fit them exactly.
pub fn batch_from_rows(
    datatypes: impl IntoIterator<Item = DataType>,
    rows: impl IntoIterator<Item = ScalarRow>,
) -> Batch {
    let rows: Vec<_> = rows.into_iter().collect();
    let mut batch = Batch::try_new(datatypes, usize::max(rows.len(), 1)).unwrap();
    for row in &rows {
        batch.append(RowSource::Values(&row.columns)).unwrap();
    }
    batch
}

/// Collect the live rows of a batch.
pub fn batch_rows(batch: &Batch) -> Vec<ScalarRow> {
    batch.live_rows().map(|idx| batch.row(idx).unwrap()).collect()
}

/// Pull every output batch from the operator, returning all rows in output
/// order along with the number of rows in each batch.
pub fn drain_operator(op: &mut PhysicalAggregate) -> (Vec<ScalarRow>, Vec<usize>) {
    let mut rows = Vec::new();
    let mut batch_sizes = Vec::new();
    while let Some(batch) = op.next_output_batch().unwrap() {
        batch_sizes.push(batch.num_rows());
        rows.extend(batch_rows(batch));
    }
    (rows, batch_sizes)
}

/// Pull every output row from the operator.
pub fn drain_rows(op: &mut PhysicalAggregate) -> Vec<ScalarRow> {
    drain_operator(op).0
}

/// Sort rows on all columns for order insensitive comparisons.
pub fn sorted(mut rows: Vec<ScalarRow>) -> Vec<ScalarRow> {
    let width = rows.first().map(|r| r.width()).unwrap_or(0);
    let keys: Vec<_> = (0..width).map(SortKey::asc).collect();
    sort_rows(&mut rows, &keys);
    rows
}

/// Asserts that two batches are logically equal.
pub fn assert_batches_eq(a: &Batch, b: &Batch) {
    assert_eq!(a.num_columns(), b.num_columns(), "num columns differ");
    assert!(
        a.datatypes().eq(b.datatypes()),
        "data types differ"
    );
    assert_eq!(batch_rows(a), batch_rows(b), "rows differ");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;

    #[test]
    fn batches_eq_ignores_skipped() {
        let a = batch_from_rows(
            [DataType::Int32],
            [ScalarRow::from_iter([1]), ScalarRow::from_iter([2])],
        );
        let mut b = batch_from_rows(
            [DataType::Int32],
            [
                ScalarRow::from_iter([1]),
                ScalarRow::from_iter([9]),
                ScalarRow::from_iter([2]),
            ],
        );
        b.set_skip(1, true).unwrap();

        assert_batches_eq(&a, &b);
    }

    #[test]
    #[should_panic]
    fn batches_not_eq() {
        let a = batch_from_rows([DataType::Int32], [ScalarRow::from_iter([1])]);
        let b = batch_from_rows([DataType::Int32], [ScalarRow::from_iter([ScalarValue::Null])]);

        assert_batches_eq(&a, &b);
    }
}
