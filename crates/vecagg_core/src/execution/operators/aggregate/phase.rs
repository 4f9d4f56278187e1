use vecagg_error::{DbError, Result};

use crate::arrays::batch::{Batch, RowSource};
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::sort::{SortKey, sort_rows};

/// How groups are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggStrategy {
    /// Single group over all input.
    Plain,
    /// Groups are consecutive runs of presorted input.
    Sorted,
    /// Groups are hash table entries.
    Hashed,
    /// Sorted phases with additional hashed grouping sets filled during the
    /// first sorted phase.
    Mixed,
}

/// Grouping equality for one column.
pub type EqualityFn = fn(&ScalarValue, &ScalarValue) -> bool;

/// One pass over (possibly resorted) input covering a list of grouping sets.
#[derive(Debug, Clone)]
pub struct GroupingSetPhase {
    pub strategy: AggStrategy,
    /// Grouping sets evaluated by this phase. For sorted phases these are
    /// prefixes of the first (most specific) set, longest first.
    pub grouping_sets: Vec<Vec<usize>>,
    /// If the plan spelled out grouping sets rather than a plain group by.
    pub has_grouping_sets: bool,
    /// Equality per column of the most specific set.
    pub eq_fns: Vec<EqualityFn>,
}

impl GroupingSetPhase {
    /// Placeholder phase for hashed grouping sets.
    pub fn hashed(grouping_sets: Vec<Vec<usize>>, has_grouping_sets: bool) -> Self {
        GroupingSetPhase {
            strategy: AggStrategy::Hashed,
            grouping_sets,
            has_grouping_sets,
            eq_fns: Vec::new(),
        }
    }

    /// A sorted (or plain when there are no grouping columns) phase.
    pub fn sorted(grouping_sets: Vec<Vec<usize>>, has_grouping_sets: bool) -> Result<Self> {
        let most_specific = grouping_sets
            .first()
            .cloned()
            .ok_or_else(|| DbError::invalid_definition("Sorted phase without grouping sets"))?;

        let mut prev_len = most_specific.len();
        for set in &grouping_sets[1..] {
            if set.len() > prev_len || set[..] != most_specific[..set.len()] {
                return Err(DbError::invalid_definition(
                    "Grouping sets in a sorted phase must be prefixes ordered most specific first",
                )
                .with_field("set", format!("{set:?}"))
                .with_field("most_specific", format!("{most_specific:?}")));
            }
            prev_len = set.len();
        }

        let strategy = if most_specific.is_empty() {
            AggStrategy::Plain
        } else {
            AggStrategy::Sorted
        };

        Ok(GroupingSetPhase {
            strategy,
            eq_fns: vec![ScalarValue::is_not_distinct_from as EqualityFn; most_specific.len()],
            grouping_sets,
            has_grouping_sets,
        })
    }

    pub fn num_sets(&self) -> usize {
        self.grouping_sets.len()
    }

    pub fn set_len(&self, set: usize) -> usize {
        self.grouping_sets.get(set).map(|s| s.len()).unwrap_or(0)
    }

    pub fn grouping_set(&self, set: usize) -> &[usize] {
        self.grouping_sets.get(set).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Columns of the most specific set, in sort order.
    pub fn group_columns(&self) -> &[usize] {
        self.grouping_set(0)
    }

    /// Compare a batch row against a representative row on the first `ncols`
    /// grouping columns.
    pub fn batch_row_matches(
        &self,
        batch: &Batch,
        row: usize,
        representative: &ScalarRow,
        ncols: usize,
    ) -> Result<bool> {
        for (&col, eq) in self.group_columns().iter().zip(&self.eq_fns).take(ncols) {
            if !eq(&batch.get_value(col, row)?, representative.value(col)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sort keys producing the input order this phase requires.
    pub fn sort_keys(&self) -> Vec<SortKey> {
        self.group_columns().iter().map(|&c| SortKey::asc(c)).collect()
    }
}

/// Rows collected during one phase to be sorted for the next.
#[derive(Debug)]
pub struct ResortBuffer {
    keys: Vec<SortKey>,
    rows: Vec<ScalarRow>,
}

impl ResortBuffer {
    pub fn new(keys: Vec<SortKey>) -> Self {
        ResortBuffer {
            keys,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: ScalarRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort the collected rows and turn them into a readable input.
    pub fn finish(mut self) -> SortedInput {
        sort_rows(&mut self.rows, &self.keys);
        SortedInput {
            rows: self.rows,
            pos: 0,
        }
    }
}

/// Sorted rows read back in batches.
#[derive(Debug)]
pub struct SortedInput {
    rows: Vec<ScalarRow>,
    pos: usize,
}

impl SortedInput {
    /// Fill the cleared `batch` with the next rows. Returns false once all
    /// rows were read.
    pub fn fill(&mut self, batch: &mut Batch) -> Result<bool> {
        if self.pos >= self.rows.len() {
            return Ok(false);
        }
        while self.pos < self.rows.len() && !batch.is_full() {
            batch.append(RowSource::Values(&self.rows[self.pos].columns))?;
            self.pos += 1;
        }
        Ok(true)
    }

    pub fn remaining(&self) -> usize {
        self.rows.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::DataType;

    #[test]
    fn sorted_phase_validates_prefixes() {
        let phase = GroupingSetPhase::sorted(vec![vec![0, 1], vec![0], vec![]], true).unwrap();
        assert_eq!(AggStrategy::Sorted, phase.strategy);
        assert_eq!(3, phase.num_sets());
        assert_eq!(1, phase.set_len(1));

        GroupingSetPhase::sorted(vec![vec![0, 1], vec![1]], true).unwrap_err();
        GroupingSetPhase::sorted(vec![vec![0], vec![0, 1]], true).unwrap_err();
        GroupingSetPhase::sorted(vec![], true).unwrap_err();
    }

    #[test]
    fn empty_set_is_plain() {
        let phase = GroupingSetPhase::sorted(vec![vec![]], false).unwrap();
        assert_eq!(AggStrategy::Plain, phase.strategy);
    }

    #[test]
    fn resort_round_trip() {
        let mut buf = ResortBuffer::new(vec![SortKey::asc(1)]);
        for (a, b) in [(1, 3), (2, 1), (3, 2)] {
            buf.push(ScalarRow::from_iter([ScalarValue::Int32(a), ScalarValue::Int32(b)]));
        }
        let mut input = buf.finish();

        let mut batch = Batch::try_new([DataType::Int32, DataType::Int32], 2).unwrap();
        assert!(input.fill(&mut batch).unwrap());
        assert_eq!(2, batch.num_rows());
        assert_eq!(ScalarValue::Int32(2), batch.get_value(0, 0).unwrap());

        batch.clear();
        assert!(input.fill(&mut batch).unwrap());
        assert_eq!(ScalarValue::Int32(1), batch.get_value(0, 0).unwrap());

        batch.clear();
        assert!(!input.fill(&mut batch).unwrap());
    }
}
