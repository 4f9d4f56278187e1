//! Hash table mapping grouping keys to accumulators for one grouping set.

pub mod directory;

use directory::{Directory, ProbeResult};
use tracing::trace;
use vecagg_error::{DbError, Result};

use super::accumulator::{AccumulatorArray, MemoryScope};
use super::transition::{TransitionInfo, advance_row};
use crate::arrays::batch::Batch;
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;

/// Combine two hashes into a single value.
///
/// Mixing taken from boost's `hash_mix`.
pub const fn combine_hashes(v1: u64, v2: u64) -> u64 {
    const fn mix(mut x: u64) -> u64 {
        const M: u64 = 0xE9846AF9B1A615D;
        x ^= x.wrapping_shr(32);
        x = x.wrapping_mul(M);
        x ^= x.wrapping_shr(32);
        x = x.wrapping_mul(M);
        x ^= x.wrapping_shr(28);
        x
    }

    mix(v1.wrapping_add(0x9E3779B9).wrapping_add(v2))
}

/// Columns retained in each entry's representative row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashColumns {
    /// Grouping columns of this set, hashed and compared.
    pub group_columns: Vec<usize>,
    /// All retained input columns, grouping columns first followed by any
    /// other column needed for output in descending order.
    pub input_columns: Vec<usize>,
}

impl HashColumns {
    /// Compute the minimal retained column set.
    ///
    /// `all_grouped_desc` holds every column grouped by any grouping set in
    /// descending order. Referenced columns that are grouped elsewhere but not
    /// by this set read as null in output and are dropped.
    pub fn compute(group_columns: &[usize], all_grouped_desc: &[usize], referenced: &[usize]) -> Self {
        let mut needed: Vec<usize> = referenced.to_vec();
        needed.sort_unstable_by(|a, b| b.cmp(a));
        needed.dedup();

        for &col in all_grouped_desc {
            if !group_columns.contains(&col) {
                needed.retain(|&c| c != col);
            }
        }

        let mut input_columns = group_columns.to_vec();
        for col in needed {
            if !input_columns.contains(&col) {
                input_columns.push(col);
            }
        }

        HashColumns {
            group_columns: group_columns.to_vec(),
            input_columns,
        }
    }

    /// Highest input column that must be deformed before lookups.
    pub fn largest_column(&self) -> Option<usize> {
        self.input_columns.iter().copied().max()
    }
}

/// A group stored in the table.
#[derive(Debug)]
pub struct HashEntry {
    /// Values of `HashColumns::input_columns` taken from the first row seen
    /// for this key.
    pub key: ScalarRow,
    pub hash: u64,
    pub accumulators: AccumulatorArray,
}

/// Hash table for one grouping set.
///
/// Entries are never removed while the table is live. Iteration order is
/// insertion order.
#[derive(Debug)]
pub struct GroupingHashTable {
    columns: HashColumns,
    directory: Directory,
    entries: Vec<HashEntry>,
    scope: MemoryScope,
    num_lookups: usize,
}

impl GroupingHashTable {
    pub fn new(columns: HashColumns, initial_capacity: usize) -> Self {
        GroupingHashTable {
            columns,
            directory: Directory::with_capacity(initial_capacity),
            entries: Vec::new(),
            scope: MemoryScope::new(),
            num_lookups: 0,
        }
    }

    pub fn columns(&self) -> &HashColumns {
        &self.columns
    }

    pub fn num_groups(&self) -> usize {
        self.entries.len()
    }

    pub fn num_lookups(&self) -> usize {
        self.num_lookups
    }

    pub fn entry(&self, idx: usize) -> Option<&HashEntry> {
        self.entries.get(idx)
    }

    fn hash_row(&self, batch: &Batch, row: usize, key: &mut Vec<ScalarValue>) -> Result<u64> {
        key.clear();
        let mut hash = 0;
        for (idx, &col) in self.columns.group_columns.iter().enumerate() {
            let value = batch.get_value(col, row)?;
            let h = value.hash_value();
            hash = if idx == 0 { h } else { combine_hashes(hash, h) };
            key.push(value);
        }
        Ok(hash)
    }

    /// Find the group for one row, creating it with freshly initialized
    /// accumulators if the key hasn't been seen.
    pub fn lookup_or_create(
        &mut self,
        batch: &Batch,
        row: usize,
        transitions: &[TransitionInfo],
    ) -> Result<usize> {
        self.num_lookups += 1;

        let mut key = Vec::with_capacity(self.columns.group_columns.len());
        let hash = self.hash_row(batch, row, &mut key)?;

        let entries = &self.entries;
        let probe = self.directory.probe(hash, |group| {
            let existing = &entries[group as usize].key;
            key.iter()
                .enumerate()
                .all(|(idx, v)| existing.value(idx).is_not_distinct_from(v))
        });

        let offset = match probe {
            ProbeResult::Found(group) => return Ok(group as usize),
            ProbeResult::Empty(offset) => offset,
        };

        let offset = if self.directory.needs_resize(1) {
            let new_capacity = self.directory.capacity() * 2;
            trace!(new_capacity, groups = self.entries.len(), "resizing hash table directory");
            self.directory.resize(new_capacity)?;
            match self.directory.probe(hash, |_| false) {
                ProbeResult::Empty(offset) => offset,
                ProbeResult::Found(_) => {
                    return Err(DbError::new("Unexpected match after directory resize"));
                }
            }
        } else {
            offset
        };

        let group = u32::try_from(self.entries.len())
            .map_err(|_| DbError::new("Too many groups in hash table"))?;

        // Grouping columns are already read, pick up the remaining retained
        // columns from the row.
        for &col in &self.columns.input_columns[self.columns.group_columns.len()..] {
            key.push(batch.get_value(col, row)?);
        }

        self.directory.insert_at(offset, hash, group);
        self.entries.push(HashEntry {
            key: ScalarRow { columns: key },
            hash,
            accumulators: AccumulatorArray::new(transitions, &mut self.scope),
        });

        Ok(group as usize)
    }

    /// Look up every live row in the batch.
    ///
    /// The result is index aligned with the batch's row slots. Skipped slots
    /// are left as None.
    pub fn lookup_batch(
        &mut self,
        batch: &Batch,
        transitions: &[TransitionInfo],
    ) -> Result<Vec<Option<usize>>> {
        if let Some(largest) = self.columns.largest_column() {
            batch.require_attrs(largest + 1)?;
        }

        let mut groups = vec![None; batch.num_rows()];
        for row in batch.live_rows() {
            groups[row] = Some(self.lookup_or_create(batch, row, transitions)?);
        }
        Ok(groups)
    }

    /// Advance each row's group with that row.
    pub fn advance_batch(
        &mut self,
        groups: &[Option<usize>],
        transitions: &[TransitionInfo],
        batch: &Batch,
    ) -> Result<()> {
        let mut args = Vec::new();
        for (row, group) in groups.iter().enumerate() {
            let Some(group) = group else {
                continue;
            };
            let entry = &mut self.entries[*group];
            advance_row(
                transitions,
                &mut entry.accumulators,
                &mut self.scope,
                batch,
                row,
                &mut args,
            )?;
        }
        Ok(())
    }

    /// Build a full width row for projecting an entry. Columns not retained
    /// by the table are null.
    pub fn representative(&self, idx: usize, width: usize) -> Result<ScalarRow> {
        let entry = self
            .entries
            .get(idx)
            .ok_or_else(|| DbError::new("Missing hash table entry").with_field("idx", idx))?;
        let mut row = ScalarRow::all_null(width);
        for (pos, &col) in self.columns.input_columns.iter().enumerate() {
            row.columns[col] = entry.key.value(pos).clone();
        }
        Ok(row)
    }
}
