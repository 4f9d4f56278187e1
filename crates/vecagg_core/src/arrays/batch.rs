use std::sync::Arc;

use vecagg_error::{DbError, Result};

use super::bitmap::Bitmap;
use super::column::Column;
use super::datatype::DataType;
use super::row::ScalarRow;
use super::scalar::ScalarValue;

/// Opaque storage page a raw row may live on.
#[derive(Debug)]
pub struct PinnedBuffer {
    id: u64,
}

/// A shared reference keeping a buffer pinned.
///
/// The pin is released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct BufferPin {
    buffer: Arc<PinnedBuffer>,
}

impl BufferPin {
    pub fn new(id: u64) -> Self {
        BufferPin {
            buffer: Arc::new(PinnedBuffer { id }),
        }
    }

    pub fn id(&self) -> u64 {
        self.buffer.id
    }

    /// Number of live references to the underlying buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.buffer)
    }

    fn same_buffer(&self, other: &BufferPin) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

/// Where an appended row comes from.
#[derive(Debug)]
pub enum RowSource<'a> {
    /// Fully deformed values, one per column.
    Values(&'a [ScalarValue]),
    /// A raw row whose attributes are deformed later in bulk. May be backed
    /// by pinned storage.
    Physical {
        row: ScalarRow,
        pin: Option<&'a BufferPin>,
    },
}

/// A fixed capacity batch of rows stored column by column.
///
/// Row slots with their skip bit set do not exist logically. A batch is
/// allocated once and reused through `clear`.
#[derive(Debug)]
pub struct Batch {
    columns: Vec<Column>,
    /// Set bits mark absent row slots.
    skip: Bitmap,
    /// Number of row slots appended since the last clear.
    num_rows: usize,
    /// Raw rows for slots appended through `RowSource::Physical`.
    backing_rows: Vec<Option<ScalarRow>>,
    /// Number of leading attributes deformed for every appended row.
    num_deformed: usize,
    /// Distinct consecutive pins held for the backing rows.
    pins: Vec<BufferPin>,
}

impl Batch {
    pub fn try_new(datatypes: impl IntoIterator<Item = DataType>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DbError::new("Batch capacity must be greater than zero"));
        }

        let columns: Vec<_> = datatypes
            .into_iter()
            .map(|dt| Column::new(dt, capacity))
            .collect();
        let num_deformed = columns.len();

        Ok(Batch {
            columns,
            skip: Bitmap::new_with_all_true(capacity),
            num_rows: 0,
            backing_rows: vec![None; capacity],
            num_deformed,
            pins: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.skip.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of row slots in use, skipped or not.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn datatypes(&self) -> impl Iterator<Item = DataType> + '_ {
        self.columns.iter().map(|c| c.datatype())
    }

    pub fn is_full(&self) -> bool {
        self.num_rows == self.capacity()
    }

    pub fn is_skipped(&self, row: usize) -> bool {
        row >= self.num_rows || self.skip.value(row)
    }

    pub fn set_skip(&mut self, row: usize, skip: bool) -> Result<()> {
        if row >= self.num_rows {
            return Err(DbError::new("Row index out of range for skip mask")
                .with_field("row", row)
                .with_field("num_rows", self.num_rows));
        }
        self.skip.set_unchecked(row, skip);
        Ok(())
    }

    /// Indices of row slots that exist logically.
    pub fn live_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.skip.index_iter(false, self.num_rows)
    }

    pub fn num_live_rows(&self) -> usize {
        self.live_rows().count()
    }

    /// A batch is empty when every slot is skipped.
    pub fn is_empty(&self) -> bool {
        self.live_rows().next().is_none()
    }

    pub fn num_pins(&self) -> usize {
        self.pins.len()
    }

    pub fn num_deformed(&self) -> usize {
        self.num_deformed
    }

    /// Append a row into the next free slot, returning the slot index.
    pub fn append(&mut self, source: RowSource<'_>) -> Result<usize> {
        if self.is_full() {
            return Err(DbError::capacity_exceeded("Batch is full")
                .with_field("capacity", self.capacity()));
        }
        let idx = self.num_rows;

        match source {
            RowSource::Values(values) => {
                if values.len() != self.columns.len() {
                    return Err(DbError::new("Row width does not match batch")
                        .with_field("row_width", values.len())
                        .with_field("num_columns", self.columns.len()));
                }
                for (col, value) in self.columns.iter_mut().zip(values) {
                    col.set_value(idx, value)?;
                }
                self.backing_rows[idx] = None;
            }
            RowSource::Physical { row, pin } => {
                if let Some(pin) = pin {
                    let same = self.pins.last().is_some_and(|last| last.same_buffer(pin));
                    if !same {
                        self.pins.push(pin.clone());
                    }
                }
                self.backing_rows[idx] = Some(row);
                self.num_deformed = 0;
            }
        }

        self.num_rows += 1;
        self.skip.set_unchecked(idx, false);
        for col in &mut self.columns {
            col.set_logical_len(self.num_rows)?;
        }

        Ok(idx)
    }

    /// Deform the first `natts` attributes of every backing row in a single
    /// sweep over the batch.
    ///
    /// Raw rows narrower than the batch read missing attributes as null.
    pub fn deform(&mut self, natts: usize) -> Result<()> {
        if natts > self.columns.len() {
            return Err(DbError::new("Requested more attributes than the batch has")
                .with_field("natts", natts)
                .with_field("num_columns", self.columns.len()));
        }
        if natts <= self.num_deformed {
            return Ok(());
        }

        for (row_idx, backing) in self.backing_rows[..self.num_rows].iter().enumerate() {
            let Some(row) = backing else {
                continue;
            };
            for attr in self.num_deformed..natts {
                self.columns[attr].set_value(row_idx, row.value(attr))?;
            }
        }
        self.num_deformed = natts;

        Ok(())
    }

    pub fn get_all_attrs(&mut self) -> Result<()> {
        self.deform(self.columns.len())
    }

    /// Deform up to and including `attr` across all appended rows and return
    /// the column.
    pub fn materialize_column(&mut self, attr: usize) -> Result<&Column> {
        self.deform(attr + 1)?;
        Ok(&self.columns[attr])
    }

    /// Assert the first `natts` attributes were already deformed in bulk.
    ///
    /// Readers inside the operator never trigger deformation themselves.
    pub fn require_attrs(&self, natts: usize) -> Result<()> {
        if natts > self.num_deformed {
            return Err(DbError::unsupported(
                "Batch attributes must be deformed in bulk before access",
            )
            .with_field("requested", natts)
            .with_field("deformed", self.num_deformed));
        }
        Ok(())
    }

    /// Get a deformed column.
    pub fn column(&self, attr: usize) -> Result<&Column> {
        self.require_attrs(attr + 1)?;
        Ok(&self.columns[attr])
    }

    pub fn get_value(&self, attr: usize, row: usize) -> Result<ScalarValue> {
        self.column(attr)?.get_value(row)
    }

    /// Copy out the full row at `row`.
    pub fn row(&self, row: usize) -> Result<ScalarRow> {
        self.require_attrs(self.columns.len())?;
        let columns = self
            .columns
            .iter()
            .map(|c| c.get_value(row))
            .collect::<Result<Vec<_>>>()?;
        Ok(ScalarRow { columns })
    }

    /// Mark every slot skipped, release pins and backing rows, and reset
    /// column lengths. Column storage is kept.
    pub fn clear(&mut self) {
        self.skip.reset(true);
        self.num_rows = 0;
        self.backing_rows.iter_mut().for_each(|r| *r = None);
        self.num_deformed = self.columns.len();
        self.pins.clear();
        for col in &mut self.columns {
            col.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::row::ScalarRow;

    fn int_batch(cap: usize) -> Batch {
        Batch::try_new([DataType::Int32, DataType::Utf8], cap).unwrap()
    }

    #[test]
    fn append_and_clear() {
        let mut batch = int_batch(4);
        assert!(batch.is_empty());

        let idx = batch
            .append(RowSource::Values(&[1.into(), "a".into()]))
            .unwrap();
        assert_eq!(0, idx);
        let idx = batch
            .append(RowSource::Values(&[2.into(), ScalarValue::Null]))
            .unwrap();
        assert_eq!(1, idx);

        assert_eq!(2, batch.num_live_rows());
        assert_eq!(ScalarValue::Null, batch.get_value(1, 1).unwrap());

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(0, batch.num_rows());
        assert_eq!(4, batch.capacity());
    }

    #[test]
    fn append_past_capacity() {
        let mut batch = int_batch(1);
        batch
            .append(RowSource::Values(&[1.into(), "a".into()]))
            .unwrap();
        let err = batch
            .append(RowSource::Values(&[2.into(), "b".into()]))
            .unwrap_err();
        assert_eq!(vecagg_error::ErrorKind::CapacityExceeded, err.kind());
    }

    #[test]
    fn skipped_rows_not_live() {
        let mut batch = int_batch(4);
        for i in 0..4 {
            batch
                .append(RowSource::Values(&[i.into(), "x".into()]))
                .unwrap();
        }
        batch.set_skip(1, true).unwrap();
        batch.set_skip(3, true).unwrap();

        let live: Vec<_> = batch.live_rows().collect();
        assert_eq!(vec![0, 2], live);
    }

    #[test]
    fn physical_rows_deform_in_bulk() {
        let mut batch = int_batch(4);
        batch
            .append(RowSource::Physical {
                row: ScalarRow::from_iter([ScalarValue::Int32(7), "q".into()]),
                pin: None,
            })
            .unwrap();
        // Narrow raw row, second attribute reads as null.
        batch
            .append(RowSource::Physical {
                row: ScalarRow::from_iter([ScalarValue::Int32(8)]),
                pin: None,
            })
            .unwrap();

        let err = batch.column(0).unwrap_err();
        assert_eq!(vecagg_error::ErrorKind::Unsupported, err.kind());

        let col = batch.materialize_column(0).unwrap();
        assert_eq!(ScalarValue::Int32(8), col.get_value(1).unwrap());
        // Only the first attribute is deformed so far.
        batch.column(1).unwrap_err();

        batch.get_all_attrs().unwrap();
        assert_eq!(ScalarValue::Null, batch.get_value(1, 1).unwrap());
        assert_eq!(ScalarValue::from("q"), batch.get_value(1, 0).unwrap());
    }

    #[test]
    fn consecutive_pins_deduplicated() {
        let pin_a = BufferPin::new(1);
        let pin_b = BufferPin::new(2);
        let mut batch = int_batch(8);

        for pin in [&pin_a, &pin_a, &pin_b, &pin_b, &pin_a] {
            batch
                .append(RowSource::Physical {
                    row: ScalarRow::from_iter([ScalarValue::Int32(1), "x".into()]),
                    pin: Some(pin),
                })
                .unwrap();
        }

        assert_eq!(3, batch.num_pins());
        assert_eq!(3, pin_a.ref_count());
        assert_eq!(2, pin_b.ref_count());

        batch.clear();
        assert_eq!(0, batch.num_pins());
        assert_eq!(1, pin_a.ref_count());
        assert_eq!(1, pin_b.ref_count());
    }
}
