use vecagg_error::{DbError, Result, not_implemented};

use super::batch::Batch;
use super::row::ScalarRow;

/// The representations a slot may take.
///
/// The aggregation operator only ever exchanges `RowBatch` slots. The row
/// variants exist so that row-at-a-time operations have a well defined
/// failure on batches.
#[derive(Debug)]
pub enum TupleSlot {
    RowBatch(Batch),
    /// Values already broken out into columns.
    VirtualRow(ScalarRow),
    /// A raw row along with how many attributes were deformed so far.
    PhysicalRow { row: ScalarRow, num_deformed: usize },
}

impl TupleSlot {
    /// Ensure the first `natts` attributes are accessible.
    ///
    /// Batches must be deformed in bulk by whoever filled them.
    pub fn get_some_attrs(&mut self, natts: usize) -> Result<()> {
        match self {
            Self::RowBatch(batch) => batch.require_attrs(natts),
            Self::VirtualRow(row) => check_width(row, natts),
            Self::PhysicalRow { row, num_deformed } => {
                check_width(row, natts)?;
                *num_deformed = usize::max(*num_deformed, natts);
                Ok(())
            }
        }
    }

    /// Turn the slot into a self contained row.
    pub fn materialize(&mut self) -> Result<()> {
        match self {
            Self::RowBatch(_) => not_implemented!("materialize a batch slot"),
            Self::VirtualRow(_) => Ok(()),
            Self::PhysicalRow { row, .. } => {
                let row = std::mem::take(row);
                *self = Self::VirtualRow(row);
                Ok(())
            }
        }
    }

    /// Copy the contents of `other` into this slot.
    pub fn copy_from(&mut self, other: &TupleSlot) -> Result<()> {
        if matches!(self, Self::RowBatch(_)) {
            not_implemented!("copy into a batch slot")
        }
        match other {
            Self::RowBatch(_) => not_implemented!("copy a batch slot"),
            Self::VirtualRow(row) | Self::PhysicalRow { row, .. } => {
                *self = Self::VirtualRow(row.clone());
                Ok(())
            }
        }
    }

    /// Produce a reduced size physical row.
    pub fn to_minimal_row(&self) -> Result<ScalarRow> {
        match self {
            Self::RowBatch(_) => not_implemented!("minimal row from a batch slot"),
            Self::VirtualRow(row) | Self::PhysicalRow { row, .. } => Ok(row.clone()),
        }
    }

    pub fn try_as_batch(&self) -> Result<&Batch> {
        match self {
            Self::RowBatch(batch) => Ok(batch),
            _ => Err(DbError::new("Slot does not hold a batch")),
        }
    }

    pub fn try_as_batch_mut(&mut self) -> Result<&mut Batch> {
        match self {
            Self::RowBatch(batch) => Ok(batch),
            _ => Err(DbError::new("Slot does not hold a batch")),
        }
    }
}

fn check_width(row: &ScalarRow, natts: usize) -> Result<()> {
    if natts > row.width() {
        return Err(DbError::new("Requested attributes past end of row")
            .with_field("natts", natts)
            .with_field("width", row.width()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use vecagg_error::ErrorKind;

    use super::*;
    use crate::arrays::datatype::DataType;

    #[test]
    fn batch_slot_rejects_row_operations() {
        let batch = Batch::try_new([DataType::Int64], 4).unwrap();
        let mut slot = TupleSlot::RowBatch(batch);

        assert_eq!(ErrorKind::Unsupported, slot.materialize().unwrap_err().kind());
        assert_eq!(
            ErrorKind::Unsupported,
            slot.to_minimal_row().unwrap_err().kind()
        );
        let other = TupleSlot::VirtualRow(ScalarRow::from_iter([1i64]));
        assert_eq!(
            ErrorKind::Unsupported,
            slot.copy_from(&other).unwrap_err().kind()
        );
        // Nothing appended, every attribute counts as deformed.
        slot.get_some_attrs(1).unwrap();
        assert!(slot.try_as_batch().is_ok());
    }

    #[test]
    fn physical_row_materializes() {
        let mut slot = TupleSlot::PhysicalRow {
            row: ScalarRow::from_iter([1i64, 2]),
            num_deformed: 0,
        };
        slot.get_some_attrs(2).unwrap();
        slot.materialize().unwrap();
        assert_eq!(
            ScalarRow::from_iter([1i64, 2]),
            slot.to_minimal_row().unwrap()
        );
    }
}
