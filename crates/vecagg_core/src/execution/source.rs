//! Input sources feeding an operator.

use vecagg_error::{DbError, Result};

use super::operators::PollPull;
use crate::arrays::batch::{Batch, BufferPin, RowSource};
use crate::arrays::datatype::DataType;
use crate::arrays::row::ScalarRow;

/// A child producing batches on demand.
pub trait BatchSource: std::fmt::Debug {
    fn datatypes(&self) -> &[DataType];

    /// Fill the cleared `output` with the next batch.
    ///
    /// Returns `Exhausted` once all input was produced, `output` is left empty
    /// in that case.
    fn next_batch(&mut self, output: &mut Batch) -> Result<PollPull>;

    /// Recheck a substituted batch. Returning false discards the batch.
    fn recheck(&mut self, _batch: &Batch) -> Result<bool> {
        Ok(true)
    }

    /// Restart from the beginning.
    fn rescan(&mut self) -> Result<()>;
}

/// Recheck predicate applied to a substituted batch.
pub type RecheckFn = fn(&Batch) -> bool;

/// How rows are appended by a [`MemorySource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFormat {
    /// Appended fully deformed.
    #[default]
    Values,
    /// Appended as raw rows, pinned per page and deformed in bulk once a
    /// batch is full.
    Physical { rows_per_page: usize },
}

/// Source over rows held in memory.
///
/// Each slot is emitted as one batch row. A `None` slot is emitted as a
/// skipped row.
#[derive(Debug)]
pub struct MemorySource {
    datatypes: Vec<DataType>,
    slots: Vec<Option<ScalarRow>>,
    format: RowFormat,
    pos: usize,
    /// Batch substituted ahead of the slots. Kept across rescans.
    substitute: Option<(Vec<ScalarRow>, RecheckFn)>,
    substitute_emitted: bool,
    /// Buffer pins taken by physical rows.
    pins: Vec<BufferPin>,
    num_rescans: usize,
    num_batches: usize,
}

impl MemorySource {
    pub fn new(datatypes: impl IntoIterator<Item = DataType>) -> Self {
        MemorySource {
            datatypes: datatypes.into_iter().collect(),
            slots: Vec::new(),
            format: RowFormat::Values,
            pos: 0,
            substitute: None,
            substitute_emitted: false,
            pins: Vec::new(),
            num_rescans: 0,
            num_batches: 0,
        }
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = ScalarRow>) -> Self {
        self.slots.extend(rows.into_iter().map(Some));
        self
    }

    /// Add slots where `None` is a skipped row.
    pub fn with_slots(mut self, slots: impl IntoIterator<Item = Option<ScalarRow>>) -> Self {
        self.slots.extend(slots);
        self
    }

    pub fn with_format(mut self, format: RowFormat) -> Self {
        self.format = format;
        self
    }

    /// Emit `rows` as a single batch before any other input, keeping only
    /// those rows passing `recheck`.
    pub fn with_substitute(mut self, rows: Vec<ScalarRow>, recheck: RecheckFn) -> Self {
        self.substitute = Some((rows, recheck));
        self
    }

    pub fn num_rescans(&self) -> usize {
        self.num_rescans
    }

    /// Number of batches produced since creation.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn check_width(&self, row: &ScalarRow) -> Result<()> {
        if row.width() != self.datatypes.len() {
            return Err(DbError::new("Row width does not match source")
                .with_field("row_width", row.width())
                .with_field("num_columns", self.datatypes.len()));
        }
        Ok(())
    }

    fn pin_for(&mut self, slot: usize, rows_per_page: usize) -> BufferPin {
        let page = (slot / rows_per_page.max(1)) as u64;
        if let Some(pin) = self.pins.iter().find(|p| p.id() == page) {
            return pin.clone();
        }
        let pin = BufferPin::new(page);
        self.pins.push(pin.clone());
        pin
    }
}

impl BatchSource for MemorySource {
    fn datatypes(&self) -> &[DataType] {
        &self.datatypes
    }

    fn next_batch(&mut self, output: &mut Batch) -> Result<PollPull> {
        if !self.substitute_emitted {
            self.substitute_emitted = true;
            if let Some((rows, _)) = &self.substitute {
                for row in rows {
                    output.append(RowSource::Values(&row.columns))?;
                }
            }
            if !output.is_empty() {
                if self.recheck(output)? {
                    self.num_batches += 1;
                    return Ok(PollPull::Computed);
                }
                output.clear();
            }
        }

        if self.pos >= self.slots.len() {
            return Ok(PollPull::Exhausted);
        }

        while self.pos < self.slots.len() && !output.is_full() {
            let slot = self.pos;
            self.pos += 1;

            let row = match &self.slots[slot] {
                Some(row) => row.clone(),
                None => {
                    // Emitted as a skipped slot with null contents.
                    let nulls = ScalarRow::all_null(self.datatypes.len());
                    let idx = output.append(RowSource::Values(&nulls.columns))?;
                    output.set_skip(idx, true)?;
                    continue;
                }
            };
            self.check_width(&row)?;

            match self.format {
                RowFormat::Values => {
                    output.append(RowSource::Values(&row.columns))?;
                }
                RowFormat::Physical { rows_per_page } => {
                    let pin = self.pin_for(slot, rows_per_page);
                    output.append(RowSource::Physical {
                        row,
                        pin: Some(&pin),
                    })?;
                }
            }
        }

        if matches!(self.format, RowFormat::Physical { .. }) {
            output.get_all_attrs()?;
        }

        self.num_batches += 1;
        Ok(PollPull::Computed)
    }

    fn recheck(&mut self, batch: &Batch) -> Result<bool> {
        Ok(self
            .substitute
            .as_ref()
            .is_none_or(|(_, recheck)| recheck(batch)))
    }

    fn rescan(&mut self) -> Result<()> {
        self.pos = 0;
        self.substitute_emitted = false;
        self.pins.clear();
        self.num_rescans += 1;
        Ok(())
    }
}
