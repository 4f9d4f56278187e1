//! Batch aggregation operator.
//!
//! Sorted and plain grouping walk the input row by row, detecting group
//! boundaries against the first row of the current group and emitting one
//! output row per call. Grouping sets that are prefixes of each other are
//! evaluated in a single pass, each with its own accumulators, resetting only
//! the more specific sets at a boundary. Sets needing a different input order
//! are evaluated in later phases fed by resorting the input.
//!
//! Hashed grouping reads all input into one hash table per grouping set
//! before emitting full output batches. In mixed mode the hash tables are
//! filled during the first sorted phase and drained once every sorted phase
//! is done.

pub mod accumulator;
pub mod finalize;
pub mod hash_table;
pub mod ordered;
pub mod phase;
pub mod plan;
pub mod transition;

use accumulator::{AccumulatorArray, MemoryScope};
use finalize::{prepare_projection, project_group};
use hash_table::GroupingHashTable;
use ordered::process_ordered;
use phase::{AggStrategy, ResortBuffer, SortedInput};
use plan::{AggregatePlan, CompiledPlan};
use tracing::{debug, trace};
use transition::advance_row;
use vecagg_error::{DbError, OptionExt, Result};

use super::PollPull;
use crate::arrays::batch::{Batch, RowSource};
use crate::arrays::datatype::DataType;
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::slot::TupleSlot;
use crate::config::ExecutionConfig;
use crate::execution::interrupt::InterruptHandle;
use crate::execution::source::BatchSource;
use crate::expr::ProjectionContext;

/// Accumulators for one grouping set of the current sorted phase.
#[derive(Debug)]
struct SetAccumulator {
    accums: AccumulatorArray,
    scope: MemoryScope,
}

#[derive(Debug)]
pub struct PhysicalAggregate {
    plan: CompiledPlan,
    source: Box<dyn BatchSource>,
    interrupt: InterruptHandle,
    batch_size: usize,
    hash_table_capacity: usize,
    /// Leading input attributes read by the operator.
    required_attrs: usize,

    /// Current input batch.
    input: TupleSlot,
    /// Next slot of the input batch to read.
    input_pos: usize,
    /// If any input was fetched since the last reset.
    fetched_input: bool,
    /// Resorted input for the current phase. None reads from the source.
    sort_in: Option<SortedInput>,
    /// Rows collected for the next phase.
    sort_out: Option<ResortBuffer>,

    current_phase: usize,
    /// Grouping set projected last in the current phase.
    projected_set: Option<usize>,
    input_done: bool,
    agg_done: bool,
    /// Input slot holding the first row of the next group.
    pending: Option<usize>,
    /// First row of the current group.
    representative: ScalarRow,
    /// Indexed by grouping set within the current sorted phase.
    set_accums: Vec<SetAccumulator>,

    /// One table per hashed grouping set.
    hash_tables: Vec<GroupingHashTable>,
    table_filled: bool,
    /// Next (table, entry) to emit.
    hash_cursor: (usize, usize),

    output: Option<Batch>,
    args: Vec<ScalarValue>,
}

impl PhysicalAggregate {
    /// Build the operator, validating the plan against the source.
    pub fn try_new(
        plan: &AggregatePlan,
        source: Box<dyn BatchSource>,
        config: &ExecutionConfig,
    ) -> Result<Self> {
        let plan = plan.compile()?;

        if source.datatypes() != plan.input_types.as_slice() {
            return Err(DbError::invalid_definition(
                "Source types do not match aggregate input types",
            )
            .with_field("source", format!("{:?}", source.datatypes()))
            .with_field("plan", format!("{:?}", plan.input_types)));
        }

        let required_attrs = required_attrs(&plan);
        let input = Batch::try_new(plan.input_types.iter().copied(), config.batch_size)?;

        let max_sets = plan.phases[1..]
            .iter()
            .map(|p| p.num_sets())
            .max()
            .unwrap_or(0);
        let mut set_accums = Vec::with_capacity(max_sets);
        for _ in 0..max_sets {
            let mut scope = MemoryScope::new();
            let accums = AccumulatorArray::new(&plan.transitions, &mut scope);
            set_accums.push(SetAccumulator { accums, scope });
        }

        debug!(
            strategy = ?plan.strategy,
            split = ?plan.split,
            num_phases = plan.num_phases(),
            num_transitions = plan.transitions.len(),
            num_aggregates = plan.aggregates.len(),
            batch_size = config.batch_size,
            "building aggregate operator"
        );

        let mut op = PhysicalAggregate {
            plan,
            source,
            interrupt: InterruptHandle::new(),
            batch_size: config.batch_size,
            hash_table_capacity: config.hash_table_initial_capacity,
            required_attrs,
            input: TupleSlot::RowBatch(input),
            input_pos: 0,
            fetched_input: false,
            sort_in: None,
            sort_out: None,
            current_phase: 0,
            projected_set: None,
            input_done: false,
            agg_done: false,
            pending: None,
            representative: ScalarRow::default(),
            set_accums,
            hash_tables: Vec::new(),
            table_filled: false,
            hash_cursor: (0, 0),
            output: None,
            args: Vec::new(),
        };

        op.build_hash_tables();
        if op.plan.strategy == AggStrategy::Hashed {
            op.initialize_phase(0)?;
        } else {
            op.initialize_phase(1)?;
        }

        Ok(op)
    }

    pub fn output_types(&self) -> &[DataType] {
        &self.plan.output_types
    }

    pub fn strategy(&self) -> AggStrategy {
        self.plan.strategy
    }

    /// Handle for interrupting this operator from elsewhere.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn hash_tables(&self) -> &[GroupingHashTable] {
        &self.hash_tables
    }

    /// Pull the next output batch, allocated once and reused across calls.
    ///
    /// Returns None once all output was produced.
    pub fn next_output_batch(&mut self) -> Result<Option<&Batch>> {
        let mut output = match self.output.take() {
            Some(batch) => batch,
            None => Batch::try_new(self.plan.output_types.iter().copied(), self.batch_size)?,
        };
        let poll = self.poll_pull(&mut output);
        let output = &*self.output.insert(output);

        match poll? {
            PollPull::Computed => Ok(Some(output)),
            PollPull::Exhausted => Ok(None),
        }
    }

    /// Produce the next output into `output`.
    ///
    /// Sorted and plain grouping write a single row. Hashed retrieval fills
    /// the batch up to its capacity.
    pub fn poll_pull(&mut self, output: &mut Batch) -> Result<PollPull> {
        if output.num_columns() != self.plan.output_types.len() {
            return Err(DbError::new("Output batch has wrong number of columns")
                .with_field("expected", self.plan.output_types.len())
                .with_field("got", output.num_columns()));
        }
        output.clear();

        if self.current_phase == 0 {
            if !self.table_filled {
                self.fill_hash_tables()?;
            }
            return self.retrieve_hash_tables(output);
        }

        self.retrieve_direct(output)
    }

    /// Restart the operator.
    ///
    /// Filled hash tables are reused when only hashing is done and nothing
    /// they depend on changed.
    pub fn rescan(&mut self, params_changed: bool) -> Result<()> {
        if self.plan.strategy == AggStrategy::Hashed {
            if !self.table_filled && !self.fetched_input {
                trace!("rescan before any input was read");
                return Ok(());
            }
            if self.table_filled && !params_changed {
                debug!("rewinding hash table retrieval");
                self.hash_cursor = (0, 0);
                return Ok(());
            }
        }

        debug!(params_changed, "rescanning aggregate");

        self.sort_in = None;
        self.sort_out = None;
        self.agg_done = false;
        self.input_done = false;
        self.projected_set = None;
        self.pending = None;
        self.fetched_input = false;
        self.input_pos = 0;
        self.input.try_as_batch_mut()?.clear();

        for set in &mut self.set_accums {
            set.scope.reset();
            set.accums.reset(&self.plan.transitions, &mut set.scope);
        }

        self.table_filled = false;
        self.build_hash_tables();

        if self.plan.strategy == AggStrategy::Hashed {
            self.initialize_phase(0)?;
        } else {
            self.initialize_phase(1)?;
        }

        self.source.rescan()
    }

    fn build_hash_tables(&mut self) {
        self.hash_tables = self
            .plan
            .hash_columns
            .iter()
            .map(|cols| GroupingHashTable::new(cols.clone(), self.hash_table_capacity))
            .collect();
        self.hash_cursor = (0, 0);
    }

    /// Switch to a new phase, turning the rows collected during the previous
    /// phase into this phase's input.
    fn initialize_phase(&mut self, phase: usize) -> Result<()> {
        self.sort_in = None;

        if phase <= 1 {
            self.sort_out = None;
        } else {
            let collected = self.sort_out.take().required("rows collected for resort")?;
            trace!(phase, rows = collected.len(), "sorting input for phase");
            self.sort_in = Some(collected.finish());
        }

        if phase > 0 && phase + 1 < self.plan.num_phases() {
            self.sort_out = Some(ResortBuffer::new(self.plan.phases[phase + 1].sort_keys()));
        }

        self.current_phase = phase;
        debug!(phase, "initialized aggregate phase");

        Ok(())
    }

    fn num_sets(&self) -> usize {
        usize::max(self.plan.phases[self.current_phase].num_sets(), 1)
    }

    /// Reset accumulators of the first `num_reset` grouping sets.
    fn initialize_aggregates(&mut self, num_reset: usize) {
        for set in self.set_accums.iter_mut().take(num_reset) {
            set.scope.reset();
            set.accums.reset(&self.plan.transitions, &mut set.scope);
        }
    }

    /// Load the next input batch. Returns false when input is exhausted.
    fn fetch_input_batch(&mut self) -> Result<bool> {
        self.interrupt.check()?;

        let batch = self.input.try_as_batch_mut()?;
        batch.clear();
        self.input_pos = 0;

        let has_rows = match &mut self.sort_in {
            Some(sorted) => sorted.fill(batch)?,
            None => matches!(self.source.next_batch(batch)?, PollPull::Computed),
        };
        if !has_rows {
            return Ok(false);
        }
        self.fetched_input = true;

        // Attributes are deformed in bulk by whoever filled the batch.
        self.input.get_some_attrs(self.required_attrs)?;
        let batch = self.input.try_as_batch()?;

        if let Some(sort_out) = &mut self.sort_out {
            for row in batch.live_rows() {
                sort_out.push(batch.row(row)?);
            }
        }

        if self.plan.strategy == AggStrategy::Mixed && self.current_phase == 1 {
            for table in &mut self.hash_tables {
                let groups = table.lookup_batch(batch, &self.plan.transitions)?;
                table.advance_batch(&groups, &self.plan.transitions, batch)?;
            }
        }

        Ok(true)
    }

    /// Next live input slot, loading batches as needed.
    fn next_live_row(&mut self) -> Result<Option<usize>> {
        loop {
            let batch = self.input.try_as_batch()?;
            while self.input_pos < batch.num_rows() {
                let slot = self.input_pos;
                self.input_pos += 1;
                if !batch.is_skipped(slot) {
                    return Ok(Some(slot));
                }
            }

            if !self.fetch_input_batch()? {
                return Ok(None);
            }
        }
    }

    /// Advance every grouping set of the current phase with one input row.
    fn advance_sets(&mut self, slot: usize) -> Result<()> {
        let num_sets = self.num_sets();
        let batch = self.input.try_as_batch()?;
        for set in self.set_accums.iter_mut().take(num_sets) {
            advance_row(
                &self.plan.transitions,
                &mut set.accums,
                &mut set.scope,
                batch,
                slot,
                &mut self.args,
            )?;
        }
        Ok(())
    }

    /// Consume input rows belonging to the group starting at `first`.
    ///
    /// Stops at the first row of the next group, or at end of input.
    fn consume_group(&mut self, first: usize) -> Result<()> {
        let phase = &self.plan.phases[self.current_phase];
        let strategy = phase.strategy;
        let has_grouping_sets = phase.has_grouping_sets;
        let num_cols = phase.group_columns().len();

        let mut slot = first;
        loop {
            self.advance_sets(slot)?;

            let Some(next) = self.next_live_row()? else {
                if has_grouping_sets {
                    self.input_done = true;
                } else {
                    self.agg_done = true;
                }
                return Ok(());
            };

            if strategy != AggStrategy::Plain && num_cols > 0 {
                let phase = &self.plan.phases[self.current_phase];
                let batch = self.input.try_as_batch()?;
                if !phase.batch_row_matches(batch, next, &self.representative, num_cols)? {
                    self.pending = Some(next);
                    return Ok(());
                }
            }

            slot = next;
        }
    }

    /// If the pending row differs from the current group on the first
    /// `ncols` grouping columns.
    fn pending_crosses_boundary(&self, ncols: usize) -> Result<bool> {
        let pending = self.pending.required("pending row at grouping set boundary")?;
        let phase = &self.plan.phases[self.current_phase];
        let matches = phase.batch_row_matches(
            self.input.try_as_batch()?,
            pending,
            &self.representative,
            ncols,
        )?;
        Ok(!matches)
    }

    /// Sorted and plain retrieval, producing at most one row.
    fn retrieve_direct(&mut self, output: &mut Batch) -> Result<PollPull> {
        while !self.agg_done {
            let mut num_sets = self.num_sets();
            let mut num_reset = match self.projected_set {
                Some(set) if set < num_sets => set + 1,
                _ => num_sets,
            };

            if self.input_done && self.projected_set.is_some_and(|set| set + 1 >= num_sets) {
                if self.current_phase + 1 < self.plan.num_phases() {
                    self.initialize_phase(self.current_phase + 1)?;
                    self.input_done = false;
                    self.projected_set = None;
                    num_sets = self.num_sets();
                    num_reset = num_sets;
                } else if self.plan.strategy == AggStrategy::Mixed {
                    self.initialize_phase(0)?;
                    self.table_filled = true;
                    self.hash_cursor = (0, 0);
                    debug!(
                        num_tables = self.hash_tables.len(),
                        "sorted phases done, switching to hash table retrieval"
                    );
                    return self.retrieve_hash_tables(output);
                } else {
                    self.agg_done = true;
                    break;
                }
            }

            let phase = &self.plan.phases[self.current_phase];
            let strategy = phase.strategy;
            let has_grouping_sets = phase.has_grouping_sets;
            let next_set_size = match self.projected_set {
                Some(set) if set + 1 < num_sets => phase.set_len(set + 1),
                _ => 0,
            };

            // Project the next grouping set for the same group when the
            // pending row still belongs to it.
            let next_set = self.input_done
                || (strategy != AggStrategy::Plain
                    && self.projected_set.is_some_and(|set| set + 1 < num_sets)
                    && next_set_size > 0
                    && self.pending_crosses_boundary(next_set_size)?);

            if next_set {
                self.projected_set = Some(self.projected_set.map_or(0, |set| set + 1));
            } else {
                self.projected_set = Some(0);

                if self.pending.is_none() {
                    match self.next_live_row()? {
                        Some(slot) => self.pending = Some(slot),
                        None if has_grouping_sets => {
                            // No input at all. Only empty grouping sets
                            // produce a row.
                            self.input_done = true;
                            let phase = &self.plan.phases[self.current_phase];
                            let mut set = 0;
                            while set < num_sets && phase.set_len(set) > 0 {
                                set += 1;
                            }
                            self.projected_set = Some(set);
                            if set >= num_sets {
                                continue;
                            }
                        }
                        None => {
                            self.agg_done = true;
                            if strategy != AggStrategy::Plain {
                                return Ok(PollPull::Exhausted);
                            }
                        }
                    }
                }

                self.initialize_aggregates(num_reset);

                match self.pending.take() {
                    Some(first) => {
                        self.representative = self.input.try_as_batch()?.row(first)?;
                        self.consume_group(first)?;
                    }
                    None => {
                        self.representative = ScalarRow::all_null(self.plan.input_types.len());
                    }
                }
            }

            let set = self.projected_set.required("projected grouping set")?;
            if let Some(row) = self.finalize_set(set)? {
                output.append(RowSource::Values(&row))?;
                return Ok(PollPull::Computed);
            }
        }

        Ok(PollPull::Exhausted)
    }

    /// Finalize and project the current group for one grouping set.
    fn finalize_set(&mut self, set: usize) -> Result<Option<Vec<ScalarValue>>> {
        let plan = &self.plan;
        let grouped = plan.phases[self.current_phase].grouping_set(set);
        let representative =
            prepare_projection(&self.representative, grouped, &plan.all_grouped_cols);

        let set_accum = self
            .set_accums
            .get_mut(set)
            .ok_or_else(|| DbError::new("Missing accumulators for grouping set").with_field("set", set))?;

        for (idx, info) in plan.transitions.iter().enumerate() {
            if let Some(ordered) = &info.ordered {
                process_ordered(
                    info,
                    ordered,
                    &mut set_accum.accums.states[idx],
                    &mut set_accum.accums.ordered_inputs[idx],
                    &mut set_accum.scope,
                )?;
            }
        }

        let aggregates = plan
            .aggregates
            .iter()
            .map(|agg| agg.finalize(plan.split, &set_accum.accums.states[agg.trans_idx]))
            .collect::<Result<Vec<_>>>()?;

        let cx = ProjectionContext {
            representative: &representative,
            aggregates: &aggregates,
            grouped_columns: grouped,
        };
        let row = project_group(&plan.projections, plan.having.as_ref(), &cx)?;
        if row.is_none() {
            trace!(set, "group filtered by having");
        }

        Ok(row)
    }

    /// Read all input into the hash tables.
    fn fill_hash_tables(&mut self) -> Result<()> {
        while self.fetch_input_batch()? {
            let batch = self.input.try_as_batch()?;
            for table in &mut self.hash_tables {
                let groups = table.lookup_batch(batch, &self.plan.transitions)?;
                table.advance_batch(&groups, &self.plan.transitions, batch)?;
            }
        }

        self.table_filled = true;
        self.hash_cursor = (0, 0);
        debug!(
            num_tables = self.hash_tables.len(),
            num_groups = self.hash_tables.iter().map(|t| t.num_groups()).sum::<usize>(),
            "filled hash tables"
        );

        Ok(())
    }

    /// Emit finalized hash table entries until `output` is full.
    fn retrieve_hash_tables(&mut self, output: &mut Batch) -> Result<PollPull> {
        let plan = &self.plan;
        let width = plan.input_types.len();
        let phase = &plan.phases[0];

        while !output.is_full() {
            let (table_idx, entry_idx) = self.hash_cursor;
            let Some(table) = self.hash_tables.get(table_idx) else {
                break;
            };
            if entry_idx >= table.num_groups() {
                self.hash_cursor = (table_idx + 1, 0);
                continue;
            }
            self.hash_cursor = (table_idx, entry_idx + 1);

            let grouped = phase.grouping_set(table_idx);
            let representative = prepare_projection(
                &table.representative(entry_idx, width)?,
                grouped,
                &plan.all_grouped_cols,
            );
            let entry = table
                .entry(entry_idx)
                .required("hash table entry")?;

            let aggregates = plan
                .aggregates
                .iter()
                .map(|agg| agg.finalize(plan.split, &entry.accumulators.states[agg.trans_idx]))
                .collect::<Result<Vec<_>>>()?;

            let cx = ProjectionContext {
                representative: &representative,
                aggregates: &aggregates,
                grouped_columns: grouped,
            };
            if let Some(row) = project_group(&plan.projections, plan.having.as_ref(), &cx)? {
                output.append(RowSource::Values(&row))?;
            }
        }

        if output.num_rows() == 0 {
            return Ok(PollPull::Exhausted);
        }
        Ok(PollPull::Computed)
    }
}

/// Number of leading input attributes that must be deformed before the
/// operator reads a batch.
///
/// Sorted phases copy whole rows. Pure hashing only reads retained and
/// argument columns.
fn required_attrs(plan: &CompiledPlan) -> usize {
    if plan.strategy != AggStrategy::Hashed {
        return plan.input_types.len();
    }

    let hashed = plan
        .hash_columns
        .iter()
        .filter_map(|cols| cols.largest_column());
    let args = plan.transitions.iter().flat_map(|t| {
        t.arg_columns
            .iter()
            .chain(t.ordered.iter().flat_map(|o| o.tuple_columns.iter()))
            .copied()
    });

    hashed.chain(args).max().map(|col| col + 1).unwrap_or(0)
}
