//! Application of transition and combine functions to accumulators.

use vecagg_error::Result;

use super::accumulator::{AccumulatorArray, MemoryScope, TransitionState};
use crate::arrays::batch::Batch;
use crate::arrays::datatype::DataType;
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::sort::SortKey;
use crate::functions::aggregate::{DeserializeFn, FunctionHandle, Returned, TransitionFn};

/// Sort requirements for a DISTINCT or ORDER BY aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedInput {
    /// Input columns making up a buffered tuple. The transition arguments
    /// come first, followed by ORDER BY columns that aren't arguments.
    pub tuple_columns: Vec<usize>,
    /// Sort keys, columns index into the buffered tuple.
    pub keys: Vec<SortKey>,
    /// Leading tuple columns passed to the transition function.
    pub num_args: usize,
    pub distinct: bool,
}

impl OrderedInput {
    pub fn is_single_input(&self) -> bool {
        self.tuple_columns.len() == 1
    }
}

/// Resolved transition for one aggregate-sharing group.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    /// Name of the aggregate this transition was first created for.
    pub aggregate: &'static str,
    /// Transition function, or the combine function when combining partial
    /// states.
    pub func: FunctionHandle<TransitionFn>,
    /// Applied to the partial state argument before combining.
    pub deserialize: Option<FunctionHandle<DeserializeFn>>,
    pub init_value: Option<ScalarValue>,
    pub trans_type: DataType,
    pub by_value: bool,
    /// Input columns passed as arguments.
    pub arg_columns: Vec<usize>,
    pub ordered: Option<OrderedInput>,
}

impl TransitionInfo {
    /// Read this transition's arguments for one row.
    fn read_args(&self, batch: &Batch, row: usize, args: &mut Vec<ScalarValue>) -> Result<()> {
        args.clear();
        for &col in &self.arg_columns {
            args.push(batch.get_value(col, row)?);
        }

        if let Some(deserialize) = &self.deserialize {
            if let Some(partial) = args.first_mut() {
                if !(deserialize.strict && partial.is_null()) {
                    *partial = (deserialize.func)(partial)?;
                }
            }
        }

        Ok(())
    }

    fn read_tuple(&self, ordered: &OrderedInput, batch: &Batch, row: usize) -> Result<ScalarRow> {
        let columns = ordered
            .tuple_columns
            .iter()
            .map(|&col| batch.get_value(col, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(ScalarRow { columns })
    }
}

/// Apply one transition to a single state.
///
/// Strict functions are skipped when any argument is null, and a strict
/// function without a prior value is seeded with the first argument instead
/// of being called. Non-strict functions are always called and decide for
/// themselves how nulls affect the state.
pub fn advance_transition(
    info: &TransitionInfo,
    state: &mut TransitionState,
    args: &[ScalarValue],
    scope: &mut MemoryScope,
) -> Result<()> {
    if info.func.strict {
        if args.iter().any(|arg| arg.is_null()) {
            return Ok(());
        }
        if !state.has_value {
            if let Some(first) = args.first() {
                let value = first.clone();
                if !info.by_value {
                    scope.adopt(&value);
                }
                state.value = value;
                state.is_null = false;
                state.has_value = true;
                return Ok(());
            }
        }
        if state.is_null && state.has_value {
            // A strict function can't advance a null state.
            return Ok(());
        }
    }

    let before = if info.by_value {
        0
    } else {
        state.value.heap_size()
    };

    let returned = (info.func.func)(&mut state.value, args)?;
    state.has_value = true;

    match returned {
        Returned::SameHandle => {
            if !info.by_value && !state.is_null {
                scope.resize(before, state.value.heap_size());
            }
        }
        Returned::NewValue(value) => {
            if !info.by_value {
                if !state.is_null {
                    scope.release(&state.value);
                }
                if !value.is_null() {
                    scope.adopt(&value);
                }
            }
            state.is_null = value.is_null();
            state.value = value;
        }
    }

    Ok(())
}

/// Advance every transition in `accums` with one row of `batch`.
///
/// Ordered transitions buffer the row instead.
pub fn advance_row(
    transitions: &[TransitionInfo],
    accums: &mut AccumulatorArray,
    scope: &mut MemoryScope,
    batch: &Batch,
    row: usize,
    args: &mut Vec<ScalarValue>,
) -> Result<()> {
    for (idx, info) in transitions.iter().enumerate() {
        match &info.ordered {
            Some(ordered) => {
                let tuple = info.read_tuple(ordered, batch, row)?;
                accums.ordered_inputs[idx].push(tuple);
            }
            None => {
                info.read_args(batch, row, args)?;
                advance_transition(info, &mut accums.states[idx], args, scope)?;
            }
        }
    }
    Ok(())
}

/// Advance every transition in `accums` with the given rows.
///
/// `rows` must only contain live slots, skipped slots are never read.
pub fn advance_rows(
    transitions: &[TransitionInfo],
    accums: &mut AccumulatorArray,
    scope: &mut MemoryScope,
    batch: &Batch,
    rows: &[usize],
) -> Result<()> {
    let mut args = Vec::new();
    for &row in rows {
        advance_row(transitions, accums, scope, batch, row, &mut args)?;
    }
    Ok(())
}
