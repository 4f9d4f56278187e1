use vecagg_error::Result;

use super::accumulator::TransitionState;
use super::plan::AggSplit;
use crate::arrays::datatype::DataType;
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;
use crate::expr::{HavingExpr, OutputExpr, ProjectionContext};
use crate::functions::aggregate::{FinalFn, FunctionHandle, SerializeFn};

/// Finalization info for one aggregate call.
#[derive(Debug, Clone)]
pub struct PerAggregate {
    pub name: &'static str,
    /// Transition state this aggregate reads.
    pub trans_idx: usize,
    pub finalize: Option<FunctionHandle<FinalFn>>,
    /// Set only when emitting serialized partial states.
    pub serialize: Option<FunctionHandle<SerializeFn>>,
    pub output_type: DataType,
}

impl PerAggregate {
    pub fn finalize(&self, split: AggSplit, state: &TransitionState) -> Result<ScalarValue> {
        if split.skip_final() {
            finalize_partial(self.serialize.as_ref(), state)
        } else {
            finalize_aggregate(self.finalize.as_ref(), state)
        }
    }
}

/// Apply the final function, or return the raw state if there is none.
pub fn finalize_aggregate(
    finalize: Option<&FunctionHandle<FinalFn>>,
    state: &TransitionState,
) -> Result<ScalarValue> {
    match finalize {
        Some(f) if f.strict && state.is_null => Ok(ScalarValue::Null),
        Some(f) => (f.func)(&state.value),
        None => Ok(state_value(state)),
    }
}

/// Produce a partial state, serialized if the aggregate needs it.
pub fn finalize_partial(
    serialize: Option<&FunctionHandle<SerializeFn>>,
    state: &TransitionState,
) -> Result<ScalarValue> {
    match serialize {
        Some(f) if f.strict && state.is_null => Ok(ScalarValue::Null),
        Some(f) => (f.func)(&state.value),
        None => Ok(state_value(state)),
    }
}

fn state_value(state: &TransitionState) -> ScalarValue {
    if state.is_null {
        ScalarValue::Null
    } else {
        state.value.clone()
    }
}

/// Null out every column grouped by some grouping set but not by the one
/// being projected.
pub fn prepare_projection(
    representative: &ScalarRow,
    grouped: &[usize],
    all_grouped_cols: &[usize],
) -> ScalarRow {
    let mut row = representative.clone();
    for &col in all_grouped_cols {
        if !grouped.contains(&col) {
            if let Some(v) = row.columns.get_mut(col) {
                *v = ScalarValue::Null;
            }
        }
    }
    row
}

/// Evaluate HAVING then the output expressions for one group.
///
/// Returns None when the group is filtered out.
pub fn project_group(
    projections: &[OutputExpr],
    having: Option<&HavingExpr>,
    cx: &ProjectionContext<'_>,
) -> Result<Option<Vec<ScalarValue>>> {
    if let Some(having) = having {
        if !having.qualifies(cx)? {
            return Ok(None);
        }
    }

    let values = projections
        .iter()
        .map(|expr| expr.eval(cx))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(values))
}
