use std::cmp::Ordering;

use vecagg_error::Result;

use super::{expect_arity, unsupported_input};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateFunction, FunctionHandle, Returned, TransitionFn};

pub fn min(inputs: &[DataType]) -> Result<AggregateFunction> {
    min_max("min", inputs, FunctionHandle::strict("smaller", smaller))
}

pub fn max(inputs: &[DataType]) -> Result<AggregateFunction> {
    min_max("max", inputs, FunctionHandle::strict("larger", larger))
}

/// Both are strict with no initial value, the first non-null input becomes
/// the state.
fn min_max(
    name: &'static str,
    inputs: &[DataType],
    func: FunctionHandle<TransitionFn>,
) -> Result<AggregateFunction> {
    expect_arity(name, inputs, 1)?;
    let datatype = inputs[0];
    if datatype == DataType::Internal {
        return Err(unsupported_input(name, inputs));
    }

    Ok(AggregateFunction {
        name,
        input_types: inputs.to_vec(),
        trans_type: datatype,
        result_type: datatype,
        transition: func,
        combine: Some(func),
        finalize: None,
        serialize: None,
        deserialize: None,
        init_value: None,
    })
}

fn replace_if(state: &ScalarValue, candidate: &ScalarValue, want: Ordering) -> Returned {
    if candidate.compare_for_sort(state) == want {
        Returned::NewValue(candidate.clone())
    } else {
        Returned::SameHandle
    }
}

fn smaller(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    Ok(replace_if(state, &args[0], Ordering::Less))
}

fn larger(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    Ok(replace_if(state, &args[0], Ordering::Greater))
}
