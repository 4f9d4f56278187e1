use vecagg_error::Result;

use super::{expect_arity, unsupported_input};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateFunction, FunctionHandle, Returned, TransitionFn};

pub fn bool_and(inputs: &[DataType]) -> Result<AggregateFunction> {
    boolean("bool_and", inputs, FunctionHandle::strict("booland_statefunc", and))
}

pub fn bool_or(inputs: &[DataType]) -> Result<AggregateFunction> {
    boolean("bool_or", inputs, FunctionHandle::strict("boolor_statefunc", or))
}

fn boolean(
    name: &'static str,
    inputs: &[DataType],
    func: FunctionHandle<TransitionFn>,
) -> Result<AggregateFunction> {
    expect_arity(name, inputs, 1)?;
    if inputs[0] != DataType::Boolean {
        return Err(unsupported_input(name, inputs));
    }

    Ok(AggregateFunction {
        name,
        input_types: inputs.to_vec(),
        trans_type: DataType::Boolean,
        result_type: DataType::Boolean,
        transition: func,
        combine: Some(func),
        finalize: None,
        serialize: None,
        deserialize: None,
        init_value: None,
    })
}

fn and(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let v = state.try_as_bool()? && args[0].try_as_bool()?;
    Ok(Returned::NewValue(v.into()))
}

fn or(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let v = state.try_as_bool()? || args[0].try_as_bool()?;
    Ok(Returned::NewValue(v.into()))
}
