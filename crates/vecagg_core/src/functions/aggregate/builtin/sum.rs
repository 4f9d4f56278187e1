use num_traits::CheckedAdd;
use vecagg_error::{DbError, Result};

use super::{expect_arity, unsupported_input};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateFunction, FunctionHandle, Returned, TransitionFn};

pub fn sum(inputs: &[DataType]) -> Result<AggregateFunction> {
    expect_arity("sum", inputs, 1)?;

    let (transition, trans_type) = match inputs[0] {
        // Widening sum, the state type differs from the input so the first
        // value can't seed the state directly.
        DataType::Int32 => (
            FunctionHandle::non_strict("int4_sum", int4_sum as TransitionFn),
            DataType::Int64,
        ),
        DataType::Int64 => (FunctionHandle::strict("int8pl", int8pl as TransitionFn), DataType::Int64),
        DataType::Float64 => (
            FunctionHandle::strict("float8pl", float8pl as TransitionFn),
            DataType::Float64,
        ),
        _ => return Err(unsupported_input("sum", inputs)),
    };

    let combine = match trans_type {
        DataType::Float64 => FunctionHandle::strict("float8pl", float8pl as TransitionFn),
        _ => FunctionHandle::strict("int8pl", int8pl as TransitionFn),
    };

    Ok(AggregateFunction {
        name: "sum",
        input_types: inputs.to_vec(),
        trans_type,
        result_type: trans_type,
        transition,
        combine: Some(combine),
        finalize: None,
        serialize: None,
        deserialize: None,
        init_value: None,
    })
}

fn checked_add<T: CheckedAdd>(a: T, b: T) -> Result<T> {
    a.checked_add(&b)
        .ok_or_else(|| DbError::new("Sum out of range"))
}

fn int4_sum(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    if args[0].is_null() {
        return Ok(Returned::SameHandle);
    }
    let v = args[0].try_as_i64()?;
    if state.is_null() {
        return Ok(Returned::NewValue(ScalarValue::Int64(v)));
    }
    let sum = checked_add(state.try_as_i64()?, v)?;
    Ok(Returned::NewValue(ScalarValue::Int64(sum)))
}

fn int8pl(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let sum = checked_add(state.try_as_i64()?, args[0].try_as_i64()?)?;
    Ok(Returned::NewValue(ScalarValue::Int64(sum)))
}

fn float8pl(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let sum = state.try_as_f64()? + args[0].try_as_f64()?;
    Ok(Returned::NewValue(ScalarValue::Float64(sum)))
}
