use vecagg_error::{DbError, Result};

use super::expect_arity;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateFunction, FunctionHandle, Returned};

/// `count(*)`. Takes no arguments so strictness never skips a row.
pub fn count_star(inputs: &[DataType]) -> Result<AggregateFunction> {
    expect_arity("count_star", inputs, 0)?;
    Ok(counting("count_star", inputs))
}

/// `count(x)`. Strict, null values are not counted.
pub fn count(inputs: &[DataType]) -> Result<AggregateFunction> {
    expect_arity("count", inputs, 1)?;
    Ok(counting("count", inputs))
}

fn counting(name: &'static str, inputs: &[DataType]) -> AggregateFunction {
    AggregateFunction {
        name,
        input_types: inputs.to_vec(),
        trans_type: DataType::Int64,
        result_type: DataType::Int64,
        transition: FunctionHandle::strict("int8inc", int8inc),
        combine: Some(FunctionHandle::strict("int8pl", int8pl)),
        finalize: None,
        serialize: None,
        deserialize: None,
        init_value: Some(ScalarValue::Int64(0)),
    }
}

fn int8inc(state: &mut ScalarValue, _args: &[ScalarValue]) -> Result<Returned> {
    let count = state.try_as_i64()?;
    let count = count
        .checked_add(1)
        .ok_or_else(|| DbError::new("bigint out of range"))?;
    Ok(Returned::NewValue(ScalarValue::Int64(count)))
}

pub(crate) fn int8pl(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let a = state.try_as_i64()?;
    let b = args[0].try_as_i64()?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| DbError::new("bigint out of range"))?;
    Ok(Returned::NewValue(ScalarValue::Int64(sum)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments() {
        let mut state = ScalarValue::Int64(4);
        let ret = int8inc(&mut state, &[]).unwrap();
        assert_eq!(Returned::NewValue(ScalarValue::Int64(5)), ret);
    }

    #[test]
    fn arity_checked() {
        count(&[]).unwrap_err();
        count_star(&[DataType::Int32]).unwrap_err();
    }
}
