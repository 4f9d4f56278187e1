use vecagg_error::{DbError, Result};

use super::{expect_arity, unsupported_input};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateFunction, FunctionHandle, Returned};

/// `avg(x)` over numeric input.
///
/// The state is an internal `{sum, count}` pair created on the first non-null
/// input and then updated in place.
pub fn avg(inputs: &[DataType]) -> Result<AggregateFunction> {
    expect_arity("avg", inputs, 1)?;
    if !inputs[0].is_numeric() {
        return Err(unsupported_input("avg", inputs));
    }

    Ok(AggregateFunction {
        name: "avg",
        input_types: inputs.to_vec(),
        trans_type: DataType::Internal,
        result_type: DataType::Float64,
        transition: FunctionHandle::non_strict("numeric_avg_accum", avg_accum),
        combine: Some(FunctionHandle::non_strict("numeric_avg_combine", avg_combine)),
        finalize: Some(FunctionHandle::strict("numeric_avg", avg_final)),
        serialize: Some(FunctionHandle::strict("numeric_avg_serialize", avg_serialize)),
        deserialize: Some(FunctionHandle::strict(
            "numeric_avg_deserialize",
            avg_deserialize,
        )),
        init_value: None,
    })
}

fn state_parts(state: &mut ScalarValue) -> Result<(&mut f64, &mut i64)> {
    match state {
        ScalarValue::Struct(fields) => match fields.as_mut_slice() {
            [ScalarValue::Float64(sum), ScalarValue::Int64(count)] => Ok((sum, count)),
            _ => Err(DbError::new("Malformed avg state")),
        },
        _ => Err(DbError::new("Avg state not initialized")),
    }
}

fn new_state(sum: f64, count: i64) -> ScalarValue {
    ScalarValue::Struct(vec![ScalarValue::Float64(sum), ScalarValue::Int64(count)])
}

fn avg_accum(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    if args[0].is_null() {
        return Ok(Returned::SameHandle);
    }
    let v = args[0].try_as_f64()?;
    if state.is_null() {
        return Ok(Returned::NewValue(new_state(v, 1)));
    }

    let (sum, count) = state_parts(state)?;
    *sum += v;
    *count += 1;
    Ok(Returned::SameHandle)
}

fn avg_combine(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let mut other = args[0].clone();
    if other.is_null() {
        return Ok(Returned::SameHandle);
    }
    if state.is_null() {
        return Ok(Returned::NewValue(other));
    }

    let (other_sum, other_count) = state_parts(&mut other)?;
    let (sum, count) = state_parts(state)?;
    *sum += *other_sum;
    *count += *other_count;
    Ok(Returned::SameHandle)
}

fn avg_final(state: &ScalarValue) -> Result<ScalarValue> {
    let mut state = state.clone();
    let (sum, count) = state_parts(&mut state)?;
    if *count == 0 {
        return Ok(ScalarValue::Null);
    }
    Ok(ScalarValue::Float64(*sum / *count as f64))
}

fn avg_serialize(state: &ScalarValue) -> Result<ScalarValue> {
    let mut state = state.clone();
    let (sum, count) = state_parts(&mut state)?;
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&sum.to_le_bytes());
    buf.extend_from_slice(&count.to_le_bytes());
    Ok(ScalarValue::Binary(buf))
}

fn avg_deserialize(serialized: &ScalarValue) -> Result<ScalarValue> {
    let buf = match serialized {
        ScalarValue::Binary(buf) if buf.len() == 16 => buf,
        other => {
            return Err(DbError::new("Invalid serialized avg state").with_field("value", other));
        }
    };
    let mut sum = [0; 8];
    let mut count = [0; 8];
    sum.copy_from_slice(&buf[0..8]);
    count.copy_from_slice(&buf[8..16]);
    Ok(new_state(f64::from_le_bytes(sum), i64::from_le_bytes(count)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_in_place() {
        let mut state = ScalarValue::Null;
        let Returned::NewValue(v) = avg_accum(&mut state, &[ScalarValue::Int32(4)]).unwrap() else {
            panic!("expected new state");
        };
        state = v;
        assert_eq!(
            Returned::SameHandle,
            avg_accum(&mut state, &[ScalarValue::Int32(8)]).unwrap()
        );
        assert_eq!(ScalarValue::Float64(6.0), avg_final(&state).unwrap());
    }

    #[test]
    fn serialize_then_combine() {
        let partial = avg_serialize(&new_state(10.0, 4)).unwrap();
        let restored = avg_deserialize(&partial).unwrap();

        let mut state = new_state(2.0, 1);
        avg_combine(&mut state, &[restored]).unwrap();
        assert_eq!(ScalarValue::Float64(12.0 / 5.0), avg_final(&state).unwrap());
    }

    #[test]
    fn deserialize_rejects_garbage() {
        avg_deserialize(&ScalarValue::Binary(vec![1, 2, 3])).unwrap_err();
    }
}
