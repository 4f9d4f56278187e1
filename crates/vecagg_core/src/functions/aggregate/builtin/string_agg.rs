use vecagg_error::Result;

use super::{expect_arity, unsupported_input};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::functions::aggregate::{AggregateFunction, FunctionHandle, Returned};

/// `string_agg(value, delimiter)`.
///
/// The state string is appended to in place after the first value, so only
/// the first non-null input produces a new state.
pub fn string_agg(inputs: &[DataType]) -> Result<AggregateFunction> {
    expect_arity("string_agg", inputs, 2)?;
    if inputs != [DataType::Utf8, DataType::Utf8] {
        return Err(unsupported_input("string_agg", inputs));
    }

    Ok(AggregateFunction {
        name: "string_agg",
        input_types: inputs.to_vec(),
        trans_type: DataType::Utf8,
        result_type: DataType::Utf8,
        transition: FunctionHandle::non_strict("string_agg_transfn", string_agg_transfn),
        combine: None,
        finalize: None,
        serialize: None,
        deserialize: None,
        init_value: None,
    })
}

fn string_agg_transfn(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned> {
    let value = match &args[0] {
        ScalarValue::Null => return Ok(Returned::SameHandle),
        v => v.try_as_str()?,
    };

    match state {
        ScalarValue::Utf8(s) => {
            if let ScalarValue::Utf8(delim) = &args[1] {
                s.push_str(delim);
            }
            s.push_str(value);
            Ok(Returned::SameHandle)
        }
        _ => Ok(Returned::NewValue(ScalarValue::Utf8(value.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_place() {
        let mut state = ScalarValue::Null;
        let ret = string_agg_transfn(&mut state, &["a".into(), ",".into()]).unwrap();
        let Returned::NewValue(v) = ret else {
            panic!("expected new value");
        };
        state = v;

        let ret = string_agg_transfn(&mut state, &["b".into(), ",".into()]).unwrap();
        assert_eq!(Returned::SameHandle, ret);
        let ret = string_agg_transfn(&mut state, &[ScalarValue::Null, ",".into()]).unwrap();
        assert_eq!(Returned::SameHandle, ret);
        assert_eq!(ScalarValue::from("a,b"), state);
    }
}
