pub mod avg;
pub mod boolean;
pub mod count;
pub mod minmax;
pub mod string_agg;
pub mod sum;

use vecagg_error::{DbError, Result};

use super::AggregateFunction;
use crate::arrays::datatype::DataType;

type Resolver = fn(&[DataType]) -> Result<AggregateFunction>;

/// All builtin aggregates by name.
pub const BUILTIN_AGGREGATES: &[(&str, Resolver)] = &[
    ("avg", avg::avg),
    ("bool_and", boolean::bool_and),
    ("bool_or", boolean::bool_or),
    ("count", count::count),
    ("count_star", count::count_star),
    ("max", minmax::max),
    ("min", minmax::min),
    ("string_agg", string_agg::string_agg),
    ("sum", sum::sum),
];

/// Resolve an aggregate by name and argument types.
pub fn lookup_aggregate(name: &str, inputs: &[DataType]) -> Result<AggregateFunction> {
    let (_, resolve) = BUILTIN_AGGREGATES
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| DbError::new(format!("Missing aggregate function '{name}'")))?;
    resolve(inputs)
}

pub(crate) fn expect_arity(name: &str, inputs: &[DataType], n: usize) -> Result<()> {
    if inputs.len() != n {
        return Err(DbError::new(format!(
            "'{name}' expects {n} arguments, got {}",
            inputs.len()
        )));
    }
    Ok(())
}

pub(crate) fn unsupported_input(name: &str, inputs: &[DataType]) -> DbError {
    let types: Vec<_> = inputs.iter().map(|dt| dt.to_string()).collect();
    DbError::new(format!("No '{name}' for inputs ({})", types.join(", ")))
}
