//! Output projection and HAVING expressions evaluated per finalized group.

use std::cmp::Ordering;
use std::fmt;

use vecagg_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;

/// Values available when projecting one finalized group.
#[derive(Debug)]
pub struct ProjectionContext<'a> {
    /// Representative input row with ungrouped columns already nulled.
    pub representative: &'a ScalarRow,
    /// Finalized aggregate results, indexed by aggregate call.
    pub aggregates: &'a [ScalarValue],
    /// Columns grouped in the grouping set being projected.
    pub grouped_columns: &'a [usize],
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputExpr {
    /// Column of the input row.
    Column(usize),
    /// Result of the aggregate call at this index.
    Aggregate(usize),
    /// GROUPING(cols...). A bit is set for each argument not grouped in the
    /// current grouping set, leftmost argument most significant.
    Grouping(Vec<usize>),
    Literal(ScalarValue),
}

impl OutputExpr {
    pub fn eval(&self, cx: &ProjectionContext<'_>) -> Result<ScalarValue> {
        Ok(match self {
            Self::Column(idx) => cx.representative.value(*idx).clone(),
            Self::Aggregate(idx) => cx
                .aggregates
                .get(*idx)
                .cloned()
                .ok_or_else(|| DbError::new("Missing aggregate result").with_field("idx", idx))?,
            Self::Grouping(cols) => {
                ScalarValue::Int64(grouping_value(cols, cx.grouped_columns))
            }
            Self::Literal(v) => v.clone(),
        })
    }

    /// Collect input columns referenced outside of aggregates.
    pub fn collect_columns(&self, out: &mut Vec<usize>) {
        if let Self::Column(idx) = self {
            out.push(*idx);
        }
    }
}

impl fmt::Display for OutputExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(idx) => write!(f, "#{idx}"),
            Self::Aggregate(idx) => write!(f, "agg#{idx}"),
            Self::Grouping(cols) => {
                let cols: Vec<_> = cols.iter().map(|c| format!("#{c}")).collect();
                write!(f, "GROUPING({})", cols.join(", "))
            }
            Self::Literal(v) => write!(f, "{v}"),
        }
    }
}

/// Compute the GROUPING bitmask for `cols` given the grouped columns.
pub fn grouping_value(cols: &[usize], grouped: &[usize]) -> i64 {
    cols.iter().fold(0, |acc, col| {
        let bit = if grouped.contains(col) { 0 } else { 1 };
        (acc << 1) | bit
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn matches(&self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::NotEq => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::LtEq => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::GtEq => ord != Ordering::Less,
        }
    }
}

/// Boolean qualification applied to each finalized group.
#[derive(Debug, Clone, PartialEq)]
pub enum HavingExpr {
    Compare {
        left: OutputExpr,
        op: CompareOp,
        right: OutputExpr,
    },
    And(Vec<HavingExpr>),
    Or(Vec<HavingExpr>),
    Not(Box<HavingExpr>),
    IsNull(OutputExpr),
}

impl HavingExpr {
    pub fn compare(left: OutputExpr, op: CompareOp, right: OutputExpr) -> Self {
        HavingExpr::Compare { left, op, right }
    }

    /// Evaluate with SQL three-valued logic. None is unknown.
    pub fn eval(&self, cx: &ProjectionContext<'_>) -> Result<Option<bool>> {
        Ok(match self {
            Self::Compare { left, op, right } => {
                let left = left.eval(cx)?;
                let right = right.eval(cx)?;
                if left.is_null() || right.is_null() {
                    None
                } else {
                    Some(op.matches(compare_values(&left, &right)?))
                }
            }
            Self::And(exprs) => {
                let mut result = Some(true);
                for expr in exprs {
                    match expr.eval(cx)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => (),
                    }
                }
                result
            }
            Self::Or(exprs) => {
                let mut result = Some(false);
                for expr in exprs {
                    match expr.eval(cx)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => (),
                    }
                }
                result
            }
            Self::Not(expr) => expr.eval(cx)?.map(|v| !v),
            Self::IsNull(expr) => Some(expr.eval(cx)?.is_null()),
        })
    }

    /// If the group should be emitted. Unknown counts as false.
    pub fn qualifies(&self, cx: &ProjectionContext<'_>) -> Result<bool> {
        Ok(self.eval(cx)? == Some(true))
    }

    pub fn collect_columns(&self, out: &mut Vec<usize>) {
        match self {
            Self::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::And(exprs) | Self::Or(exprs) => {
                exprs.iter().for_each(|e| e.collect_columns(out));
            }
            Self::Not(expr) => expr.collect_columns(out),
            Self::IsNull(expr) => expr.collect_columns(out),
        }
    }
}

/// Compare two non-null values, allowing mixed numeric types.
fn compare_values(left: &ScalarValue, right: &ScalarValue) -> Result<Ordering> {
    let numeric = |v: &ScalarValue| v.datatype().is_some_and(|dt| dt.is_numeric());
    if left.datatype() == right.datatype() {
        return Ok(left.compare_for_sort(right));
    }
    if numeric(left) && numeric(right) {
        let l = left.try_as_f64()?;
        let r = right.try_as_f64()?;
        return Ok(l.total_cmp(&r));
    }
    Err(DbError::new("Cannot compare values of different types")
        .with_field("left", left)
        .with_field("right", right))
}

/// Resolve the output type of an expression.
pub(crate) fn output_type(
    expr: &OutputExpr,
    input_types: &[DataType],
    aggregate_types: &[DataType],
) -> Result<DataType> {
    match expr {
        OutputExpr::Column(idx) => input_types.get(*idx).copied().ok_or_else(|| {
            DbError::invalid_definition("Output column reference out of range")
                .with_field("column", idx)
        }),
        OutputExpr::Aggregate(idx) => aggregate_types.get(*idx).copied().ok_or_else(|| {
            DbError::invalid_definition("Output aggregate reference out of range")
                .with_field("aggregate", idx)
        }),
        OutputExpr::Grouping(_) => Ok(DataType::Int64),
        OutputExpr::Literal(v) => Ok(v.datatype().unwrap_or(DataType::Int64)),
    }
}
