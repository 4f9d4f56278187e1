//! Sort based processing for DISTINCT and ORDER BY aggregates.
//!
//! Input tuples are buffered per group, then stable sorted and fed to the
//! transition function. With DISTINCT only the first tuple of each run of
//! equal tuples is used, nulls comparing equal to nulls.

use vecagg_error::Result;

use super::accumulator::{MemoryScope, TransitionState};
use super::transition::{OrderedInput, TransitionInfo, advance_transition};
use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::sort::sort_rows;

/// Sort and consume `tuples`, advancing `state`. Leaves `tuples` empty.
pub fn process_ordered(
    info: &TransitionInfo,
    ordered: &OrderedInput,
    state: &mut TransitionState,
    tuples: &mut Vec<ScalarRow>,
    scope: &mut MemoryScope,
) -> Result<()> {
    sort_rows(tuples, &ordered.keys);
    if ordered.is_single_input() {
        process_ordered_single(info, ordered.distinct, state, tuples, scope)
    } else {
        process_ordered_multi(info, ordered, state, tuples, scope)
    }
}

/// Single column tuples, comparing bare values.
fn process_ordered_single(
    info: &TransitionInfo,
    distinct: bool,
    state: &mut TransitionState,
    tuples: &mut Vec<ScalarRow>,
    scope: &mut MemoryScope,
) -> Result<()> {
    let mut previous: Option<ScalarValue> = None;

    for tuple in tuples.drain(..) {
        let value = tuple.columns.into_iter().next().unwrap_or_default();

        if distinct
            && previous
                .as_ref()
                .is_some_and(|prev| prev.is_not_distinct_from(&value))
        {
            continue;
        }

        advance_transition(info, state, std::slice::from_ref(&value), scope)?;
        previous = Some(value);
    }

    Ok(())
}

/// Multi column tuples. The previous tuple is moved into place rather than
/// copied, a duplicate leaves it untouched.
fn process_ordered_multi(
    info: &TransitionInfo,
    ordered: &OrderedInput,
    state: &mut TransitionState,
    tuples: &mut Vec<ScalarRow>,
    scope: &mut MemoryScope,
) -> Result<()> {
    let distinct_cols: Vec<usize> = (0..ordered.num_args).collect();
    let mut previous: Option<ScalarRow> = None;

    for current in tuples.drain(..) {
        if ordered.distinct
            && previous
                .as_ref()
                .is_some_and(|prev| prev.columns_not_distinct(&current, &distinct_cols))
        {
            continue;
        }

        advance_transition(info, state, &current.columns[..ordered.num_args], scope)?;
        previous = Some(current);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::sort::SortKey;
    use crate::execution::operators::aggregate::transition::tests::{
        calls,
        counting_info,
        reset_calls,
    };
    use crate::functions::aggregate::builtin::lookup_aggregate;

    fn distinct_single() -> OrderedInput {
        OrderedInput {
            tuple_columns: vec![0],
            keys: vec![SortKey::asc(0)],
            num_args: 1,
            distinct: true,
        }
    }

    fn run(info: &TransitionInfo, ordered: &OrderedInput, tuples: Vec<ScalarRow>) -> TransitionState {
        let mut scope = MemoryScope::new();
        let mut state = TransitionState::initialize(info, &mut scope);
        let mut tuples = tuples;
        process_ordered(info, ordered, &mut state, &mut tuples, &mut scope).unwrap();
        assert!(tuples.is_empty());
        state
    }

    #[test]
    fn distinct_single_skips_duplicates() {
        let info = counting_info(0);
        let tuples = [3, 1, 3, 2, 1, 3]
            .into_iter()
            .map(|v| ScalarRow::from_iter([ScalarValue::Int64(v)]))
            .collect();

        reset_calls();
        let state = run(&info, &distinct_single(), tuples);
        assert_eq!(3, calls());
        assert_eq!(ScalarValue::Int64(6), state.value);
    }

    #[test]
    fn distinct_nulls_collapse() {
        let f = lookup_aggregate("count", &[DataType::Int64]).unwrap();
        let info = TransitionInfo {
            aggregate: f.name,
            func: f.transition,
            deserialize: None,
            init_value: f.init_value.clone(),
            trans_type: f.trans_type,
            by_value: true,
            arg_columns: vec![0],
            ordered: None,
        };
        let tuples = [Some(1_i64), None, Some(1), None]
            .into_iter()
            .map(|v| ScalarRow::from_iter([ScalarValue::from(v)]))
            .collect();

        let state = run(&info, &distinct_single(), tuples);
        // Strict count ignores the single remaining null.
        assert_eq!(ScalarValue::Int64(1), state.value);
    }

    #[test]
    fn ordered_string_agg_multi_input() {
        let f = lookup_aggregate("string_agg", &[DataType::Utf8, DataType::Utf8]).unwrap();
        let info = TransitionInfo {
            aggregate: f.name,
            func: f.transition,
            deserialize: None,
            init_value: None,
            trans_type: f.trans_type,
            by_value: false,
            arg_columns: vec![0, 1],
            ordered: None,
        };
        // Tuple: (value, delimiter, sort column)
        let ordered = OrderedInput {
            tuple_columns: vec![0, 1, 2],
            keys: vec![SortKey::desc(2)],
            num_args: 2,
            distinct: false,
        };
        let tuples = vec![
            ScalarRow::from_iter([ScalarValue::from("b"), ",".into(), ScalarValue::Int32(2)]),
            ScalarRow::from_iter([ScalarValue::from("a"), ",".into(), ScalarValue::Int32(1)]),
            ScalarRow::from_iter([ScalarValue::from("c"), ",".into(), ScalarValue::Int32(3)]),
        ];

        let state = run(&info, &ordered, tuples);
        assert_eq!(ScalarValue::from("c,b,a"), state.value);
    }

    #[test]
    fn distinct_multi_compares_all_arguments() {
        let mut info = counting_info(0);
        info.arg_columns = vec![0, 1];
        let ordered = OrderedInput {
            tuple_columns: vec![0, 1],
            keys: vec![SortKey::asc(0), SortKey::asc(1)],
            num_args: 2,
            distinct: true,
        };
        let tuples = [(1, 1), (1, 2), (1, 1), (2, 1), (1, 2)]
            .into_iter()
            .map(|(a, b)| ScalarRow::from_iter([ScalarValue::Int64(a), ScalarValue::Int64(b)]))
            .collect();

        reset_calls();
        run(&info, &ordered, tuples);
        assert_eq!(3, calls());
    }

    #[test]
    fn distinct_matches_naive_reference() {
        let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
        let info = counting_info(0);

        for _ in 0..50 {
            let len = rng.random_range(0..40);
            let values: Vec<Option<i64>> = (0..len)
                .map(|_| {
                    if rng.random_bool(0.1) {
                        None
                    } else {
                        Some(rng.random_range(0..8))
                    }
                })
                .collect();

            // Quadratic reference: keep a value if no earlier value equals it.
            let expected = values
                .iter()
                .enumerate()
                .filter(|(idx, v)| v.is_some() && !values[..*idx].contains(v))
                .count();

            let tuples = values
                .iter()
                .map(|v| ScalarRow::from_iter([ScalarValue::from(*v)]))
                .collect();

            reset_calls();
            run(&info, &distinct_single(), tuples);
            assert_eq!(expected, calls(), "values: {values:?}");
        }
    }
}
