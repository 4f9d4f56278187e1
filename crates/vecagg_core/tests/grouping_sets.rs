use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vecagg_core::arrays::datatype::DataType;
use vecagg_core::arrays::row::ScalarRow;
use vecagg_core::arrays::scalar::ScalarValue;
use vecagg_core::config::ExecutionConfig;
use vecagg_core::execution::operators::aggregate::PhysicalAggregate;
use vecagg_core::execution::operators::aggregate::phase::AggStrategy;
use vecagg_core::execution::operators::aggregate::plan::{
    AggregateCall,
    AggregatePlan,
    GroupingPlan,
};
use vecagg_core::execution::source::MemorySource;
use vecagg_core::expr::OutputExpr;
use vecagg_core::functions::aggregate::builtin::lookup_aggregate;
use vecagg_core::testutil::{drain_operator, drain_rows};

const TYPES: [DataType; 3] = [DataType::Int32, DataType::Int32, DataType::Int64];

fn row(a: i32, b: i32, v: i64) -> ScalarRow {
    ScalarRow::from_iter([ScalarValue::from(a), ScalarValue::from(b), ScalarValue::from(v)])
}

fn out(a: Option<i32>, b: Option<i32>, sum: i64) -> ScalarRow {
    ScalarRow::from_iter([ScalarValue::from(a), ScalarValue::from(b), ScalarValue::from(sum)])
}

fn config(batch_size: usize) -> ExecutionConfig {
    ExecutionConfig {
        batch_size,
        ..Default::default()
    }
}

fn sum_plan(grouping: GroupingPlan, extra: impl IntoIterator<Item = OutputExpr>) -> AggregatePlan {
    let mut projections = vec![
        OutputExpr::Column(0),
        OutputExpr::Column(1),
        OutputExpr::Aggregate(0),
    ];
    projections.extend(extra);

    AggregatePlan::new(TYPES, grouping)
        .with_aggregate(AggregateCall::new(
            lookup_aggregate("sum", &[DataType::Int64]).unwrap(),
            [2],
        ))
        .with_projections(projections)
}

fn rollup_ab() -> GroupingPlan {
    GroupingPlan::GroupingSets {
        sorted_phases: vec![vec![vec![0, 1], vec![0], vec![]]],
        hashed: Vec::new(),
    }
}

#[test]
fn rollup_emits_each_level_at_its_boundary() {
    logutil::init_test();

    let plan = sum_plan(rollup_ab(), [OutputExpr::Grouping(vec![0, 1])]);
    let source = MemorySource::new(TYPES).with_rows([
        row(1, 1, 10),
        row(1, 1, 20),
        row(1, 2, 5),
        row(2, 1, 7),
    ]);
    let mut op = PhysicalAggregate::try_new(&plan, Box::new(source), &config(3)).unwrap();
    assert_eq!(AggStrategy::Sorted, op.strategy());

    let with_grouping = |a: Option<i32>, b: Option<i32>, sum: i64, grouping: i64| {
        let mut r = out(a, b, sum);
        r.columns.push(ScalarValue::Int64(grouping));
        r
    };

    let rows = drain_rows(&mut op);
    let expected = vec![
        with_grouping(Some(1), Some(1), 30, 0),
        with_grouping(Some(1), Some(2), 5, 0),
        with_grouping(Some(1), None, 35, 1),
        with_grouping(Some(2), Some(1), 7, 0),
        with_grouping(Some(2), None, 7, 1),
        with_grouping(None, None, 42, 3),
    ];
    assert_eq!(expected, rows);
}

#[test]
fn rollup_less_specific_sets_keep_accumulating() {
    logutil::init_test();

    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let num_rows = rng.random_range(1..60);
        let mut input: Vec<(i32, i32, i64)> = (0..num_rows)
            .map(|_| {
                (
                    rng.random_range(0..4),
                    rng.random_range(0..3),
                    rng.random_range(0..100),
                )
            })
            .collect();
        input.sort_unstable();

        let mut by_ab: BTreeMap<(i32, i32), i64> = BTreeMap::new();
        let mut by_a: BTreeMap<i32, i64> = BTreeMap::new();
        for &(a, b, v) in &input {
            *by_ab.entry((a, b)).or_default() += v;
            *by_a.entry(a).or_default() += v;
        }
        let total: i64 = input.iter().map(|(_, _, v)| v).sum();

        let plan = sum_plan(rollup_ab(), [OutputExpr::Grouping(vec![0, 1])]);
        let source = MemorySource::new(TYPES)
            .with_rows(input.iter().map(|&(a, b, v)| row(a, b, v)));
        let mut op = PhysicalAggregate::try_new(&plan, Box::new(source), &config(7)).unwrap();
        let rows = drain_rows(&mut op);

        let mut got_ab = Vec::new();
        let mut got_a = Vec::new();
        let mut got_total = Vec::new();
        // Largest (a, b) sum seen since the last (a) row.
        let mut max_in_group = 0;
        for r in &rows {
            let sum = r.value(2).try_as_i64().unwrap();
            match r.value(3).try_as_i64().unwrap() {
                0 => {
                    let a = r.value(0).try_as_i64().unwrap() as i32;
                    let b = r.value(1).try_as_i64().unwrap() as i32;
                    got_ab.push(((a, b), sum));
                    max_in_group = i64::max(max_in_group, sum);
                }
                1 => {
                    let a = r.value(0).try_as_i64().unwrap() as i32;
                    assert!(sum >= max_in_group, "rollup sum decreased within group");
                    got_a.push((a, sum));
                    max_in_group = 0;
                }
                _ => got_total.push(sum),
            }
        }

        assert_eq!(by_ab.into_iter().collect::<Vec<_>>(), got_ab);
        assert_eq!(by_a.into_iter().collect::<Vec<_>>(), got_a);
        assert_eq!(vec![total], got_total);
    }
}

#[test]
fn later_phase_reads_resorted_input() {
    logutil::init_test();

    let plan = sum_plan(
        GroupingPlan::GroupingSets {
            sorted_phases: vec![vec![vec![0, 1], vec![0]], vec![vec![1]]],
            hashed: Vec::new(),
        },
        [],
    );
    let source = MemorySource::new(TYPES).with_rows([
        row(1, 1, 10),
        row(1, 2, 5),
        row(2, 1, 7),
        row(2, 2, 1),
    ]);
    let mut op = PhysicalAggregate::try_new(&plan, Box::new(source), &config(2)).unwrap();

    let rows = drain_rows(&mut op);
    let expected = vec![
        out(Some(1), Some(1), 10),
        out(Some(1), Some(2), 5),
        out(Some(1), None, 15),
        out(Some(2), Some(1), 7),
        out(Some(2), Some(2), 1),
        out(Some(2), None, 8),
        out(None, Some(1), 17),
        out(None, Some(2), 6),
    ];
    assert_eq!(expected, rows);
}

#[test]
fn mixed_drains_hash_tables_last() {
    logutil::init_test();

    let plan = sum_plan(
        GroupingPlan::GroupingSets {
            sorted_phases: vec![vec![vec![0]]],
            hashed: vec![vec![1]],
        },
        [],
    );
    let source = MemorySource::new(TYPES).with_rows([row(1, 1, 10), row(1, 2, 5), row(2, 1, 7)]);
    let mut op = PhysicalAggregate::try_new(&plan, Box::new(source), &config(4)).unwrap();
    assert_eq!(AggStrategy::Mixed, op.strategy());

    let (rows, batch_sizes) = drain_operator(&mut op);
    let expected = vec![
        out(Some(1), None, 15),
        out(Some(2), None, 7),
        out(None, Some(1), 17),
        out(None, Some(2), 5),
    ];
    assert_eq!(expected, rows);
    // Sorted groups come one per call, hashed groups fill a batch.
    assert_eq!(vec![1, 1, 2], batch_sizes);

    // Every input row was looked up once in the single hash table.
    assert_eq!(3, op.hash_tables()[0].num_lookups());
}

#[test]
fn empty_input_emits_only_empty_sets() {
    logutil::init_test();

    let plan = AggregatePlan::new(
        TYPES,
        GroupingPlan::GroupingSets {
            sorted_phases: vec![vec![vec![0], vec![]]],
            hashed: Vec::new(),
        },
    )
    .with_aggregate(AggregateCall::new(
        lookup_aggregate("count_star", &[]).unwrap(),
        [],
    ))
    .with_projections([OutputExpr::Column(0), OutputExpr::Aggregate(0)]);
    let mut op =
        PhysicalAggregate::try_new(&plan, Box::new(MemorySource::new(TYPES)), &config(4)).unwrap();

    let rows = drain_rows(&mut op);
    assert_eq!(
        vec![ScalarRow::from_iter([ScalarValue::Null, ScalarValue::Int64(0)])],
        rows
    );
}

#[test]
fn empty_input_mixed_produces_nothing() {
    logutil::init_test();

    let plan = sum_plan(
        GroupingPlan::GroupingSets {
            sorted_phases: vec![vec![vec![0]]],
            hashed: vec![vec![1]],
        },
        [],
    );
    let mut op =
        PhysicalAggregate::try_new(&plan, Box::new(MemorySource::new(TYPES)), &config(4)).unwrap();

    assert!(drain_rows(&mut op).is_empty());
}
