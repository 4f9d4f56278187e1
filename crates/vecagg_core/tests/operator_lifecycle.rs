use vecagg_core::arrays::batch::Batch;
use vecagg_core::arrays::datatype::DataType;
use vecagg_core::arrays::row::ScalarRow;
use vecagg_core::arrays::scalar::ScalarValue;
use vecagg_core::config::ExecutionConfig;
use vecagg_core::execution::operators::PollPull;
use vecagg_core::execution::operators::aggregate::PhysicalAggregate;
use vecagg_core::execution::operators::aggregate::plan::{
    AggregateArg,
    AggregateCall,
    AggregatePlan,
    GroupingPlan,
};
use vecagg_core::execution::source::{MemorySource, RecheckFn};
use vecagg_core::expr::OutputExpr;
use vecagg_core::functions::aggregate::builtin::lookup_aggregate;
use vecagg_core::testutil::{assert_batches_eq, batch_from_rows, drain_rows};
use vecagg_error::ErrorKind;

const TYPES: [DataType; 2] = [DataType::Int32, DataType::Int64];

fn row(a: i32, b: i64) -> ScalarRow {
    ScalarRow::from_iter([ScalarValue::from(a), ScalarValue::from(b)])
}

fn input() -> Vec<ScalarRow> {
    vec![row(1, 10), row(1, 20), row(2, 5), row(3, 1)]
}

fn expected() -> Vec<ScalarRow> {
    vec![row(1, 30), row(2, 5), row(3, 1)]
}

fn sum_plan(grouping: GroupingPlan) -> AggregatePlan {
    AggregatePlan::new(TYPES, grouping)
        .with_aggregate(AggregateCall::new(
            lookup_aggregate("sum", &[DataType::Int64]).unwrap(),
            [1],
        ))
        .with_projections([OutputExpr::Column(0), OutputExpr::Aggregate(0)])
}

fn sorted_plan() -> AggregatePlan {
    sum_plan(GroupingPlan::Sorted {
        group_columns: vec![0],
    })
}

fn small_batches() -> ExecutionConfig {
    serde_json::from_str(r#"{"batch_size": 2}"#).unwrap()
}

#[test]
fn config_from_json_keeps_defaults() {
    let config = small_batches();
    assert_eq!(2, config.batch_size);
    assert_eq!(
        ExecutionConfig::default().hash_table_initial_capacity,
        config.hash_table_initial_capacity
    );
}

#[test]
fn rescan_sorted_mid_stream() {
    logutil::init_test();

    let source = MemorySource::new(TYPES).with_rows(input());
    let mut op = PhysicalAggregate::try_new(&sorted_plan(), Box::new(source), &small_batches())
        .unwrap();

    let first = op.next_output_batch().unwrap().unwrap();
    assert_batches_eq(&batch_from_rows(TYPES, [row(1, 30)]), first);

    op.rescan(false).unwrap();
    assert_eq!(expected(), drain_rows(&mut op));
}

#[test]
fn interrupt_cancels_at_next_fetch() {
    logutil::init_test();

    let source = MemorySource::new(TYPES).with_rows(input());
    let mut op = PhysicalAggregate::try_new(&sorted_plan(), Box::new(source), &small_batches())
        .unwrap();

    let handle = op.interrupt_handle();
    handle.interrupt();
    let err = op.next_output_batch().unwrap_err();
    assert_eq!(ErrorKind::Cancelled, err.kind());

    handle.clear();
    op.rescan(false).unwrap();
    assert_eq!(expected(), drain_rows(&mut op));
}

#[test]
fn interrupt_while_filling_hash_table() {
    logutil::init_test();

    let plan = sum_plan(GroupingPlan::Hashed {
        group_columns: vec![0],
    });
    let source = MemorySource::new(TYPES).with_rows(input());
    let mut op = PhysicalAggregate::try_new(&plan, Box::new(source), &small_batches()).unwrap();

    op.interrupt_handle().interrupt();
    let mut output = Batch::try_new(op.output_types().to_vec(), 2).unwrap();
    let err = op.poll_pull(&mut output).unwrap_err();
    assert_eq!(ErrorKind::Cancelled, err.kind());

    op.interrupt_handle().clear();
    op.rescan(false).unwrap();
    let mut rows = Vec::new();
    loop {
        match op.poll_pull(&mut output).unwrap() {
            PollPull::Computed => {
                rows.extend(output.live_rows().map(|idx| output.row(idx).unwrap()));
            }
            PollPull::Exhausted => break,
        }
    }
    assert_eq!(expected(), vecagg_core::testutil::sorted(rows));
}

#[test]
fn substituted_batch_replayed_when_rechecked() {
    logutil::init_test();

    fn accept(batch: &Batch) -> bool {
        batch.num_live_rows() > 0
    }
    fn reject(_batch: &Batch) -> bool {
        false
    }

    let plan = AggregatePlan::new(TYPES, GroupingPlan::Plain)
        .with_aggregate(AggregateCall::new(
            lookup_aggregate("count_star", &[]).unwrap(),
            [],
        ))
        .with_projections([OutputExpr::Aggregate(0)]);

    let cases: [(RecheckFn, i64); 2] = [(accept, 6), (reject, 4)];
    for (recheck, count) in cases {
        let source = MemorySource::new(TYPES)
            .with_rows(input())
            .with_substitute(vec![row(9, 9), row(9, 9)], recheck);
        let mut op =
            PhysicalAggregate::try_new(&plan, Box::new(source), &ExecutionConfig::default())
                .unwrap();

        assert_eq!(
            vec![ScalarRow::from_iter([ScalarValue::Int64(count)])],
            drain_rows(&mut op)
        );
    }
}

#[test]
fn definition_errors_at_build() {
    logutil::init_test();

    let source = || Box::new(MemorySource::new(TYPES));
    let config = ExecutionConfig::default();

    // Nested aggregate.
    let inner = AggregateCall::new(lookup_aggregate("sum", &[DataType::Int64]).unwrap(), [1]);
    let mut outer = AggregateCall::new(lookup_aggregate("sum", &[DataType::Int64]).unwrap(), []);
    outer.args.push(AggregateArg::Aggregate(Box::new(inner)));
    let plan = AggregatePlan::new(TYPES, GroupingPlan::Plain).with_aggregate(outer);
    let err = PhysicalAggregate::try_new(&plan, source(), &config).unwrap_err();
    assert_eq!(ErrorKind::InvalidDefinition, err.kind());

    // DISTINCT with a hashed grouping set.
    let plan = AggregatePlan::new(
        TYPES,
        GroupingPlan::GroupingSets {
            sorted_phases: vec![vec![vec![0]]],
            hashed: vec![vec![1]],
        },
    )
    .with_aggregate(
        AggregateCall::new(lookup_aggregate("sum", &[DataType::Int64]).unwrap(), [1])
            .with_distinct(),
    );
    let err = PhysicalAggregate::try_new(&plan, source(), &config).unwrap_err();
    assert_eq!(ErrorKind::InvalidDefinition, err.kind());

    // Empty hashed grouping set.
    let plan = AggregatePlan::new(
        TYPES,
        GroupingPlan::GroupingSets {
            sorted_phases: Vec::new(),
            hashed: vec![vec![0], vec![]],
        },
    );
    let err = PhysicalAggregate::try_new(&plan, source(), &config).unwrap_err();
    assert_eq!(ErrorKind::InvalidDefinition, err.kind());

    // Sorted phase sets that aren't prefixes.
    let plan = AggregatePlan::new(
        TYPES,
        GroupingPlan::GroupingSets {
            sorted_phases: vec![vec![vec![0], vec![1]]],
            hashed: Vec::new(),
        },
    );
    let err = PhysicalAggregate::try_new(&plan, source(), &config).unwrap_err();
    assert_eq!(ErrorKind::InvalidDefinition, err.kind());

    // Source disagrees with the plan.
    let err = PhysicalAggregate::try_new(
        &sorted_plan(),
        Box::new(MemorySource::new([DataType::Int64, DataType::Int64])),
        &config,
    )
    .unwrap_err();
    assert_eq!(ErrorKind::InvalidDefinition, err.kind());
}

#[test]
fn zero_batch_size_rejected() {
    let config = ExecutionConfig {
        batch_size: 0,
        ..Default::default()
    };
    let source = MemorySource::new(TYPES);
    PhysicalAggregate::try_new(&sorted_plan(), Box::new(source), &config).unwrap_err();
}
