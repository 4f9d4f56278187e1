//! Aggregate plan definitions and their validation into executable form.

use vecagg_error::{DbError, Result};

use super::finalize::PerAggregate;
use super::hash_table::HashColumns;
use super::phase::{AggStrategy, GroupingSetPhase};
use super::transition::{OrderedInput, TransitionInfo};
use crate::arrays::datatype::DataType;
use crate::arrays::sort::SortKey;
use crate::expr::{HavingExpr, OutputExpr, output_type};
use crate::functions::aggregate::AggregateFunction;

/// Which stage of a split aggregation this operator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggSplit {
    /// Transition raw input and finalize.
    #[default]
    Simple,
    /// Transition raw input and emit serialized partial states.
    InitialSerial,
    /// Combine deserialized partial states and finalize.
    FinalDeserial,
}

impl AggSplit {
    pub const fn combine(&self) -> bool {
        matches!(self, Self::FinalDeserial)
    }

    pub const fn skip_final(&self) -> bool {
        matches!(self, Self::InitialSerial)
    }

    pub const fn serialize(&self) -> bool {
        matches!(self, Self::InitialSerial)
    }

    pub const fn deserialize(&self) -> bool {
        matches!(self, Self::FinalDeserial)
    }
}

#[derive(Debug, Clone)]
pub enum AggregateArg {
    Column(usize),
    /// An aggregate used as an argument. Always rejected.
    Aggregate(Box<AggregateCall>),
}

/// One aggregate call in the plan.
#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub args: Vec<AggregateArg>,
    pub distinct: bool,
    /// ORDER BY inside the call. Key columns are input columns.
    pub order_by: Vec<SortKey>,
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, columns: impl IntoIterator<Item = usize>) -> Self {
        AggregateCall {
            function,
            args: columns.into_iter().map(AggregateArg::Column).collect(),
            distinct: false,
            order_by: Vec::new(),
        }
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn with_order_by(mut self, keys: impl IntoIterator<Item = SortKey>) -> Self {
        self.order_by = keys.into_iter().collect();
        self
    }

    fn is_ordered(&self) -> bool {
        self.distinct || !self.order_by.is_empty()
    }
}

/// How the input is grouped.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupingPlan {
    /// Everything in one group.
    Plain,
    /// Input is sorted on the group columns.
    Sorted { group_columns: Vec<usize> },
    /// Unordered input grouped through a hash table.
    Hashed { group_columns: Vec<usize> },
    /// Explicit grouping sets.
    ///
    /// Each sorted phase lists prefix sets, most specific first. The first
    /// phase reads input already sorted on its columns, later phases are fed
    /// by resorting. Hashed sets are filled during the first sorted phase, or
    /// from the input directly when there are no sorted phases.
    GroupingSets {
        sorted_phases: Vec<Vec<Vec<usize>>>,
        hashed: Vec<Vec<usize>>,
    },
}

#[derive(Debug, Clone)]
pub struct AggregatePlan {
    pub input_types: Vec<DataType>,
    pub grouping: GroupingPlan,
    pub aggregates: Vec<AggregateCall>,
    pub projections: Vec<OutputExpr>,
    pub having: Option<HavingExpr>,
    pub split: AggSplit,
}

impl AggregatePlan {
    pub fn new(input_types: impl IntoIterator<Item = DataType>, grouping: GroupingPlan) -> Self {
        AggregatePlan {
            input_types: input_types.into_iter().collect(),
            grouping,
            aggregates: Vec::new(),
            projections: Vec::new(),
            having: None,
            split: AggSplit::Simple,
        }
    }

    pub fn with_aggregate(mut self, call: AggregateCall) -> Self {
        self.aggregates.push(call);
        self
    }

    pub fn with_projections(mut self, exprs: impl IntoIterator<Item = OutputExpr>) -> Self {
        self.projections = exprs.into_iter().collect();
        self
    }

    pub fn with_having(mut self, having: HavingExpr) -> Self {
        self.having = Some(having);
        self
    }

    pub fn with_split(mut self, split: AggSplit) -> Self {
        self.split = split;
        self
    }
}

/// Validated plan ready for execution.
#[derive(Debug)]
pub struct CompiledPlan {
    pub strategy: AggStrategy,
    pub split: AggSplit,
    pub input_types: Vec<DataType>,
    /// Index 0 holds hashed sets (possibly none), sorted phases follow.
    pub phases: Vec<GroupingSetPhase>,
    /// Retained columns for each hashed set.
    pub hash_columns: Vec<HashColumns>,
    /// Every grouped column in descending order.
    pub all_grouped_cols: Vec<usize>,
    pub transitions: Vec<TransitionInfo>,
    pub aggregates: Vec<PerAggregate>,
    pub projections: Vec<OutputExpr>,
    pub having: Option<HavingExpr>,
    pub output_types: Vec<DataType>,
}

impl CompiledPlan {
    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }
}

impl AggregatePlan {
    /// Validate the plan, resolving transitions and grouping phases.
    ///
    /// Every malformed definition is reported here, never while processing
    /// rows.
    pub fn compile(&self) -> Result<CompiledPlan> {
        let num_inputs = self.input_types.len();
        let check_column = |col: usize, what: &str| -> Result<()> {
            if col >= num_inputs {
                return Err(DbError::invalid_definition(format!(
                    "{what} references column outside of input"
                ))
                .with_field("column", col)
                .with_field("num_inputs", num_inputs));
            }
            Ok(())
        };

        let (strategy, phases) = self.build_phases()?;
        for phase in &phases {
            for set in &phase.grouping_sets {
                for &col in set {
                    check_column(col, "Grouping set")?;
                }
            }
        }

        let mut all_grouped_cols: Vec<usize> = phases
            .iter()
            .flat_map(|p| p.grouping_sets.iter().flatten().copied())
            .collect();
        all_grouped_cols.sort_unstable_by(|a, b| b.cmp(a));
        all_grouped_cols.dedup();

        let mut transitions: Vec<TransitionInfo> = Vec::new();
        let mut aggregates = Vec::with_capacity(self.aggregates.len());
        for call in &self.aggregates {
            let arg_columns = call
                .args
                .iter()
                .map(|arg| match arg {
                    AggregateArg::Column(col) => {
                        check_column(*col, "Aggregate argument")?;
                        Ok(*col)
                    }
                    AggregateArg::Aggregate(_) => Err(DbError::invalid_definition(
                        "aggregate function calls cannot be nested",
                    )
                    .with_field("aggregate", call.function.name)),
                })
                .collect::<Result<Vec<_>>>()?;
            for key in &call.order_by {
                check_column(key.column, "Aggregate ORDER BY")?;
            }

            let info = self.build_transition(call, arg_columns, strategy)?;
            let trans_idx = match transitions.iter().position(|t| shares_state(t, &info)) {
                Some(idx) => idx,
                None => {
                    transitions.push(info);
                    transitions.len() - 1
                }
            };

            aggregates.push(self.build_per_aggregate(call, trans_idx)?);
        }

        let mut referenced = Vec::new();
        for expr in &self.projections {
            expr.collect_columns(&mut referenced);
            if let OutputExpr::Grouping(cols) = expr {
                for &col in cols {
                    check_column(col, "GROUPING")?;
                }
            }
        }
        if let Some(having) = &self.having {
            having.collect_columns(&mut referenced);
        }
        for &col in &referenced {
            check_column(col, "Output expression")?;
        }

        let hash_columns = phases[0]
            .grouping_sets
            .iter()
            .map(|set| HashColumns::compute(set, &all_grouped_cols, &referenced))
            .collect();

        let aggregate_types: Vec<_> = aggregates.iter().map(|a| a.output_type).collect();
        let output_types = self
            .projections
            .iter()
            .map(|expr| output_type(expr, &self.input_types, &aggregate_types))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledPlan {
            strategy,
            split: self.split,
            input_types: self.input_types.clone(),
            phases,
            hash_columns,
            all_grouped_cols,
            transitions,
            aggregates,
            projections: self.projections.clone(),
            having: self.having.clone(),
            output_types,
        })
    }

    fn build_phases(&self) -> Result<(AggStrategy, Vec<GroupingSetPhase>)> {
        Ok(match &self.grouping {
            GroupingPlan::Plain => (
                AggStrategy::Plain,
                vec![
                    GroupingSetPhase::hashed(Vec::new(), false),
                    GroupingSetPhase::sorted(vec![Vec::new()], false)?,
                ],
            ),
            GroupingPlan::Sorted { group_columns } => {
                let phase = GroupingSetPhase::sorted(vec![group_columns.clone()], false)?;
                (
                    phase.strategy,
                    vec![GroupingSetPhase::hashed(Vec::new(), false), phase],
                )
            }
            GroupingPlan::Hashed { group_columns } => {
                if group_columns.is_empty() {
                    return Err(DbError::invalid_definition(
                        "Hashed grouping requires at least one grouping column",
                    ));
                }
                (
                    AggStrategy::Hashed,
                    vec![GroupingSetPhase::hashed(vec![group_columns.clone()], false)],
                )
            }
            GroupingPlan::GroupingSets {
                sorted_phases,
                hashed,
            } => {
                if hashed.iter().any(|set| set.is_empty()) {
                    return Err(DbError::invalid_definition(
                        "An empty grouping set cannot be hashed",
                    ));
                }
                if sorted_phases.is_empty() && hashed.is_empty() {
                    return Err(DbError::invalid_definition("No grouping sets provided"));
                }

                let mut phases = vec![GroupingSetPhase::hashed(hashed.clone(), true)];
                for sets in sorted_phases {
                    phases.push(GroupingSetPhase::sorted(sets.clone(), true)?);
                }

                let strategy = match (sorted_phases.is_empty(), hashed.is_empty()) {
                    (true, _) => AggStrategy::Hashed,
                    (false, false) => AggStrategy::Mixed,
                    (false, true) => {
                        if phases[1..].iter().any(|p| p.strategy == AggStrategy::Sorted) {
                            AggStrategy::Sorted
                        } else {
                            AggStrategy::Plain
                        }
                    }
                };
                (strategy, phases)
            }
        })
    }

    fn build_transition(
        &self,
        call: &AggregateCall,
        arg_columns: Vec<usize>,
        strategy: AggStrategy,
    ) -> Result<TransitionInfo> {
        let f = &call.function;
        let name = f.name;

        if call.is_ordered() {
            if matches!(strategy, AggStrategy::Hashed | AggStrategy::Mixed) {
                return Err(DbError::invalid_definition(
                    "DISTINCT or ORDER BY aggregates are not supported with hashed grouping",
                )
                .with_field("aggregate", name));
            }
            if self.split != AggSplit::Simple {
                return Err(DbError::invalid_definition(
                    "DISTINCT or ORDER BY aggregates cannot be split into partial stages",
                )
                .with_field("aggregate", name));
            }
        }

        let mut deserialize = None;
        let func = if self.split.combine() {
            let combine = f.combine.ok_or_else(|| {
                DbError::invalid_definition("combine function not set for aggregate")
                    .with_field("aggregate", name)
            })?;
            if combine.strict && f.trans_type == DataType::Internal {
                return Err(DbError::invalid_definition(format!(
                    "combine function with transition type {} must not be declared strict",
                    f.trans_type
                ))
                .with_field("aggregate", name));
            }
            if arg_columns.len() != 1 {
                return Err(DbError::invalid_definition(
                    "combining partial states requires exactly one argument",
                )
                .with_field("aggregate", name));
            }
            let partial_type = if f.trans_type == DataType::Internal {
                DataType::Binary
            } else {
                f.trans_type
            };
            self.check_arg_types(name, &arg_columns, &[partial_type])?;
            if self.split.deserialize() && f.trans_type == DataType::Internal {
                deserialize = Some(f.deserialize.ok_or_else(|| {
                    DbError::invalid_definition("deserialize function not provided")
                        .with_field("aggregate", name)
                })?);
            }
            combine
        } else {
            self.check_arg_types(name, &arg_columns, &f.input_types)?;
            let transition = f.transition;
            if transition.strict && f.init_value.is_none() {
                let first_input = arg_columns.first().map(|&col| self.input_types[col]);
                if first_input != Some(f.trans_type) {
                    return Err(DbError::invalid_definition(
                        "aggregate needs to have compatible input type and transition type",
                    )
                    .with_field("aggregate", name)
                    .with_field("transition_type", f.trans_type));
                }
            }
            transition
        };

        let ordered = if call.is_ordered() {
            Some(build_ordered_input(call, &arg_columns)?)
        } else {
            None
        };

        Ok(TransitionInfo {
            aggregate: name,
            func,
            deserialize,
            init_value: f.init_value.clone(),
            trans_type: f.trans_type,
            by_value: f.trans_type.is_pass_by_value(),
            arg_columns,
            ordered,
        })
    }

    /// Check the argument columns against the types a function was resolved
    /// for.
    fn check_arg_types(
        &self,
        name: &'static str,
        arg_columns: &[usize],
        expected: &[DataType],
    ) -> Result<()> {
        if arg_columns.len() != expected.len() {
            return Err(DbError::invalid_definition(
                "wrong number of arguments for aggregate",
            )
            .with_field("aggregate", name)
            .with_field("expected", expected.len())
            .with_field("got", arg_columns.len()));
        }
        for (idx, (&col, &want)) in arg_columns.iter().zip(expected).enumerate() {
            let got = self.input_types[col];
            if got != want {
                return Err(DbError::invalid_definition("aggregate argument has wrong type")
                    .with_field("aggregate", name)
                    .with_field("argument", idx)
                    .with_field("expected", want)
                    .with_field("got", got));
            }
        }
        Ok(())
    }

    fn build_per_aggregate(&self, call: &AggregateCall, trans_idx: usize) -> Result<PerAggregate> {
        let f = &call.function;
        let (serialize, output_type) = if self.split.serialize() {
            if f.trans_type == DataType::Internal {
                let serialize = f.serialize.ok_or_else(|| {
                    DbError::invalid_definition(
                        "serialize function not provided for serialization aggregation",
                    )
                    .with_field("aggregate", f.name)
                })?;
                (Some(serialize), DataType::Binary)
            } else {
                (None, f.trans_type)
            }
        } else {
            (None, f.result_type)
        };

        Ok(PerAggregate {
            name: f.name,
            trans_idx,
            finalize: f.finalize,
            serialize,
            output_type,
        })
    }
}

/// Lay out the buffered tuple for an ordered aggregate.
fn build_ordered_input(call: &AggregateCall, arg_columns: &[usize]) -> Result<OrderedInput> {
    let mut tuple_columns = arg_columns.to_vec();
    let mut keys = Vec::new();

    if call.order_by.is_empty() {
        // DISTINCT without ORDER BY sorts on all arguments.
        keys.extend((0..arg_columns.len()).map(SortKey::asc));
    } else {
        for key in &call.order_by {
            let pos = match tuple_columns.iter().position(|&c| c == key.column) {
                Some(pos) => pos,
                None => {
                    if call.distinct {
                        return Err(DbError::invalid_definition(
                            "in an aggregate with DISTINCT, ORDER BY expressions must appear in argument list",
                        )
                        .with_field("aggregate", call.function.name));
                    }
                    tuple_columns.push(key.column);
                    tuple_columns.len() - 1
                }
            };
            keys.push(SortKey { column: pos, ..*key });
        }
        if call.distinct {
            // Remaining arguments break ties so equal tuples are adjacent.
            for pos in 0..arg_columns.len() {
                if !keys.iter().any(|k| k.column == pos) {
                    keys.push(SortKey::asc(pos));
                }
            }
        }
    }

    Ok(OrderedInput {
        tuple_columns,
        keys,
        num_args: arg_columns.len(),
        distinct: call.distinct,
    })
}

/// If two transitions can share a single state.
fn shares_state(existing: &TransitionInfo, new: &TransitionInfo) -> bool {
    existing.ordered.is_none()
        && new.ordered.is_none()
        && existing.func.name == new.func.name
        && existing.func.strict == new.func.strict
        && existing.arg_columns == new.arg_columns
        && existing.init_value == new.init_value
        && existing.trans_type == new.trans_type
        && existing.deserialize.map(|d| d.name) == new.deserialize.map(|d| d.name)
}
