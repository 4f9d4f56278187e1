//! Resolved aggregate function definitions.
//!
//! An aggregate is described by up to five functions operating on a single
//! transition state value. All functions are resolved once when a plan is
//! built and stored as plain function pointers.

pub mod builtin;

use std::fmt;

use vecagg_error::Result;

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;

/// What a transition or combine function did with the state it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    /// The state was left in place, possibly mutated. No ownership changes.
    SameHandle,
    /// A freshly produced state replacing the previous one. `Null` means the
    /// state transitioned to null.
    NewValue(ScalarValue),
}

/// Advance `state` with one row of arguments. `state` is `Null` when the
/// transition value is null.
pub type TransitionFn = fn(state: &mut ScalarValue, args: &[ScalarValue]) -> Result<Returned>;

/// Produce the final result from a state.
pub type FinalFn = fn(state: &ScalarValue) -> Result<ScalarValue>;

/// Convert a state into its wire representation.
pub type SerializeFn = fn(state: &ScalarValue) -> Result<ScalarValue>;

/// Convert a wire representation back into a state.
pub type DeserializeFn = fn(serialized: &ScalarValue) -> Result<ScalarValue>;

/// A resolved function along with its strictness.
///
/// A strict function is never called with a null argument.
#[derive(Clone, Copy)]
pub struct FunctionHandle<F> {
    pub name: &'static str,
    pub func: F,
    pub strict: bool,
}

impl<F> FunctionHandle<F> {
    pub const fn strict(name: &'static str, func: F) -> Self {
        FunctionHandle {
            name,
            func,
            strict: true,
        }
    }

    pub const fn non_strict(name: &'static str, func: F) -> Self {
        FunctionHandle {
            name,
            func,
            strict: false,
        }
    }
}

impl<F> fmt::Debug for FunctionHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("name", &self.name)
            .field("strict", &self.strict)
            .finish()
    }
}

/// A fully resolved aggregate function.
#[derive(Debug, Clone)]
pub struct AggregateFunction {
    pub name: &'static str,
    pub input_types: Vec<DataType>,
    /// Type of the transition state.
    pub trans_type: DataType,
    /// Type produced by finalization.
    pub result_type: DataType,
    pub transition: FunctionHandle<TransitionFn>,
    pub combine: Option<FunctionHandle<TransitionFn>>,
    pub finalize: Option<FunctionHandle<FinalFn>>,
    pub serialize: Option<FunctionHandle<SerializeFn>>,
    pub deserialize: Option<FunctionHandle<DeserializeFn>>,
    /// Declared initial state. None means the state starts null.
    pub init_value: Option<ScalarValue>,
}

impl AggregateFunction {
    /// Type of the value emitted when producing partial output.
    pub fn partial_type(&self) -> DataType {
        if self.serialize.is_some() {
            DataType::Binary
        } else {
            self.trans_type
        }
    }
}
