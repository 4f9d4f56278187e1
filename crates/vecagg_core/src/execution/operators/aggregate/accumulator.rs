use crate::arrays::row::ScalarRow;
use crate::arrays::scalar::ScalarValue;

use super::transition::TransitionInfo;

/// Accounting arena for by-reference transition values.
///
/// One scope exists per accumulator lifetime: per grouping set on the sorted
/// path, per hash table on the hashed path. Values are owned by their
/// transition states, the scope tracks what it currently holds so that a
/// reset releases everything adopted since the last reset.
#[derive(Debug, Default)]
pub struct MemoryScope {
    live_values: usize,
    allocated_bytes: usize,
    total_adopted: usize,
    total_released: usize,
}

impl MemoryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a value produced by a transition function.
    pub fn adopt(&mut self, value: &ScalarValue) {
        self.live_values += 1;
        self.total_adopted += 1;
        self.allocated_bytes += value.heap_size();
    }

    /// Release a value previously adopted.
    pub fn release(&mut self, value: &ScalarValue) {
        self.live_values = self.live_values.saturating_sub(1);
        self.total_released += 1;
        self.allocated_bytes = self.allocated_bytes.saturating_sub(value.heap_size());
    }

    /// Account for a value that grew or shrank in place.
    pub fn resize(&mut self, before: usize, after: usize) {
        self.allocated_bytes = (self.allocated_bytes + after).saturating_sub(before);
    }

    /// Drop everything held by this scope.
    pub fn reset(&mut self) {
        self.total_released += self.live_values;
        self.live_values = 0;
        self.allocated_bytes = 0;
    }

    pub fn live_values(&self) -> usize {
        self.live_values
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub fn total_adopted(&self) -> usize {
        self.total_adopted
    }

    pub fn total_released(&self) -> usize {
        self.total_released
    }
}

/// Transition value for one aggregate in one group.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionState {
    /// Current value, `Null` whenever `is_null` is set.
    pub value: ScalarValue,
    pub is_null: bool,
    /// False until the state was seeded or transitioned. A strict function
    /// without an initial value seeds from its first non-null input.
    pub has_value: bool,
}

impl TransitionState {
    pub fn initialize(info: &TransitionInfo, scope: &mut MemoryScope) -> Self {
        match &info.init_value {
            Some(init) => {
                let value = init.clone();
                if !info.by_value && !value.is_null() {
                    scope.adopt(&value);
                }
                TransitionState {
                    is_null: value.is_null(),
                    value,
                    has_value: true,
                }
            }
            None => TransitionState {
                value: ScalarValue::Null,
                is_null: true,
                has_value: false,
            },
        }
    }
}

/// Transition states for every transition in one logical group.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorArray {
    pub states: Vec<TransitionState>,
    /// Buffered input tuples for DISTINCT/ORDER BY transitions, empty for
    /// the others.
    pub ordered_inputs: Vec<Vec<ScalarRow>>,
}

impl AccumulatorArray {
    pub fn new(transitions: &[TransitionInfo], scope: &mut MemoryScope) -> Self {
        AccumulatorArray {
            states: transitions
                .iter()
                .map(|info| TransitionState::initialize(info, scope))
                .collect(),
            ordered_inputs: vec![Vec::new(); transitions.len()],
        }
    }

    /// Reinitialize all states in place.
    pub fn reset(&mut self, transitions: &[TransitionInfo], scope: &mut MemoryScope) {
        for ((state, ordered), info) in self
            .states
            .iter_mut()
            .zip(self.ordered_inputs.iter_mut())
            .zip(transitions)
        {
            *state = TransitionState::initialize(info, scope);
            ordered.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_accounting() {
        let mut scope = MemoryScope::new();
        let a = ScalarValue::from("hello");
        scope.adopt(&a);
        scope.adopt(&a);
        assert_eq!(2, scope.live_values());
        scope.release(&a);
        assert_eq!(1, scope.live_values());

        scope.reset();
        assert_eq!(0, scope.live_values());
        assert_eq!(0, scope.allocated_bytes());
        assert_eq!(2, scope.total_adopted());
        assert_eq!(2, scope.total_released());
    }
}
