use indexmap::IndexMap;
use std::fmt;

/// Provenance of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueState {
    #[default]
    NotSet,
    Default,
    ExplicitlySet,
}

impl fmt::Display for ValueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueState::NotSet => "NOT_SET",
            ValueState::Default => "DEFAULT",
            ValueState::ExplicitlySet => "EXPLICITLY_SET",
        })
    }
}

/// Per-node ledger of field states. Fields absent from the ledger are
/// `NotSet`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueStateTracker {
    states: IndexMap<String, ValueState>,
}

impl ValueStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> ValueState {
        self.states.get(field).copied().unwrap_or_default()
    }

    pub fn mark_explicit(&mut self, field: &str) {
        self.states
            .insert(field.to_string(), ValueState::ExplicitlySet);
    }

    pub fn mark_default(&mut self, field: &str) {
        self.states.insert(field.to_string(), ValueState::Default);
    }

    /// Returns the field to `NotSet` whatever its prior state.
    pub fn reset(&mut self, field: &str) {
        self.states.shift_remove(field);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Whether any tracked field counts as set.
    pub fn any_set(&self, allow_default: bool) -> bool {
        self.states.values().any(|s| match s {
            ValueState::ExplicitlySet => true,
            ValueState::Default => allow_default,
            ValueState::NotSet => false,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ValueState)> {
        self.states.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_not_set() {
        let tracker = ValueStateTracker::new();
        assert_eq!(tracker.get("anything"), ValueState::NotSet);
        assert!(!tracker.any_set(true));
    }

    #[test]
    fn transitions_follow_the_three_state_machine() {
        let mut tracker = ValueStateTracker::new();
        tracker.mark_default("value");
        assert_eq!(tracker.get("value"), ValueState::Default);
        assert!(!tracker.any_set(false));
        assert!(tracker.any_set(true));

        tracker.mark_explicit("value");
        assert_eq!(tracker.get("value"), ValueState::ExplicitlySet);
        assert!(tracker.any_set(false));

        tracker.reset("value");
        assert_eq!(tracker.get("value"), ValueState::NotSet);
        assert_eq!(tracker.iter().count(), 0);
    }

    #[test]
    fn display_uses_upper_snake_case() {
        assert_eq!(ValueState::ExplicitlySet.to_string(), "EXPLICITLY_SET");
        assert_eq!(ValueState::NotSet.to_string(), "NOT_SET");
    }
}
