//! Run-wide diagnostic counters.
//!
//! A fixed bank of 50 integer counters split by lifetime: indices 0-9 live
//! for the whole run, 10-19 are reset when an event begins, 20-39 when an
//! evolution pass begins, and 40-49 belong to external code and are never
//! reset by the generator. Counters are diagnostics only; nothing in the
//! generator branches on their values.

use serde::Serialize;

/// Number of counters in the bank.
pub const COUNTER_COUNT: usize = 50;

/// Errors returned by counter access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    /// The index is outside `0..50`.
    #[error("counter index {0} out of range (0..{COUNTER_COUNT})")]
    OutOfRange(usize),
}

/// The lifetime group a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CounterScope {
    /// Indices 0-9.
    Run,
    /// Indices 10-19.
    Event,
    /// Indices 20-39.
    Step,
    /// Indices 40-49.
    External,
}

impl CounterScope {
    /// The scope an index belongs to, if it is in range.
    pub const fn of(index: usize) -> Option<Self> {
        match index {
            0..=9 => Some(Self::Run),
            10..=19 => Some(Self::Event),
            20..=39 => Some(Self::Step),
            40..=49 => Some(Self::External),
            _ => None,
        }
    }

    const fn range(self) -> core::ops::Range<usize> {
        match self {
            Self::Run => 0..10,
            Self::Event => 10..20,
            Self::Step => 20..40,
            Self::External => 40..50,
        }
    }
}

/// Named counter indices used by the generator.
pub mod slots {
    /// Generator constructed.
    pub const CONSTRUCTED: usize = 0;
    /// Initialization begun.
    pub const INIT_BEGUN: usize = 1;
    /// Initialization completed.
    pub const INIT_DONE: usize = 2;
    /// Event generation begun.
    pub const GENERATION_BEGUN: usize = 3;
    /// Event accepted.
    pub const ACCEPTED: usize = 4;
    /// Event discarded by a hook.
    pub const VETOED: usize = 5;

    /// Hard-process selection begun.
    pub const PROCESS_BEGUN: usize = 10;
    /// Hard-process selection completed.
    pub const PROCESS_DONE: usize = 11;
    /// Survived the process-level hook.
    pub const PROCESS_SURVIVED: usize = 12;
    /// Survived every hook.
    pub const EVENT_SURVIVED: usize = 13;
    /// Parton-level evolution begun.
    pub const PARTON_BEGUN: usize = 14;
    /// Parton-level evolution completed.
    pub const PARTON_DONE: usize = 15;
    /// Survived the parton-level hook.
    pub const PARTON_SURVIVED: usize = 16;

    /// Subsystem most recently committed to.
    pub const CURRENT_SYSTEM: usize = 20;
    /// Evolution passes begun.
    pub const PASSES: usize = 21;
    /// Scheduler steps begun.
    pub const STEPS_BEGUN: usize = 22;
    /// Additional collisions selected.
    pub const COLLISION_SELECTED: usize = 23;
    /// Incoming branchings selected.
    pub const INCOMING_SELECTED: usize = 24;
    /// Outgoing branchings selected.
    pub const OUTGOING_SELECTED: usize = 25;
    /// Additional collisions kept after hooks.
    pub const COLLISION_ACCEPTED: usize = 26;
    /// Incoming branchings kept after hooks.
    pub const INCOMING_ACCEPTED: usize = 27;
    /// Outgoing branchings kept after hooks.
    pub const OUTGOING_ACCEPTED: usize = 28;
    /// Deferred or resonance steps begun.
    pub const LATE_BEGUN: usize = 29;
    /// Deferred or resonance branchings selected.
    pub const LATE_SELECTED: usize = 30;
    /// Deferred or resonance branchings kept after hooks.
    pub const LATE_ACCEPTED: usize = 31;

    /// First index reserved for external code.
    pub const EXTERNAL_FIRST: usize = 40;
}

/// The counter bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counters {
    values: Vec<i64>,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    /// A bank of zeroed counters.
    pub fn new() -> Self {
        Self {
            values: vec![0; COUNTER_COUNT],
        }
    }

    /// Read counter `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::OutOfRange`] for an index outside `0..50`.
    pub fn get(&self, index: usize) -> Result<i64, CounterError> {
        self.values
            .get(index)
            .copied()
            .ok_or(CounterError::OutOfRange(index))
    }

    /// Overwrite counter `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::OutOfRange`] for an index outside `0..50`.
    pub fn set(&mut self, index: usize, value: i64) -> Result<(), CounterError> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(CounterError::OutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    /// Add `delta` to counter `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::OutOfRange`] for an index outside `0..50`.
    pub fn add(&mut self, index: usize, delta: i64) -> Result<(), CounterError> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(CounterError::OutOfRange(index))?;
        *slot = slot.saturating_add(delta);
        Ok(())
    }

    /// Zero every counter of one scope.
    pub fn reset_scope(&mut self, scope: CounterScope) {
        for slot in self.values.iter_mut().take(scope.range().end).skip(scope.range().start) {
            *slot = 0;
        }
    }

    /// Increment a counter the generator owns. Indices come from [`slots`].
    pub(crate) fn bump(&mut self, index: usize) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = slot.saturating_add(1);
        }
    }

    /// Overwrite a counter the generator owns. Indices come from [`slots`].
    pub(crate) fn record(&mut self, index: usize, value: i64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// All counter values in index order.
    pub fn as_slice(&self) -> &[i64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn get_set_add() {
        let mut counters = Counters::new();
        counters.set(41, 5).unwrap();
        counters.add(41, 3).unwrap();
        assert_eq!(counters.get(41).unwrap(), 8);
        assert_eq!(counters.get(0).unwrap(), 0);
    }

    #[test]
    fn out_of_range_is_error() {
        let mut counters = Counters::new();
        assert_eq!(counters.get(50), Err(CounterError::OutOfRange(50)));
        assert_eq!(counters.set(99, 1), Err(CounterError::OutOfRange(99)));
        assert_eq!(counters.add(50, 1), Err(CounterError::OutOfRange(50)));
    }

    #[test]
    fn reset_scope_touches_only_its_range() {
        let mut counters = Counters::new();
        for index in [slots::ACCEPTED, slots::PROCESS_BEGUN, slots::STEPS_BEGUN, 45] {
            counters.add(index, 2).unwrap();
        }
        counters.reset_scope(CounterScope::Step);
        assert_eq!(counters.get(slots::STEPS_BEGUN).unwrap(), 0);
        assert_eq!(counters.get(slots::PROCESS_BEGUN).unwrap(), 2);

        counters.reset_scope(CounterScope::Event);
        assert_eq!(counters.get(slots::PROCESS_BEGUN).unwrap(), 0);
        assert_eq!(counters.get(slots::ACCEPTED).unwrap(), 2);
        assert_eq!(counters.get(45).unwrap(), 2);
    }

    #[test]
    fn scope_of_index() {
        assert_eq!(CounterScope::of(9), Some(CounterScope::Run));
        assert_eq!(CounterScope::of(10), Some(CounterScope::Event));
        assert_eq!(CounterScope::of(39), Some(CounterScope::Step));
        assert_eq!(CounterScope::of(slots::EXTERNAL_FIRST), Some(CounterScope::External));
        assert_eq!(CounterScope::of(50), None);
    }
}
