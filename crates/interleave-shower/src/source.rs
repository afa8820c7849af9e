//! The uniform contract every competing branching source implements.
//!
//! The scheduler never looks inside a source. It asks each one for the
//! scale of its next candidate below a ceiling, compares the scales, and
//! tells the winner to commit. Everything a source needs to finish the
//! branching later (which dipole end, which energy sharing, which azimuth)
//! stays private to the source until then.
//!
//! # Lifecycle per evolution pass
//!
//! 1. [`BranchingSource::begin_event`] once per event.
//! 2. [`BranchingSource::prepare`] for each subsystem the source should
//!    evolve; again for any subsystem a commit changed or created.
//! 3. Repeated [`BranchingSource::next_candidate`] /
//!    [`BranchingSource::commit`] / [`BranchingSource::discard`].
//! 4. [`BranchingSource::refresh`] after a rollback, which drops every
//!    cached quantity and rebuilds it from the restored state.

use rand::rngs::SmallRng;

use interleave_record::{EventRecord, RecordError, SubsystemRegistry};
use interleave_types::{ParticleIndex, SourceKind, SubsystemId};

use crate::EvolutionError;

/// The random stream owned by one generator instance.
pub type RandomStream = SmallRng;

// ---------------------------------------------------------------------------
// Shared evolution state
// ---------------------------------------------------------------------------

/// The record and registry of the event being evolved.
///
/// Checkpoints cover both: the record journals touched entries and the
/// registry is snapshotted whole.
#[derive(Debug, Clone, Default)]
pub struct EvolutionState {
    /// The event history.
    pub record: EventRecord,
    /// The subsystem membership.
    pub systems: SubsystemRegistry,
    saved_systems: Option<SubsystemRegistry>,
}

impl EvolutionState {
    /// Wrap a record and registry.
    pub const fn new(record: EventRecord, systems: SubsystemRegistry) -> Self {
        Self {
            record,
            systems,
            saved_systems: None,
        }
    }

    /// Open a checkpoint before a single commit.
    pub fn begin_checkpoint(&mut self) -> Result<(), RecordError> {
        self.record.begin_checkpoint()?;
        self.saved_systems = Some(self.systems.clone());
        Ok(())
    }

    /// Undo the commit since the checkpoint.
    pub fn rollback(&mut self) -> Result<usize, RecordError> {
        let removed = self.record.rollback()?;
        if let Some(saved) = self.saved_systems.take() {
            self.systems = saved;
        }
        Ok(removed)
    }

    /// Keep the commit since the checkpoint.
    pub fn release(&mut self) -> Result<(), RecordError> {
        self.saved_systems = None;
        self.record.release()
    }

    /// Give back the record and registry.
    pub fn into_parts(self) -> (EventRecord, SubsystemRegistry) {
        (self.record, self.systems)
    }
}

// ---------------------------------------------------------------------------
// Commit results
// ---------------------------------------------------------------------------

/// What a successful commit did.
#[derive(Debug, Clone, PartialEq)]
pub struct Branching {
    /// The source that committed.
    pub kind: SourceKind,
    /// The subsystem the branching belongs to.
    pub system: SubsystemId,
    /// The evolution scale of the branching.
    pub scale: f64,
    /// Entries appended to the record, in order.
    pub appended: Vec<ParticleIndex>,
    /// Subsystems whose membership changed, including a new one.
    pub touched: Vec<SubsystemId>,
    /// The subsystem created by this commit, if any.
    pub created: Option<SubsystemId>,
}

/// The result of asking a source to commit its pending candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The branching was applied to the record and registry.
    Committed(Branching),
    /// Exact kinematics turned out infeasible; nothing was changed.
    Refused {
        /// Why the branching could not be completed.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// The source contract
// ---------------------------------------------------------------------------

/// A competing generator of branchings ordered by a common evolution scale.
pub trait BranchingSource: Send {
    /// Which kind of source this is; fixes its tie-break priority.
    fn kind(&self) -> SourceKind;

    /// Per-event setup before any subsystem is prepared.
    fn begin_event(&mut self, _state: &EvolutionState, _rng: &mut RandomStream) {}

    /// (Re)build the cached branching ends of one subsystem.
    fn prepare(&mut self, system: SubsystemId, state: &EvolutionState);

    /// Forget every prepared subsystem and any pending candidate.
    fn reset(&mut self);

    /// Subsystems currently prepared.
    fn tracked_systems(&self) -> Vec<SubsystemId>;

    /// Drop all cached quantities and rebuild them from `state`.
    fn refresh(&mut self, state: &EvolutionState) {
        let systems = self.tracked_systems();
        self.reset();
        for system in systems {
            self.prepare(system, state);
        }
    }

    /// Sample the next candidate scale in `(floor, ceiling]`.
    ///
    /// Returns `None` when nothing is found above `floor`. A returned scale
    /// becomes the pending candidate until the next call, a commit or a
    /// discard.
    fn next_candidate(
        &mut self,
        ceiling: f64,
        floor: f64,
        state: &EvolutionState,
        rng: &mut RandomStream,
    ) -> Option<f64>;

    /// Apply the pending candidate.
    fn commit(
        &mut self,
        state: &mut EvolutionState,
        rng: &mut RandomStream,
    ) -> Result<CommitOutcome, EvolutionError>;

    /// Drop the pending candidate without applying it.
    fn discard(&mut self);
}
