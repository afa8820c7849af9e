//! Branching engines that compete for the next step of an evolving event.
//!
//! Both engines here implement [`BranchingSource`]: given a ceiling and a
//! floor on the evolution scale, each proposes the scale of its own next
//! branching, and only the winner of the comparison is asked to commit.
//! The additional-collision source in `interleave-core` implements the same
//! contract.
//!
//! # Modules
//!
//! - [`source`] -- The [`BranchingSource`] contract and the shared
//!   [`EvolutionState`].
//! - [`sudakov`] -- Veto-algorithm trial generation and splitting kernels.
//! - [`outgoing`] -- [`OutgoingShower`], dipole-style final-state branchings.
//! - [`incoming`] -- [`IncomingShower`], backward initial-state branchings.
//! - [`density`] -- The [`PartonDensity`] collaborator and a toy proton.
//! - [`config`] -- Tunables for both engines.

pub mod config;
pub mod density;
pub mod incoming;
pub mod outgoing;
pub mod source;
pub mod sudakov;

// Re-export primary types at crate root.
pub use config::{IncomingConfig, OutgoingConfig};
pub use density::{DensityShape, PartonDensity, ToyDensity};
pub use incoming::{IncomingShower, beam_fraction_used, momentum_fraction};
pub use outgoing::OutgoingShower;
pub use source::{Branching, BranchingSource, CommitOutcome, EvolutionState, RandomStream};

use interleave_record::RecordError;
use interleave_types::SourceKind;

/// Errors raised while a source commits a branching.
///
/// A branching that is merely infeasible is not an error; sources report
/// it as [`CommitOutcome::Refused`].
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    /// The record or registry rejected a mutation.
    #[error("record error: {source}")]
    Record {
        /// The underlying record error.
        #[from]
        source: RecordError,
    },

    /// Commit was called without a pending candidate.
    #[error("{kind} source has no pending candidate to commit")]
    NoCandidate {
        /// The source that was asked to commit.
        kind: SourceKind,
    },
}
