//! Event history record and subsystem registry.
//!
//! Every particle produced while an event evolves is appended here and never
//! removed or reordered. Branchings only ever append new entries and rewrite
//! the status, relative and colour fields of existing ones, which is what
//! makes single-branching rollback cheap: a checkpoint remembers the record
//! length plus the original value of every existing entry it touched.
//!
//! # Architecture
//!
//! - [`record`] -- The [`EventRecord`] arena with checkpoint journal and listing.
//! - [`builder`] -- The [`ParticleBuilder`] for validated particle construction.
//! - [`systems`] -- The [`SubsystemRegistry`] grouping particles by subcollision.
//! - [`consistency`] -- History, registry and conservation verification.
//!
//! # Invariants
//!
//! - Index 0 is the system entry; indices 1 and 2 are the beams when present.
//! - A particle with negative status has daughters, all appended after it.
//! - Registry outgoing sets only contain live (positive-status) particles.
//!
//! # Usage
//!
//! ```
//! use interleave_record::{EventRecord, ParticleBuilder};
//! use interleave_types::{FourMomentum, status};
//!
//! let mut record = EventRecord::new();
//! let gluon = ParticleBuilder::new(21, status::HARD_OUTGOING)
//!     .momentum(FourMomentum::new(0.0, 10.0, 0.0, 10.0))
//!     .colours(101, 102)
//!     .build();
//! assert!(gluon.is_ok());
//! let index = gluon.and_then(|p| record.append(p));
//! assert!(index.is_ok());
//! assert_eq!(record.len(), 2);
//! ```

pub mod builder;
pub mod consistency;
pub mod record;
pub mod systems;

// Re-export primary types at crate root.
pub use builder::ParticleBuilder;
pub use consistency::{ConsistencyResult, Violation, verify_event};
pub use record::EventRecord;
pub use systems::{Subsystem, SubsystemRegistry};

use interleave_types::{ParticleIndex, SubsystemId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when reading or mutating the record or registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The index does not refer to an existing particle.
    #[error("particle index {index} out of range (record holds {len})")]
    UnknownParticle {
        /// The offending index.
        index: ParticleIndex,
        /// Current record length.
        len: usize,
    },

    /// The subsystem id does not exist.
    #[error("unknown subsystem {0}")]
    UnknownSubsystem(SubsystemId),

    /// The particle is not an outgoing member of the subsystem.
    #[error("particle {index} is not outgoing in subsystem {system}")]
    NotInSubsystem {
        /// The particle that was looked up.
        index: ParticleIndex,
        /// The subsystem it was expected in.
        system: SubsystemId,
    },

    /// A particle failed validation.
    #[error("invalid particle: {0}")]
    InvalidParticle(&'static str),

    /// A checkpoint is already open.
    #[error("a checkpoint is already open")]
    CheckpointAlreadyOpen,

    /// No checkpoint is open.
    #[error("no checkpoint is open")]
    NoCheckpoint,
}
