//! Shared type definitions for the interleaved event evolution engine.
//!
//! Everything downstream (the event record, the branching engines, the
//! scheduler and the run driver) speaks in terms of the types defined here.
//!
//! # Modules
//!
//! - [`ids`] -- Typed arena handles for particles and subsystems, run ids
//! - [`momentum`] -- Four-momentum arithmetic and Lorentz boosts
//! - [`particle`] -- The particle record, status codes, identity codes
//! - [`enums`] -- Source kinds, hook points, veto positions, beam sides

pub mod enums;
pub mod ids;
pub mod momentum;
pub mod particle;

// Re-export all public types at crate root for convenience.
pub use enums::{BeamSide, HookPoint, SourceKind, VetoPosition};
pub use ids::{ParticleIndex, RunId, SubsystemId};
pub use momentum::FourMomentum;
pub use particle::{Particle, codes, expand_pair, status};
