//! Interleaved evolution of collision events.
//!
//! This crate drives the competition between the branching sources of
//! `interleave-shower` and the additional-collision source defined here,
//! exposes the veto hooks, and wraps everything in a per-event
//! [`Generator`].
//!
//! # Modules
//!
//! - [`evolution`] -- [`Scheduler`], one evolution pass between a ceiling
//!   and a floor with hook dispatch and rollback.
//! - [`generator`] -- [`Generator`], the per-event driver, and
//!   [`RunStatistics`].
//! - [`hooks`] -- [`HookSet`], the veto hook capability set, and the
//!   `sub_event` helper.
//! - [`policy`] -- Demonstration hook policies built from configuration.
//! - [`collisions`] -- [`ImpactParameterCollisions`], the toy
//!   additional-collision source.
//! - [`process`] -- The [`ProcessSource`] collaborator and toy processes.
//! - [`counters`] -- Fifty diagnostic counters in four scopes.
//! - [`header`] -- Ordered key/value run headers.
//! - [`config`] -- Configuration loading from `interleave-config.yaml`.
//!
//! [`ProcessSource`]: process::ProcessSource

pub mod collisions;
pub mod config;
pub mod counters;
pub mod evolution;
pub mod generator;
pub mod header;
pub mod hooks;
pub mod policy;
pub mod process;

// Re-export primary types at crate root.
pub use collisions::ImpactParameterCollisions;
pub use config::{ConfigError, GeneratorConfig};
pub use counters::{CounterError, CounterScope, Counters};
pub use evolution::{
    AdvanceOutcome, CommittedStep, EvolutionContext, PassKind, Scheduler, StepCounts,
};
pub use generator::{
    Components, Event, EventOutcome, GenerateError, Generator, InitError, RunStatistics,
};
pub use header::HeaderStore;
pub use hooks::{EmissionVerdict, EventView, HookSet, Intervention, Verdict};
pub use policy::policy_hooks;
