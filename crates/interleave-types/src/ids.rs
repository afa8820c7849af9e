//! Type-safe identifiers.
//!
//! Particles and subsystems live in append-only arenas and are addressed by
//! integer handles. Each handle gets its own newtype so that a particle index
//! can never be passed where a subsystem id is expected. Runs are tagged with
//! a UUID v7 for log correlation across parallel generator instances.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a `usize` arena handle.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            /// Wrap a raw arena position.
            pub const fn new(raw: usize) -> Self {
                Self(raw)
            }

            /// Return the raw arena position.
            pub const fn get(self) -> usize {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            fn from(raw: usize) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_index! {
    /// Position of a particle in the event record.
    ///
    /// Index 0 is the system pseudo-particle, so a zero index in a mother or
    /// daughter slot means "no relative".
    ParticleIndex
}

define_index! {
    /// Identifier of a scattering subsystem, assigned in creation order.
    SubsystemId
}

impl ParticleIndex {
    /// The "no relative" marker used in mother/daughter slots.
    pub const NONE: Self = Self(0);

    /// Returns `true` if this is the "no relative" marker.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Unique identifier for one generator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_index_is_zero() {
        assert!(ParticleIndex::NONE.is_none());
        assert!(!ParticleIndex::new(3).is_none());
        assert_eq!(ParticleIndex::default(), ParticleIndex::NONE);
    }

    #[test]
    fn index_serializes_as_bare_integer() {
        let json = serde_json::to_string(&SubsystemId::new(4)).ok();
        assert_eq!(json.as_deref(), Some("4"));
    }

    #[test]
    fn run_ids_are_distinct() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.into_inner().to_string());
    }
}
