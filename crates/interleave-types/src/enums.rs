//! Enumeration types shared by the engines, the scheduler and hook policies.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Branching sources
// ---------------------------------------------------------------------------

/// The kind of competing branching source.
///
/// Declaration order is the tie-break priority: when two sources propose
/// exactly the same scale, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Final-state branchings of outgoing particles.
    Outgoing,
    /// Backward branchings of incoming particles.
    Incoming,
    /// Additional hard subcollisions.
    Collision,
}

impl SourceKind {
    /// All kinds in priority order.
    pub const ALL: [Self; 3] = [Self::Outgoing, Self::Incoming, Self::Collision];

    /// Tie-break rank; lower wins.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Outgoing => 0,
            Self::Incoming => 1,
            Self::Collision => 2,
        }
    }
}

impl core::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Collision => "collision",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Hook points
// ---------------------------------------------------------------------------

/// The fixed points at which external policy code may intervene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HookPoint {
    /// Hard process selected, before any evolution. The only point with
    /// write access to the record.
    ProcessLevel,
    /// All evolution complete.
    PartonLevel,
    /// Evolution has dropped below a configured scale.
    ScaleThreshold,
    /// After each of the first N branchings of the hardest subsystem.
    StepCount,
    /// After each of the first N additional collisions.
    CollisionStepCount,
    /// Single incoming branching just committed; may be rolled back.
    IncomingEmission,
    /// Single outgoing branching just committed; may be rolled back.
    OutgoingEmission,
    /// Multiplicative reweighting of the event weight.
    CrossSectionReweight,
    /// Starting scale of the evolution inside a resonance decay.
    ResonanceScale,
}

impl core::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::ProcessLevel => "process-level",
            Self::PartonLevel => "parton-level",
            Self::ScaleThreshold => "scale-threshold",
            Self::StepCount => "step-count",
            Self::CollisionStepCount => "collision-step-count",
            Self::IncomingEmission => "incoming-emission",
            Self::OutgoingEmission => "outgoing-emission",
            Self::CrossSectionReweight => "cross-section-reweight",
            Self::ResonanceScale => "resonance-scale",
        };
        f.write_str(name)
    }
}

/// Where the evolution stood when the scale-threshold hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VetoPosition {
    /// Nothing was committed above the threshold.
    Start,
    /// The last commit was an additional collision.
    Collision,
    /// The last commit was an incoming branching.
    Incoming,
    /// The last commit was an outgoing branching.
    Outgoing,
    /// Deferred, non-interleaved outgoing evolution.
    Deferred,
    /// Outgoing evolution inside a resonance decay subsystem.
    Resonance,
}

impl VetoPosition {
    /// Numeric position code, 0 through 5.
    pub const fn code(self) -> u8 {
        match self {
            Self::Start => 0,
            Self::Collision => 1,
            Self::Incoming => 2,
            Self::Outgoing => 3,
            Self::Deferred => 4,
            Self::Resonance => 5,
        }
    }

    /// Position corresponding to a commit by the given source kind.
    pub const fn after(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Outgoing => Self::Outgoing,
            SourceKind::Incoming => Self::Incoming,
            SourceKind::Collision => Self::Collision,
        }
    }
}

// ---------------------------------------------------------------------------
// Beams
// ---------------------------------------------------------------------------

/// One of the two incoming beams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BeamSide {
    /// Beam moving along `+z`, record index 1.
    A,
    /// Beam moving along `-z`, record index 2.
    B,
}

impl BeamSide {
    /// Both sides.
    pub const BOTH: [Self; 2] = [Self::A, Self::B];

    /// Direction along the beam axis.
    pub const fn sign(self) -> f64 {
        match self {
            Self::A => 1.0,
            Self::B => -1.0,
        }
    }

    /// The opposite beam.
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Record index of the beam particle.
    pub const fn record_index(self) -> usize {
        match self {
            Self::A => 1,
            Self::B => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_priority_follows_declaration_order() {
        let mut kinds = vec![SourceKind::Collision, SourceKind::Outgoing, SourceKind::Incoming];
        kinds.sort();
        assert_eq!(kinds, SourceKind::ALL.to_vec());
        assert!(SourceKind::Outgoing.priority() < SourceKind::Incoming.priority());
        assert!(SourceKind::Incoming.priority() < SourceKind::Collision.priority());
    }

    #[test]
    fn veto_position_codes() {
        assert_eq!(VetoPosition::Start.code(), 0);
        assert_eq!(VetoPosition::after(SourceKind::Collision).code(), 1);
        assert_eq!(VetoPosition::after(SourceKind::Incoming).code(), 2);
        assert_eq!(VetoPosition::after(SourceKind::Outgoing).code(), 3);
        assert_eq!(VetoPosition::Resonance.code(), 5);
    }

    #[test]
    fn beam_sides_are_opposite() {
        assert_eq!(BeamSide::A.other(), BeamSide::B);
        assert!(BeamSide::A.sign() > 0.0);
        assert!(BeamSide::B.sign() < 0.0);
        assert_eq!(BeamSide::B.record_index(), 2);
    }
}
