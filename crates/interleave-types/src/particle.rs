//! The particle record stored in the event history.
//!
//! A particle carries its identity code, kinematics, colour tags, status
//! and two ordered pairs of relatives. Relative pairs follow a compact
//! convention:
//!
//! | Pair | Meaning |
//! |------|---------|
//! | `(0, 0)` | no relatives |
//! | `(a, 0)` or `(a, a)` | the single relative `a` |
//! | `(a, b)` with `a < b` | the contiguous range `a..=b` |
//! | `(a, b)` with `a > b > 0` | the two relatives `a` and `b` |

use serde::{Deserialize, Serialize};

use crate::ids::ParticleIndex;
use crate::momentum::FourMomentum;

/// Status codes used by the record and the evolution engines.
///
/// Positive codes mark live final-state particles, negative codes mark
/// particles that are superseded, decayed or otherwise not final.
pub mod status {
    /// System pseudo-particle at index 0.
    pub const SYSTEM: i32 = -11;
    /// Incoming beam particle.
    pub const BEAM: i32 = -12;
    /// Incoming parton of the hardest process.
    pub const HARD_INCOMING: i32 = -21;
    /// Resonance produced in the hardest process, decayed.
    pub const RESONANCE: i32 = -22;
    /// Outgoing parton of the hardest process.
    pub const HARD_OUTGOING: i32 = 23;
    /// Incoming parton of an additional collision.
    pub const COLLISION_INCOMING: i32 = -31;
    /// Outgoing parton of an additional collision.
    pub const COLLISION_OUTGOING: i32 = 33;
    /// Outgoing parton reused as the incoming parton of a later collision.
    pub const RESCATTERED: i32 = -34;
    /// New initiator created by an incoming branching.
    pub const INITIATOR: i32 = -41;
    /// Sibling emitted into the final state by an incoming branching.
    pub const SIBLING: i32 = 43;
    /// Outgoing particle copied to absorb the recoil of an incoming branching.
    pub const INCOMING_RECOIL: i32 = 44;
    /// Daughter of an outgoing branching.
    pub const EMISSION: i32 = 51;
    /// Recoiler copy of an outgoing branching.
    pub const OUTGOING_RECOIL: i32 = 52;
}

/// Identity codes used by the toy processes and the branching kernels.
pub mod codes {
    /// Identity code of the system pseudo-particle.
    pub const SYSTEM: i32 = 90;
    /// Gluon.
    pub const GLUON: i32 = 21;
    /// Proton beam.
    pub const PROTON: i32 = 2212;
    /// Neutral weak boson used as the toy resonance.
    pub const Z_BOSON: i32 = 23;
    /// Heaviest quark flavour code treated as a parton.
    pub const MAX_QUARK: i32 = 6;
}

/// One entry in the event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Identity code; sign distinguishes particle from antiparticle.
    pub id: i32,
    /// Status code (see [`status`]).
    pub status: i32,
    /// Ordered mother pair.
    pub mothers: (ParticleIndex, ParticleIndex),
    /// Ordered daughter pair.
    pub daughters: (ParticleIndex, ParticleIndex),
    /// Colour tag, 0 if none.
    pub colour: u32,
    /// Anticolour tag, 0 if none.
    pub anticolour: u32,
    /// Four-momentum.
    pub momentum: FourMomentum,
    /// Rest mass.
    pub mass: f64,
    /// Evolution scale at which the particle was produced; 0 means it may
    /// not branch further.
    pub scale: f64,
}

impl Particle {
    /// A bare particle with no relatives, colours or scale.
    pub const fn new(id: i32, status: i32, momentum: FourMomentum) -> Self {
        Self {
            id,
            status,
            mothers: (ParticleIndex::NONE, ParticleIndex::NONE),
            daughters: (ParticleIndex::NONE, ParticleIndex::NONE),
            colour: 0,
            anticolour: 0,
            momentum,
            mass: 0.0,
            scale: 0.0,
        }
    }

    /// Returns `true` for a current final-state member of the history.
    pub const fn is_final(&self) -> bool {
        self.status > 0
    }

    /// Returns `true` for a gluon.
    pub const fn is_gluon(&self) -> bool {
        self.id == codes::GLUON
    }

    /// Returns `true` for a quark or antiquark.
    pub const fn is_quark(&self) -> bool {
        self.id != 0 && self.id.abs() <= codes::MAX_QUARK
    }

    /// Returns `true` for anything that carries colour charge.
    pub const fn is_parton(&self) -> bool {
        self.is_gluon() || self.is_quark()
    }

    /// Colour representation implied by the identity code: 0 singlet,
    /// 1 triplet, -1 antitriplet, 2 octet.
    pub const fn colour_type(&self) -> i8 {
        if self.is_gluon() {
            2
        } else if self.is_quark() {
            if self.id > 0 { 1 } else { -1 }
        } else {
            0
        }
    }

    /// Returns `true` if the colour tags agree with [`Self::colour_type`].
    pub const fn colours_match_type(&self) -> bool {
        match self.colour_type() {
            0 => self.colour == 0 && self.anticolour == 0,
            1 => self.colour > 0 && self.anticolour == 0,
            -1 => self.colour == 0 && self.anticolour > 0,
            _ => self.colour > 0 && self.anticolour > 0,
        }
    }

    /// Expanded list of daughters.
    pub fn daughter_list(&self) -> Vec<ParticleIndex> {
        expand_pair(self.daughters)
    }

    /// Expanded list of mothers.
    pub fn mother_list(&self) -> Vec<ParticleIndex> {
        expand_pair(self.mothers)
    }
}

/// Expand a relative pair into the indices it denotes.
pub fn expand_pair(pair: (ParticleIndex, ParticleIndex)) -> Vec<ParticleIndex> {
    let (first, second) = pair;
    if first.is_none() {
        return if second.is_none() { Vec::new() } else { vec![second] };
    }
    if second.is_none() || second == first {
        return vec![first];
    }
    if first < second {
        (first.get()..=second.get()).map(ParticleIndex::new).collect()
    } else {
        vec![first, second]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: usize, b: usize) -> (ParticleIndex, ParticleIndex) {
        (ParticleIndex::new(a), ParticleIndex::new(b))
    }

    #[test]
    fn relative_pair_conventions() {
        assert!(expand_pair(pair(0, 0)).is_empty());
        assert_eq!(expand_pair(pair(4, 0)), vec![ParticleIndex::new(4)]);
        assert_eq!(expand_pair(pair(4, 4)), vec![ParticleIndex::new(4)]);
        assert_eq!(expand_pair(pair(4, 6)).len(), 3);
        assert_eq!(
            expand_pair(pair(7, 3)),
            vec![ParticleIndex::new(7), ParticleIndex::new(3)]
        );
    }

    #[test]
    fn colour_types() {
        let mut quark = Particle::new(2, 23, FourMomentum::default());
        assert_eq!(quark.colour_type(), 1);
        assert!(!quark.colours_match_type());
        quark.colour = 101;
        assert!(quark.colours_match_type());

        let antiquark = Particle::new(-1, 23, FourMomentum::default());
        assert_eq!(antiquark.colour_type(), -1);

        let gluon = Particle::new(codes::GLUON, 23, FourMomentum::default());
        assert_eq!(gluon.colour_type(), 2);

        let boson = Particle::new(codes::Z_BOSON, -22, FourMomentum::default());
        assert_eq!(boson.colour_type(), 0);
        assert!(boson.colours_match_type());
    }

    #[test]
    fn sign_of_status_marks_final_state() {
        let live = Particle::new(21, status::EMISSION, FourMomentum::default());
        let gone = Particle::new(21, -status::EMISSION, FourMomentum::default());
        assert!(live.is_final());
        assert!(!gone.is_final());
    }
}
