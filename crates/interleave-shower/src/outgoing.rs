//! Final-state branchings of outgoing partons.
//!
//! Each live outgoing parton of a prepared subsystem contributes one dipole
//! end per colour tag it carries, paired with the particle carrying the
//! matching anticolour (or colour). When no colour partner exists among the
//! subsystem's outgoing particles, the particle forming the largest
//! invariant mass with the radiator takes the recoil instead.
//!
//! # Kinematics
//!
//! For a massless radiator `i` and recoiler `k` with `m2 = (p_i + p_k)^2`,
//! a branching at transverse momentum `pT` and energy sharing `z` sets
//! `y = pT2 / (m2 z (1 - z))` and
//!
//! ```text
//! p_j  = z p_i + y (1 - z) p_k + k_perp
//! p_l  = (1 - z) p_i + y z p_k - k_perp
//! p_k' = (1 - y) p_k
//! ```
//!
//! with `k_perp^2 = -pT2`, orthogonal to both `p_i` and `p_k`. The dipole
//! momentum is conserved exactly and all three outgoing momenta stay
//! massless.

use std::collections::BTreeSet;

use rand::Rng;
use tracing::debug;

use interleave_record::ParticleBuilder;
use interleave_types::{FourMomentum, Particle, ParticleIndex, SourceKind, SubsystemId, codes, status};

use crate::EvolutionError;
use crate::config::{CA, CF, OutgoingConfig, TR, alpha_over_2pi};
use crate::source::{Branching, BranchingSource, CommitOutcome, EvolutionState, RandomStream};
use crate::sudakov::{
    Channel, Overestimate, accept_gluon_gluon_end, accept_pair, accept_quark_gluon,
    outgoing_z_range, veto_loop,
};

/// Which of the radiator's tags the dipole end is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColourSide {
    Colour,
    Anticolour,
}

/// The kind of final-state splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splitting {
    QuarkGluon,
    GluonGluon,
    GluonPair { flavour: i32 },
}

#[derive(Debug, Clone)]
struct DipoleEnd {
    system: SubsystemId,
    radiator: ParticleIndex,
    recoiler: ParticleIndex,
    side: ColourSide,
    m2_dipole: f64,
    max_pt2: f64,
    gluon: bool,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    end: usize,
    pt2: f64,
    z: f64,
    phi: f64,
    splitting: Splitting,
}

/// The outgoing-branching engine.
#[derive(Debug, Clone)]
pub struct OutgoingShower {
    config: OutgoingConfig,
    ends: Vec<DipoleEnd>,
    prepared: BTreeSet<SubsystemId>,
    pending: Option<Candidate>,
}

impl OutgoingShower {
    /// Create an engine with no prepared subsystems.
    pub const fn new(config: OutgoingConfig) -> Self {
        Self {
            config,
            ends: Vec::new(),
            prepared: BTreeSet::new(),
            pending: None,
        }
    }

    /// Number of dipole ends currently able to radiate.
    pub const fn end_count(&self) -> usize {
        self.ends.len()
    }

    fn channels(&self, gluon: bool) -> Vec<(Channel, Option<i32>)> {
        if !gluon {
            return vec![(
                Channel {
                    norm: 2.0 * CF,
                    overestimate: Overestimate::SoftEnd,
                    accept: accept_quark_gluon,
                },
                None,
            )];
        }
        let mut channels = vec![(
            Channel {
                norm: CA,
                overestimate: Overestimate::SoftEnd,
                accept: accept_gluon_gluon_end,
            },
            None,
        )];
        if self.config.gluon_splitting && self.config.flavours > 0 {
            // Each of the gluon's two ends carries half the splitting.
            channels.push((
                Channel {
                    norm: 0.5 * TR * f64::from(self.config.flavours),
                    overestimate: Overestimate::Flat,
                    accept: accept_pair,
                },
                Some(i32::from(self.config.flavours)),
            ));
        }
        channels
    }
}

/// Pick the particle that takes the recoil for one tag of the radiator.
fn find_recoiler(
    state: &EvolutionState,
    members: &[ParticleIndex],
    radiator: ParticleIndex,
    radiating: &Particle,
    side: ColourSide,
) -> Option<ParticleIndex> {
    let live = members
        .iter()
        .copied()
        .filter(|i| *i != radiator)
        .filter_map(|i| state.record.get(i).filter(|p| p.is_final()).map(|p| (i, p)));

    let tag = match side {
        ColourSide::Colour => radiating.colour,
        ColourSide::Anticolour => radiating.anticolour,
    };
    let partner = live.clone().find(|(_, p)| match side {
        ColourSide::Colour => p.anticolour == tag,
        ColourSide::Anticolour => p.colour == tag,
    });
    if let Some((index, _)) = partner {
        return Some(index);
    }

    live.map(|(i, p)| (i, (radiating.momentum + p.momentum).m2()))
        .filter(|(_, m2)| *m2 > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// A spacelike vector of length `pt` orthogonal to both `p_i` and `p_k`, at
/// azimuth `phi` around their common axis in the dipole rest frame.
pub fn transverse_vector(p_i: &FourMomentum, p_k: &FourMomentum, pt: f64, phi: f64) -> Option<FourMomentum> {
    let total = *p_i + *p_k;
    let rest = p_i.to_rest_frame_of(&total);
    let norm = rest.p_abs();
    if norm <= 0.0 {
        return None;
    }
    let axis = (rest.px / norm, rest.py / norm, rest.pz / norm);
    let reference = if axis.2.abs() < 0.9 { (0.0, 0.0, 1.0) } else { (1.0, 0.0, 0.0) };
    let e1 = normalize(cross(axis, reference))?;
    let e2 = cross(axis, e1);
    let (sin, cos) = phi.sin_cos();
    let k = FourMomentum::new(
        pt * cos.mul_add(e1.0, sin * e2.0),
        pt * cos.mul_add(e1.1, sin * e2.1),
        pt * cos.mul_add(e1.2, sin * e2.2),
        0.0,
    );
    Some(k.from_rest_frame_of(&total))
}

fn cross(a: (f64, f64, f64), b: (f64, f64, f64)) -> (f64, f64, f64) {
    (
        a.1.mul_add(b.2, -(a.2 * b.1)),
        a.2.mul_add(b.0, -(a.0 * b.2)),
        a.0.mul_add(b.1, -(a.1 * b.0)),
    )
}

fn normalize(v: (f64, f64, f64)) -> Option<(f64, f64, f64)> {
    let length = v.2.mul_add(v.2, v.0.mul_add(v.0, v.1 * v.1)).sqrt();
    (length > 0.0).then(|| (v.0 / length, v.1 / length, v.2 / length))
}

impl BranchingSource for OutgoingShower {
    fn kind(&self) -> SourceKind {
        SourceKind::Outgoing
    }

    fn prepare(&mut self, system: SubsystemId, state: &EvolutionState) {
        self.ends.retain(|end| end.system != system);
        self.pending = None;
        let Some(members) = state.systems.get(system) else {
            self.prepared.remove(&system);
            return;
        };
        self.prepared.insert(system);

        for &radiator in &members.outgoing {
            let Some(particle) = state.record.get(radiator) else {
                continue;
            };
            if !particle.is_final() || !particle.is_parton() {
                continue;
            }
            let sides = [
                (particle.colour > 0, ColourSide::Colour),
                (particle.anticolour > 0, ColourSide::Anticolour),
            ];
            for (carried, side) in sides {
                if !carried {
                    continue;
                }
                let Some(recoiler) = find_recoiler(state, &members.outgoing, radiator, particle, side) else {
                    continue;
                };
                let Some(partner) = state.record.get(recoiler) else {
                    continue;
                };
                let m2_dipole = (particle.momentum + partner.momentum).m2();
                let max_pt2 = (particle.scale * particle.scale).min(0.25 * m2_dipole);
                if max_pt2 <= 0.0 {
                    continue;
                }
                self.ends.push(DipoleEnd {
                    system,
                    radiator,
                    recoiler,
                    side,
                    m2_dipole,
                    max_pt2,
                    gluon: particle.is_gluon(),
                });
            }
        }
        debug!(system = %system, ends = self.ends.len(), "outgoing engine prepared subsystem");
    }

    fn reset(&mut self) {
        self.ends.clear();
        self.prepared.clear();
        self.pending = None;
    }

    fn tracked_systems(&self) -> Vec<SubsystemId> {
        self.prepared.iter().copied().collect()
    }

    fn next_candidate(
        &mut self,
        ceiling: f64,
        floor: f64,
        _state: &EvolutionState,
        rng: &mut RandomStream,
    ) -> Option<f64> {
        self.pending = None;
        let cutoff2 = self.config.pt_min * self.config.pt_min;
        let mut floor_pt2 = floor.max(self.config.pt_min).powi(2);
        let ceiling_pt2 = ceiling * ceiling;
        let coupling = alpha_over_2pi(self.config.alpha_s);
        let mut best: Option<Candidate> = None;

        for (index, end) in self.ends.iter().enumerate() {
            let start = ceiling_pt2.min(end.max_pt2);
            if start <= floor_pt2 {
                continue;
            }
            let Some((z_min, z_max)) = outgoing_z_range(cutoff2, end.m2_dipole) else {
                continue;
            };
            for (channel, flavours) in self.channels(end.gluon) {
                let coefficient = channel.coefficient(coupling, z_min, z_max, 1.0);
                let trial = veto_loop(start, floor_pt2, coefficient, rng, |pt2, rng| {
                    let z = channel
                        .overestimate
                        .sample(z_min, z_max, rng.random())
                        .clamp(z_min, z_max);
                    if pt2 >= z * (1.0 - z) * end.m2_dipole {
                        return None;
                    }
                    if rng.random::<f64>() >= (channel.accept)(z) {
                        return None;
                    }
                    let phi = core::f64::consts::TAU * rng.random::<f64>();
                    let splitting = match flavours {
                        Some(count) => Splitting::GluonPair {
                            flavour: rng.random_range(1..=count),
                        },
                        None if end.gluon => Splitting::GluonGluon,
                        None => Splitting::QuarkGluon,
                    };
                    Some((z, phi, splitting))
                });
                if let Some((pt2, (z, phi, splitting))) = trial {
                    // Later trials only need to beat the current winner.
                    floor_pt2 = pt2;
                    best = Some(Candidate {
                        end: index,
                        pt2,
                        z,
                        phi,
                        splitting,
                    });
                }
            }
        }

        self.pending = best;
        best.map(|candidate| candidate.pt2.sqrt())
    }

    fn commit(
        &mut self,
        state: &mut EvolutionState,
        _rng: &mut RandomStream,
    ) -> Result<CommitOutcome, EvolutionError> {
        let kind = self.kind();
        let candidate = self.pending.take().ok_or(EvolutionError::NoCandidate { kind })?;
        let end = self
            .ends
            .get(candidate.end)
            .cloned()
            .ok_or(EvolutionError::NoCandidate { kind })?;

        let radiator = state.record.particle(end.radiator)?.clone();
        let recoiler = state.record.particle(end.recoiler)?.clone();
        if !radiator.is_final() || !recoiler.is_final() {
            return Ok(CommitOutcome::Refused {
                reason: "dipole end is stale",
            });
        }

        let p_i = radiator.momentum;
        let p_k = recoiler.momentum;
        let m2 = (p_i + p_k).m2();
        if m2 <= 0.0 || p_i.m2().abs() > 1e-6 * m2 || p_k.m2().abs() > 1e-6 * m2 {
            return Ok(CommitOutcome::Refused {
                reason: "massive dipole partner",
            });
        }
        let Candidate { pt2, z, phi, splitting, .. } = candidate;
        let y = pt2 / (m2 * z * (1.0 - z));
        if !(y > 0.0 && y < 1.0) {
            return Ok(CommitOutcome::Refused {
                reason: "no room for recoil",
            });
        }
        let pt = pt2.sqrt();
        let Some(k_perp) = transverse_vector(&p_i, &p_k, pt, phi) else {
            return Ok(CommitOutcome::Refused {
                reason: "degenerate dipole axis",
            });
        };
        let p_j = p_i * z + p_k * (y * (1.0 - z)) + k_perp;
        let p_l = p_i * (1.0 - z) + p_k * (y * z) - k_perp;
        let p_recoil = p_k * (1.0 - y);
        let physical = [p_j, p_l, p_recoil]
            .iter()
            .all(|p| p.is_finite() && p.e > 0.0);
        if !physical {
            return Ok(CommitOutcome::Refused {
                reason: "non-physical daughter momenta",
            });
        }

        let (colour, anticolour) = (radiator.colour, radiator.anticolour);
        let (first, second) = match (splitting, end.side) {
            (Splitting::GluonPair { flavour }, _) => ((flavour, colour, 0), (-flavour, 0, anticolour)),
            (_, ColourSide::Colour) => {
                let tag = state.record.next_colour_tag();
                ((radiator.id, tag, anticolour), (codes::GLUON, colour, tag))
            }
            (_, ColourSide::Anticolour) => {
                let tag = state.record.next_colour_tag();
                ((radiator.id, colour, tag), (codes::GLUON, tag, anticolour))
            }
        };

        let daughter_j = ParticleBuilder::new(first.0, status::EMISSION)
            .momentum(p_j)
            .mass(0.0)
            .mothers(end.radiator, ParticleIndex::NONE)
            .colours(first.1, first.2)
            .scale(pt)
            .build()?;
        let daughter_l = ParticleBuilder::new(second.0, status::EMISSION)
            .momentum(p_l)
            .mass(0.0)
            .mothers(end.radiator, ParticleIndex::NONE)
            .colours(second.1, second.2)
            .scale(pt)
            .build()?;

        let j = state.record.append(daughter_j)?;
        let l = state.record.append(daughter_l)?;
        let recoil = state.record.carbon_copy(end.recoiler, status::OUTGOING_RECOIL)?;
        state.record.set_momentum(recoil, p_recoil)?;
        state.record.set_scale(recoil, pt)?;
        state.record.supersede(end.radiator, (j, l))?;

        state.systems.replace_outgoing(end.system, end.radiator, j)?;
        state.systems.add_outgoing(end.system, l)?;
        state.systems.replace_outgoing(end.system, end.recoiler, recoil)?;

        debug!(
            system = %end.system,
            scale = pt,
            z,
            radiator = %end.radiator,
            recoiler = %end.recoiler,
            "outgoing branching committed"
        );

        Ok(CommitOutcome::Committed(Branching {
            kind,
            system: end.system,
            scale: pt,
            appended: vec![j, l, recoil],
            touched: vec![end.system],
            created: None,
        }))
    }

    fn discard(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use interleave_record::{EventRecord, SubsystemRegistry, consistency};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    /// A quark pair back to back at 45.5 GeV each, as from a decay at rest.
    fn quark_pair() -> (EvolutionState, SubsystemId) {
        let mut record = EventRecord::new();
        let quark = ParticleBuilder::new(2, status::HARD_OUTGOING)
            .momentum(FourMomentum::new(0.0, 45.5, 0.0, 45.5))
            .colours(101, 0)
            .scale(91.0)
            .build()
            .unwrap();
        let antiquark = ParticleBuilder::new(-2, status::HARD_OUTGOING)
            .momentum(FourMomentum::new(0.0, -45.5, 0.0, 45.5))
            .colours(0, 101)
            .scale(91.0)
            .build()
            .unwrap();
        let q = record.append(quark).unwrap();
        let qbar = record.append(antiquark).unwrap();
        let mut systems = SubsystemRegistry::new();
        let id = systems.add_system(None, vec![q, qbar]);
        (EvolutionState::new(record, systems), id)
    }

    fn final_momentum(state: &EvolutionState) -> FourMomentum {
        state.record.final_state().map(|(_, p)| p.momentum).sum()
    }

    #[test]
    fn quark_pair_has_two_colour_connected_ends() {
        let (state, id) = quark_pair();
        let mut shower = OutgoingShower::new(OutgoingConfig::default());
        shower.prepare(id, &state);
        assert_eq!(shower.end_count(), 2);
        assert_eq!(shower.tracked_systems(), vec![id]);
    }

    #[test]
    fn candidate_respects_ceiling_and_floor() {
        let (state, id) = quark_pair();
        let mut shower = OutgoingShower::new(OutgoingConfig::default());
        shower.prepare(id, &state);
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..200 {
            if let Some(scale) = shower.next_candidate(20.0, 2.0, &state, &mut rng) {
                assert!(scale <= 20.0 && scale > 2.0);
            }
        }
        assert!(shower.next_candidate(5.0, 5.0, &state, &mut rng).is_none());
    }

    /// Evolve one subsystem down to the cutoff, re-preparing after every
    /// commit, and return the number of commits.
    fn evolve(state: &mut EvolutionState, id: SubsystemId, seed: u64) -> usize {
        let mut shower = OutgoingShower::new(OutgoingConfig::default());
        shower.prepare(id, state);
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut ceiling = 45.5;
        let mut commits: usize = 0;
        while let Some(scale) = shower.next_candidate(ceiling, 1.0, state, &mut rng) {
            assert!(scale <= ceiling);
            if let CommitOutcome::Committed(branching) = shower.commit(state, &mut rng).unwrap() {
                assert_eq!(branching.appended.len(), 3);
                commits = commits.saturating_add(1);
            }
            ceiling = scale;
            shower.prepare(id, state);
        }
        commits
    }

    #[test]
    fn repeated_commits_conserve_momentum_and_stay_ordered() {
        let mut total_commits: usize = 0;
        for seed in 0..10 {
            let (mut state, id) = quark_pair();
            let before = final_momentum(&state);
            total_commits = total_commits.saturating_add(evolve(&mut state, id, seed));

            let after = final_momentum(&state);
            assert!((after - before).max_abs() < 1e-8);
            assert!(consistency::verify_history(&state.record).is_empty());
            assert!(consistency::verify_registry(&state.record, &state.systems).is_empty());
            let members = &state.systems.subsystem(id).unwrap().outgoing;
            assert_eq!(members.len(), state.record.final_state().count());
        }
        assert!(total_commits > 0);
    }

    #[test]
    fn stale_end_is_refused_without_changes() {
        let (mut state, id) = quark_pair();
        let mut shower = OutgoingShower::new(OutgoingConfig::default());
        shower.prepare(id, &state);
        let mut rng = SmallRng::seed_from_u64(9);
        let mut found = None;
        for _ in 0..100 {
            found = shower.next_candidate(45.5, 1.0, &state, &mut rng);
            if found.is_some() {
                break;
            }
        }
        assert!(found.is_some());

        state.record.set_status(ParticleIndex::new(1), -23).unwrap();
        state.record.set_status(ParticleIndex::new(2), -23).unwrap();
        let before = state.record.len();
        let outcome = shower.commit(&mut state, &mut rng).unwrap();
        assert!(matches!(outcome, CommitOutcome::Refused { .. }));
        assert_eq!(state.record.len(), before);
    }

    #[test]
    fn commit_without_candidate_is_an_error() {
        let (mut state, _) = quark_pair();
        let mut shower = OutgoingShower::new(OutgoingConfig::default());
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(
            shower.commit(&mut state, &mut rng),
            Err(EvolutionError::NoCandidate { .. })
        ));
    }
}
