//! Backward branchings of incoming partons.
//!
//! Each beam-attached subsystem contributes one initiator per side. A
//! branching resolves the initiator `a` into a new, earlier initiator `m`
//! carrying momentum fraction `x / z`, plus a sibling `s` that joins the
//! subsystem's final state. The new initiator is recorded as the mother of
//! the one it replaces, and names both the sibling and the replaced
//! initiator as daughters. Earlier entries keep their momenta.
//!
//! # Kinematics
//!
//! Both incoming partons stay collinear with their beams. With `b` the
//! other incoming parton, `m = a / z`, `P = m + b` and `s_hat = (a + b)^2`,
//! the sibling is the massless vector with transverse momentum `pT` for
//! which `(P - s)^2 = s_hat`. Solving in light-cone components gives
//!
//! ```text
//! B = (P^2 - s_hat) / 2
//! s_fwd = (B + sqrt(B^2 - P^2 pT2)) / P_bwd
//! s_bwd = pT2 / s_fwd
//! ```
//!
//! The old outgoing particles are copied and carried from the rest frame of
//! `a + b` into the rest frame of `P - s`, which keeps every invariant
//! inside the subsystem.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use interleave_record::ParticleBuilder;
use interleave_types::{
    BeamSide, FourMomentum, Particle, ParticleIndex, SourceKind, SubsystemId, codes, status,
};

use crate::EvolutionError;
use crate::config::{CA, CF, IncomingConfig, TR, alpha_over_2pi};
use crate::density::PartonDensity;
use crate::source::{Branching, BranchingSource, CommitOutcome, EvolutionState, RandomStream};
use crate::sudakov::{
    Channel, Overestimate, accept_gluon_from_gluon, accept_gluon_from_quark, accept_pair,
    accept_quark_gluon, incoming_z_max, veto_loop,
};

/// Backward splitting channels, named initiator-from-mother.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backward {
    QuarkFromQuark,
    QuarkFromGluon,
    GluonFromGluon,
    GluonFromQuark,
}

#[derive(Debug, Clone)]
struct InitiatorEnd {
    system: SubsystemId,
    side: BeamSide,
    initiator: ParticleIndex,
    other: ParticleIndex,
    id: i32,
    x: f64,
    s_hat: f64,
    max_pt2: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    end: usize,
    pt2: f64,
    z: f64,
    mother_id: i32,
    sibling_id: i32,
    channel: Backward,
}

/// The incoming-branching engine.
pub struct IncomingShower {
    config: IncomingConfig,
    density: Arc<dyn PartonDensity>,
    ends: Vec<InitiatorEnd>,
    prepared: BTreeSet<SubsystemId>,
    pending: Option<Candidate>,
}

impl core::fmt::Debug for IncomingShower {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IncomingShower")
            .field("config", &self.config)
            .field("ends", &self.ends.len())
            .field("prepared", &self.prepared)
            .finish_non_exhaustive()
    }
}

impl IncomingShower {
    /// Create an engine drawing beam densities from `density`.
    pub fn new(config: IncomingConfig, density: Arc<dyn PartonDensity>) -> Self {
        Self {
            config,
            density,
            ends: Vec::new(),
            prepared: BTreeSet::new(),
            pending: None,
        }
    }

    /// Number of initiators currently able to branch.
    pub const fn end_count(&self) -> usize {
        self.ends.len()
    }

    fn channels(&self, gluon: bool) -> [(Channel, Backward, f64); 2] {
        if gluon {
            [
                (
                    Channel {
                        norm: 2.0 * CA,
                        overestimate: Overestimate::SoftBoth,
                        accept: accept_gluon_from_gluon,
                    },
                    Backward::GluonFromGluon,
                    1.0,
                ),
                (
                    Channel {
                        norm: 2.0 * CF,
                        overestimate: Overestimate::SoftMother,
                        accept: accept_gluon_from_quark,
                    },
                    Backward::GluonFromQuark,
                    2.0 * f64::from(self.config.flavours),
                ),
            ]
        } else {
            [
                (
                    Channel {
                        norm: 2.0 * CF,
                        overestimate: Overestimate::SoftEnd,
                        accept: accept_quark_gluon,
                    },
                    Backward::QuarkFromQuark,
                    1.0,
                ),
                (
                    Channel {
                        norm: TR,
                        overestimate: Overestimate::Flat,
                        accept: accept_pair,
                    },
                    Backward::QuarkFromGluon,
                    1.0,
                ),
            ]
        }
    }

    /// Momentum fraction still available to `system` on `side`.
    fn available_fraction(&self, state: &EvolutionState, side: BeamSide, system: SubsystemId) -> f64 {
        1.0 - self.config.beam_reserve - beam_fraction_used(state, side, Some(system))
    }
}

/// Momentum fraction taken from the beam on `side` by every subsystem's
/// initiator, optionally leaving one subsystem out.
pub fn beam_fraction_used(state: &EvolutionState, side: BeamSide, exclude: Option<SubsystemId>) -> f64 {
    let beam_index = ParticleIndex::new(side.record_index());
    let Some(beam) = state.record.get(beam_index) else {
        return 0.0;
    };
    state
        .systems
        .iter()
        .filter(|(id, _)| Some(*id) != exclude)
        .filter_map(|(_, system)| system.incoming_on(side))
        .filter_map(|index| state.record.get(index))
        .filter(|p| p.mothers.0 == beam_index)
        .map(|p| momentum_fraction(&p.momentum, beam, side))
        .sum()
}

/// Light-cone momentum fraction of `p` relative to the beam on `side`.
pub fn momentum_fraction(p: &FourMomentum, beam: &Particle, side: BeamSide) -> f64 {
    match side {
        BeamSide::A => p.plus() / beam.momentum.plus(),
        BeamSide::B => p.minus() / beam.momentum.minus(),
    }
}

/// Light-cone components of `p` along and against the direction of `side`.
fn light_cone(p: &FourMomentum, side: BeamSide) -> (f64, f64) {
    match side {
        BeamSide::A => (p.plus(), p.minus()),
        BeamSide::B => (p.minus(), p.plus()),
    }
}

/// Colour tags of the new initiator and the sibling.
fn backward_colours(
    channel: Backward,
    initiator: &Particle,
    mother_id: i32,
    tag: u32,
) -> ((u32, u32), (u32, u32)) {
    let (colour, anticolour) = (initiator.colour, initiator.anticolour);
    match channel {
        Backward::QuarkFromQuark if initiator.id > 0 => ((tag, 0), (tag, colour)),
        Backward::QuarkFromQuark => ((0, tag), (anticolour, tag)),
        Backward::QuarkFromGluon if initiator.id > 0 => ((colour, tag), (0, tag)),
        Backward::QuarkFromGluon => ((tag, anticolour), (tag, 0)),
        Backward::GluonFromGluon => ((colour, tag), (anticolour, tag)),
        Backward::GluonFromQuark if mother_id > 0 => ((colour, 0), (anticolour, 0)),
        Backward::GluonFromQuark => ((0, anticolour), (0, colour)),
    }
}

impl BranchingSource for IncomingShower {
    fn kind(&self) -> SourceKind {
        SourceKind::Incoming
    }

    fn prepare(&mut self, system: SubsystemId, state: &EvolutionState) {
        self.ends.retain(|end| end.system != system);
        self.pending = None;
        let Some(members) = state.systems.get(system) else {
            self.prepared.remove(&system);
            return;
        };
        self.prepared.insert(system);

        let Some((first, second)) = members.incoming else {
            return;
        };
        if !members.balanced {
            return;
        }
        let (Some(a), Some(b)) = (state.record.get(first), state.record.get(second)) else {
            return;
        };
        let from_beams = BeamSide::BOTH
            .iter()
            .zip([a, b])
            .all(|(side, p)| {
                p.mothers.0.get() == side.record_index()
                    && p.momentum.pt2() <= 1e-12 * p.momentum.e * p.momentum.e
            });
        if !from_beams {
            return;
        }

        let incoming_sum = a.momentum + b.momentum;
        let outgoing_sum = members
            .outgoing
            .iter()
            .filter_map(|i| state.record.get(*i))
            .map(|p| p.momentum)
            .sum::<FourMomentum>();
        if (outgoing_sum - incoming_sum).max_abs() > 1e-6 * incoming_sum.e.max(1.0) {
            return;
        }
        let s_hat = incoming_sum.m2();

        for (side, initiator, other) in [(BeamSide::A, first, second), (BeamSide::B, second, first)] {
            let Some(particle) = state.record.get(initiator) else {
                continue;
            };
            let Some(beam) = state.record.beam(side) else {
                continue;
            };
            if !particle.is_parton() || particle.scale <= 0.0 {
                continue;
            }
            let x = momentum_fraction(&particle.momentum, beam, side);
            if !(x > 0.0 && x < 1.0) {
                continue;
            }
            self.ends.push(InitiatorEnd {
                system,
                side,
                initiator,
                other,
                id: particle.id,
                x,
                s_hat,
                max_pt2: particle.scale * particle.scale,
            });
        }
        debug!(system = %system, ends = self.ends.len(), "incoming engine prepared subsystem");
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
        state: &EvolutionState,
        rng: &mut RandomStream,
    ) -> Option<f64> {
        self.pending = None;
        let cutoff2 = self.config.pt_min * self.config.pt_min;
        let mut floor_pt2 = floor.max(self.config.pt_min).powi(2);
        let ceiling_pt2 = ceiling * ceiling;
        let coupling = alpha_over_2pi(self.config.alpha_s);
        let ratio_max = self.config.density_ratio_max;
        let flavours = i32::from(self.config.flavours);
        let mut best: Option<Candidate> = None;

        for (index, end) in self.ends.iter().enumerate() {
            let start = ceiling_pt2.min(end.max_pt2);
            if start <= floor_pt2 {
                continue;
            }
            let available = self.available_fraction(state, end.side, end.system);
            let z_min = end.x / available;
            let z_max = incoming_z_max(cutoff2, end.s_hat);
            if !(z_min > 0.0 && z_min < z_max) {
                continue;
            }
            let gluon = end.id == codes::GLUON;

            for (channel, backward, multiplicity) in self.channels(gluon) {
                if multiplicity <= 0.0 {
                    continue;
                }
                let coefficient = channel.coefficient(coupling, z_min, z_max, ratio_max * multiplicity);
                let density = &self.density;
                let trial = veto_loop(start, floor_pt2, coefficient, rng, |pt2, rng| {
                    let z = channel
                        .overestimate
                        .sample(z_min, z_max, rng.random())
                        .clamp(z_min, z_max);
                    if pt2 * 4.0 * z > end.s_hat * (1.0 - z) * (1.0 - z) {
                        return None;
                    }
                    let mother_x = end.x / z;
                    if mother_x >= available {
                        return None;
                    }
                    let mother_id = match backward {
                        Backward::QuarkFromQuark => end.id,
                        Backward::QuarkFromGluon | Backward::GluonFromGluon => codes::GLUON,
                        Backward::GluonFromQuark => {
                            let flavour = rng.random_range(1..=flavours);
                            if rng.random::<bool>() { flavour } else { -flavour }
                        }
                    };
                    let scale = pt2.sqrt();
                    let current = density.density(end.id, end.x, scale);
                    if current <= 0.0 {
                        return None;
                    }
                    let ratio = density.density(mother_id, mother_x, scale) / current;
                    let probability = (channel.accept)(z) * (ratio / ratio_max).min(1.0);
                    if rng.random::<f64>() >= probability {
                        return None;
                    }
                    let sibling_id = match backward {
                        Backward::QuarkFromQuark | Backward::GluonFromGluon => codes::GLUON,
                        Backward::QuarkFromGluon => -end.id,
                        Backward::GluonFromQuark => mother_id,
                    };
                    Some((z, mother_id, sibling_id))
                });
                if let Some((pt2, (z, mother_id, sibling_id))) = trial {
                    floor_pt2 = pt2;
                    best = Some(Candidate {
                        end: index,
                        pt2,
                        z,
                        mother_id,
                        sibling_id,
                        channel: backward,
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
        rng: &mut RandomStream,
    ) -> Result<CommitOutcome, EvolutionError> {
        let kind = self.kind();
        let candidate = self.pending.take().ok_or(EvolutionError::NoCandidate { kind })?;
        let end = self
            .ends
            .get(candidate.end)
            .cloned()
            .ok_or(EvolutionError::NoCandidate { kind })?;

        let members = state.systems.subsystem(end.system)?.clone();
        if members.incoming_on(end.side) != Some(end.initiator) {
            return Ok(CommitOutcome::Refused {
                reason: "initiator is stale",
            });
        }
        let initiator = state.record.particle(end.initiator)?.clone();
        let other = state.record.particle(end.other)?.clone();
        let beam_index = ParticleIndex::new(end.side.record_index());

        let Candidate { pt2, z, mother_id, sibling_id, channel, .. } = candidate;
        if end.x / z >= self.available_fraction(state, end.side, end.system) {
            return Ok(CommitOutcome::Refused {
                reason: "beam momentum exhausted",
            });
        }

        let old_total = initiator.momentum + other.momentum;
        let outgoing_sum = members
            .outgoing
            .iter()
            .filter_map(|i| state.record.get(*i))
            .map(|p| p.momentum)
            .sum::<FourMomentum>();
        if (outgoing_sum - old_total).max_abs() > 1e-6 * old_total.e.max(1.0) {
            return Ok(CommitOutcome::Refused {
                reason: "subsystem momentum does not balance",
            });
        }

        // Sibling from the light-cone solution.
        let mother = initiator.momentum * (1.0 / z);
        let total = mother + other.momentum;
        let p2 = total.m2();
        let half_excess = 0.5 * (p2 - old_total.m2());
        let discriminant = half_excess.mul_add(half_excess, -(p2 * pt2));
        let (_, total_bwd) = light_cone(&total, end.side);
        if discriminant < 0.0 || total_bwd <= 0.0 {
            return Ok(CommitOutcome::Refused {
                reason: "sibling outside phase space",
            });
        }
        let s_fwd = (half_excess + discriminant.sqrt()) / total_bwd;
        let s_bwd = pt2 / s_fwd;
        let pt = pt2.sqrt();
        let phi = core::f64::consts::TAU * rng.random::<f64>();
        let sibling = FourMomentum::new(
            pt * phi.cos(),
            pt * phi.sin(),
            end.side.sign() * 0.5 * (s_fwd - s_bwd),
            0.5 * (s_fwd + s_bwd),
        );
        let new_total = total - sibling;
        let boosted = members
            .outgoing
            .iter()
            .map(|i| {
                state.record.particle(*i).map(|p| {
                    (*i, p.momentum.to_rest_frame_of(&old_total).from_rest_frame_of(&new_total))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if !sibling.is_finite() || boosted.iter().any(|(_, p)| !p.is_finite()) {
            return Ok(CommitOutcome::Refused {
                reason: "non-physical recoil",
            });
        }

        let needs_tag = channel != Backward::GluonFromQuark;
        let tag = if needs_tag { state.record.next_colour_tag() } else { 0 };
        let (mother_colours, sibling_colours) = backward_colours(channel, &initiator, mother_id, tag);

        let new_initiator = ParticleBuilder::new(mother_id, status::INITIATOR)
            .momentum(mother)
            .mass(0.0)
            .mothers(beam_index, ParticleIndex::NONE)
            .colours(mother_colours.0, mother_colours.1)
            .scale(pt)
            .build()?;
        let m = state.record.append(new_initiator)?;
        let new_sibling = ParticleBuilder::new(sibling_id, status::SIBLING)
            .momentum(sibling)
            .mass(0.0)
            .mothers(m, ParticleIndex::NONE)
            .colours(sibling_colours.0, sibling_colours.1)
            .scale(pt)
            .build()?;
        let s = state.record.append(new_sibling)?;
        // `(s, a)` with `s > a` names exactly the sibling and the replaced
        // initiator. The replaced initiator keeps its recorded momentum.
        state.record.set_daughters(m, (s, end.initiator))?;
        state.record.set_mothers(end.initiator, (m, ParticleIndex::NONE))?;

        let mut appended = vec![m, s];
        for (old, momentum) in boosted {
            let copy = state.record.carbon_copy(old, status::INCOMING_RECOIL)?;
            state.record.set_momentum(copy, momentum)?;
            state.systems.replace_outgoing(end.system, old, copy)?;
            appended.push(copy);
        }
        state.systems.add_outgoing(end.system, s)?;
        state.systems.set_incoming(end.system, end.side, m)?;

        let beam_daughters = state.record.particle(beam_index)?.daughters;
        if beam_daughters.0 == end.initiator {
            state.record.set_daughters(beam_index, (m, m))?;
        }

        debug!(
            system = %end.system,
            side = ?end.side,
            scale = pt,
            z,
            initiator = %end.initiator,
            "incoming branching committed"
        );

        Ok(CommitOutcome::Committed(Branching {
            kind,
            system: end.system,
            scale: pt,
            appended,
            touched: vec![end.system],
            created: None,
        }))
    }

    fn discard(&mut self) {
        self.pending = None;
    }
}
