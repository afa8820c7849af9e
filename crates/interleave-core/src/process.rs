//! The hard-process collaborator and two toy processes.
//!
//! A [`ProcessSource`] supplies the primary interaction of each event as a
//! fresh record (system entry, beams, hard subsystem) plus summary
//! information. Processes with unstable resonances leave them live through
//! the interleaved evolution and decay them afterwards on request, each
//! decay opening a subsystem without incoming particles.

use rand::Rng;
use tracing::debug;

use interleave_record::{EventRecord, ParticleBuilder, RecordError, SubsystemRegistry};
use interleave_shower::{EvolutionState, RandomStream};
use interleave_types::{BeamSide, FourMomentum, Particle, ParticleIndex, SubsystemId, codes, status};

use crate::config::BeamConfig;
use crate::hooks::ProcessInfo;

/// Attempts at finding a hard configuration inside the beam budget.
const MAX_PHASE_SPACE_TRIES: u32 = 1_000;

/// Largest momentum fraction a hard-process parton may take.
const MAX_FRACTION: f64 = 0.99;

/// Errors raised by a process source.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The record rejected a particle.
    #[error("record error: {source}")]
    Record {
        /// The underlying record error.
        #[from]
        source: RecordError,
    },

    /// No configuration inside the beam budget was found.
    #[error("{name}: no phase-space point found after {tries} tries")]
    NoPhaseSpace {
        /// Process name.
        name: &'static str,
        /// Attempts made.
        tries: u32,
    },
}

/// A freshly generated primary interaction.
#[derive(Debug, Clone)]
pub struct HardProcess {
    /// Record holding the system entry, the beams and the hard subsystem.
    pub record: EventRecord,
    /// Registry holding the hard subsystem as subsystem 0.
    pub systems: SubsystemRegistry,
    /// Summary passed to hooks.
    pub info: ProcessInfo,
}

/// A resonance decayed after the interleaved evolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonanceDecay {
    /// The decayed resonance.
    pub resonance: ParticleIndex,
    /// The subsystem formed by its decay products.
    pub system: SubsystemId,
    /// Default starting scale of evolution inside the decay.
    pub scale: f64,
}

/// Supplier of hard processes.
pub trait ProcessSource: Send {
    /// Human-readable process name.
    fn name(&self) -> &'static str;

    /// Largest hard scale the process can produce.
    fn max_scale(&self) -> f64;

    /// Generate the primary interaction of a new event.
    fn generate(&mut self, rng: &mut RandomStream) -> Result<HardProcess, ProcessError>;

    /// Decay every live resonance in `state`. The default has none.
    fn decay_resonances(
        &mut self,
        _state: &mut EvolutionState,
        _rng: &mut RandomStream,
    ) -> Result<Vec<ResonanceDecay>, ProcessError> {
        Ok(Vec::new())
    }
}

fn beams(config: &BeamConfig) -> EventRecord {
    EventRecord::with_beams(
        Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(config.energy_a)),
        Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(-config.energy_b)),
    )
}

/// Append the two incoming partons of a hard subsystem, extracted from
/// beams A and B, and point the beams at them.
fn append_incoming(
    record: &mut EventRecord,
    a: Particle,
    b: Particle,
) -> Result<(ParticleIndex, ParticleIndex), RecordError> {
    let first = record.append(a)?;
    let second = record.append(b)?;
    record.set_daughters(ParticleIndex::new(BeamSide::A.record_index()), (first, first))?;
    record.set_daughters(ParticleIndex::new(BeamSide::B.record_index()), (second, second))?;
    Ok((first, second))
}

fn incoming_parton(
    id: i32,
    side: BeamSide,
    momentum: FourMomentum,
    colours: (u32, u32),
    scale: f64,
) -> ParticleBuilder {
    ParticleBuilder::new(id, status::HARD_INCOMING)
        .momentum(momentum)
        .mass(0.0)
        .mothers(ParticleIndex::new(side.record_index()), ParticleIndex::NONE)
        .colours(colours.0, colours.1)
        .scale(scale)
}

// ---------------------------------------------------------------------------
// g g -> g g
// ---------------------------------------------------------------------------

/// Gluon-gluon scattering with `dsigma/dpT2 ~ 1/pT^4` above a cut.
#[derive(Debug, Clone)]
pub struct QcdTwoToTwo {
    beams: BeamConfig,
    pt_min: f64,
}

impl QcdTwoToTwo {
    /// A process with transverse-momentum cut `pt_min`.
    pub const fn new(beams: BeamConfig, pt_min: f64) -> Self {
        Self { beams, pt_min }
    }
}

impl ProcessSource for QcdTwoToTwo {
    fn name(&self) -> &'static str {
        "g g -> g g"
    }

    fn max_scale(&self) -> f64 {
        0.5 * self.beams.sqrt_s()
    }

    fn generate(&mut self, rng: &mut RandomStream) -> Result<HardProcess, ProcessError> {
        let sqrt_s = self.beams.sqrt_s();
        for _ in 0..MAX_PHASE_SPACE_TRIES {
            let r: f64 = rng.random();
            let pt = self.pt_min / (1.0 - r).sqrt();
            let y_max = (sqrt_s / pt).ln();
            if y_max <= 0.0 {
                continue;
            }
            let y3 = rng.random_range(-y_max..y_max);
            let y4 = rng.random_range(-y_max..y_max);
            let plus = pt * (y3.exp() + y4.exp());
            let minus = pt * ((-y3).exp() + (-y4).exp());
            if 0.5 * plus >= MAX_FRACTION * self.beams.energy_a
                || 0.5 * minus >= MAX_FRACTION * self.beams.energy_b
            {
                continue;
            }

            let mut record = beams(&self.beams);
            let tags: [u32; 4] = core::array::from_fn(|_| record.next_colour_tag());
            let [t1, t2, t3, t4] = tags;
            let (a, b) = append_incoming(
                &mut record,
                incoming_parton(codes::GLUON, BeamSide::A, FourMomentum::along_axis(0.5 * plus), (t1, t2), pt)
                    .build()?,
                incoming_parton(codes::GLUON, BeamSide::B, FourMomentum::along_axis(-0.5 * minus), (t3, t1), pt)
                    .build()?,
            )?;
            let phi = core::f64::consts::TAU * rng.random::<f64>();
            let outgoing = |momentum, colours: (u32, u32)| {
                ParticleBuilder::new(codes::GLUON, status::HARD_OUTGOING)
                    .momentum(momentum)
                    .mass(0.0)
                    .mothers(a, b)
                    .colours(colours.0, colours.1)
                    .scale(pt)
                    .build()
            };
            let c = record.append(outgoing(FourMomentum::from_pt_rapidity(pt, phi, y3), (t3, t4))?)?;
            let d = record.append(outgoing(
                FourMomentum::from_pt_rapidity(pt, phi + core::f64::consts::PI, y4),
                (t4, t2),
            )?)?;
            record.set_daughters(a, (c, d))?;
            record.set_daughters(b, (c, d))?;

            let mut systems = SubsystemRegistry::new();
            systems.add_system(Some((a, b)), vec![c, d]);
            return Ok(HardProcess {
                record,
                systems,
                info: ProcessInfo {
                    name: self.name(),
                    scale: pt,
                    weight: 1.0,
                },
            });
        }
        Err(ProcessError::NoPhaseSpace {
            name: self.name(),
            tries: MAX_PHASE_SPACE_TRIES,
        })
    }
}

// ---------------------------------------------------------------------------
// q qbar -> resonance -> q' qbar'
// ---------------------------------------------------------------------------

/// Quark-antiquark annihilation into a Breit-Wigner resonance that decays
/// into a quark-antiquark pair after the interleaved evolution.
#[derive(Debug, Clone)]
pub struct ResonanceProduction {
    beams: BeamConfig,
    mass: f64,
    width: f64,
    flavours: i32,
}

impl ResonanceProduction {
    /// A resonance of the given mass and width coupling to `flavours`
    /// light quark flavours.
    pub fn new(beams: BeamConfig, mass: f64, width: f64, flavours: u8) -> Self {
        Self {
            beams,
            mass,
            width,
            flavours: i32::from(flavours.max(1)),
        }
    }

    fn sample_mass(&self, rng: &mut RandomStream) -> f64 {
        let r: f64 = rng.random();
        let offset = 0.5 * self.width * (core::f64::consts::PI * (r - 0.5)).tan();
        self.mass + offset.clamp(-5.0 * self.width, 5.0 * self.width)
    }
}

impl ProcessSource for ResonanceProduction {
    fn name(&self) -> &'static str {
        "q qbar -> Z0"
    }

    fn max_scale(&self) -> f64 {
        5.0_f64.mul_add(self.width, self.mass)
    }

    fn generate(&mut self, rng: &mut RandomStream) -> Result<HardProcess, ProcessError> {
        let sqrt_s = self.beams.sqrt_s();
        for _ in 0..MAX_PHASE_SPACE_TRIES {
            let mass = self.sample_mass(rng);
            if mass <= 0.0 || mass >= sqrt_s {
                continue;
            }
            let y_max = (sqrt_s / mass).ln();
            let y = rng.random_range(-y_max..y_max);
            let plus = mass * y.exp();
            let minus = mass * (-y).exp();
            if 0.5 * plus >= MAX_FRACTION * self.beams.energy_a
                || 0.5 * minus >= MAX_FRACTION * self.beams.energy_b
            {
                continue;
            }

            let flavour = rng.random_range(1..=self.flavours);
            let (quark_side, antiquark_side) = if rng.random::<bool>() {
                (BeamSide::A, BeamSide::B)
            } else {
                (BeamSide::B, BeamSide::A)
            };
            let momentum_on = |side: BeamSide| match side {
                BeamSide::A => FourMomentum::along_axis(0.5 * plus),
                BeamSide::B => FourMomentum::along_axis(-0.5 * minus),
            };

            let mut record = beams(&self.beams);
            let tag = record.next_colour_tag();
            let quark = incoming_parton(flavour, quark_side, momentum_on(quark_side), (tag, 0), mass).build()?;
            let antiquark =
                incoming_parton(-flavour, antiquark_side, momentum_on(antiquark_side), (0, tag), mass).build()?;
            let (first, second) = match quark_side {
                BeamSide::A => (quark, antiquark),
                BeamSide::B => (antiquark, quark),
            };
            let (a, b) = append_incoming(&mut record, first, second)?;
            let boson = ParticleBuilder::new(codes::Z_BOSON, -status::RESONANCE)
                .momentum(FourMomentum::along_axis(0.5 * plus) + FourMomentum::along_axis(-0.5 * minus))
                .mass(mass)
                .mothers(a, b)
                .scale(mass)
                .build()?;
            let z = record.append(boson)?;
            record.set_daughters(a, (z, z))?;
            record.set_daughters(b, (z, z))?;

            let mut systems = SubsystemRegistry::new();
            systems.add_system(Some((a, b)), vec![z]);
            return Ok(HardProcess {
                record,
                systems,
                info: ProcessInfo {
                    name: self.name(),
                    scale: mass,
                    weight: 1.0,
                },
            });
        }
        Err(ProcessError::NoPhaseSpace {
            name: self.name(),
            tries: MAX_PHASE_SPACE_TRIES,
        })
    }

    fn decay_resonances(
        &mut self,
        state: &mut EvolutionState,
        rng: &mut RandomStream,
    ) -> Result<Vec<ResonanceDecay>, ProcessError> {
        let live: Vec<(ParticleIndex, SubsystemId)> = state
            .systems
            .iter()
            .flat_map(|(id, system)| system.outgoing.iter().map(move |index| (*index, id)))
            .filter(|(index, _)| {
                state
                    .record
                    .get(*index)
                    .is_some_and(|p| p.is_final() && p.id == codes::Z_BOSON)
            })
            .collect();

        let mut decays = Vec::with_capacity(live.len());
        for (resonance, parent) in live {
            let boson = state.record.particle(resonance)?.clone();
            let mass = boson.momentum.m();
            let cos_theta = rng.random_range(-1.0..=1.0_f64);
            let sin_theta = cos_theta.mul_add(-cos_theta, 1.0).max(0.0).sqrt();
            let phi = core::f64::consts::TAU * rng.random::<f64>();
            let half = 0.5 * mass;
            let rest = FourMomentum::new(
                half * sin_theta * phi.cos(),
                half * sin_theta * phi.sin(),
                half * cos_theta,
                half,
            );
            let flavour = rng.random_range(1..=self.flavours);
            let tag = state.record.next_colour_tag();
            let product = |id: i32, momentum: FourMomentum, colours: (u32, u32)| {
                ParticleBuilder::new(id, status::HARD_OUTGOING)
                    .momentum(momentum.from_rest_frame_of(&boson.momentum))
                    .mass(0.0)
                    .mothers(resonance, ParticleIndex::NONE)
                    .colours(colours.0, colours.1)
                    .scale(mass)
                    .build()
            };
            let opposite = FourMomentum::new(-rest.px, -rest.py, -rest.pz, rest.e);
            let quark = state.record.append(product(flavour, rest, (tag, 0))?)?;
            let antiquark = state.record.append(product(-flavour, opposite, (0, tag))?)?;
            state.record.supersede(resonance, (quark, antiquark))?;
            state.systems.remove_outgoing(parent, resonance)?;
            let system = state.systems.add_system(None, vec![quark, antiquark]);
            debug!(resonance = %resonance, system = %system, mass, flavour, "resonance decayed");
            decays.push(ResonanceDecay {
                resonance,
                system,
                scale: mass,
            });
        }
        Ok(decays)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use interleave_record::consistency;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn beam_config() -> BeamConfig {
        BeamConfig {
            energy_a: 3500.0,
            energy_b: 3500.0,
        }
    }

    #[test]
    fn two_to_two_is_consistent_and_above_cut() {
        let mut process = QcdTwoToTwo::new(beam_config(), 20.0);
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..50 {
            let hard = process.generate(&mut rng).unwrap();
            assert!(hard.info.scale >= 20.0);
            assert!(hard.info.scale <= process.max_scale());
            assert_eq!(hard.systems.len(), 1);
            assert_eq!(hard.record.len(), 7);
            let result = consistency::verify_event(&hard.record, &hard.systems, 1e-9);
            assert!(result.is_consistent(), "{result:?}");
        }
    }

    #[test]
    fn beams_point_at_hard_initiators() {
        let mut process = QcdTwoToTwo::new(beam_config(), 20.0);
        let mut rng = SmallRng::seed_from_u64(8);
        let hard = process.generate(&mut rng).unwrap();
        let (a, b) = hard.systems.subsystem(SubsystemId::new(0)).unwrap().incoming.unwrap();
        assert_eq!(hard.record.beam(BeamSide::A).unwrap().daughters.0, a);
        assert_eq!(hard.record.beam(BeamSide::B).unwrap().daughters.0, b);
    }

    #[test]
    fn resonance_decays_into_new_subsystem() {
        let mut process = ResonanceProduction::new(beam_config(), 91.19, 2.5, 5);
        let mut rng = SmallRng::seed_from_u64(12);
        let hard = process.generate(&mut rng).unwrap();
        let mut state = EvolutionState::new(hard.record, hard.systems);
        let decays = process.decay_resonances(&mut state, &mut rng).unwrap();
        assert_eq!(decays.len(), 1);
        let decay = decays.first().unwrap();
        assert!(state.systems.subsystem(decay.system).unwrap().incoming.is_none());
        assert_eq!(
            state.record.particle(decay.resonance).unwrap().status,
            status::RESONANCE
        );
        let result = consistency::verify_event(&state.record, &state.systems, 1e-9);
        assert!(result.is_consistent(), "{result:?}");

        // Nothing left to decay.
        assert!(process.decay_resonances(&mut state, &mut rng).unwrap().is_empty());
    }

    #[test]
    fn resonance_mass_stays_in_window() {
        let process = ResonanceProduction::new(beam_config(), 91.19, 2.5, 5);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..1_000 {
            let mass = process.sample_mass(&mut rng);
            assert!((mass - 91.19).abs() <= 12.5 + 1e-9);
        }
    }
}
