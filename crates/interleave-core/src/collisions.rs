//! Additional hard subcollisions from an impact-parameter overlap model.
//!
//! Each event draws an impact parameter `b` once. The overlap of the two
//! beams at that `b` enhances (central collisions) or suppresses
//! (peripheral ones) the rate
//!
//! ```text
//! dP / dpT2 = e(b) * norm / (pT2 + pT0^2)^2
//! ```
//!
//! whose Sudakov integral inverts in closed form, so trial scales need no
//! veto against an overestimate. Each collision is a gluon-gluon scattering
//! at fixed `pT` with both outgoing rapidities uniform; trials that would
//! take more momentum than the beams have left are vetoed and the descent
//! continues.
//!
//! With rescattering enabled, a collision may instead pull in an already
//! live gluon of an earlier subsystem as its side-B incoming parton. The
//! earlier subsystem loses that gluon and is marked unbalanced.

use rand::Rng;
use tracing::debug;

use interleave_record::ParticleBuilder;
use interleave_shower::outgoing::transverse_vector;
use interleave_shower::sudakov::MAX_TRIALS;
use interleave_shower::{
    Branching, BranchingSource, CommitOutcome, EvolutionError, EvolutionState, RandomStream,
    beam_fraction_used,
};
use interleave_types::{BeamSide, FourMomentum, ParticleIndex, SourceKind, SubsystemId, codes, status};

use crate::config::CollisionConfig;

#[derive(Debug, Clone, Copy)]
struct Pending {
    pt: f64,
    y3: f64,
    y4: f64,
    x1: f64,
    x2: f64,
    rescatter: Option<(ParticleIndex, SubsystemId)>,
}

/// The toy additional-collision source.
#[derive(Debug, Clone)]
pub struct ImpactParameterCollisions {
    config: CollisionConfig,
    beam_reserve: f64,
    impact_parameter: f64,
    enhancement: f64,
    collisions: usize,
    pending: Option<Pending>,
}

impl ImpactParameterCollisions {
    /// Create a source. `beam_reserve` is the momentum fraction each beam
    /// keeps back, shared with the incoming engine.
    pub const fn new(config: CollisionConfig, beam_reserve: f64) -> Self {
        Self {
            config,
            beam_reserve,
            impact_parameter: 0.0,
            enhancement: 1.0,
            collisions: 0,
            pending: None,
        }
    }

    /// Impact parameter drawn for the current event.
    pub const fn impact_parameter(&self) -> f64 {
        self.impact_parameter
    }

    /// Overlap enhancement of the current event; averages to one.
    pub const fn enhancement(&self) -> f64 {
        self.enhancement
    }

    /// Additional collisions committed in the current event.
    pub const fn collisions(&self) -> usize {
        self.collisions
    }

    fn available(&self, state: &EvolutionState, side: BeamSide) -> f64 {
        1.0 - self.beam_reserve - beam_fraction_used(state, side, None)
    }

    /// A live gluon of a beam-attached subsystem that can be rescattered.
    fn pick_rescatter(
        state: &EvolutionState,
        rng: &mut RandomStream,
    ) -> Option<(ParticleIndex, SubsystemId)> {
        let candidates: Vec<(ParticleIndex, SubsystemId)> = state
            .systems
            .iter()
            .filter(|(_, system)| system.has_incoming())
            .flat_map(|(id, system)| system.outgoing.iter().map(move |index| (*index, id)))
            .filter(|(index, _)| {
                state.record.get(*index).is_some_and(|p| {
                    p.is_final() && p.is_gluon() && p.momentum.minus() > 0.0
                })
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let choice = rng.random_range(0..candidates.len());
        candidates.get(choice).copied()
    }

    fn commit_fresh(
        state: &mut EvolutionState,
        pending: Pending,
        phi: f64,
    ) -> Result<Branching, EvolutionError> {
        let beam_a = ParticleIndex::new(BeamSide::A.record_index());
        let beam_b = ParticleIndex::new(BeamSide::B.record_index());
        let energy_a = state.record.particle(beam_a)?.momentum.e;
        let energy_b = state.record.particle(beam_b)?.momentum.e;
        let pt = pending.pt;

        let (t1, t2, t3, t4) = (
            state.record.next_colour_tag(),
            state.record.next_colour_tag(),
            state.record.next_colour_tag(),
            state.record.next_colour_tag(),
        );
        let incoming = |momentum, mother, colours: (u32, u32)| {
            ParticleBuilder::new(codes::GLUON, status::COLLISION_INCOMING)
                .momentum(momentum)
                .mass(0.0)
                .mothers(mother, ParticleIndex::NONE)
                .colours(colours.0, colours.1)
                .scale(pt)
                .build()
        };
        let g1 = state
            .record
            .append(incoming(FourMomentum::along_axis(pending.x1 * energy_a), beam_a, (t1, t2))?)?;
        let g2 = state
            .record
            .append(incoming(FourMomentum::along_axis(-pending.x2 * energy_b), beam_b, (t3, t1))?)?;
        let outgoing = |momentum, colours: (u32, u32)| {
            ParticleBuilder::new(codes::GLUON, status::COLLISION_OUTGOING)
                .momentum(momentum)
                .mass(0.0)
                .mothers(g1, g2)
                .colours(colours.0, colours.1)
                .scale(pt)
                .build()
        };
        let g3 = state
            .record
            .append(outgoing(FourMomentum::from_pt_rapidity(pt, phi, pending.y3), (t3, t4))?)?;
        let g4 = state.record.append(outgoing(
            FourMomentum::from_pt_rapidity(pt, phi + core::f64::consts::PI, pending.y4),
            (t4, t2),
        )?)?;
        state.record.set_daughters(g1, (g3, g4))?;
        state.record.set_daughters(g2, (g3, g4))?;
        let system = state.systems.add_system(Some((g1, g2)), vec![g3, g4]);

        Ok(Branching {
            kind: SourceKind::Collision,
            system,
            scale: pt,
            appended: vec![g1, g2, g3, g4],
            touched: vec![system],
            created: Some(system),
        })
    }

    fn commit_rescatter(
        state: &mut EvolutionState,
        pending: Pending,
        rescattered: ParticleIndex,
        donor: SubsystemId,
        phi: f64,
    ) -> Result<Option<Branching>, EvolutionError> {
        let beam_a = ParticleIndex::new(BeamSide::A.record_index());
        let energy_a = state.record.particle(beam_a)?.momentum.e;
        let partner = state.record.particle(rescattered)?.clone();
        if !partner.is_final() {
            return Ok(None);
        }
        let pt = pending.pt;
        let first = FourMomentum::along_axis(pending.x1 * energy_a);
        let cos_theta = (0.5 * (pending.y3 - pending.y4)).tanh();
        let Some(kick) = transverse_vector(&first, &partner.momentum, pt, phi) else {
            return Ok(None);
        };
        let forward = 0.5 * (1.0 + cos_theta);
        let backward = 0.5 * (1.0 - cos_theta);
        let p3 = first * forward + partner.momentum * backward + kick;
        let p4 = first * backward + partner.momentum * forward - kick;
        if !p3.is_finite() || !p4.is_finite() || p3.e <= 0.0 || p4.e <= 0.0 {
            return Ok(None);
        }

        let (t1, t2) = (state.record.next_colour_tag(), state.record.next_colour_tag());
        let g1 = state.record.append(
            ParticleBuilder::new(codes::GLUON, status::COLLISION_INCOMING)
                .momentum(first)
                .mass(0.0)
                .mothers(beam_a, ParticleIndex::NONE)
                .colours(t1, t2)
                .scale(pt)
                .build()?,
        )?;
        let outgoing = |momentum, colours: (u32, u32)| {
            ParticleBuilder::new(codes::GLUON, status::COLLISION_OUTGOING)
                .momentum(momentum)
                .mass(0.0)
                .mothers(g1, rescattered)
                .colours(colours.0, colours.1)
                .scale(pt)
                .build()
        };
        let g3 = state.record.append(outgoing(p3, (partner.colour, t2))?)?;
        let g4 = state.record.append(outgoing(p4, (t1, partner.anticolour))?)?;
        state.record.set_daughters(g1, (g3, g4))?;
        state.record.set_daughters(rescattered, (g3, g4))?;
        state.record.set_status(rescattered, status::RESCATTERED)?;
        state.systems.remove_outgoing(donor, rescattered)?;
        let system = state.systems.add_system(Some((g1, rescattered)), vec![g3, g4]);

        Ok(Some(Branching {
            kind: SourceKind::Collision,
            system,
            scale: pt,
            appended: vec![g1, g3, g4],
            touched: vec![donor, system],
            created: Some(system),
        }))
    }
}

impl BranchingSource for ImpactParameterCollisions {
    fn kind(&self) -> SourceKind {
        SourceKind::Collision
    }

    fn begin_event(&mut self, _state: &EvolutionState, rng: &mut RandomStream) {
        let r: f64 = rng.random();
        // Overlap exp(-b^2 / 2w^2) is uniform in (0, 1]; doubling it makes
        // the mean enhancement one.
        let overlap = 1.0 - r;
        self.impact_parameter = self.config.profile_width * (-2.0 * overlap.ln()).sqrt();
        self.enhancement = 2.0 * overlap;
        self.collisions = 0;
        self.pending = None;
        debug!(
            impact_parameter = self.impact_parameter,
            enhancement = self.enhancement,
            "impact parameter drawn"
        );
    }

    fn prepare(&mut self, _system: SubsystemId, _state: &EvolutionState) {
        self.pending = None;
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn tracked_systems(&self) -> Vec<SubsystemId> {
        Vec::new()
    }

    fn next_candidate(
        &mut self,
        ceiling: f64,
        floor: f64,
        state: &EvolutionState,
        rng: &mut RandomStream,
    ) -> Option<f64> {
        self.pending = None;
        if !self.config.enabled || self.collisions >= self.config.max_collisions {
            return None;
        }
        let rate = self.enhancement * self.config.coupling_norm;
        let pt0_sq = self.config.pt0 * self.config.pt0;
        if rate <= 0.0 || ceiling <= floor {
            return None;
        }
        let energy_a = state.record.beam(BeamSide::A)?.momentum.e;
        let energy_b = state.record.beam(BeamSide::B)?.momentum.e;
        let sqrt_s = 2.0 * (energy_a * energy_b).sqrt();
        let available_a = self.available(state, BeamSide::A);
        let available_b = self.available(state, BeamSide::B);
        let floor_sq = floor * floor;

        let mut inverse = 1.0 / (ceiling * ceiling + pt0_sq);
        for _ in 0..MAX_TRIALS {
            let r: f64 = rng.random();
            inverse -= r.ln() / rate;
            let pt_sq = 1.0 / inverse - pt0_sq;
            if pt_sq <= floor_sq {
                return None;
            }
            let pt = pt_sq.sqrt();
            let y_max = (sqrt_s / pt).ln();
            if y_max <= 0.0 {
                continue;
            }
            let y3 = rng.random_range(-y_max..y_max);
            let y4 = rng.random_range(-y_max..y_max);

            if rng.random::<f64>() < self.config.rescatter_probability {
                if let Some((index, donor)) = Self::pick_rescatter(state, rng) {
                    let partner_minus = state.record.get(index).map_or(0.0, |p| p.momentum.minus());
                    let s_hat = 2.0 * pt_sq * (1.0 + (y3 - y4).cosh());
                    let x1 = s_hat / (2.0 * energy_a * partner_minus);
                    if x1 < available_a {
                        self.pending = Some(Pending {
                            pt,
                            y3,
                            y4,
                            x1,
                            x2: 0.0,
                            rescatter: Some((index, donor)),
                        });
                        return Some(pt);
                    }
                    continue;
                }
            }

            let x1 = pt * (y3.exp() + y4.exp()) / (2.0 * energy_a);
            let x2 = pt * ((-y3).exp() + (-y4).exp()) / (2.0 * energy_b);
            if x1 < available_a && x2 < available_b {
                self.pending = Some(Pending {
                    pt,
                    y3,
                    y4,
                    x1,
                    x2,
                    rescatter: None,
                });
                return Some(pt);
            }
        }
        None
    }

    fn commit(
        &mut self,
        state: &mut EvolutionState,
        rng: &mut RandomStream,
    ) -> Result<CommitOutcome, EvolutionError> {
        let kind = self.kind();
        let pending = self.pending.take().ok_or(EvolutionError::NoCandidate { kind })?;
        let phi = core::f64::consts::TAU * rng.random::<f64>();
        let branching = match pending.rescatter {
            None => Self::commit_fresh(state, pending, phi)?,
            Some((index, donor)) => {
                match Self::commit_rescatter(state, pending, index, donor, phi)? {
                    Some(branching) => branching,
                    None => {
                        return Ok(CommitOutcome::Refused {
                            reason: "rescattered parton cannot absorb the collision",
                        });
                    }
                }
            }
        };
        self.collisions = self.collisions.saturating_add(1);
        debug!(
            system = %branching.system,
            scale = branching.scale,
            rescatter = pending.rescatter.is_some(),
            collisions = self.collisions,
            "additional collision committed"
        );
        Ok(CommitOutcome::Committed(branching))
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
    use interleave_types::Particle;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn beams_only() -> EvolutionState {
        let record = EventRecord::with_beams(
            Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(3500.0)),
            Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(-3500.0)),
        );
        EvolutionState::new(record, SubsystemRegistry::new())
    }

    fn source(config: CollisionConfig) -> ImpactParameterCollisions {
        ImpactParameterCollisions::new(config, 0.01)
    }

    #[test]
    fn disabled_source_has_no_candidates() {
        let state = beams_only();
        let mut collisions = source(CollisionConfig {
            enabled: false,
            ..CollisionConfig::default()
        });
        let mut rng = SmallRng::seed_from_u64(1);
        collisions.begin_event(&state, &mut rng);
        assert_eq!(collisions.next_candidate(100.0, 1.0, &state, &mut rng), None);
    }

    #[test]
    fn enhancement_averages_to_one() {
        let state = beams_only();
        let mut collisions = source(CollisionConfig::default());
        let mut rng = SmallRng::seed_from_u64(5);
        let n = 20_000;
        let mut sum = 0.0;
        for _ in 0..n {
            collisions.begin_event(&state, &mut rng);
            sum += collisions.enhancement();
            assert!(collisions.impact_parameter() >= 0.0);
        }
        let mean = sum / f64::from(n);
        assert!((mean - 1.0).abs() < 0.05, "mean enhancement {mean}");
    }

    #[test]
    fn descending_collisions_create_consistent_subsystems() {
        let mut state = beams_only();
        let mut collisions = source(CollisionConfig::default());
        let mut rng = SmallRng::seed_from_u64(11);
        collisions.begin_event(&state, &mut rng);
        let mut ceiling = 50.0;
        while let Some(scale) = collisions.next_candidate(ceiling, 2.0, &state, &mut rng) {
            assert!(scale <= ceiling && scale > 2.0);
            let CommitOutcome::Committed(branching) = collisions.commit(&mut state, &mut rng).unwrap() else {
                panic!("fresh collisions are never refused");
            };
            assert_eq!(branching.created, Some(branching.system));
            ceiling = scale;
        }
        assert_eq!(state.systems.len(), collisions.collisions());
        assert!(collisions.collisions() <= CollisionConfig::default().max_collisions);
        let result = consistency::verify_event(&state.record, &state.systems, 1e-9);
        assert!(result.is_consistent(), "{result:?}");
        assert!(beam_fraction_used(&state, BeamSide::A, None) < 0.99);
    }

    #[test]
    fn max_collisions_is_enforced() {
        let mut state = beams_only();
        let mut collisions = source(CollisionConfig {
            max_collisions: 1,
            coupling_norm: 1.0e4,
            ..CollisionConfig::default()
        });
        let mut rng = SmallRng::seed_from_u64(3);
        collisions.begin_event(&state, &mut rng);
        while collisions.next_candidate(100.0, 2.0, &state, &mut rng).is_none() {
            collisions.begin_event(&state, &mut rng);
        }
        collisions.commit(&mut state, &mut rng).unwrap();
        assert_eq!(collisions.next_candidate(100.0, 0.0, &state, &mut rng), None);
    }

    #[test]
    fn rescattering_reuses_a_live_gluon() {
        let mut state = beams_only();
        let mut collisions = source(CollisionConfig {
            rescatter_probability: 1.0,
            coupling_norm: 1.0e4,
            ..CollisionConfig::default()
        });
        let mut rng = SmallRng::seed_from_u64(9);
        collisions.begin_event(&state, &mut rng);

        // The first collision has nothing to rescatter.
        let mut ceiling = 40.0;
        let scale = loop {
            if let Some(scale) = collisions.next_candidate(ceiling, 2.0, &state, &mut rng) {
                break scale;
            }
            collisions.begin_event(&state, &mut rng);
            ceiling = 40.0;
        };
        collisions.commit(&mut state, &mut rng).unwrap();
        ceiling = scale;

        let mut rescattered = false;
        while let Some(scale) = collisions.next_candidate(ceiling, 2.0, &state, &mut rng) {
            if let CommitOutcome::Committed(branching) = collisions.commit(&mut state, &mut rng).unwrap() {
                if branching.touched.len() == 2 {
                    rescattered = true;
                    let donor = state.systems.subsystem(branching.touched[0]).unwrap();
                    assert!(!donor.balanced);
                    let (_, partner) = state.systems.subsystem(branching.system).unwrap().incoming.unwrap();
                    assert_eq!(state.record.particle(partner).unwrap().status, status::RESCATTERED);
                }
            }
            ceiling = scale;
        }
        assert!(rescattered);
        let result = consistency::verify_event(&state.record, &state.systems, 1e-9);
        assert!(result.is_consistent(), "{result:?}");
    }
}
