//! Consistency verification for an evolved event.
//!
//! Three families of checks run over the record and registry:
//!
//! - **History**: known identity codes, finite kinematics, colour tags
//!   matching colour type, relatives in range, superseded particles with
//!   daughters that were all appended later.
//! - **Registry**: every outgoing member is live, every incoming member
//!   exists and is not live.
//! - **Conservation**: the summed final state equals the summed momenta
//!   extracted from the beams, within a relative tolerance.
//!
//! ```text
//! sum(p for final) == sum(p for entries whose first mother is a beam)
//! ```
//!
//! A mother link may point to a later entry: backward evolution records the
//! new initiator as mother of the particle it replaces, and the new initiator
//! names the replaced particle among its daughters. Any other daughter link
//! must point forward.

use serde::Serialize;

use interleave_types::{BeamSide, ParticleIndex, SubsystemId, status};

use crate::{EventRecord, SubsystemRegistry};

/// One problem found by a consistency check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Violation {
    /// Identity code 0.
    UnknownCode {
        /// The offending entry.
        index: ParticleIndex,
    },
    /// Colour tags inconsistent with the colour representation.
    ColourMismatch {
        /// The offending entry.
        index: ParticleIndex,
    },
    /// Momentum, mass or scale is not finite.
    NonFinite {
        /// The offending entry.
        index: ParticleIndex,
    },
    /// A mother or daughter index points outside the record.
    DanglingRelative {
        /// The entry holding the link.
        index: ParticleIndex,
        /// The out-of-range relative.
        relative: ParticleIndex,
    },
    /// A superseded entry has no daughters.
    MissingDaughters {
        /// The offending entry.
        index: ParticleIndex,
    },
    /// A daughter link points to an earlier entry.
    BackwardDaughter {
        /// The entry holding the link.
        index: ParticleIndex,
        /// The earlier daughter.
        daughter: ParticleIndex,
    },
    /// A registry outgoing member is not live.
    RegistryNotLive {
        /// The subsystem.
        system: SubsystemId,
        /// The member.
        index: ParticleIndex,
    },
    /// A registry member does not exist in the record.
    RegistryDangling {
        /// The subsystem.
        system: SubsystemId,
        /// The member.
        index: ParticleIndex,
    },
    /// Final-state momentum differs from what was extracted from the beams.
    MomentumImbalance {
        /// Largest absolute component of the difference.
        deviation: f64,
        /// Allowed deviation.
        tolerance: f64,
    },
}

/// The outcome of a full consistency check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConsistencyResult {
    /// No problems found.
    Consistent,
    /// One or more problems found.
    Violations(Vec<Violation>),
}

impl ConsistencyResult {
    /// Returns `true` if no problems were found.
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Run every check.
pub fn verify_event(
    record: &EventRecord,
    registry: &SubsystemRegistry,
    relative_tolerance: f64,
) -> ConsistencyResult {
    let mut violations = verify_history(record);
    violations.extend(verify_registry(record, registry));
    if let Some(imbalance) = verify_momentum(record, relative_tolerance) {
        violations.push(imbalance);
    }
    if violations.is_empty() {
        ConsistencyResult::Consistent
    } else {
        ConsistencyResult::Violations(violations)
    }
}

/// Check identity codes, kinematics, colours and the shape of the history.
pub fn verify_history(record: &EventRecord) -> Vec<Violation> {
    let mut violations = Vec::new();
    let len = record.len();

    for (index, particle) in record.iter() {
        if index.is_none() {
            continue;
        }
        if particle.id == 0 {
            violations.push(Violation::UnknownCode { index });
        }
        if !particle.momentum.is_finite() || !particle.mass.is_finite() || !particle.scale.is_finite() {
            violations.push(Violation::NonFinite { index });
        }
        if particle.is_final() && !particle.colours_match_type() {
            violations.push(Violation::ColourMismatch { index });
        }

        for relative in [particle.mothers.0, particle.mothers.1, particle.daughters.0, particle.daughters.1] {
            if relative.get() >= len {
                violations.push(Violation::DanglingRelative { index, relative });
            }
        }

        let daughters = particle.daughter_list();
        if particle.status < 0 && daughters.is_empty() {
            violations.push(Violation::MissingDaughters { index });
        }
        for daughter in daughters {
            if daughter <= index && !is_backward_link(record, index, daughter) {
                violations.push(Violation::BackwardDaughter { index, daughter });
            }
        }
    }
    violations
}

/// A later entry may name an earlier one as daughter only if the earlier one
/// names it back as mother. Backward carbon copies and new initiators both
/// link this way.
fn is_backward_link(record: &EventRecord, later: ParticleIndex, earlier: ParticleIndex) -> bool {
    record
        .get(earlier)
        .is_some_and(|p| p.mother_list().contains(&later))
}

/// Check that registry members exist and have the expected liveness.
pub fn verify_registry(record: &EventRecord, registry: &SubsystemRegistry) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (system, members) in registry.iter() {
        for &index in &members.outgoing {
            match record.get(index) {
                None => violations.push(Violation::RegistryDangling { system, index }),
                Some(p) if !p.is_final() => {
                    violations.push(Violation::RegistryNotLive { system, index });
                }
                Some(_) => {}
            }
        }
        if let Some((a, b)) = members.incoming {
            for index in [a, b] {
                if record.get(index).is_none() {
                    violations.push(Violation::RegistryDangling { system, index });
                }
            }
        }
    }
    violations
}

/// Compare the summed final state with the summed beam extractions.
///
/// Returns `None` for a record without beams or with nothing extracted.
pub fn verify_momentum(record: &EventRecord, relative_tolerance: f64) -> Option<Violation> {
    let beams = BeamSide::BOTH.map(|side| ParticleIndex::new(side.record_index()));
    if beams.iter().any(|b| record.get(*b).is_none_or(|p| p.status != status::BEAM)) {
        return None;
    }

    let extracted = record
        .iter()
        .filter(|(index, p)| !beams.contains(index) && beams.contains(&p.mothers.0))
        .map(|(_, p)| p.momentum)
        .collect::<Vec<_>>();
    if extracted.is_empty() {
        return None;
    }
    let initial = extracted.into_iter().sum::<interleave_types::FourMomentum>();
    let final_state = record.final_state().map(|(_, p)| p.momentum).sum::<interleave_types::FourMomentum>();

    let deviation = (final_state - initial).max_abs();
    let tolerance = relative_tolerance * initial.e.abs().max(1.0);
    (deviation > tolerance).then_some(Violation::MomentumImbalance {
        deviation,
        tolerance,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::ParticleBuilder;
    use interleave_types::{FourMomentum, Particle, codes};

    fn beams() -> EventRecord {
        EventRecord::with_beams(
            Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(500.0)),
            Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(-500.0)),
        )
    }

    /// gg -> gg at 90 degrees with 20 GeV per parton.
    fn two_to_two() -> (EventRecord, SubsystemRegistry) {
        let mut record = beams();
        let one = ParticleIndex::new(1);
        let two = ParticleIndex::new(2);
        let a = record
            .append(
                ParticleBuilder::new(codes::GLUON, status::HARD_INCOMING)
                    .momentum(FourMomentum::along_axis(20.0))
                    .mothers(one, ParticleIndex::NONE)
                    .colours(101, 102)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let b = record
            .append(
                ParticleBuilder::new(codes::GLUON, status::HARD_INCOMING)
                    .momentum(FourMomentum::along_axis(-20.0))
                    .mothers(two, ParticleIndex::NONE)
                    .colours(103, 101)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let c = record
            .append(
                ParticleBuilder::new(codes::GLUON, status::HARD_OUTGOING)
                    .momentum(FourMomentum::new(20.0, 0.0, 0.0, 20.0))
                    .mothers(a, b)
                    .colours(103, 104)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let d = record
            .append(
                ParticleBuilder::new(codes::GLUON, status::HARD_OUTGOING)
                    .momentum(FourMomentum::new(-20.0, 0.0, 0.0, 20.0))
                    .mothers(a, b)
                    .colours(104, 102)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        record.set_daughters(one, (a, a)).unwrap();
        record.set_daughters(two, (b, b)).unwrap();
        record.set_daughters(a, (c, d)).unwrap();
        record.set_daughters(b, (c, d)).unwrap();
        let mut registry = SubsystemRegistry::new();
        registry.add_system(Some((a, b)), vec![c, d]);
        (record, registry)
    }

    #[test]
    fn well_formed_event_is_consistent() {
        let (record, registry) = two_to_two();
        assert_eq!(verify_event(&record, &registry, 1e-9), ConsistencyResult::Consistent);
    }

    #[test]
    fn superseded_without_daughters_is_flagged() {
        let (mut record, registry) = two_to_two();
        record.set_status(ParticleIndex::new(5), -23).unwrap();
        let result = verify_event(&record, &registry, 1e-9);
        let ConsistencyResult::Violations(found) = result else {
            panic!("expected violations");
        };
        assert!(found.contains(&Violation::MissingDaughters {
            index: ParticleIndex::new(5)
        }));
        assert!(found.iter().any(|v| matches!(v, Violation::RegistryNotLive { .. })));
    }

    #[test]
    fn momentum_imbalance_is_flagged() {
        let (mut record, _) = two_to_two();
        record
            .set_momentum(ParticleIndex::new(5), FourMomentum::new(25.0, 0.0, 0.0, 25.0))
            .unwrap();
        assert!(matches!(
            verify_momentum(&record, 1e-6),
            Some(Violation::MomentumImbalance { .. })
        ));
    }

    #[test]
    fn unreciprocated_earlier_daughter_is_flagged() {
        let (mut record, _) = two_to_two();
        let later = record.carbon_copy(ParticleIndex::new(5), 51).unwrap();
        record.set_daughters(later, (ParticleIndex::new(6), ParticleIndex::NONE)).unwrap();
        assert!(verify_history(&record).contains(&Violation::BackwardDaughter {
            index: later,
            daughter: ParticleIndex::new(6)
        }));
    }

    #[test]
    fn backward_copy_link_is_allowed() {
        let (mut record, _) = two_to_two();
        record.carbon_copy(ParticleIndex::new(3), -41).unwrap();
        assert!(
            verify_history(&record)
                .iter()
                .all(|v| !matches!(v, Violation::BackwardDaughter { .. }))
        );
    }
}
