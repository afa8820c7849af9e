//! The subsystem registry.
//!
//! A subsystem groups the particles that originate from one hard
//! interaction: its two incoming partons (absent for decay subsystems) and
//! the ordered list of its currently live outgoing particles. Every engine
//! commit updates the registry together with the record, so the engines
//! always see a registry that matches the record when they next prepare.

use serde::Serialize;

use interleave_types::{BeamSide, ParticleIndex, SubsystemId};

use crate::RecordError;

/// One scattering subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subsystem {
    /// Incoming pair `(side A, side B)`, absent for decay subsystems.
    pub incoming: Option<(ParticleIndex, ParticleIndex)>,
    /// Currently live outgoing particles, in insertion order.
    pub outgoing: Vec<ParticleIndex>,
    /// `false` once an outgoing particle has been lent to a later
    /// subsystem, after which incoming and outgoing momenta no longer
    /// balance.
    pub balanced: bool,
}

impl Subsystem {
    /// Returns `true` for a subsystem attached to the beams.
    pub const fn has_incoming(&self) -> bool {
        self.incoming.is_some()
    }

    /// The incoming particle on the given side.
    pub fn incoming_on(&self, side: BeamSide) -> Option<ParticleIndex> {
        self.incoming.map(|(a, b)| match side {
            BeamSide::A => a,
            BeamSide::B => b,
        })
    }
}

/// Mapping from subsystem id to its members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubsystemRegistry {
    systems: Vec<Subsystem>,
}

impl SubsystemRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            systems: Vec::new(),
        }
    }

    /// Number of subsystems.
    pub const fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no subsystem has been registered.
    pub const fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Register a new subsystem and return its id.
    pub fn add_system(
        &mut self,
        incoming: Option<(ParticleIndex, ParticleIndex)>,
        outgoing: Vec<ParticleIndex>,
    ) -> SubsystemId {
        let id = SubsystemId::new(self.systems.len());
        self.systems.push(Subsystem {
            incoming,
            outgoing,
            balanced: true,
        });
        id
    }

    /// Look up a subsystem.
    pub fn get(&self, id: SubsystemId) -> Option<&Subsystem> {
        self.systems.get(id.get())
    }

    /// Look up a subsystem, failing on an unknown id.
    pub fn subsystem(&self, id: SubsystemId) -> Result<&Subsystem, RecordError> {
        self.get(id).ok_or(RecordError::UnknownSubsystem(id))
    }

    /// All subsystems with their ids, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SubsystemId, &Subsystem)> {
        self.systems
            .iter()
            .enumerate()
            .map(|(i, s)| (SubsystemId::new(i), s))
    }

    /// All subsystem ids.
    pub fn ids(&self) -> impl Iterator<Item = SubsystemId> + '_ {
        (0..self.systems.len()).map(SubsystemId::new)
    }

    /// The subsystem whose outgoing set contains the particle.
    pub fn system_of(&self, index: ParticleIndex) -> Option<SubsystemId> {
        self.iter()
            .find(|(_, s)| s.outgoing.contains(&index))
            .map(|(id, _)| id)
    }

    /// Replace the incoming particle on one side.
    pub fn set_incoming(
        &mut self,
        id: SubsystemId,
        side: BeamSide,
        index: ParticleIndex,
    ) -> Result<(), RecordError> {
        let system = self.system_mut(id)?;
        let pair = system
            .incoming
            .as_mut()
            .ok_or(RecordError::InvalidParticle("subsystem has no incoming pair"))?;
        match side {
            BeamSide::A => pair.0 = index,
            BeamSide::B => pair.1 = index,
        }
        Ok(())
    }

    /// Replace an outgoing member in place, keeping its position.
    pub fn replace_outgoing(
        &mut self,
        id: SubsystemId,
        old: ParticleIndex,
        new: ParticleIndex,
    ) -> Result<(), RecordError> {
        let system = self.system_mut(id)?;
        let slot = system
            .outgoing
            .iter_mut()
            .find(|i| **i == old)
            .ok_or(RecordError::NotInSubsystem {
                index: old,
                system: id,
            })?;
        *slot = new;
        Ok(())
    }

    /// Append an outgoing member.
    pub fn add_outgoing(&mut self, id: SubsystemId, index: ParticleIndex) -> Result<(), RecordError> {
        self.system_mut(id)?.outgoing.push(index);
        Ok(())
    }

    /// Remove an outgoing member that has been lent to another subsystem.
    pub fn remove_outgoing(
        &mut self,
        id: SubsystemId,
        index: ParticleIndex,
    ) -> Result<(), RecordError> {
        let system = self.system_mut(id)?;
        let before = system.outgoing.len();
        system.outgoing.retain(|i| *i != index);
        if system.outgoing.len() == before {
            return Err(RecordError::NotInSubsystem { index, system: id });
        }
        system.balanced = false;
        Ok(())
    }

    fn system_mut(&mut self, id: SubsystemId) -> Result<&mut Subsystem, RecordError> {
        self.systems
            .get_mut(id.get())
            .ok_or(RecordError::UnknownSubsystem(id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn idx(raw: usize) -> ParticleIndex {
        ParticleIndex::new(raw)
    }

    #[test]
    fn ids_follow_creation_order() {
        let mut registry = SubsystemRegistry::new();
        let first = registry.add_system(Some((idx(3), idx(4))), vec![idx(5), idx(6)]);
        let second = registry.add_system(None, vec![idx(7)]);
        assert_eq!(first, SubsystemId::new(0));
        assert_eq!(second, SubsystemId::new(1));
        assert!(!registry.subsystem(second).unwrap().has_incoming());
    }

    #[test]
    fn replace_keeps_position() {
        let mut registry = SubsystemRegistry::new();
        let id = registry.add_system(Some((idx(3), idx(4))), vec![idx(5), idx(6)]);
        registry.replace_outgoing(id, idx(5), idx(9)).unwrap();
        assert_eq!(registry.subsystem(id).unwrap().outgoing, vec![idx(9), idx(6)]);
        assert_eq!(registry.system_of(idx(9)), Some(id));
        assert_eq!(registry.system_of(idx(5)), None);
    }

    #[test]
    fn incoming_side_update() {
        let mut registry = SubsystemRegistry::new();
        let id = registry.add_system(Some((idx(3), idx(4))), vec![]);
        registry.set_incoming(id, BeamSide::B, idx(8)).unwrap();
        let system = registry.subsystem(id).unwrap();
        assert_eq!(system.incoming_on(BeamSide::A), Some(idx(3)));
        assert_eq!(system.incoming_on(BeamSide::B), Some(idx(8)));
    }

    #[test]
    fn removing_a_member_unbalances() {
        let mut registry = SubsystemRegistry::new();
        let id = registry.add_system(Some((idx(3), idx(4))), vec![idx(5), idx(6)]);
        registry.remove_outgoing(id, idx(6)).unwrap();
        assert!(!registry.subsystem(id).unwrap().balanced);
        assert!(matches!(
            registry.remove_outgoing(id, idx(6)),
            Err(RecordError::NotInSubsystem { .. })
        ));
    }

    #[test]
    fn unknown_subsystem_is_an_error() {
        let mut registry = SubsystemRegistry::new();
        assert_eq!(
            registry.add_outgoing(SubsystemId::new(2), idx(1)),
            Err(RecordError::UnknownSubsystem(SubsystemId::new(2)))
        );
    }
}
