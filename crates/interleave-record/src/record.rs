//! The event record: an append-only arena of particles.
//!
//! # Design
//!
//! - **Append-only**: indices are handed out in creation order and never
//!   reused. The only removal is a rollback truncating back to a checkpoint.
//! - **Journaled mutation**: while a checkpoint is open, the first write to
//!   any particle that existed at checkpoint time saves its original value.
//!   Rolling back restores those values and truncates appended entries.
//! - **Colour tags**: fresh tags are issued above the largest tag seen, so a
//!   record built from an external source never collides with new tags.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use interleave_types::{BeamSide, FourMomentum, Particle, ParticleIndex, codes, status};

use crate::RecordError;

/// First colour tag issued is one above this value.
const COLOUR_TAG_BASE: u32 = 100;

/// Saved state for an open checkpoint.
#[derive(Debug, Clone)]
struct Journal {
    length: usize,
    next_colour: u32,
    saved: BTreeMap<usize, Particle>,
}

/// The full provenance graph of one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    particles: Vec<Particle>,
    next_colour: u32,
    #[serde(skip)]
    journal: Option<Journal>,
}

impl Default for EventRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecord {
    /// Create a record holding only the system entry at index 0.
    pub fn new() -> Self {
        Self {
            particles: vec![Particle::new(codes::SYSTEM, status::SYSTEM, FourMomentum::default())],
            next_colour: COLOUR_TAG_BASE,
            journal: None,
        }
    }

    /// Create a record with the two beam particles at indices 1 and 2.
    ///
    /// The system entry gets the beams as daughters and its momentum set to
    /// their sum.
    pub fn with_beams(beam_a: Particle, beam_b: Particle) -> Self {
        let total = beam_a.momentum + beam_b.momentum;
        let mut record = Self::new();
        for mut beam in [beam_a, beam_b] {
            beam.status = status::BEAM;
            beam.mothers = (ParticleIndex::NONE, ParticleIndex::NONE);
            beam.daughters = (ParticleIndex::NONE, ParticleIndex::NONE);
            record.particles.push(beam);
        }
        if let Some(system) = record.particles.first_mut() {
            system.daughters = (ParticleIndex::new(1), ParticleIndex::new(2));
            system.momentum = total;
            system.mass = total.m();
        }
        record
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    /// Number of entries, including the system entry.
    pub const fn len(&self) -> usize {
        self.particles.len()
    }

    /// Returns `true` if the record holds no entries at all.
    pub const fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Look up a particle.
    pub fn get(&self, index: ParticleIndex) -> Option<&Particle> {
        self.particles.get(index.get())
    }

    /// Look up a particle, failing on an out-of-range index.
    pub fn particle(&self, index: ParticleIndex) -> Result<&Particle, RecordError> {
        self.get(index).ok_or(RecordError::UnknownParticle {
            index,
            len: self.len(),
        })
    }

    /// The beam particle on the given side, if the record was built with beams.
    pub fn beam(&self, side: BeamSide) -> Option<&Particle> {
        self.particles
            .get(side.record_index())
            .filter(|p| p.status == status::BEAM)
    }

    /// All entries with their indices, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ParticleIndex, &Particle)> {
        self.particles
            .iter()
            .enumerate()
            .map(|(i, p)| (ParticleIndex::new(i), p))
    }

    /// Live final-state entries with their indices.
    pub fn final_state(&self) -> impl Iterator<Item = (ParticleIndex, &Particle)> {
        self.iter().filter(|(_, p)| p.is_final())
    }

    /// All entries as a slice.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    // -----------------------------------------------------------------------
    // Appends
    // -----------------------------------------------------------------------

    /// Append a particle and return its index.
    ///
    /// Mothers must already exist; daughters must be empty because nothing
    /// after the new entry exists yet.
    pub fn append(&mut self, particle: Particle) -> Result<ParticleIndex, RecordError> {
        if !particle.momentum.is_finite() {
            return Err(RecordError::InvalidParticle("non-finite momentum"));
        }
        for mother in [particle.mothers.0, particle.mothers.1] {
            self.check_index(mother)?;
        }
        if !particle.daughters.0.is_none() || !particle.daughters.1.is_none() {
            return Err(RecordError::InvalidParticle(
                "daughters must be empty when appending",
            ));
        }
        self.next_colour = self
            .next_colour
            .max(particle.colour)
            .max(particle.anticolour);
        let index = ParticleIndex::new(self.particles.len());
        self.particles.push(particle);
        Ok(index)
    }

    /// Copy an existing particle to the end of the record with a new status.
    ///
    /// A positive status makes a forward copy: the original is superseded with
    /// the copy as its daughter, and the copy has the original as mother. A
    /// negative status makes a backward copy: the copy becomes the mother of
    /// the original.
    pub fn carbon_copy(
        &mut self,
        index: ParticleIndex,
        new_status: i32,
    ) -> Result<ParticleIndex, RecordError> {
        if new_status == 0 {
            return Err(RecordError::InvalidParticle("copy status must be non-zero"));
        }
        let mut copy = self.particle(index)?.clone();
        copy.status = new_status;
        copy.daughters = (ParticleIndex::NONE, ParticleIndex::NONE);
        if new_status > 0 {
            copy.mothers = (index, index);
        }
        let copy_index = self.append(copy)?;
        if new_status > 0 {
            let original = self.touch(index)?;
            original.status = -original.status.abs();
            original.daughters = (copy_index, copy_index);
        } else {
            self.touch(index)?.mothers = (copy_index, copy_index);
            self.touch(copy_index)?.daughters = (index, index);
        }
        Ok(copy_index)
    }

    /// Issue a fresh colour tag.
    pub const fn next_colour_tag(&mut self) -> u32 {
        self.next_colour = self.next_colour.saturating_add(1);
        self.next_colour
    }

    // -----------------------------------------------------------------------
    // Field mutation
    // -----------------------------------------------------------------------

    /// Set the status of a particle.
    pub fn set_status(&mut self, index: ParticleIndex, new_status: i32) -> Result<(), RecordError> {
        self.touch(index)?.status = new_status;
        Ok(())
    }

    /// Mark a particle superseded by the given daughters.
    pub fn supersede(
        &mut self,
        index: ParticleIndex,
        daughters: (ParticleIndex, ParticleIndex),
    ) -> Result<(), RecordError> {
        self.set_daughters(index, daughters)?;
        let particle = self.touch(index)?;
        particle.status = -particle.status.abs();
        Ok(())
    }

    /// Replace the mother pair.
    pub fn set_mothers(
        &mut self,
        index: ParticleIndex,
        mothers: (ParticleIndex, ParticleIndex),
    ) -> Result<(), RecordError> {
        self.check_index(mothers.0)?;
        self.check_index(mothers.1)?;
        self.touch(index)?.mothers = mothers;
        Ok(())
    }

    /// Replace the daughter pair.
    pub fn set_daughters(
        &mut self,
        index: ParticleIndex,
        daughters: (ParticleIndex, ParticleIndex),
    ) -> Result<(), RecordError> {
        self.check_index(daughters.0)?;
        self.check_index(daughters.1)?;
        self.touch(index)?.daughters = daughters;
        Ok(())
    }

    /// Replace the colour and anticolour tags.
    pub fn set_colours(
        &mut self,
        index: ParticleIndex,
        colour: u32,
        anticolour: u32,
    ) -> Result<(), RecordError> {
        let particle = self.touch(index)?;
        particle.colour = colour;
        particle.anticolour = anticolour;
        self.next_colour = self.next_colour.max(colour).max(anticolour);
        Ok(())
    }

    /// Replace the production scale.
    pub fn set_scale(&mut self, index: ParticleIndex, scale: f64) -> Result<(), RecordError> {
        self.touch(index)?.scale = scale;
        Ok(())
    }

    /// Replace the momentum.
    pub fn set_momentum(
        &mut self,
        index: ParticleIndex,
        momentum: FourMomentum,
    ) -> Result<(), RecordError> {
        if !momentum.is_finite() {
            return Err(RecordError::InvalidParticle("non-finite momentum"));
        }
        self.touch(index)?.momentum = momentum;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Open a checkpoint covering the next branching.
    pub fn begin_checkpoint(&mut self) -> Result<(), RecordError> {
        if self.journal.is_some() {
            return Err(RecordError::CheckpointAlreadyOpen);
        }
        self.journal = Some(Journal {
            length: self.particles.len(),
            next_colour: self.next_colour,
            saved: BTreeMap::new(),
        });
        Ok(())
    }

    /// Returns `true` while a checkpoint is open.
    pub const fn has_checkpoint(&self) -> bool {
        self.journal.is_some()
    }

    /// Undo everything since the open checkpoint and close it.
    ///
    /// Returns the number of appended entries that were removed.
    pub fn rollback(&mut self) -> Result<usize, RecordError> {
        let journal = self.journal.take().ok_or(RecordError::NoCheckpoint)?;
        let removed = self.particles.len().saturating_sub(journal.length);
        self.particles.truncate(journal.length);
        let restored = journal.saved.len();
        for (position, original) in journal.saved {
            if let Some(slot) = self.particles.get_mut(position) {
                *slot = original;
            }
        }
        self.next_colour = journal.next_colour;
        debug!(removed, restored, "record rolled back to checkpoint");
        Ok(removed)
    }

    /// Keep everything since the open checkpoint and close it.
    pub fn release(&mut self) -> Result<(), RecordError> {
        self.journal.take().map(|_| ()).ok_or(RecordError::NoCheckpoint)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_index(&self, index: ParticleIndex) -> Result<(), RecordError> {
        if index.get() < self.particles.len() {
            Ok(())
        } else {
            Err(RecordError::UnknownParticle {
                index,
                len: self.particles.len(),
            })
        }
    }

    /// Mutable access that journals the original value first.
    fn touch(&mut self, index: ParticleIndex) -> Result<&mut Particle, RecordError> {
        let len = self.particles.len();
        let position = index.get();
        if let Some(journal) = self.journal.as_mut() {
            if position < journal.length && !journal.saved.contains_key(&position) {
                if let Some(original) = self.particles.get(position) {
                    journal.saved.insert(position, original.clone());
                }
            }
        }
        self.particles
            .get_mut(position)
            .ok_or(RecordError::UnknownParticle { index, len })
    }
}

impl core::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "{:>5} {:>6} {:>5} {:>11} {:>11} {:>7} {:>47} {:>9} {:>9}",
            "no", "id", "stat", "mothers", "daughters", "colours", "p = (px py pz e)", "m", "scale"
        )?;
        for (index, p) in self.iter() {
            writeln!(
                f,
                "{:>5} {:>6} {:>5} {:>5} {:>5} {:>5} {:>5} {:>3} {:>3} {} {:>9.3} {:>9.3}",
                index,
                p.id,
                p.status,
                p.mothers.0,
                p.mothers.1,
                p.daughters.0,
                p.daughters.1,
                p.colour,
                p.anticolour,
                p.momentum,
                p.mass,
                p.scale
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn proton(pz: f64) -> Particle {
        Particle::new(codes::PROTON, status::BEAM, FourMomentum::along_axis(pz))
    }

    fn gluon(px: f64) -> Particle {
        let mut p = Particle::new(codes::GLUON, status::HARD_OUTGOING, FourMomentum::new(px, 0.0, 0.0, px.abs()));
        p.colour = 101;
        p.anticolour = 102;
        p
    }

    #[test]
    fn new_record_holds_system_entry() {
        let record = EventRecord::new();
        assert_eq!(record.len(), 1);
        let system = record.particle(ParticleIndex::NONE).unwrap();
        assert_eq!(system.status, status::SYSTEM);
    }

    #[test]
    fn beams_become_system_daughters() {
        let record = EventRecord::with_beams(proton(500.0), proton(-500.0));
        assert_eq!(record.len(), 3);
        let system = record.particle(ParticleIndex::NONE).unwrap();
        assert_eq!(system.daughter_list().len(), 2);
        assert!((system.mass - 1000.0).abs() < 1e-9);
        assert!(record.beam(BeamSide::A).is_some());
        assert!(record.beam(BeamSide::B).is_some());
    }

    #[test]
    fn append_rejects_dangling_mother() {
        let mut record = EventRecord::new();
        let mut p = gluon(5.0);
        p.mothers = (ParticleIndex::new(9), ParticleIndex::NONE);
        assert!(matches!(
            record.append(p),
            Err(RecordError::UnknownParticle { .. })
        ));
    }

    #[test]
    fn colour_tags_start_above_base_and_skip_seen_tags() {
        let mut record = EventRecord::new();
        assert_eq!(record.next_colour_tag(), 101);
        let mut p = gluon(5.0);
        p.colour = 140;
        record.append(p).unwrap();
        assert_eq!(record.next_colour_tag(), 141);
    }

    #[test]
    fn forward_carbon_copy_links_both_ways() {
        let mut record = EventRecord::new();
        let original = record.append(gluon(5.0)).unwrap();
        let copy = record.carbon_copy(original, status::OUTGOING_RECOIL).unwrap();
        let o = record.particle(original).unwrap();
        let c = record.particle(copy).unwrap();
        assert!(o.status < 0);
        assert_eq!(o.daughters, (copy, copy));
        assert_eq!(c.mothers, (original, original));
        assert_eq!(c.status, status::OUTGOING_RECOIL);
        assert_eq!(c.momentum, o.momentum);
    }

    #[test]
    fn backward_carbon_copy_becomes_mother() {
        let mut record = EventRecord::new();
        let original = record.append(gluon(5.0)).unwrap();
        let copy = record.carbon_copy(original, status::HARD_INCOMING).unwrap();
        assert_eq!(record.particle(original).unwrap().mothers, (copy, copy));
        assert_eq!(record.particle(copy).unwrap().daughters, (original, original));
    }

    #[test]
    fn rollback_restores_touched_and_truncates_appended() {
        let mut record = EventRecord::new();
        let first = record.append(gluon(5.0)).unwrap();
        let before = record.clone();

        record.begin_checkpoint().unwrap();
        let tag = record.next_colour_tag();
        let second = record.append(gluon(-5.0)).unwrap();
        record.supersede(first, (second, second)).unwrap();
        record.set_colours(first, tag, 0).unwrap();
        assert_eq!(record.rollback().unwrap(), 1);

        assert_eq!(record.particles(), before.particles());
        assert_eq!(record.clone().next_colour_tag(), before.clone().next_colour_tag());
        assert!(!record.has_checkpoint());
    }

    #[test]
    fn release_keeps_changes() {
        let mut record = EventRecord::new();
        record.begin_checkpoint().unwrap();
        record.append(gluon(5.0)).unwrap();
        record.release().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.rollback(), Err(RecordError::NoCheckpoint));
    }

    #[test]
    fn nested_checkpoint_is_refused() {
        let mut record = EventRecord::new();
        record.begin_checkpoint().unwrap();
        assert_eq!(record.begin_checkpoint(), Err(RecordError::CheckpointAlreadyOpen));
    }

    #[test]
    fn listing_has_one_line_per_entry_plus_header() {
        let record = EventRecord::with_beams(proton(500.0), proton(-500.0));
        let listing = record.to_string();
        assert_eq!(listing.lines().count(), 4);
    }
}
