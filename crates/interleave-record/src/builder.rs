//! Validated construction of [`Particle`] values.

use interleave_types::{FourMomentum, Particle, ParticleIndex};

use crate::RecordError;

/// Builder for constructing validated [`Particle`] values.
///
/// Enforces a non-zero identity code and status, finite kinematics, a
/// non-negative production scale, and colour tags that agree with the
/// colour representation implied by the identity code.
///
/// # Examples
///
/// ```
/// use interleave_record::ParticleBuilder;
/// use interleave_types::{FourMomentum, ParticleIndex, status};
///
/// let quark = ParticleBuilder::new(2, status::EMISSION)
///     .momentum(FourMomentum::new(3.0, 4.0, 0.0, 5.0))
///     .mothers(ParticleIndex::new(5), ParticleIndex::NONE)
///     .colours(103, 0)
///     .scale(12.0)
///     .build();
///
/// assert!(quark.is_ok());
/// ```
#[derive(Debug)]
pub struct ParticleBuilder {
    id: i32,
    status: i32,
    momentum: FourMomentum,
    mass: Option<f64>,
    mothers: (ParticleIndex, ParticleIndex),
    colour: u32,
    anticolour: u32,
    scale: f64,
}

impl ParticleBuilder {
    /// Start building a particle with the given identity code and status.
    pub const fn new(id: i32, status: i32) -> Self {
        Self {
            id,
            status,
            momentum: FourMomentum::new(0.0, 0.0, 0.0, 0.0),
            mass: None,
            mothers: (ParticleIndex::NONE, ParticleIndex::NONE),
            colour: 0,
            anticolour: 0,
            scale: 0.0,
        }
    }

    /// Set the four-momentum.
    #[must_use]
    pub const fn momentum(mut self, momentum: FourMomentum) -> Self {
        self.momentum = momentum;
        self
    }

    /// Set the rest mass. Defaults to the invariant mass of the momentum.
    #[must_use]
    pub const fn mass(mut self, mass: f64) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Set the mother pair.
    #[must_use]
    pub const fn mothers(mut self, first: ParticleIndex, second: ParticleIndex) -> Self {
        self.mothers = (first, second);
        self
    }

    /// Set the colour and anticolour tags.
    #[must_use]
    pub const fn colours(mut self, colour: u32, anticolour: u32) -> Self {
        self.colour = colour;
        self.anticolour = anticolour;
        self
    }

    /// Set the production scale.
    #[must_use]
    pub const fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Validate inputs and produce a [`Particle`].
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidParticle`] naming the first rule that
    /// failed.
    pub fn build(self) -> Result<Particle, RecordError> {
        if self.id == 0 {
            return Err(RecordError::InvalidParticle("identity code must be non-zero"));
        }
        if self.status == 0 {
            return Err(RecordError::InvalidParticle("status must be non-zero"));
        }
        if !self.momentum.is_finite() {
            return Err(RecordError::InvalidParticle("non-finite momentum"));
        }
        let mass = self.mass.unwrap_or_else(|| self.momentum.m());
        if !mass.is_finite() || mass < 0.0 {
            return Err(RecordError::InvalidParticle("mass must be finite and non-negative"));
        }
        if !self.scale.is_finite() || self.scale < 0.0 {
            return Err(RecordError::InvalidParticle("scale must be finite and non-negative"));
        }

        let mut particle = Particle::new(self.id, self.status, self.momentum);
        particle.mass = mass;
        particle.mothers = self.mothers;
        particle.colour = self.colour;
        particle.anticolour = self.anticolour;
        particle.scale = self.scale;

        if !particle.colours_match_type() {
            return Err(RecordError::InvalidParticle(
                "colour tags do not match colour representation",
            ));
        }
        Ok(particle)
    }
}
