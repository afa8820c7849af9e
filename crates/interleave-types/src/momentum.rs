//! Four-momentum arithmetic in the `(px, py, pz, e)` convention.
//!
//! Metric signature is `(+, -, -, -)`: `p.dot(p) = e^2 - |p|^2`.

use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A four-momentum `(px, py, pz, e)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourMomentum {
    /// Momentum along x.
    pub px: f64,
    /// Momentum along y.
    pub py: f64,
    /// Momentum along z (beam axis).
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl FourMomentum {
    /// Construct from components.
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Massless momentum along the beam axis with the given signed `pz`.
    pub const fn along_axis(pz: f64) -> Self {
        Self::new(0.0, 0.0, pz, pz.abs())
    }

    /// Massless momentum with transverse momentum `pt` at azimuth `phi` and
    /// rapidity `y`.
    pub fn from_pt_rapidity(pt: f64, phi: f64, y: f64) -> Self {
        Self::new(pt * phi.cos(), pt * phi.sin(), pt * y.sinh(), pt * y.cosh())
    }

    /// Minkowski product.
    pub fn dot(&self, other: &Self) -> f64 {
        self.e * other.e - self.px * other.px - self.py * other.py - self.pz * other.pz
    }

    /// Invariant mass squared (may be slightly negative from rounding).
    pub fn m2(&self) -> f64 {
        self.dot(self)
    }

    /// Invariant mass, clamped to zero for spacelike vectors.
    pub fn m(&self) -> f64 {
        self.m2().max(0.0).sqrt()
    }

    /// Transverse momentum squared.
    pub fn pt2(&self) -> f64 {
        self.px * self.px + self.py * self.py
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.pt2().sqrt()
    }

    /// Magnitude of the three-momentum.
    pub fn p_abs(&self) -> f64 {
        (self.pt2() + self.pz * self.pz).sqrt()
    }

    /// Rapidity; infinite for a massless vector along the beam axis.
    pub fn rapidity(&self) -> f64 {
        0.5 * ((self.e + self.pz) / (self.e - self.pz)).ln()
    }

    /// Light-cone plus component `e + pz`.
    pub fn plus(&self) -> f64 {
        self.e + self.pz
    }

    /// Light-cone minus component `e - pz`.
    pub fn minus(&self) -> f64 {
        self.e - self.pz
    }

    /// Largest absolute component, used as a tolerance scale.
    pub fn max_abs(&self) -> f64 {
        self.px.abs().max(self.py.abs()).max(self.pz.abs()).max(self.e.abs())
    }

    /// Returns `true` if every component is finite.
    pub const fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }

    /// Lorentz boost by velocity `(bx, by, bz)`.
    ///
    /// Returns the vector unchanged when the velocity is zero or not
    /// subluminal.
    #[must_use]
    pub fn boost(&self, bx: f64, by: f64, bz: f64) -> Self {
        let beta2 = bx * bx + by * by + bz * bz;
        if beta2 <= 0.0 || beta2 >= 1.0 {
            return *self;
        }
        let gamma = 1.0 / (1.0 - beta2).sqrt();
        let along = bx * self.px + by * self.py + bz * self.pz;
        let shift = gamma * (gamma * along / (1.0 + gamma) + self.e);
        Self::new(
            self.px + shift * bx,
            self.py + shift * by,
            self.pz + shift * bz,
            gamma * (self.e + along),
        )
    }

    /// Boost into the rest frame of `frame`.
    #[must_use]
    pub fn to_rest_frame_of(&self, frame: &Self) -> Self {
        if frame.e <= 0.0 {
            return *self;
        }
        self.boost(-frame.px / frame.e, -frame.py / frame.e, -frame.pz / frame.e)
    }

    /// Boost out of the rest frame of `frame` into the frame where it has
    /// its given momentum.
    #[must_use]
    pub fn from_rest_frame_of(&self, frame: &Self) -> Self {
        if frame.e <= 0.0 {
            return *self;
        }
        self.boost(frame.px / frame.e, frame.py / frame.e, frame.pz / frame.e)
    }
}

impl Add for FourMomentum {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.px + rhs.px, self.py + rhs.py, self.pz + rhs.pz, self.e + rhs.e)
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for FourMomentum {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.px - rhs.px, self.py - rhs.py, self.pz - rhs.pz, self.e - rhs.e)
    }
}

impl SubAssign for FourMomentum {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for FourMomentum {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.px, -self.py, -self.pz, -self.e)
    }
}

impl Mul<f64> for FourMomentum {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.px * rhs, self.py * rhs, self.pz * rhs, self.e * rhs)
    }
}

impl core::iter::Sum for FourMomentum {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl core::fmt::Display for FourMomentum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "({:>10.3} {:>10.3} {:>10.3} {:>10.3})",
            self.px, self.py, self.pz, self.e
        )
    }
}
