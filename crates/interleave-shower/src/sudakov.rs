//! Veto-algorithm building blocks shared by the branching engines.
//!
//! Every engine samples its next scale the same way: an overestimated
//! emission density `c * dpT2/pT2` is integrated downward from the start
//! scale, which gives the closed-form trial `pT2' = pT2 * R^(1/c)`. A trial
//! is then accepted with probability `true density / overestimate`; on
//! rejection the evolution continues downward from the rejected trial.
//! Because the trial distribution only depends on where it starts, a
//! candidate can always be re-sampled from any lower ceiling.

use rand::Rng;

use crate::source::RandomStream;

/// Upper bound on trials per dipole end before giving up on it.
pub const MAX_TRIALS: usize = 10_000;

/// Shape of the energy-sharing overestimate used to pick `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overestimate {
    /// `1 / (1 - z)`, soft emission off a quark or gluon.
    SoftEnd,
    /// Constant, gluon splitting into a quark pair.
    Flat,
    /// `1 / z`, backward evolution into a softer mother.
    SoftMother,
    /// `1 / (z (1 - z))`, both soft limits of a gluon.
    SoftBoth,
}

impl Overestimate {
    /// Value of the overestimate at `z`.
    pub fn value(self, z: f64) -> f64 {
        match self {
            Self::SoftEnd => 1.0 / (1.0 - z),
            Self::Flat => 1.0,
            Self::SoftMother => 1.0 / z,
            Self::SoftBoth => 1.0 / (z * (1.0 - z)),
        }
    }

    /// Integral over `[z_min, z_max]`.
    pub fn integral(self, z_min: f64, z_max: f64) -> f64 {
        if z_max <= z_min {
            return 0.0;
        }
        match self {
            Self::SoftEnd => ((1.0 - z_min) / (1.0 - z_max)).ln(),
            Self::Flat => z_max - z_min,
            Self::SoftMother => (z_max / z_min).ln(),
            Self::SoftBoth => logit(z_max) - logit(z_min),
        }
    }

    /// Sample `z` in `[z_min, z_max]` from the overestimate, given a uniform
    /// number `r` in `[0, 1)`.
    pub fn sample(self, z_min: f64, z_max: f64, r: f64) -> f64 {
        match self {
            Self::SoftEnd => 1.0 - (1.0 - z_min) * ((1.0 - z_max) / (1.0 - z_min)).powf(r),
            Self::Flat => (z_max - z_min).mul_add(r, z_min),
            Self::SoftMother => z_min * (z_max / z_min).powf(r),
            Self::SoftBoth => {
                let u = (logit(z_max) - logit(z_min)).mul_add(r, logit(z_min));
                1.0 / (1.0 + (-u).exp())
            }
        }
    }
}

fn logit(z: f64) -> f64 {
    (z / (1.0 - z)).ln()
}

/// A branching channel: colour factor times overestimate, plus the
/// probability of keeping a `z` drawn from the overestimate.
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    /// Colour factor and multiplicity in front of the overestimate.
    pub norm: f64,
    /// Overestimate shape.
    pub overestimate: Overestimate,
    /// Ratio of the true kernel to `norm * overestimate`, in `[0, 1]`.
    pub accept: fn(f64) -> f64,
}

impl Channel {
    /// Coefficient of `dpT2/pT2` in the overestimated density.
    pub fn coefficient(&self, alpha_over_2pi: f64, z_min: f64, z_max: f64, extra: f64) -> f64 {
        alpha_over_2pi * self.norm * extra * self.overestimate.integral(z_min, z_max)
    }
}

/// `(1 + z^2) / 2`: quark emitting a gluon, over `2 C_F / (1 - z)`.
pub fn accept_quark_gluon(z: f64) -> f64 {
    0.5 * z.mul_add(z, 1.0)
}

/// `(1 + z^3) / 2`: one end of a gluon emitting a gluon, over `C_A / (1 - z)`.
pub fn accept_gluon_gluon_end(z: f64) -> f64 {
    0.5 * (z * z).mul_add(z, 1.0)
}

/// `z^2 + (1 - z)^2`: gluon splitting into a quark pair, over a constant.
pub fn accept_pair(z: f64) -> f64 {
    z.mul_add(z, (1.0 - z) * (1.0 - z))
}

/// `(1 + (1 - z)^2) / 2`: quark mother leaving a gluon, over `2 C_F / z`.
pub fn accept_gluon_from_quark(z: f64) -> f64 {
    0.5 * (1.0 - z).mul_add(1.0 - z, 1.0)
}

/// Full gluon-to-gluon kernel over `2 C_A / (z (1 - z))`.
pub fn accept_gluon_from_gluon(z: f64) -> f64 {
    let w = z * (1.0 - z);
    w.mul_add(w, 1.0 - 2.0 * w)
}

/// Next trial `pT2` below `pt2` for a `coefficient * dpT2/pT2` density.
pub fn trial_pt2(pt2: f64, coefficient: f64, rng: &mut RandomStream) -> f64 {
    let r: f64 = rng.random();
    pt2 * r.powf(1.0 / coefficient)
}

/// Run the veto algorithm from `start_pt2` down to `floor_pt2`.
///
/// `try_accept` receives each trial `pT2` and returns the accepted
/// branching details, or `None` to continue downward.
pub fn veto_loop<T, F>(
    start_pt2: f64,
    floor_pt2: f64,
    coefficient: f64,
    rng: &mut RandomStream,
    mut try_accept: F,
) -> Option<(f64, T)>
where
    F: FnMut(f64, &mut RandomStream) -> Option<T>,
{
    if coefficient.is_nan() || coefficient <= 0.0 || start_pt2 <= floor_pt2 {
        return None;
    }
    let mut pt2 = start_pt2;
    for _ in 0..MAX_TRIALS {
        pt2 = trial_pt2(pt2, coefficient, rng);
        if pt2 <= floor_pt2 {
            return None;
        }
        if let Some(details) = try_accept(pt2, rng) {
            return Some((pt2, details));
        }
    }
    None
}

/// Allowed energy-sharing range for a final-state branching of a dipole
/// with invariant mass squared `m2_dipole` and cutoff `pt2_min`.
pub fn outgoing_z_range(pt2_min: f64, m2_dipole: f64) -> Option<(f64, f64)> {
    if m2_dipole <= 4.0 * pt2_min || pt2_min <= 0.0 {
        return None;
    }
    let half_width = 0.5 * (1.0 - 4.0 * pt2_min / m2_dipole).sqrt();
    Some((0.5 - half_width, 0.5 + half_width))
}

/// Largest `z` for a backward branching of a subsystem with squared
/// invariant mass `s_hat` above the cutoff `pt2_min`.
///
/// Solves `(1 - z)^2 = k z` with `k = 4 pT2_min / s_hat`.
pub fn incoming_z_max(pt2_min: f64, s_hat: f64) -> f64 {
    if s_hat <= 0.0 {
        return 0.0;
    }
    let k = 4.0 * pt2_min / s_hat;
    let b = 2.0 + k;
    0.5 * (b - b.mul_add(b, -4.0).max(0.0).sqrt())
}
