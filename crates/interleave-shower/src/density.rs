//! Beam parton densities consumed by backward evolution.
//!
//! The incoming engine only ever needs ratios of momentum densities
//! `x f(x, Q2)` between a candidate mother and the current initiator, so
//! the collaborator boundary is a single query.

use interleave_types::codes;

/// Source of beam momentum densities.
pub trait PartonDensity: Send + Sync {
    /// Momentum density `x f(x)` of flavour `id` at fraction `x` and
    /// evolution scale `scale`. Zero outside `0 < x < 1`.
    fn density(&self, id: i32, x: f64, scale: f64) -> f64;
}

/// Shape parameters of one flavour class: `norm * x^power * (1 - x)^falloff`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityShape {
    /// Overall normalisation.
    pub norm: f64,
    /// Small-`x` exponent.
    pub power: f64,
    /// Large-`x` exponent.
    pub falloff: f64,
}

impl DensityShape {
    fn evaluate(&self, x: f64) -> f64 {
        self.norm * x.powf(self.power) * (1.0 - x).powf(self.falloff)
    }
}

/// A scale-independent toy proton: gluons, valence up/down on top of a
/// flavour-blind sea.
#[derive(Debug, Clone, PartialEq)]
pub struct ToyDensity {
    /// Gluon shape.
    pub gluon: DensityShape,
    /// Valence shape for up and down quarks.
    pub valence: DensityShape,
    /// Sea shape for every quark and antiquark.
    pub sea: DensityShape,
}

impl Default for ToyDensity {
    fn default() -> Self {
        Self {
            gluon: DensityShape {
                norm: 1.7,
                power: -0.1,
                falloff: 5.0,
            },
            valence: DensityShape {
                norm: 0.6,
                power: 0.5,
                falloff: 3.0,
            },
            sea: DensityShape {
                norm: 0.1,
                power: -0.1,
                falloff: 7.0,
            },
        }
    }
}

impl PartonDensity for ToyDensity {
    fn density(&self, id: i32, x: f64, _scale: f64) -> f64 {
        if !(x > 0.0 && x < 1.0) {
            return 0.0;
        }
        if id == codes::GLUON {
            return self.gluon.evaluate(x);
        }
        if id == 0 || id.abs() > codes::MAX_QUARK {
            return 0.0;
        }
        let sea = self.sea.evaluate(x);
        if id == 1 || id == 2 {
            self.valence.evaluate(x) + sea
        } else {
            sea
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanishes_outside_unit_interval() {
        let pdf = ToyDensity::default();
        for x in [0.0, 1.0, 1.5, -0.2] {
            assert!(pdf.density(codes::GLUON, x, 10.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn valence_exceeds_sea() {
        let pdf = ToyDensity::default();
        let up = pdf.density(2, 0.3, 10.0);
        let anti_up = pdf.density(-2, 0.3, 10.0);
        assert!(up > anti_up);
        assert!(anti_up > 0.0);
    }

    #[test]
    fn non_partons_have_no_density() {
        let pdf = ToyDensity::default();
        assert!(pdf.density(codes::Z_BOSON, 0.1, 10.0).abs() < f64::EPSILON);
        assert!(pdf.density(0, 0.1, 10.0).abs() < f64::EPSILON);
    }
}
