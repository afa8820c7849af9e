//! Tunable parameters of the two branching engines.
//!
//! Both structs deserialize from the `outgoing` and `incoming` sections of
//! `interleave-config.yaml`; every field is optional there and falls back
//! to the default listed in its doc comment.

use serde::Deserialize;

/// Quark colour factor `C_F`.
pub const CF: f64 = 4.0 / 3.0;
/// Gluon colour factor `C_A`.
pub const CA: f64 = 3.0;
/// Quark-pair splitting factor `T_R`.
pub const TR: f64 = 0.5;

/// Configuration of the outgoing (final-state) engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutgoingConfig {
    /// Fixed strong coupling (default: 0.12).
    pub alpha_s: f64,

    /// Transverse-momentum cutoff below which nothing branches (default: 1.0).
    pub pt_min: f64,

    /// Number of quark flavours a gluon may split into (default: 5).
    pub flavours: u8,

    /// Whether gluons may split into quark pairs (default: true).
    pub gluon_splitting: bool,
}

impl Default for OutgoingConfig {
    fn default() -> Self {
        Self {
            alpha_s: 0.12,
            pt_min: 1.0,
            flavours: 5,
            gluon_splitting: true,
        }
    }
}

/// Configuration of the incoming (initial-state) engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IncomingConfig {
    /// Fixed strong coupling (default: 0.12).
    pub alpha_s: f64,

    /// Transverse-momentum cutoff below which nothing branches (default: 1.0).
    pub pt_min: f64,

    /// Number of quark flavours a gluon initiator may come from (default: 5).
    pub flavours: u8,

    /// Overestimate of the mother/daughter density ratio (default: 4.0).
    ///
    /// Ratios above this are clamped, biasing the rare branchings that
    /// exceed it.
    pub density_ratio_max: f64,

    /// Momentum fraction kept in reserve on each beam (default: 0.01).
    pub beam_reserve: f64,
}

impl Default for IncomingConfig {
    fn default() -> Self {
        Self {
            alpha_s: 0.12,
            pt_min: 1.0,
            flavours: 5,
            density_ratio_max: 4.0,
            beam_reserve: 0.01,
        }
    }
}

/// `alpha_s / 2 pi`.
pub fn alpha_over_2pi(alpha_s: f64) -> f64 {
    alpha_s / (2.0 * core::f64::consts::PI)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn default_config_values() {
        let outgoing = OutgoingConfig::default();
        assert!((outgoing.pt_min - 1.0).abs() < f64::EPSILON);
        assert_eq!(outgoing.flavours, 5);
        let incoming = IncomingConfig::default();
        assert!((incoming.density_ratio_max - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let parsed: IncomingConfig = serde_yml::from_str("pt_min: 2.5\n").unwrap();
        assert!((parsed.pt_min - 2.5).abs() < f64::EPSILON);
        assert!((parsed.alpha_s - 0.12).abs() < f64::EPSILON);
    }
}
