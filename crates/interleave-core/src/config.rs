//! Configuration loading and typed config structures for the generator.
//!
//! The canonical configuration lives in `interleave-config.yaml`. This
//! module defines strongly-typed structs that mirror the YAML structure and
//! a loader that reads it. Every field has a default, so an empty document
//! is a valid configuration. Checks that need physics (for example a floor
//! above the available phase space) happen in [`Generator::new`].
//!
//! [`Generator::new`]: crate::generator::Generator::new

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use interleave_shower::{IncomingConfig, OutgoingConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level generator configuration.
///
/// Mirrors the structure of `interleave-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratorConfig {
    /// Run-level settings (seed, event count, workers, retries).
    #[serde(default)]
    pub run: RunConfig,

    /// Beam energies.
    #[serde(default)]
    pub beams: BeamConfig,

    /// Scheduler settings.
    #[serde(default)]
    pub evolution: EvolutionConfig,

    /// Outgoing-branching engine tunables.
    #[serde(default)]
    pub outgoing: OutgoingConfig,

    /// Incoming-branching engine tunables.
    #[serde(default)]
    pub incoming: IncomingConfig,

    /// Additional-collision source tunables.
    #[serde(default)]
    pub collisions: CollisionConfig,

    /// Which toy hard process to run.
    #[serde(default)]
    pub process: ProcessConfig,

    /// Demonstration veto policies wired by the binary.
    #[serde(default)]
    pub hooks: HookPolicyConfig,

    /// Key/value pairs loaded into the header store.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl GeneratorConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Base random seed; worker `i` uses `seed + i`.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Events to attempt per worker.
    #[serde(default = "default_events")]
    pub events: u64,

    /// Independent generator instances run in parallel.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts per event before giving up on failures that are not vetoes.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Whether accepted events are run through the consistency check.
    #[serde(default = "default_check_event")]
    pub check_event: bool,

    /// Relative tolerance of the momentum-conservation check.
    #[serde(default = "default_momentum_tolerance")]
    pub momentum_tolerance: f64,

    /// Log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            events: default_events(),
            workers: default_workers(),
            max_tries: default_max_tries(),
            check_event: default_check_event(),
            momentum_tolerance: default_momentum_tolerance(),
            log_level: default_log_level(),
        }
    }
}

/// Beam energies in GeV. Beam A moves along `+z`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BeamConfig {
    /// Energy of beam A (default: 6500).
    #[serde(default = "default_beam_energy")]
    pub energy_a: f64,

    /// Energy of beam B (default: 6500).
    #[serde(default = "default_beam_energy")]
    pub energy_b: f64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            energy_a: default_beam_energy(),
            energy_b: default_beam_energy(),
        }
    }
}

impl BeamConfig {
    /// Collision energy `sqrt(s)` for head-on massless beams.
    pub fn sqrt_s(&self) -> f64 {
        2.0 * (self.energy_a * self.energy_b).sqrt()
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvolutionConfig {
    /// Lower cutoff of the evolution scale (default: 1.0).
    #[serde(default = "default_floor")]
    pub floor: f64,

    /// Bounded number of scheduler iterations per pass (default: 10000).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Whether outgoing branchings compete in the interleaved pass
    /// (default: true). When false they run afterwards in a deferred pass.
    #[serde(default = "default_interleave_outgoing")]
    pub interleave_outgoing: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            max_iterations: default_max_iterations(),
            interleave_outgoing: default_interleave_outgoing(),
        }
    }
}

/// Additional-collision configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollisionConfig {
    /// Whether additional collisions are generated at all.
    #[serde(default = "default_collisions_enabled")]
    pub enabled: bool,

    /// Regularisation scale `pT0` in GeV (default: 2.3).
    #[serde(default = "default_pt0")]
    pub pt0: f64,

    /// Normalisation of the `dpT2 / (pT2 + pT0^2)^2` rate (default: 40.0).
    #[serde(default = "default_coupling_norm")]
    pub coupling_norm: f64,

    /// Width of the impact-parameter overlap profile (default: 1.0).
    #[serde(default = "default_profile_width")]
    pub profile_width: f64,

    /// Probability that a new collision reuses a live gluon (default: 0.0).
    #[serde(default)]
    pub rescatter_probability: f64,

    /// Maximum number of additional collisions per event (default: 10).
    #[serde(default = "default_max_collisions")]
    pub max_collisions: usize,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            enabled: default_collisions_enabled(),
            pt0: default_pt0(),
            coupling_norm: default_coupling_norm(),
            profile_width: default_profile_width(),
            rescatter_probability: 0.0,
            max_collisions: default_max_collisions(),
        }
    }
}

/// The toy hard processes available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// Gluon-gluon scattering.
    #[default]
    QcdTwoToTwo,
    /// Quark-antiquark annihilation into a decaying resonance.
    Resonance,
}

/// Hard process configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessConfig {
    /// Which process to generate.
    #[serde(default)]
    pub kind: ProcessKind,

    /// Transverse-momentum cut of the 2 -> 2 process (default: 20.0).
    #[serde(default = "default_process_pt_min")]
    pub pt_min: f64,

    /// Resonance mass in GeV (default: 91.19).
    #[serde(default = "default_resonance_mass")]
    pub resonance_mass: f64,

    /// Resonance width in GeV (default: 2.5).
    #[serde(default = "default_resonance_width")]
    pub resonance_width: f64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kind: ProcessKind::default(),
            pt_min: default_process_pt_min(),
            resonance_mass: default_resonance_mass(),
            resonance_width: default_resonance_width(),
        }
    }
}

/// Demonstration veto policies. Every policy is off unless configured.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HookPolicyConfig {
    /// Abort events whose parton level has more final partons than this.
    #[serde(default)]
    pub max_final_partons: Option<usize>,

    /// Pause at this scale and abort events with fewer commits above it
    /// than `min_commits_above`.
    #[serde(default)]
    pub threshold_scale: Option<f64>,

    /// Commits required above `threshold_scale` (default: 1).
    #[serde(default = "default_min_commits_above")]
    pub min_commits_above: u64,

    /// Reject single outgoing emissions with a smaller energy fraction.
    #[serde(default)]
    pub min_emission_fraction: Option<f64>,

    /// Override the starting scale of resonance decay evolution.
    #[serde(default)]
    pub resonance_scale: Option<f64>,
}

const fn default_seed() -> u64 {
    42
}

const fn default_events() -> u64 {
    100
}

const fn default_workers() -> usize {
    1
}

const fn default_max_tries() -> u32 {
    10
}

const fn default_check_event() -> bool {
    true
}

const fn default_momentum_tolerance() -> f64 {
    1e-6
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_beam_energy() -> f64 {
    6500.0
}

const fn default_floor() -> f64 {
    1.0
}

const fn default_max_iterations() -> u32 {
    10_000
}

const fn default_interleave_outgoing() -> bool {
    true
}

const fn default_collisions_enabled() -> bool {
    true
}

const fn default_pt0() -> f64 {
    2.3
}

const fn default_coupling_norm() -> f64 {
    40.0
}

const fn default_profile_width() -> f64 {
    1.0
}

const fn default_max_collisions() -> usize {
    10
}

const fn default_process_pt_min() -> f64 {
    20.0
}

const fn default_resonance_mass() -> f64 {
    91.19
}

const fn default_resonance_width() -> f64 {
    2.5
}

const fn default_min_commits_above() -> u64 {
    1
}
