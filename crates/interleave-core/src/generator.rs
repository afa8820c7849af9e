//! Per-event driver and run statistics.
//!
//! A [`Generator`] owns one hard-process source, the three branching
//! sources, the hook set, the counters, the header store and one random
//! stream. Instances share nothing and can run in parallel on disjoint
//! seeds.
//!
//! # Event flow
//!
//! 1. The process source generates the primary interaction; the
//!    process-level and reweight hooks see it.
//! 2. The interleaved pass runs every source from the hard scale down to
//!    the evolution floor. With interleaving of outgoing branchings
//!    switched off, a deferred pass of the outgoing engine follows.
//! 3. Resonances are decayed and each decay subsystem gets its own pass.
//! 4. The parton-level hook sees the finished event; the optional
//!    consistency check runs.
//!
//! Vetoes end the event with [`EventOutcome::Vetoed`]. Stalled or
//! inconsistent events are retried up to the configured bound.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use interleave_record::{ConsistencyResult, EventRecord, SubsystemRegistry, verify_event};
use interleave_shower::{
    BranchingSource, EvolutionError, EvolutionState, IncomingShower, OutgoingShower, RandomStream,
    ToyDensity,
};
use interleave_types::{HookPoint, RunId, SourceKind};

use crate::collisions::ImpactParameterCollisions;
use crate::config::{GeneratorConfig, ProcessKind};
use crate::counters::{CounterScope, Counters, slots};
use crate::evolution::{AdvanceOutcome, CommittedStep, EvolutionContext, PassKind, Scheduler};
use crate::header::HeaderStore;
use crate::hooks::{EventView, HookSet, ProcessInfo, ResonanceContext, Verdict};
use crate::process::{ProcessError, ProcessSource, QcdTwoToTwo, ResonanceProduction};

/// Light flavours the toy resonance couples to.
const RESONANCE_FLAVOURS: u8 = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration that cannot produce events. Raised before any event.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// A numeric parameter is outside its allowed range.
    #[error("invalid parameter {name} = {value}")]
    InvalidParameter {
        /// Dotted configuration path of the parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The evolution floor leaves no phase space at the beam energy.
    #[error("evolution floor {floor} is not below the kinematic limit {limit}")]
    FloorAbovePhaseSpace {
        /// Configured floor.
        floor: f64,
        /// Half the centre-of-mass energy.
        limit: f64,
    },

    /// The hard process cannot reach above the evolution floor.
    #[error("evolution floor {floor} is not below the hard-process reach {max_scale}")]
    FloorAboveHardScale {
        /// Configured floor.
        floor: f64,
        /// Largest scale the process produces.
        max_scale: f64,
    },

    /// A branching source was installed in the wrong slot.
    #[error("{found} source installed in the {slot} slot")]
    SourceMismatch {
        /// The slot being filled.
        slot: SourceKind,
        /// The kind the source reports.
        found: SourceKind,
    },
}

/// Per-event failures that are not vetoes.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The process source failed.
    #[error("process error: {source}")]
    Process {
        /// The underlying process error.
        #[from]
        source: ProcessError,
    },

    /// Record bookkeeping failed during evolution.
    #[error("evolution error: {source}")]
    Evolution {
        /// The underlying evolution error.
        #[from]
        source: EvolutionError,
    },

    /// The reweight hook returned a negative or non-finite factor.
    #[error("reweight hook returned invalid factor {factor}")]
    InvalidWeight {
        /// The rejected factor.
        factor: f64,
    },

    /// Every attempt hit the scheduler iteration limit.
    #[error("evolution stalled in {tries} consecutive attempts")]
    Stalled {
        /// Attempts made.
        tries: u32,
    },

    /// Every attempt failed the consistency check.
    #[error("event inconsistent in {tries} consecutive attempts ({violations} violations in the last)")]
    Inconsistent {
        /// Attempts made.
        tries: u32,
        /// Problems found in the last attempt.
        violations: usize,
    },
}

// ---------------------------------------------------------------------------
// Events and statistics
// ---------------------------------------------------------------------------

/// A fully evolved event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Sequence number within this generator, from 1.
    pub number: u64,
    /// The event history.
    pub record: EventRecord,
    /// Final subsystem membership.
    pub systems: SubsystemRegistry,
    /// The hard process summary.
    pub info: ProcessInfo,
    /// Statistical weight after reweighting.
    pub weight: f64,
    /// Every kept branching, pass by pass.
    pub steps: Vec<CommittedStep>,
}

/// Result of asking for the next event.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum EventOutcome {
    /// The event survived every hook and check.
    Accepted(Event),
    /// A hook discarded the event.
    Vetoed {
        /// The hook that discarded it.
        point: HookPoint,
    },
}

/// Counts kept over a run and merged across parallel instances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Run identifier.
    pub run_id: RunId,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, once it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Events requested.
    pub tried: u64,
    /// Events with at least one attempt that survived the process-level hook.
    pub selected: u64,
    /// Events accepted.
    pub accepted: u64,
    /// Events vetoed, per hook point.
    pub vetoed: BTreeMap<HookPoint, u64>,
    /// Attempts that stalled or failed the consistency check.
    pub failed: u64,
    /// Sum of accepted event weights.
    pub weight_sum: f64,
}

impl RunStatistics {
    /// Empty statistics starting now.
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            tried: 0,
            selected: 0,
            accepted: 0,
            vetoed: BTreeMap::new(),
            failed: 0,
            weight_sum: 0.0,
        }
    }

    /// Total vetoed events over all points.
    pub fn vetoed_total(&self) -> u64 {
        self.vetoed.values().fold(0, |sum, n| sum.saturating_add(*n))
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Add another instance's counts into this one.
    pub fn merge(&mut self, other: &Self) {
        self.tried = self.tried.saturating_add(other.tried);
        self.selected = self.selected.saturating_add(other.selected);
        self.accepted = self.accepted.saturating_add(other.accepted);
        self.failed = self.failed.saturating_add(other.failed);
        self.weight_sum += other.weight_sum;
        for (point, count) in &other.vetoed {
            let entry = self.vetoed.entry(*point).or_insert(0);
            *entry = entry.saturating_add(*count);
        }
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = match (self.finished_at, other.finished_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// The collaborators a generator drives.
pub struct Components {
    /// Supplier of hard processes.
    pub process: Box<dyn ProcessSource>,
    /// Outgoing-branching source.
    pub outgoing: Box<dyn BranchingSource>,
    /// Incoming-branching source.
    pub incoming: Box<dyn BranchingSource>,
    /// Additional-collision source.
    pub collisions: Box<dyn BranchingSource>,
}

impl Components {
    /// The toy process, showers and collision model described by `config`.
    pub fn toy(config: &GeneratorConfig) -> Self {
        let process: Box<dyn ProcessSource> = match config.process.kind {
            ProcessKind::QcdTwoToTwo => Box::new(QcdTwoToTwo::new(config.beams.clone(), config.process.pt_min)),
            ProcessKind::Resonance => Box::new(ResonanceProduction::new(
                config.beams.clone(),
                config.process.resonance_mass,
                config.process.resonance_width,
                RESONANCE_FLAVOURS.min(config.incoming.flavours),
            )),
        };
        Self {
            process,
            outgoing: Box::new(OutgoingShower::new(config.outgoing.clone())),
            incoming: Box::new(IncomingShower::new(
                config.incoming.clone(),
                Arc::new(ToyDensity::default()),
            )),
            collisions: Box::new(ImpactParameterCollisions::new(
                config.collisions.clone(),
                config.incoming.beam_reserve,
            )),
        }
    }
}

impl core::fmt::Debug for Components {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Components")
            .field("process", &self.process.name())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

#[allow(clippy::large_enum_variant)]
enum Attempt {
    Done(EventOutcome),
    Stalled,
    Inconsistent(usize),
}

/// One independent event generator.
pub struct Generator {
    config: GeneratorConfig,
    components: Components,
    hooks: HookSet,
    counters: Counters,
    headers: HeaderStore,
    rng: RandomStream,
    stats: RunStatistics,
    events: u64,
}

impl Generator {
    /// Validate the configuration and assemble a generator.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] when the configuration leaves no phase space
    /// or a source sits in the wrong slot.
    pub fn new(
        config: GeneratorConfig,
        components: Components,
        hooks: HookSet,
        seed: u64,
    ) -> Result<Self, InitError> {
        let mut counters = Counters::new();
        counters.bump(slots::CONSTRUCTED);
        counters.bump(slots::INIT_BEGUN);
        validate(&config, &components)?;
        counters.bump(slots::INIT_DONE);

        let headers = HeaderStore::from(config.headers.clone());
        let run_id = RunId::new();
        info!(
            %run_id,
            seed,
            process = components.process.name(),
            hooks = ?hooks.enabled_points(),
            "generator initialized"
        );
        Ok(Self {
            config,
            components,
            hooks,
            counters,
            headers,
            rng: SmallRng::seed_from_u64(seed),
            stats: RunStatistics::new(run_id),
            events: 0,
        })
    }

    /// A generator with the toy components, seeded for worker `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] as [`Generator::new`] does.
    pub fn from_config(config: GeneratorConfig, hooks: HookSet, worker: u64) -> Result<Self, InitError> {
        let components = Components::toy(&config);
        let seed = config.run.seed.wrapping_add(worker);
        Self::new(config, components, hooks, seed)
    }

    /// The configuration in use.
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Diagnostic counters.
    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Diagnostic counters, for the external slots.
    pub const fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// Run header store.
    pub const fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    /// Run header store, writable.
    pub const fn headers_mut(&mut self) -> &mut HeaderStore {
        &mut self.headers
    }

    /// Enabled hooks, writable between events.
    pub const fn hooks_mut(&mut self) -> &mut HookSet {
        &mut self.hooks
    }

    /// Run statistics so far.
    pub const fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Stamp the finish time and hand back the statistics.
    pub fn finish(mut self) -> RunStatistics {
        self.stats.finish();
        self.stats
    }

    /// Generate the next event.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] when the process source or record
    /// bookkeeping fails, when the reweight factor is invalid, or when
    /// every bounded attempt stalled or failed the consistency check.
    pub fn next_event(&mut self) -> Result<EventOutcome, GenerateError> {
        self.counters.bump(slots::GENERATION_BEGUN);
        self.stats.tried = self.stats.tried.saturating_add(1);
        self.events = self.events.saturating_add(1);

        let tries = self.config.run.max_tries.max(1);
        let mut last = Attempt::Stalled;
        let mut selected = false;
        for attempt in 1..=tries {
            match self.attempt(&mut selected)? {
                Attempt::Done(EventOutcome::Accepted(event)) => {
                    self.counters.bump(slots::ACCEPTED);
                    self.stats.accepted = self.stats.accepted.saturating_add(1);
                    self.stats.weight_sum += event.weight;
                    debug!(
                        event = event.number,
                        particles = event.record.len(),
                        systems = event.systems.len(),
                        steps = event.steps.len(),
                        "event accepted"
                    );
                    return Ok(EventOutcome::Accepted(event));
                }
                Attempt::Done(EventOutcome::Vetoed { point }) => {
                    self.counters.bump(slots::VETOED);
                    let entry = self.stats.vetoed.entry(point).or_insert(0);
                    *entry = entry.saturating_add(1);
                    debug!(event = self.events, %point, "event vetoed");
                    return Ok(EventOutcome::Vetoed { point });
                }
                failed => {
                    self.stats.failed = self.stats.failed.saturating_add(1);
                    warn!(event = self.events, attempt, "event attempt failed; retrying");
                    last = failed;
                }
            }
        }
        Err(match last {
            Attempt::Inconsistent(violations) => GenerateError::Inconsistent { tries, violations },
            Attempt::Stalled | Attempt::Done(_) => GenerateError::Stalled { tries },
        })
    }

    /// One attempt at a complete event.
    #[allow(clippy::too_many_lines)]
    fn attempt(&mut self, selected: &mut bool) -> Result<Attempt, GenerateError> {
        self.counters.reset_scope(CounterScope::Event);
        self.counters.reset_scope(CounterScope::Step);
        self.counters.bump(slots::PROCESS_BEGUN);

        let Components {
            process,
            outgoing,
            incoming,
            collisions,
        } = &mut self.components;

        let hard = process.generate(&mut self.rng)?;
        self.counters.bump(slots::PROCESS_DONE);
        let mut record = hard.record;
        let info = hard.info;

        if self.hooks.process_level(&mut record, &info) == Verdict::Abort {
            return Ok(Attempt::Done(EventOutcome::Vetoed {
                point: HookPoint::ProcessLevel,
            }));
        }
        self.counters.bump(slots::PROCESS_SURVIVED);
        if !*selected {
            *selected = true;
            self.stats.selected = self.stats.selected.saturating_add(1);
        }

        let mut state = EvolutionState::new(record, hard.systems);
        let factor = self.hooks.reweight(view_of(&state), &info);
        if !(factor.is_finite() && factor >= 0.0) {
            return Err(GenerateError::InvalidWeight { factor });
        }
        let weight = info.weight * factor;

        self.counters.bump(slots::PARTON_BEGUN);
        let interleave_outgoing = self.config.evolution.interleave_outgoing;
        let floor = self.config.evolution.floor;
        let max_iterations = self.config.evolution.max_iterations;

        for source in [&mut *outgoing, &mut *incoming, &mut *collisions] {
            source.reset();
            source.begin_event(&state, &mut self.rng);
        }
        let systems: Vec<_> = state.systems.ids().collect();
        for system in &systems {
            incoming.prepare(*system, &state);
            collisions.prepare(*system, &state);
            if interleave_outgoing {
                outgoing.prepare(*system, &state);
            }
        }

        let mut cx = EvolutionContext {
            state: &mut state,
            hooks: &mut self.hooks,
            counters: &mut self.counters,
            rng: &mut self.rng,
        };
        let mut steps = Vec::new();

        let mut scheduler = Scheduler::new(PassKind::Interleaved, max_iterations);
        let outcome = if interleave_outgoing {
            let mut sources: [&mut dyn BranchingSource; 3] =
                [outgoing.as_mut(), incoming.as_mut(), collisions.as_mut()];
            scheduler.advance(&mut sources, &mut cx, info.scale, floor)?
        } else {
            let mut sources: [&mut dyn BranchingSource; 2] = [incoming.as_mut(), collisions.as_mut()];
            scheduler.advance(&mut sources, &mut cx, info.scale, floor)?
        };
        steps.extend_from_slice(scheduler.history());
        let mut counts = scheduler.counts();
        if let Some(attempt) = interrupted(outcome) {
            return Ok(attempt);
        }

        if !interleave_outgoing {
            outgoing.reset();
            let systems: Vec<_> = cx.state.systems.ids().collect();
            for system in systems {
                outgoing.prepare(system, cx.state);
            }
            let mut scheduler = Scheduler::new(PassKind::Deferred, max_iterations).with_counts(counts);
            let mut sources: [&mut dyn BranchingSource; 1] = [outgoing.as_mut()];
            let outcome = scheduler.advance(&mut sources, &mut cx, info.scale, floor)?;
            steps.extend_from_slice(scheduler.history());
            counts = scheduler.counts();
            if let Some(attempt) = interrupted(outcome) {
                return Ok(attempt);
            }
        }

        let decays = process.decay_resonances(cx.state, cx.rng)?;
        for decay in decays {
            let context = ResonanceContext {
                resonance: decay.resonance,
                system: decay.system,
                default_scale: decay.scale,
            };
            let scale = cx
                .hooks
                .resonance_scale(view_of(cx.state), context)
                .unwrap_or(decay.scale);
            outgoing.reset();
            outgoing.prepare(decay.system, cx.state);
            let mut scheduler = Scheduler::new(PassKind::Resonance, max_iterations).with_counts(counts);
            let mut sources: [&mut dyn BranchingSource; 1] = [outgoing.as_mut()];
            let outcome = scheduler.advance(&mut sources, &mut cx, scale, floor)?;
            steps.extend_from_slice(scheduler.history());
            counts = scheduler.counts();
            if let Some(attempt) = interrupted(outcome) {
                return Ok(attempt);
            }
        }
        self.counters.bump(slots::PARTON_DONE);

        if self.hooks.parton_level(view_of(&state)) == Verdict::Abort {
            return Ok(Attempt::Done(EventOutcome::Vetoed {
                point: HookPoint::PartonLevel,
            }));
        }
        self.counters.bump(slots::PARTON_SURVIVED);

        if self.config.run.check_event {
            let result = verify_event(&state.record, &state.systems, self.config.run.momentum_tolerance);
            if let ConsistencyResult::Violations(violations) = result {
                warn!(
                    event = self.events,
                    violations = violations.len(),
                    first = ?violations.first(),
                    "event failed the consistency check"
                );
                debug!(listing = %state.record, "inconsistent event");
                return Ok(Attempt::Inconsistent(violations.len()));
            }
        }
        self.counters.bump(slots::EVENT_SURVIVED);

        let (record, systems) = state.into_parts();
        Ok(Attempt::Done(EventOutcome::Accepted(Event {
            number: self.events,
            record,
            systems,
            info,
            weight,
            steps,
        })))
    }
}

impl core::fmt::Debug for Generator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Generator")
            .field("run_id", &self.stats.run_id)
            .field("process", &self.components.process.name())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

const fn view_of(state: &EvolutionState) -> EventView<'_> {
    EventView {
        record: &state.record,
        systems: &state.systems,
    }
}

/// Map a pass outcome that ends the attempt early.
const fn interrupted(outcome: AdvanceOutcome) -> Option<Attempt> {
    match outcome {
        AdvanceOutcome::Terminated { .. } => None,
        AdvanceOutcome::Aborted { point, .. } => Some(Attempt::Done(EventOutcome::Vetoed { point })),
        AdvanceOutcome::IterationLimit { .. } => Some(Attempt::Stalled),
    }
}

fn validate(config: &GeneratorConfig, components: &Components) -> Result<(), InitError> {
    let positive = [
        ("evolution.floor", config.evolution.floor),
        ("beams.energy_a", config.beams.energy_a),
        ("beams.energy_b", config.beams.energy_b),
        ("outgoing.alpha_s", config.outgoing.alpha_s),
        ("outgoing.pt_min", config.outgoing.pt_min),
        ("incoming.alpha_s", config.incoming.alpha_s),
        ("incoming.pt_min", config.incoming.pt_min),
        ("incoming.density_ratio_max", config.incoming.density_ratio_max),
        ("collisions.pt0", config.collisions.pt0),
        ("collisions.profile_width", config.collisions.profile_width),
        ("run.momentum_tolerance", config.run.momentum_tolerance),
        ("evolution.max_iterations", f64::from(config.evolution.max_iterations)),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(InitError::InvalidParameter { name, value });
        }
    }
    let fractions = [
        ("incoming.beam_reserve", config.incoming.beam_reserve),
        ("collisions.rescatter_probability", config.collisions.rescatter_probability),
    ];
    for (name, value) in fractions {
        if !(0.0..1.0).contains(&value) {
            return Err(InitError::InvalidParameter { name, value });
        }
    }

    let slots = [
        (SourceKind::Outgoing, components.outgoing.kind()),
        (SourceKind::Incoming, components.incoming.kind()),
        (SourceKind::Collision, components.collisions.kind()),
    ];
    for (slot, found) in slots {
        if slot != found {
            return Err(InitError::SourceMismatch { slot, found });
        }
    }

    let floor = config.evolution.floor;
    let limit = config.beams.sqrt_s() / 2.0;
    if floor >= limit {
        return Err(InitError::FloorAbovePhaseSpace { floor, limit });
    }
    let max_scale = components.process.max_scale();
    if floor >= max_scale {
        return Err(InitError::FloorAboveHardScale { floor, max_scale });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::hooks::Intervention;

    fn accepted(outcome: EventOutcome) -> Event {
        match outcome {
            EventOutcome::Accepted(event) => event,
            other => panic!("Expected an accepted event, got {other:?}"),
        }
    }

    fn small_config() -> GeneratorConfig {
        GeneratorConfig::parse(
            "
run:
  max_tries: 3
beams:
  energy_a: 1000.0
  energy_b: 1000.0
evolution:
  floor: 2.0
collisions:
  max_collisions: 3
",
        )
        .unwrap()
    }

    #[test]
    fn default_toy_generator_produces_consistent_events() {
        let mut generator = Generator::from_config(small_config(), HookSet::new(), 0).unwrap();
        for _ in 0..10 {
            let event = accepted(generator.next_event().unwrap());
            assert!(verify_event(&event.record, &event.systems, 1e-6).is_consistent());
            assert!(event.steps.iter().zip(event.steps.iter().skip(1)).all(|(a, b)| b.scale <= a.scale));
        }
        assert_eq!(generator.statistics().accepted, 10);
        assert_eq!(generator.counters().get(slots::ACCEPTED).unwrap(), 10);
        assert_eq!(generator.counters().get(slots::INIT_DONE).unwrap(), 1);
    }

    #[test]
    fn deferred_outgoing_pass_runs_after_interleaved() {
        let mut config = small_config();
        config.evolution.interleave_outgoing = false;
        let mut generator = Generator::from_config(config, HookSet::new(), 1).unwrap();
        let event = accepted(generator.next_event().unwrap());
        let first_outgoing = event.steps.iter().position(|s| s.kind == SourceKind::Outgoing);
        if let Some(first) = first_outgoing {
            assert!(event.steps.iter().skip(first).all(|s| s.kind == SourceKind::Outgoing));
        }
    }

    #[test]
    fn resonance_decays_get_their_own_subsystem() {
        let mut config = small_config();
        config.process.kind = ProcessKind::Resonance;
        let mut generator = Generator::from_config(config, HookSet::new(), 2).unwrap();
        let event = accepted(generator.next_event().unwrap());
        assert!(event.systems.iter().any(|(_, system)| !system.has_incoming()));
    }

    #[test]
    fn process_level_veto_counts_per_point() {
        let hooks = HookSet::new().with(Intervention::ProcessLevel(Box::new(|_, _| Verdict::Abort)));
        let mut generator = Generator::from_config(small_config(), hooks, 3).unwrap();
        let outcome = generator.next_event().unwrap();
        assert!(matches!(
            outcome,
            EventOutcome::Vetoed {
                point: HookPoint::ProcessLevel
            }
        ));
        let stats = generator.finish();
        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.selected, 0);
        assert_eq!(stats.vetoed.get(&HookPoint::ProcessLevel), Some(&1));
        assert!(stats.finished_at.is_some());
    }

    #[test]
    fn retried_event_is_selected_once() {
        let mut config = small_config();
        config.evolution.max_iterations = 1;
        let mut generator = Generator::from_config(config, HookSet::new(), 6).unwrap();
        assert!(matches!(
            generator.next_event(),
            Err(GenerateError::Stalled { tries: 3 })
        ));
        let stats = generator.statistics();
        assert_eq!(stats.tried, 1);
        assert_eq!(stats.selected, 1);
        assert_eq!(stats.failed, 3);
    }

    #[test]
    fn negative_reweight_is_an_error() {
        let hooks = HookSet::new().with(Intervention::CrossSectionReweight(Box::new(|_, _| -1.0)));
        let mut generator = Generator::from_config(small_config(), hooks, 4).unwrap();
        assert!(matches!(
            generator.next_event(),
            Err(GenerateError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn reweight_scales_event_weight() {
        let hooks = HookSet::new().with(Intervention::CrossSectionReweight(Box::new(|_, _| 2.5)));
        let mut generator = Generator::from_config(small_config(), hooks, 5).unwrap();
        let event = accepted(generator.next_event().unwrap());
        assert!((event.weight - 2.5 * event.info.weight).abs() < 1e-12);
    }

    #[test]
    fn infeasible_floor_is_rejected() {
        let mut config = small_config();
        config.evolution.floor = 5_000.0;
        assert!(matches!(
            Generator::from_config(config, HookSet::new(), 0),
            Err(InitError::FloorAbovePhaseSpace { .. })
        ));

        let mut config = small_config();
        config.evolution.floor = 0.0;
        assert!(matches!(
            Generator::from_config(config, HookSet::new(), 0),
            Err(InitError::InvalidParameter {
                name: "evolution.floor",
                ..
            })
        ));
    }

    #[test]
    fn swapped_sources_are_rejected() {
        let config = small_config();
        let mut components = Components::toy(&config);
        core::mem::swap(&mut components.outgoing, &mut components.incoming);
        assert!(matches!(
            Generator::new(config, components, HookSet::new(), 0),
            Err(InitError::SourceMismatch {
                slot: SourceKind::Outgoing,
                found: SourceKind::Incoming
            })
        ));
    }

    #[test]
    fn statistics_merge_sums_counts() {
        let mut a = RunStatistics::new(RunId::new());
        a.accepted = 2;
        a.vetoed.insert(HookPoint::PartonLevel, 1);
        let mut b = RunStatistics::new(RunId::new());
        b.accepted = 3;
        b.vetoed.insert(HookPoint::PartonLevel, 2);
        b.weight_sum = 1.5;
        b.finish();
        a.merge(&b);
        assert_eq!(a.accepted, 5);
        assert_eq!(a.vetoed_total(), 3);
        assert!((a.weight_sum - 1.5).abs() < f64::EPSILON);
        assert_eq!(a.finished_at, b.finished_at);
    }

    #[test]
    fn statistics_serialize_vetoes_by_point_name() {
        let mut stats = RunStatistics::new(RunId::new());
        stats.vetoed.insert(HookPoint::ScaleThreshold, 4);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["vetoed"]["ScaleThreshold"], 4);
        assert_eq!(json["accepted"], 0);
        assert!(json["finished_at"].is_null());
    }
}
