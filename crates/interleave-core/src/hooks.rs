//! Veto hooks: synchronous intervention points for external policy code.
//!
//! A [`HookSet`] is a capability set. Each enabled [`HookPoint`] carries
//! exactly one handler, so an enabled point can never lack its action and a
//! disabled point costs nothing. The scheduler and the generator call the
//! dispatch methods at their fixed points; a point without a handler
//! answers with the neutral outcome (continue, keep, weight 1, no
//! override).
//!
//! # Design
//!
//! Handlers are boxed `FnMut` closures so policies can keep state across
//! calls (for example "veto every second event"). All handlers are `Send`
//! so a generator and its hooks can move onto a worker thread together.
//! Handlers see the record read-only through [`EventView`], except the
//! process-level handler, which receives the record mutably before any
//! evolution has happened. Keeping an edited record consistent is then the
//! handler's responsibility.
//!
//! # Usage
//!
//! ```
//! use interleave_core::hooks::{HookSet, Intervention, Verdict};
//! use interleave_types::HookPoint;
//!
//! let hooks = HookSet::new().with(Intervention::ScaleThreshold {
//!     scale: 50.0,
//!     handler: Box::new(|_view, _context| Verdict::Abort),
//! });
//! assert!(hooks.can_intervene_at(HookPoint::ScaleThreshold));
//! assert!(!hooks.can_intervene_at(HookPoint::PartonLevel));
//! ```

use std::collections::BTreeMap;

use interleave_record::{EventRecord, SubsystemRegistry};
use interleave_types::{HookPoint, Particle, ParticleIndex, SourceKind, SubsystemId, VetoPosition};

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Decision of an event-level hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Resume exactly where the evolution left off.
    Continue,
    /// Discard the whole event.
    Abort,
}

/// Decision of a single-emission hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionVerdict {
    /// Keep the branching.
    Keep,
    /// Roll the branching back and continue below its scale.
    Reject,
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Read-only view of the event under evolution.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    /// The event history.
    pub record: &'a EventRecord,
    /// The subsystem membership.
    pub systems: &'a SubsystemRegistry,
}

/// Summary of the selected hard process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    /// Process name.
    pub name: &'static str,
    /// Factorisation scale of the hard process.
    pub scale: f64,
    /// Event weight before reweighting.
    pub weight: f64,
}

/// Context of the scale-threshold hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdContext {
    /// The configured threshold scale.
    pub scale: f64,
    /// What the last commit above the threshold was.
    pub position: VetoPosition,
    /// Commits made above the threshold in this pass.
    pub commits: u64,
}

/// Context of the step-count hook.
///
/// Counts run over the whole event. In resonance passes `outgoing` counts
/// the branchings inside resonance decays instead of the hardest subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    /// Which source just committed.
    pub kind: SourceKind,
    /// The pass and source of the commit.
    pub position: VetoPosition,
    /// Incoming branchings of the hardest subsystem so far.
    pub incoming: u64,
    /// Outgoing branchings so far, this one included.
    pub outgoing: u64,
    /// Scale of the commit.
    pub scale: f64,
    /// First record entry the commit appended.
    pub first_appended: ParticleIndex,
}

/// Context of the collision-step-count hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionContext {
    /// Additional collisions so far, this one included.
    pub collisions: u64,
    /// The subsystem the collision created.
    pub system: SubsystemId,
    /// Scale of the collision.
    pub scale: f64,
}

/// Context of a single-emission hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionContext<'a> {
    /// Which engine committed.
    pub kind: SourceKind,
    /// The subsystem the branching belongs to.
    pub system: SubsystemId,
    /// Scale of the branching.
    pub scale: f64,
    /// Entries the branching appended, in order.
    pub appended: &'a [ParticleIndex],
}

/// Context of the resonance-scale hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonanceContext {
    /// The decayed resonance.
    pub resonance: ParticleIndex,
    /// The decay subsystem.
    pub system: SubsystemId,
    /// Starting scale used without an override.
    pub default_scale: f64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handler with write access to the freshly selected process record.
pub type ProcessHandler = Box<dyn FnMut(&mut EventRecord, &ProcessInfo) -> Verdict + Send>;
/// Handler that sees the finished parton level.
pub type PartonHandler = Box<dyn FnMut(EventView<'_>) -> Verdict + Send>;
/// Scale-threshold handler.
pub type ThresholdHandler = Box<dyn FnMut(EventView<'_>, ThresholdContext) -> Verdict + Send>;
/// Step-count handler.
pub type StepHandler = Box<dyn FnMut(EventView<'_>, StepContext) -> Verdict + Send>;
/// Collision-step-count handler.
pub type CollisionHandler = Box<dyn FnMut(EventView<'_>, CollisionContext) -> Verdict + Send>;
/// Single-emission handler.
pub type EmissionHandler =
    Box<dyn FnMut(EventView<'_>, EmissionContext<'_>) -> EmissionVerdict + Send>;
/// Cross-section reweighting handler; returns a factor that must not be negative.
pub type ReweightHandler = Box<dyn FnMut(EventView<'_>, &ProcessInfo) -> f64 + Send>;
/// Resonance starting-scale handler.
pub type ResonanceHandler = Box<dyn FnMut(EventView<'_>, ResonanceContext) -> f64 + Send>;

/// One enabled intervention point together with its handler.
pub enum Intervention {
    /// After the hard process is selected.
    ProcessLevel(ProcessHandler),
    /// After all evolution.
    PartonLevel(PartonHandler),
    /// Once per pass, when evolution first drops below `scale`.
    ScaleThreshold {
        /// Threshold evolution scale.
        scale: f64,
        /// The decision.
        handler: ThresholdHandler,
    },
    /// After each of the first `count` branchings of the hardest subsystem,
    /// and of the first `count` branchings inside resonance decays.
    StepCount {
        /// Number of branchings to inspect.
        count: u64,
        /// The decision.
        handler: StepHandler,
    },
    /// After each of the first `count` additional collisions.
    CollisionStepCount {
        /// Number of collisions to inspect.
        count: u64,
        /// The decision.
        handler: CollisionHandler,
    },
    /// After every incoming branching.
    IncomingEmission(EmissionHandler),
    /// After every outgoing branching.
    OutgoingEmission(EmissionHandler),
    /// Before evolution, to rescale the event weight.
    CrossSectionReweight(ReweightHandler),
    /// Before evolving each resonance decay subsystem.
    ResonanceScale(ResonanceHandler),
}

impl Intervention {
    /// The point this intervention is attached to.
    pub const fn point(&self) -> HookPoint {
        match self {
            Self::ProcessLevel(_) => HookPoint::ProcessLevel,
            Self::PartonLevel(_) => HookPoint::PartonLevel,
            Self::ScaleThreshold { .. } => HookPoint::ScaleThreshold,
            Self::StepCount { .. } => HookPoint::StepCount,
            Self::CollisionStepCount { .. } => HookPoint::CollisionStepCount,
            Self::IncomingEmission(_) => HookPoint::IncomingEmission,
            Self::OutgoingEmission(_) => HookPoint::OutgoingEmission,
            Self::CrossSectionReweight(_) => HookPoint::CrossSectionReweight,
            Self::ResonanceScale(_) => HookPoint::ResonanceScale,
        }
    }
}

impl core::fmt::Debug for Intervention {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ScaleThreshold { scale, .. } => {
                f.debug_struct("ScaleThreshold").field("scale", scale).finish_non_exhaustive()
            }
            Self::StepCount { count, .. } => {
                f.debug_struct("StepCount").field("count", count).finish_non_exhaustive()
            }
            Self::CollisionStepCount { count, .. } => f
                .debug_struct("CollisionStepCount")
                .field("count", count)
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.point()),
        }
    }
}

// ---------------------------------------------------------------------------
// The capability set
// ---------------------------------------------------------------------------

/// The set of enabled intervention points.
#[derive(Debug, Default)]
pub struct HookSet {
    interventions: BTreeMap<HookPoint, Intervention>,
}

impl HookSet {
    /// A set with nothing enabled.
    pub const fn new() -> Self {
        Self {
            interventions: BTreeMap::new(),
        }
    }

    /// Enable an intervention, replacing any handler at the same point.
    #[must_use]
    pub fn with(mut self, intervention: Intervention) -> Self {
        self.insert(intervention);
        self
    }

    /// Enable an intervention and return the one it replaced.
    pub fn insert(&mut self, intervention: Intervention) -> Option<Intervention> {
        self.interventions.insert(intervention.point(), intervention)
    }

    /// Disable a point.
    pub fn remove(&mut self, point: HookPoint) -> Option<Intervention> {
        self.interventions.remove(&point)
    }

    /// Whether a handler is attached at `point`.
    pub fn can_intervene_at(&self, point: HookPoint) -> bool {
        self.interventions.contains_key(&point)
    }

    /// Every enabled point, in declaration order.
    pub fn enabled_points(&self) -> Vec<HookPoint> {
        self.interventions.keys().copied().collect()
    }

    /// Threshold scale of the scale-threshold hook, if enabled.
    pub fn threshold_scale(&self) -> Option<f64> {
        match self.interventions.get(&HookPoint::ScaleThreshold) {
            Some(Intervention::ScaleThreshold { scale, .. }) => Some(*scale),
            _ => None,
        }
    }

    /// Run the process-level hook.
    pub fn process_level(&mut self, record: &mut EventRecord, info: &ProcessInfo) -> Verdict {
        match self.interventions.get_mut(&HookPoint::ProcessLevel) {
            Some(Intervention::ProcessLevel(handler)) => handler(record, info),
            _ => Verdict::Continue,
        }
    }

    /// Run the parton-level hook.
    pub fn parton_level(&mut self, view: EventView<'_>) -> Verdict {
        match self.interventions.get_mut(&HookPoint::PartonLevel) {
            Some(Intervention::PartonLevel(handler)) => handler(view),
            _ => Verdict::Continue,
        }
    }

    /// Run the scale-threshold hook.
    pub fn scale_threshold(&mut self, view: EventView<'_>, context: ThresholdContext) -> Verdict {
        match self.interventions.get_mut(&HookPoint::ScaleThreshold) {
            Some(Intervention::ScaleThreshold { handler, .. }) => handler(view, context),
            _ => Verdict::Continue,
        }
    }

    /// Run the step-count hook if the step is among the first `count`.
    pub fn step(&mut self, view: EventView<'_>, context: StepContext) -> Verdict {
        match self.interventions.get_mut(&HookPoint::StepCount) {
            Some(Intervention::StepCount { count, handler }) if step_number(&context) <= *count => {
                handler(view, context)
            }
            _ => Verdict::Continue,
        }
    }

    /// Run the collision-step-count hook if the collision is among the first `count`.
    pub fn collision_step(&mut self, view: EventView<'_>, context: CollisionContext) -> Verdict {
        match self.interventions.get_mut(&HookPoint::CollisionStepCount) {
            Some(Intervention::CollisionStepCount { count, handler })
                if context.collisions <= *count =>
            {
                handler(view, context)
            }
            _ => Verdict::Continue,
        }
    }

    /// Run the single-emission hook matching the committing engine.
    pub fn emission(&mut self, view: EventView<'_>, context: EmissionContext<'_>) -> EmissionVerdict {
        let point = match context.kind {
            SourceKind::Incoming => HookPoint::IncomingEmission,
            SourceKind::Outgoing => HookPoint::OutgoingEmission,
            SourceKind::Collision => return EmissionVerdict::Keep,
        };
        match self.interventions.get_mut(&point) {
            Some(Intervention::IncomingEmission(handler) | Intervention::OutgoingEmission(handler)) => {
                handler(view, context)
            }
            _ => EmissionVerdict::Keep,
        }
    }

    /// Run the reweighting hook; 1.0 when disabled.
    pub fn reweight(&mut self, view: EventView<'_>, info: &ProcessInfo) -> f64 {
        match self.interventions.get_mut(&HookPoint::CrossSectionReweight) {
            Some(Intervention::CrossSectionReweight(handler)) => handler(view, info),
            _ => 1.0,
        }
    }

    /// Run the resonance-scale hook.
    pub fn resonance_scale(&mut self, view: EventView<'_>, context: ResonanceContext) -> Option<f64> {
        match self.interventions.get_mut(&HookPoint::ResonanceScale) {
            Some(Intervention::ResonanceScale(handler)) => Some(handler(view, context)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-event extraction
// ---------------------------------------------------------------------------

/// Ordinal of the step being reported, as compared with the hook's count.
const fn step_number(context: &StepContext) -> u64 {
    match context.position {
        VetoPosition::Resonance => context.outgoing,
        _ => context.incoming.saturating_add(context.outgoing),
    }
}

/// Which subsystem [`sub_event`] extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubEventSelection {
    /// The hard-process subsystem.
    Hardest,
    /// The most recently created subsystem.
    Latest,
}

/// One parton of a sub-event, with its index in the full record.
#[derive(Debug, Clone, PartialEq)]
pub struct SubEventEntry {
    /// Index in the full record.
    pub index: ParticleIndex,
    /// The particle.
    pub particle: Particle,
}

/// The current live partons of one subsystem, in record order.
pub fn sub_event(view: EventView<'_>, selection: SubEventSelection) -> Vec<SubEventEntry> {
    let system = match selection {
        SubEventSelection::Hardest => view.systems.ids().next(),
        SubEventSelection::Latest => view.systems.ids().last(),
    };
    let Some(members) = system.and_then(|id| view.systems.get(id)) else {
        return Vec::new();
    };
    let mut indices = members.outgoing.clone();
    indices.sort_unstable();
    indices
        .into_iter()
        .filter_map(|index| {
            view.record
                .get(index)
                .filter(|p| p.is_final() && p.is_parton())
                .map(|p| SubEventEntry {
                    index,
                    particle: p.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use interleave_types::{FourMomentum, codes, status};

    fn view_parts() -> (EventRecord, SubsystemRegistry) {
        let mut record = EventRecord::new();
        let mut gluon = Particle::new(codes::GLUON, status::HARD_OUTGOING, FourMomentum::new(0.0, 5.0, 0.0, 5.0));
        gluon.colour = 101;
        gluon.anticolour = 102;
        let first = record.append(gluon.clone()).unwrap();
        let boson = record
            .append(Particle::new(codes::Z_BOSON, status::RESONANCE.abs(), FourMomentum::new(0.0, 0.0, 0.0, 91.0)))
            .unwrap();
        let second = record.append(gluon).unwrap();
        let mut systems = SubsystemRegistry::new();
        systems.add_system(None, vec![second, boson, first]);
        systems.add_system(None, vec![second]);
        (record, systems)
    }

    #[test]
    fn disabled_points_are_neutral() {
        let (mut record, systems) = view_parts();
        let mut hooks = HookSet::new();
        let view = EventView { record: &record, systems: &systems };
        assert_eq!(hooks.parton_level(view), Verdict::Continue);
        let info = ProcessInfo { name: "test", scale: 10.0, weight: 1.0 };
        assert!((hooks.reweight(view, &info) - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            hooks.resonance_scale(view, ResonanceContext {
                resonance: ParticleIndex::new(2),
                system: SubsystemId::new(1),
                default_scale: 91.0,
            }),
            None
        );
        assert_eq!(hooks.process_level(&mut record, &info), Verdict::Continue);
    }

    #[test]
    fn insert_replaces_handler_at_same_point() {
        let mut hooks = HookSet::new()
            .with(Intervention::PartonLevel(Box::new(|_| Verdict::Abort)));
        let previous = hooks.insert(Intervention::PartonLevel(Box::new(|_| Verdict::Continue)));
        assert!(previous.is_some());
        assert_eq!(hooks.enabled_points(), vec![HookPoint::PartonLevel]);

        let (record, systems) = view_parts();
        assert_eq!(hooks.parton_level(EventView { record: &record, systems: &systems }), Verdict::Continue);
        assert!(hooks.remove(HookPoint::PartonLevel).is_some());
        assert!(!hooks.can_intervene_at(HookPoint::PartonLevel));
    }

    #[test]
    fn step_hook_stops_after_count() {
        let mut hooks = HookSet::new().with(Intervention::StepCount {
            count: 2,
            handler: Box::new(|_, _| Verdict::Abort),
        });
        let (record, systems) = view_parts();
        let view = EventView { record: &record, systems: &systems };
        let context = |position, incoming, outgoing| StepContext {
            kind: SourceKind::Outgoing,
            position,
            incoming,
            outgoing,
            scale: 5.0,
            first_appended: ParticleIndex::new(1),
        };
        assert_eq!(hooks.step(view, context(VetoPosition::Outgoing, 1, 1)), Verdict::Abort);
        assert_eq!(hooks.step(view, context(VetoPosition::Deferred, 2, 1)), Verdict::Continue);
        // Resonance decays count their own branchings.
        assert_eq!(hooks.step(view, context(VetoPosition::Resonance, 5, 2)), Verdict::Abort);
        assert_eq!(hooks.step(view, context(VetoPosition::Resonance, 0, 3)), Verdict::Continue);
    }

    #[test]
    fn emission_hooks_are_per_engine() {
        let mut hooks = HookSet::new().with(Intervention::OutgoingEmission(Box::new(|_, _| EmissionVerdict::Reject)));
        let (record, systems) = view_parts();
        let view = EventView { record: &record, systems: &systems };
        let context = |kind| EmissionContext {
            kind,
            system: SubsystemId::new(0),
            scale: 3.0,
            appended: &[],
        };
        assert_eq!(hooks.emission(view, context(SourceKind::Outgoing)), EmissionVerdict::Reject);
        assert_eq!(hooks.emission(view, context(SourceKind::Incoming)), EmissionVerdict::Keep);
        assert_eq!(hooks.emission(view, context(SourceKind::Collision)), EmissionVerdict::Keep);
    }

    #[test]
    fn stateful_handler_keeps_state() {
        let mut seen = 0_u32;
        let mut hooks = HookSet::new().with(Intervention::PartonLevel(Box::new(move |_| {
            seen = seen.saturating_add(1);
            if seen & 1 == 0 { Verdict::Abort } else { Verdict::Continue }
        })));
        let (record, systems) = view_parts();
        let view = EventView { record: &record, systems: &systems };
        assert_eq!(hooks.parton_level(view), Verdict::Continue);
        assert_eq!(hooks.parton_level(view), Verdict::Abort);
    }

    #[test]
    fn sub_event_keeps_record_indices() {
        let (record, systems) = view_parts();
        let view = EventView { record: &record, systems: &systems };
        let hardest = sub_event(view, SubEventSelection::Hardest);
        let indices: Vec<usize> = hardest.iter().map(|entry| entry.index.get()).collect();
        assert_eq!(indices, vec![1, 3]);
        let latest = sub_event(view, SubEventSelection::Latest);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].index, ParticleIndex::new(3));
    }

    #[test]
    fn threshold_scale_is_exposed() {
        let hooks = HookSet::new().with(Intervention::ScaleThreshold {
            scale: 50.0,
            handler: Box::new(|_, _| Verdict::Continue),
        });
        assert_eq!(hooks.threshold_scale(), Some(50.0));
        assert_eq!(HookSet::new().threshold_scale(), None);
    }
}
