//! The evolution scheduler: competition between branching sources.
//!
//! [`Scheduler::advance`] runs one evolution pass between a ceiling and a
//! floor. Each iteration asks every source for its next candidate below
//! the current ceiling, picks the largest scale, and has its owner commit
//! it. The committed scale becomes the new ceiling, so scales never rise
//! within a pass.
//!
//! # Selection
//!
//! Ties are broken by [`SourceKind::priority`]: outgoing before incoming
//! before collision. Sources that lose the comparison discard their
//! pending candidate; every source is asked afresh on the next iteration
//! because any commit may create or invalidate candidates elsewhere.
//!
//! # Commits and rollback
//!
//! Every commit runs inside a record checkpoint. When the owning source
//! refuses (exact kinematics infeasible), the checkpoint is rolled back
//! and the remaining sources compete again at the same ceiling. If none of
//! them has a candidate, evolution resumes below the highest refused
//! scale. When a single-emission hook rejects a branching, the checkpoint
//! is rolled back, every source drops its cached state and rebuilds it
//! from the restored record, and evolution resumes below the rejected
//! scale.
//!
//! # Hooks
//!
//! - The scale-threshold hook fires at most once per pass, before the
//!   first commit below the threshold, or at termination if the floor is
//!   below the threshold.
//! - Single-emission hooks see every incoming or outgoing branching.
//! - Step-count hooks see the first N branchings of the hardest
//!   subsystem, and in resonance passes the first N branchings inside
//!   resonance decays. Collision-step hooks see the first N additional
//!   collisions. The running counts live in [`StepCounts`] and carry
//!   over from one pass to the next.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use interleave_shower::{BranchingSource, CommitOutcome, EvolutionError, EvolutionState, RandomStream};
use interleave_types::{HookPoint, ParticleIndex, SourceKind, SubsystemId, VetoPosition};

use crate::counters::{Counters, slots};
use crate::hooks::{
    CollisionContext, EmissionContext, EmissionVerdict, EventView, HookSet, StepContext,
    ThresholdContext, Verdict,
};

/// Which evolution pass the scheduler is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassKind {
    /// All configured sources compete from the hard scale down.
    Interleaved,
    /// Outgoing branchings alone, after a pass without them.
    Deferred,
    /// Outgoing branchings inside a resonance decay subsystem.
    Resonance,
}

impl PassKind {
    /// Position code reported to the scale-threshold hook.
    pub const fn position(self, last: Option<SourceKind>) -> VetoPosition {
        match (self, last) {
            (Self::Interleaved, None) => VetoPosition::Start,
            (Self::Interleaved, Some(kind)) => VetoPosition::after(kind),
            (Self::Deferred, _) => VetoPosition::Deferred,
            (Self::Resonance, _) => VetoPosition::Resonance,
        }
    }

    const fn steps_slot(self) -> usize {
        match self {
            Self::Interleaved => slots::STEPS_BEGUN,
            Self::Deferred | Self::Resonance => slots::LATE_BEGUN,
        }
    }

    const fn selected_slot(self, kind: SourceKind) -> usize {
        match (self, kind) {
            (Self::Interleaved, SourceKind::Collision) => slots::COLLISION_SELECTED,
            (Self::Interleaved, SourceKind::Incoming) => slots::INCOMING_SELECTED,
            (Self::Interleaved, SourceKind::Outgoing) => slots::OUTGOING_SELECTED,
            (Self::Deferred | Self::Resonance, _) => slots::LATE_SELECTED,
        }
    }

    const fn accepted_slot(self, kind: SourceKind) -> usize {
        match (self, kind) {
            (Self::Interleaved, SourceKind::Collision) => slots::COLLISION_ACCEPTED,
            (Self::Interleaved, SourceKind::Incoming) => slots::INCOMING_ACCEPTED,
            (Self::Interleaved, SourceKind::Outgoing) => slots::OUTGOING_ACCEPTED,
            (Self::Deferred | Self::Resonance, _) => slots::LATE_ACCEPTED,
        }
    }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// No source had a candidate above the floor.
    Terminated {
        /// Commits made in the pass.
        commits: u64,
    },
    /// A hook discarded the event.
    Aborted {
        /// The hook that aborted.
        point: HookPoint,
        /// Commits made before the abort.
        commits: u64,
    },
    /// The bounded iteration count ran out.
    IterationLimit {
        /// Commits made before the limit.
        commits: u64,
    },
}

/// One kept branching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommittedStep {
    /// The source that committed.
    pub kind: SourceKind,
    /// The subsystem of the branching.
    pub system: SubsystemId,
    /// The scale of the branching.
    pub scale: f64,
}

/// Mutable state shared by the scheduler and the hook dispatch.
pub struct EvolutionContext<'a> {
    /// The event being evolved.
    pub state: &'a mut EvolutionState,
    /// Enabled hooks.
    pub hooks: &'a mut HookSet,
    /// Diagnostic counters.
    pub counters: &'a mut Counters,
    /// The generator's random stream.
    pub rng: &'a mut RandomStream,
}

const fn view_of(state: &EvolutionState) -> EventView<'_> {
    EventView {
        record: &state.record,
        systems: &state.systems,
    }
}

/// Running step counts of one event, carried across its passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    /// Incoming branchings of the hardest subsystem.
    pub incoming: u64,
    /// Outgoing branchings of the hardest subsystem.
    pub outgoing: u64,
    /// Outgoing branchings inside resonance decays.
    pub resonance: u64,
    /// Additional collisions.
    pub collisions: u64,
}

/// Runs evolution passes.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pass: PassKind,
    max_iterations: u32,
    history: Vec<CommittedStep>,
    counts: StepCounts,
}

impl Scheduler {
    /// A scheduler for one kind of pass with a bounded iteration count.
    pub const fn new(pass: PassKind, max_iterations: u32) -> Self {
        Self {
            pass,
            max_iterations,
            history: Vec::new(),
            counts: StepCounts {
                incoming: 0,
                outgoing: 0,
                resonance: 0,
                collisions: 0,
            },
        }
    }

    /// Continue from the step counts of earlier passes of the same event.
    #[must_use]
    pub const fn with_counts(mut self, counts: StepCounts) -> Self {
        self.counts = counts;
        self
    }

    /// Step counts so far, including every earlier pass it continued from.
    pub const fn counts(&self) -> StepCounts {
        self.counts
    }

    /// Branchings kept by the last call to [`Scheduler::advance`], in order.
    pub fn history(&self) -> &[CommittedStep] {
        &self.history
    }

    /// Evolve from `ceiling` down to `floor`.
    ///
    /// With `floor >= ceiling` nothing is queried and nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError`] only when the record or registry rejects
    /// bookkeeping during a commit or rollback. Infeasible branchings,
    /// vetoes and termination are reported through [`AdvanceOutcome`].
    #[allow(clippy::too_many_lines)]
    pub fn advance(
        &mut self,
        sources: &mut [&mut dyn BranchingSource],
        cx: &mut EvolutionContext<'_>,
        ceiling: f64,
        floor: f64,
    ) -> Result<AdvanceOutcome, EvolutionError> {
        self.history.clear();
        if floor.is_nan() || ceiling.is_nan() || floor >= ceiling {
            return Ok(AdvanceOutcome::Terminated { commits: 0 });
        }
        cx.counters.bump(slots::PASSES);

        let threshold = cx.hooks.threshold_scale();
        let mut threshold_pending = threshold.is_some();
        let mut ceiling = ceiling;
        let mut commits: u64 = 0;
        let mut last_kind: Option<SourceKind> = None;
        let mut excluded: BTreeSet<SourceKind> = BTreeSet::new();
        let mut highest_refused: Option<f64> = None;

        for _ in 0..self.max_iterations {
            cx.counters.bump(self.pass.steps_slot());

            let winner = select(sources, cx, ceiling, floor, &excluded);
            let Some((position, scale, kind)) = winner else {
                if let Some(refused) = highest_refused.take() {
                    // Everything left refused or had nothing: resume below.
                    excluded.clear();
                    ceiling = refused;
                    continue;
                }
                if let Some(threshold) = threshold.filter(|t| threshold_pending && *t > floor) {
                    let context = ThresholdContext {
                        scale: threshold,
                        position: self.pass.position(last_kind),
                        commits,
                    };
                    if cx.hooks.scale_threshold(view_of(cx.state), context) == Verdict::Abort {
                        debug!(threshold, commits, "scale threshold hook aborted at termination");
                        return Ok(AdvanceOutcome::Aborted {
                            point: HookPoint::ScaleThreshold,
                            commits,
                        });
                    }
                }
                debug!(pass = ?self.pass, commits, floor, "evolution pass terminated");
                return Ok(AdvanceOutcome::Terminated { commits });
            };

            let Some(source) = sources.get_mut(position) else {
                continue;
            };

            if let Some(threshold) = threshold.filter(|t| threshold_pending && scale < *t) {
                threshold_pending = false;
                let context = ThresholdContext {
                    scale: threshold,
                    position: self.pass.position(last_kind),
                    commits,
                };
                if cx.hooks.scale_threshold(view_of(cx.state), context) == Verdict::Abort {
                    source.discard();
                    debug!(threshold, commits, "scale threshold hook aborted the event");
                    return Ok(AdvanceOutcome::Aborted {
                        point: HookPoint::ScaleThreshold,
                        commits,
                    });
                }
            }

            cx.counters.bump(self.pass.selected_slot(kind));
            cx.state.begin_checkpoint()?;
            let outcome = match source.commit(cx.state, cx.rng) {
                Ok(outcome) => outcome,
                Err(error) => {
                    cx.state.rollback()?;
                    return Err(error);
                }
            };

            let branching = match outcome {
                CommitOutcome::Refused { reason } => {
                    cx.state.rollback()?;
                    debug!(source = %kind, scale, reason, "commit refused; retrying remaining sources");
                    excluded.insert(kind);
                    highest_refused = Some(highest_refused.map_or(scale, |h| h.max(scale)));
                    continue;
                }
                CommitOutcome::Committed(branching) => branching,
            };

            let verdict = cx.hooks.emission(
                view_of(cx.state),
                EmissionContext {
                    kind,
                    system: branching.system,
                    scale,
                    appended: &branching.appended,
                },
            );
            if verdict == EmissionVerdict::Reject {
                cx.state.rollback()?;
                for source in sources.iter_mut() {
                    source.refresh(cx.state);
                }
                ceiling = scale;
                excluded.clear();
                highest_refused = None;
                debug!(source = %kind, scale, "emission rejected by hook; rolled back");
                continue;
            }

            cx.state.release()?;
            commits = commits.saturating_add(1);
            last_kind = Some(kind);
            ceiling = scale;
            excluded.clear();
            highest_refused = None;
            self.history.push(CommittedStep {
                kind,
                system: branching.system,
                scale,
            });
            for source in sources.iter_mut() {
                for system in &branching.touched {
                    source.prepare(*system, cx.state);
                }
            }
            cx.counters.bump(self.pass.accepted_slot(kind));
            cx.counters.record(
                slots::CURRENT_SYSTEM,
                i64::try_from(branching.system.get()).unwrap_or(i64::MAX),
            );
            debug!(
                pass = ?self.pass,
                source = %kind,
                system = %branching.system,
                scale,
                appended = branching.appended.len(),
                "branching committed"
            );

            let first_appended = branching.appended.first().copied().unwrap_or(ParticleIndex::NONE);
            if let Some(point) = self.step_hooks(cx, kind, branching.system, branching.created, scale, first_appended) {
                return Ok(AdvanceOutcome::Aborted { point, commits });
            }
        }

        warn!(
            pass = ?self.pass,
            max_iterations = self.max_iterations,
            commits,
            ceiling,
            "evolution pass hit the iteration limit"
        );
        Ok(AdvanceOutcome::IterationLimit { commits })
    }

    /// Run the step-count hooks after a kept branching. Returns the point
    /// that aborted, if any.
    fn step_hooks(
        &mut self,
        cx: &mut EvolutionContext<'_>,
        kind: SourceKind,
        system: SubsystemId,
        created: Option<SubsystemId>,
        scale: f64,
        first_appended: ParticleIndex,
    ) -> Option<HookPoint> {
        match kind {
            SourceKind::Collision => {
                self.counts.collisions = self.counts.collisions.saturating_add(1);
                let context = CollisionContext {
                    collisions: self.counts.collisions,
                    system: created.unwrap_or(system),
                    scale,
                };
                (cx.hooks.collision_step(view_of(cx.state), context) == Verdict::Abort)
                    .then_some(HookPoint::CollisionStepCount)
            }
            SourceKind::Incoming | SourceKind::Outgoing => {
                let counts = &mut self.counts;
                let outgoing = match (self.pass, kind) {
                    (PassKind::Resonance, _) => {
                        counts.resonance = counts.resonance.saturating_add(1);
                        counts.resonance
                    }
                    _ if system.get() != 0 => return None,
                    (_, SourceKind::Incoming) => {
                        counts.incoming = counts.incoming.saturating_add(1);
                        counts.outgoing
                    }
                    _ => {
                        counts.outgoing = counts.outgoing.saturating_add(1);
                        counts.outgoing
                    }
                };
                let context = StepContext {
                    kind,
                    position: self.pass.position(Some(kind)),
                    incoming: counts.incoming,
                    outgoing,
                    scale,
                    first_appended,
                };
                (cx.hooks.step(view_of(cx.state), context) == Verdict::Abort).then_some(HookPoint::StepCount)
            }
        }
    }
}

/// Query every source not excluded and return the winning slot, scale and
/// kind. Losers discard their candidates.
fn select(
    sources: &mut [&mut dyn BranchingSource],
    cx: &mut EvolutionContext<'_>,
    ceiling: f64,
    floor: f64,
    excluded: &BTreeSet<SourceKind>,
) -> Option<(usize, f64, SourceKind)> {
    let mut best: Option<(usize, f64, SourceKind)> = None;
    for (position, source) in sources.iter_mut().enumerate() {
        let kind = source.kind();
        if excluded.contains(&kind) {
            source.discard();
            continue;
        }
        let Some(scale) = source.next_candidate(ceiling, floor, cx.state, cx.rng) else {
            continue;
        };
        if !(scale > floor && scale <= ceiling) {
            source.discard();
            continue;
        }
        let better = best.is_none_or(|(_, best_scale, best_kind)| match scale.partial_cmp(&best_scale) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => kind.priority() < best_kind.priority(),
            _ => false,
        });
        if better {
            best = Some((position, scale, kind));
        }
    }
    let winner = best.map(|(position, _, _)| position);
    for (position, source) in sources.iter_mut().enumerate() {
        if Some(position) != winner {
            source.discard();
        }
    }
    best
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::{Arc, Mutex};

    use interleave_shower::Branching;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    /// Proposes a fixed list of scales, highest first, and commits without
    /// touching the record.
    struct Fixed {
        kind: SourceKind,
        scales: Vec<f64>,
        pending: Option<f64>,
        refuse: bool,
        system: SubsystemId,
    }

    impl Fixed {
        fn new(kind: SourceKind, scales: &[f64]) -> Self {
            Self {
                kind,
                scales: scales.to_vec(),
                pending: None,
                refuse: false,
                system: SubsystemId::new(0),
            }
        }

        fn in_system(mut self, system: usize) -> Self {
            self.system = SubsystemId::new(system);
            self
        }
    }

    impl BranchingSource for Fixed {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn prepare(&mut self, _system: SubsystemId, _state: &EvolutionState) {}

        fn reset(&mut self) {
            self.pending = None;
        }

        fn tracked_systems(&self) -> Vec<SubsystemId> {
            Vec::new()
        }

        fn next_candidate(
            &mut self,
            ceiling: f64,
            floor: f64,
            _state: &EvolutionState,
            _rng: &mut RandomStream,
        ) -> Option<f64> {
            self.pending = self.scales.iter().copied().find(|s| *s <= ceiling && *s > floor);
            self.pending
        }

        fn commit(
            &mut self,
            _state: &mut EvolutionState,
            _rng: &mut RandomStream,
        ) -> Result<CommitOutcome, EvolutionError> {
            let scale = self
                .pending
                .take()
                .ok_or(EvolutionError::NoCandidate { kind: self.kind })?;
            if self.refuse {
                self.refuse = false;
                return Ok(CommitOutcome::Refused { reason: "scripted" });
            }
            self.scales.retain(|s| (s - scale).abs() > 0.0);
            Ok(CommitOutcome::Committed(Branching {
                kind: self.kind,
                system: self.system,
                scale,
                appended: Vec::new(),
                touched: Vec::new(),
                created: None,
            }))
        }

        fn discard(&mut self) {
            self.pending = None;
        }
    }

    fn run_pass(
        scheduler: &mut Scheduler,
        sources: &mut [&mut dyn BranchingSource],
        hooks: &mut HookSet,
        counters: &mut Counters,
        ceiling: f64,
        floor: f64,
    ) -> AdvanceOutcome {
        let mut state = EvolutionState::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let mut cx = EvolutionContext {
            state: &mut state,
            hooks,
            counters,
            rng: &mut rng,
        };
        scheduler.advance(sources, &mut cx, ceiling, floor).unwrap()
    }

    fn run(sources: &mut [&mut dyn BranchingSource], hooks: &mut HookSet, ceiling: f64, floor: f64) -> (AdvanceOutcome, Vec<CommittedStep>) {
        let mut scheduler = Scheduler::new(PassKind::Interleaved, 100);
        let mut counters = Counters::new();
        let outcome = run_pass(&mut scheduler, sources, hooks, &mut counters, ceiling, floor);
        (outcome, scheduler.history().to_vec())
    }

    /// A step-count hook that records what it was shown.
    fn recording_step_hook(count: u64) -> (HookSet, Arc<Mutex<Vec<(VetoPosition, u64, u64)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hooks = HookSet::new().with(crate::hooks::Intervention::StepCount {
            count,
            handler: Box::new(move |_, context| {
                sink.lock().unwrap().push((context.position, context.incoming, context.outgoing));
                Verdict::Continue
            }),
        });
        (hooks, seen)
    }

    #[test]
    fn picks_largest_scale_each_time() {
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[60.0, 20.0]);
        let mut incoming = Fixed::new(SourceKind::Incoming, &[70.0, 10.0]);
        let mut hooks = HookSet::new();
        let (outcome, history) = run(&mut [&mut outgoing, &mut incoming], &mut hooks, 100.0, 1.0);
        assert_eq!(outcome, AdvanceOutcome::Terminated { commits: 4 });
        let scales: Vec<f64> = history.iter().map(|step| step.scale).collect();
        assert_eq!(scales, vec![70.0, 60.0, 20.0, 10.0]);
    }

    #[test]
    fn refused_commit_lets_others_compete_at_same_ceiling() {
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[50.0, 5.0]);
        outgoing.refuse = true;
        let mut incoming = Fixed::new(SourceKind::Incoming, &[30.0]);
        let mut hooks = HookSet::new();
        let (outcome, history) = run(&mut [&mut outgoing, &mut incoming], &mut hooks, 100.0, 1.0);
        assert_eq!(outcome, AdvanceOutcome::Terminated { commits: 2 });
        let kinds: Vec<SourceKind> = history.iter().map(|step| step.kind).collect();
        assert_eq!(kinds, vec![SourceKind::Incoming, SourceKind::Outgoing]);
        assert!(history.last().is_some_and(|step| (step.scale - 5.0).abs() < f64::EPSILON));
    }

    #[test]
    fn lone_refusal_resumes_below_refused_scale() {
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[50.0, 40.0]);
        outgoing.refuse = true;
        let mut hooks = HookSet::new();
        let (outcome, history) = run(&mut [&mut outgoing], &mut hooks, 100.0, 1.0);
        // 50 is refused once and stays scripted, but the ceiling has moved
        // to 50 so the next query returns it again and it now commits.
        assert_eq!(outcome, AdvanceOutcome::Terminated { commits: 2 });
        assert!(history.iter().all(|step| step.scale <= 50.0));
    }

    #[test]
    fn iteration_limit_is_reported() {
        let scales: Vec<f64> = (1..=200).rev().map(f64::from).collect();
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &scales);
        let mut hooks = HookSet::new();
        let (outcome, _) = run(&mut [&mut outgoing], &mut hooks, 1000.0, 0.0);
        assert_eq!(outcome, AdvanceOutcome::IterationLimit { commits: 100 });
    }

    #[test]
    fn threshold_fires_at_termination_when_floor_is_below() {
        let mut hooks = HookSet::new().with(crate::hooks::Intervention::ScaleThreshold {
            scale: 10.0,
            handler: Box::new(|_, context| {
                assert_eq!(context.position, VetoPosition::Start);
                Verdict::Abort
            }),
        });
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[]);
        let (outcome, _) = run(&mut [&mut outgoing], &mut hooks, 100.0, 1.0);
        assert_eq!(
            outcome,
            AdvanceOutcome::Aborted {
                point: HookPoint::ScaleThreshold,
                commits: 0
            }
        );
    }

    #[test]
    fn positions_by_pass() {
        assert_eq!(PassKind::Interleaved.position(None), VetoPosition::Start);
        assert_eq!(
            PassKind::Interleaved.position(Some(SourceKind::Incoming)),
            VetoPosition::Incoming
        );
        assert_eq!(PassKind::Deferred.position(None), VetoPosition::Deferred);
        assert_eq!(
            PassKind::Resonance.position(Some(SourceKind::Outgoing)),
            VetoPosition::Resonance
        );
    }

    #[test]
    fn step_counts_carry_into_the_deferred_pass() {
        let (mut hooks, seen) = recording_step_hook(10);
        let mut counters = Counters::new();

        let mut incoming = Fixed::new(SourceKind::Incoming, &[50.0, 40.0]);
        let mut interleaved = Scheduler::new(PassKind::Interleaved, 100);
        run_pass(&mut interleaved, &mut [&mut incoming], &mut hooks, &mut counters, 100.0, 1.0);

        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[60.0, 30.0]);
        let mut deferred = Scheduler::new(PassKind::Deferred, 100).with_counts(interleaved.counts());
        run_pass(&mut deferred, &mut [&mut outgoing], &mut hooks, &mut counters, 100.0, 1.0);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (VetoPosition::Incoming, 1, 0),
                (VetoPosition::Incoming, 2, 0),
                (VetoPosition::Deferred, 2, 1),
                (VetoPosition::Deferred, 2, 2),
            ]
        );
        assert_eq!(
            deferred.counts(),
            StepCounts {
                incoming: 2,
                outgoing: 2,
                resonance: 0,
                collisions: 0,
            }
        );
    }

    #[test]
    fn step_hook_fires_inside_resonance_decays() {
        let (mut hooks, seen) = recording_step_hook(1);
        let mut counters = Counters::new();
        let earlier = StepCounts {
            incoming: 3,
            outgoing: 4,
            resonance: 0,
            collisions: 1,
        };

        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[40.0, 20.0]).in_system(2);
        let mut scheduler = Scheduler::new(PassKind::Resonance, 100).with_counts(earlier);
        run_pass(&mut scheduler, &mut [&mut outgoing], &mut hooks, &mut counters, 45.0, 1.0);

        // Only the first branching inside the decay is within the count.
        assert_eq!(*seen.lock().unwrap(), vec![(VetoPosition::Resonance, 3, 1)]);
        assert_eq!(scheduler.counts().resonance, 2);
        assert_eq!(scheduler.counts().outgoing, 4);
    }

    #[test]
    fn branchings_outside_the_hardest_subsystem_are_not_step_counted() {
        let (mut hooks, seen) = recording_step_hook(10);
        let mut counters = Counters::new();
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[40.0]).in_system(1);
        let mut scheduler = Scheduler::new(PassKind::Interleaved, 100);
        run_pass(&mut scheduler, &mut [&mut outgoing], &mut hooks, &mut counters, 100.0, 1.0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(scheduler.counts(), StepCounts::default());
    }

    #[test]
    fn current_system_follows_the_latest_commit() {
        let mut hooks = HookSet::new();
        let mut counters = Counters::new();
        let mut incoming = Fixed::new(SourceKind::Incoming, &[50.0]).in_system(1);
        let mut outgoing = Fixed::new(SourceKind::Outgoing, &[30.0]);
        let mut scheduler = Scheduler::new(PassKind::Interleaved, 100);
        run_pass(
            &mut scheduler,
            &mut [&mut outgoing, &mut incoming],
            &mut hooks,
            &mut counters,
            100.0,
            1.0,
        );
        assert_eq!(counters.get(slots::CURRENT_SYSTEM).unwrap(), 0);
    }
}
