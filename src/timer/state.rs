use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    clock::elapsed_minutes,
    error::{FocusError, FocusResult},
    plan::{Phase, PhaseKind, SessionPlan},
    recorder::{
        record::RecordInput, CompletionStats, SaveGuard, SessionOutcome, SessionRecord,
    },
};

/// Seconds left at which the gentle countdown cue starts.
const GENTLE_CUE_FROM_SECS: u64 = 10;
/// Seconds left at which the cue turns sharp.
const SHARP_CUE_FROM_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    #[default]
    Idle,
    Planned,
    Running,
    /// Between a phase's expiry and the next phase's start, inside one tick.
    PhaseTransition,
    Completed,
    Cancelled,
    SuddenClosure,
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineStatus::Completed | EngineStatus::Cancelled | EngineStatus::SuddenClosure
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Manual,
    /// Refused by `FocusSession::stop`; completion comes from `tick`.
    NaturalComplete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CountdownCue {
    Gentle,
    Sharp,
}

/// Audible cue for the last seconds of a phase, if any.
pub fn cue_for(remaining_secs: u64) -> Option<CountdownCue> {
    match remaining_secs {
        0 => None,
        s if s <= SHARP_CUE_FROM_SECS => Some(CountdownCue::Sharp),
        s if s <= GENTLE_CUE_FROM_SECS => Some(CountdownCue::Gentle),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRuntime {
    pub status: EngineStatus,
    pub current_phase_index: usize,
    pub time_remaining_secs: u64,
    pub mode: PhaseKind,
    pub is_running: bool,
    /// Wall-clock start of the current phase, not of the session.
    pub phase_started_at: Option<DateTime<Utc>>,
}

impl Default for PhaseRuntime {
    fn default() -> Self {
        Self {
            status: EngineStatus::Idle,
            current_phase_index: 0,
            time_remaining_secs: 0,
            mode: PhaseKind::Study,
            is_running: false,
            phase_started_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionAccumulators {
    pub actual_study_minutes: u32,
    pub actual_break_minutes: u32,
    pub completed_phases: usize,
}

impl SessionAccumulators {
    pub fn add(&mut self, kind: PhaseKind, minutes: u32) {
        match kind {
            PhaseKind::Study => self.actual_study_minutes += minutes,
            PhaseKind::Break => self.actual_break_minutes += minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub runtime: PhaseRuntime,
    pub accumulators: SessionAccumulators,
    pub plan: Option<SessionPlan>,
}

#[derive(Debug, Clone)]
pub enum PhaseTransition {
    Advanced { from: Phase, to: Phase },
    Completed {
        stats: CompletionStats,
        record: Option<SessionRecord>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub cue: Option<CountdownCue>,
    pub remaining_secs: u64,
    pub transition: Option<PhaseTransition>,
}

/// One focus session: plan, countdown, accumulators and its save guard.
///
/// Pure state machine; every method takes `now` explicitly. The controller
/// owns the timers and calls in here under its lock, which is what makes a
/// tick's advance-or-finalize decision atomic.
#[derive(Debug, Default)]
pub struct FocusSession {
    session_id: Option<String>,
    plan: Option<SessionPlan>,
    runtime: PhaseRuntime,
    accumulators: SessionAccumulators,
    save_guard: SaveGuard,
    started_at: Option<DateTime<Utc>>,
    last_record: Option<SessionRecord>,
    completion: Option<CompletionStats>,
}

impl FocusSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> EngineStatus {
        self.runtime.status
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_running
    }

    pub fn runtime(&self) -> &PhaseRuntime {
        &self.runtime
    }

    pub fn accumulators(&self) -> SessionAccumulators {
        self.accumulators
    }

    pub fn plan(&self) -> Option<&SessionPlan> {
        self.plan.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_saved(&self) -> bool {
        self.save_guard.is_saved()
    }

    pub fn last_record(&self) -> Option<&SessionRecord> {
        self.last_record.as_ref()
    }

    pub fn completion(&self) -> Option<CompletionStats> {
        self.completion
    }

    /// Kind of the phase being counted down, if running.
    pub fn active_phase(&self) -> Option<PhaseKind> {
        self.runtime.is_running.then_some(self.runtime.mode)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            runtime: self.runtime.clone(),
            accumulators: self.accumulators,
            plan: self.plan.clone(),
        }
    }

    /// Load a freshly generated plan. Replaces any finished session.
    pub fn load_plan(&mut self, plan: SessionPlan) -> FocusResult<()> {
        if self.runtime.is_running {
            return Err(FocusError::SessionActive);
        }

        let first_secs = plan.get(0).map(Phase::duration_secs).unwrap_or(0);
        let first_kind = plan.get(0).map(|p| p.kind).unwrap_or(PhaseKind::Study);

        *self = Self {
            session_id: Some(Uuid::new_v4().to_string()),
            runtime: PhaseRuntime {
                status: EngineStatus::Planned,
                time_remaining_secs: first_secs,
                mode: first_kind,
                ..PhaseRuntime::default()
            },
            plan: Some(plan),
            ..Self::default()
        };
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> FocusResult<PhaseRuntime> {
        match self.runtime.status {
            EngineStatus::Planned => {}
            EngineStatus::Running | EngineStatus::PhaseTransition => {
                return Err(FocusError::SessionActive)
            }
            _ => return Err(FocusError::NoPlanLoaded),
        }

        let first = self
            .plan
            .as_ref()
            .and_then(|plan| plan.get(0))
            .cloned()
            .ok_or(FocusError::NoPlanLoaded)?;

        self.runtime = PhaseRuntime {
            status: EngineStatus::Running,
            current_phase_index: 0,
            time_remaining_secs: first.duration_secs(),
            mode: first.kind,
            is_running: true,
            phase_started_at: Some(now),
        };
        self.started_at = Some(now);
        Ok(self.runtime.clone())
    }

    /// One second of countdown. No-op unless running.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if !self.runtime.is_running {
            return TickOutcome::default();
        }

        self.runtime.time_remaining_secs = self.runtime.time_remaining_secs.saturating_sub(1);
        let remaining_secs = self.runtime.time_remaining_secs;

        let mut outcome = TickOutcome {
            cue: cue_for(remaining_secs),
            remaining_secs,
            transition: None,
        };

        if remaining_secs == 0 {
            outcome.transition = self.complete_phase(now);
        }
        outcome
    }

    /// Stop on behalf of the user (or a navigation they confirmed).
    ///
    /// Returns the record only for the call that won the save guard; a second
    /// stop, or a stop after completion, yields `None`.
    ///
    /// `NaturalComplete` is refused here: only the last phase running out
    /// through `tick` may finalize a session as completed.
    pub fn stop(&mut self, reason: StopReason, now: DateTime<Utc>) -> Option<SessionRecord> {
        if reason == StopReason::NaturalComplete || self.started_at.is_none() {
            return None;
        }

        if self.runtime.is_running {
            self.close_current_phase(now);
        }
        self.finalize(SessionOutcome::Cancelled, false, now)
    }

    /// Last-resort capture when the host goes away without a clean stop.
    pub fn capture_sudden_closure(&mut self, now: DateTime<Utc>) -> Option<SessionRecord> {
        if !self.runtime.is_running || self.save_guard.is_saved() {
            return None;
        }
        self.close_current_phase(now);
        self.finalize(SessionOutcome::SuddenClosure, true, now)
    }

    fn close_current_phase(&mut self, now: DateTime<Utc>) {
        if let Some(phase_started_at) = self.runtime.phase_started_at {
            self.accumulators
                .add(self.runtime.mode, elapsed_minutes(phase_started_at, now));
        }
        self.runtime.is_running = false;
    }

    fn complete_phase(&mut self, now: DateTime<Utc>) -> Option<PhaseTransition> {
        let plan = self.plan.as_ref()?;
        let index = self.runtime.current_phase_index;
        let outgoing = plan.get(index)?.clone();
        let next = plan.get(index + 1).cloned();
        let total_phases = plan.len();

        self.runtime.status = EngineStatus::PhaseTransition;
        if let Some(phase_started_at) = self.runtime.phase_started_at {
            self.accumulators
                .add(outgoing.kind, elapsed_minutes(phase_started_at, now));
        }
        self.accumulators.completed_phases += 1;

        match next {
            Some(next) => {
                self.runtime.current_phase_index = next.index;
                self.runtime.time_remaining_secs = next.duration_secs();
                self.runtime.mode = next.kind;
                self.runtime.phase_started_at = Some(now);
                self.runtime.status = EngineStatus::Running;
                Some(PhaseTransition::Advanced {
                    from: outgoing,
                    to: next,
                })
            }
            None => {
                self.runtime.is_running = false;
                let stats = CompletionStats {
                    total_phases,
                    study_minutes: self.accumulators.actual_study_minutes,
                    break_minutes: self.accumulators.actual_break_minutes,
                    total_minutes: self.accumulators.actual_study_minutes
                        + self.accumulators.actual_break_minutes,
                };
                self.completion = Some(stats);
                let record = self.finalize(SessionOutcome::Completed, false, now);
                Some(PhaseTransition::Completed { stats, record })
            }
        }
    }

    fn finalize(
        &mut self,
        status: SessionOutcome,
        abnormal: bool,
        now: DateTime<Utc>,
    ) -> Option<SessionRecord> {
        if !self.save_guard.try_finalize() {
            return None;
        }

        self.runtime.is_running = false;
        self.runtime.status = match status {
            SessionOutcome::Completed => EngineStatus::Completed,
            SessionOutcome::Cancelled => EngineStatus::Cancelled,
            SessionOutcome::SuddenClosure => EngineStatus::SuddenClosure,
        };

        let plan = self.plan.as_ref()?;
        let record = SessionRecord::build(RecordInput {
            id: self.session_id.as_deref().unwrap_or_default(),
            plan,
            accumulators: &self.accumulators,
            current_phase_index: self.runtime.current_phase_index,
            status,
            abnormal,
            started_at: self.started_at.unwrap_or(now),
            ended_at: now,
        });
        self.last_record = Some(record.clone());
        Some(record)
    }
}
