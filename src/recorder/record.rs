use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::SessionPlan;
use crate::timer::SessionAccumulators;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    SuddenClosure,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "Completed",
            SessionOutcome::Cancelled => "Cancelled",
            SessionOutcome::SuddenClosure => "SuddenClosure",
        }
    }
}

/// Final outcome of one focus session. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub status: SessionOutcome,
    pub total_planned_minutes: u32,
    pub total_study_minutes: u32,
    pub total_break_minutes: u32,
    pub actual_study_minutes: u32,
    pub actual_break_minutes: u32,
    pub plan: SessionPlan,
    pub total_phases: usize,
    pub completed_phases: usize,
    pub completion_percentage: u32,
    pub properly_completed: bool,
    /// Captured by the shutdown hook rather than a clean stop.
    #[serde(default)]
    pub abnormal: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

pub(crate) struct RecordInput<'a> {
    pub id: &'a str,
    pub plan: &'a SessionPlan,
    pub accumulators: &'a SessionAccumulators,
    pub current_phase_index: usize,
    pub status: SessionOutcome,
    pub abnormal: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SessionRecord {
    pub(crate) fn build(input: RecordInput<'_>) -> Self {
        let total_phases = input.plan.len();
        let properly_completed = input.status == SessionOutcome::Completed
            && input.current_phase_index + 1 >= total_phases;

        Self {
            id: input.id.to_string(),
            status: input.status,
            total_planned_minutes: input.plan.total_minutes(),
            total_study_minutes: input.plan.study_minutes(),
            total_break_minutes: input.plan.break_minutes(),
            actual_study_minutes: input.accumulators.actual_study_minutes,
            actual_break_minutes: input.accumulators.actual_break_minutes,
            plan: input.plan.clone(),
            total_phases,
            completed_phases: input.accumulators.completed_phases,
            completion_percentage: completion_percentage(input.current_phase_index, total_phases),
            properly_completed,
            abnormal: input.abnormal,
            started_at: input.started_at,
            ended_at: input.ended_at,
        }
    }

    pub fn actual_total_minutes(&self) -> u32 {
        self.actual_study_minutes + self.actual_break_minutes
    }
}

/// Share of the plan reached, counting the phase in progress.
pub fn completion_percentage(current_phase_index: usize, total_phases: usize) -> u32 {
    if total_phases == 0 {
        return 0;
    }
    let reached = (current_phase_index + 1).min(total_phases) as f64;
    (100.0 * reached / total_phases as f64).round() as u32
}

/// Summary shown when the last phase expires on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStats {
    pub total_phases: usize,
    pub study_minutes: u32,
    pub break_minutes: u32,
    pub total_minutes: u32,
}

/// At-most-once flag for persisting a session outcome.
///
/// Manual stop, natural completion, forced navigation and the shutdown hook
/// all race through [`try_finalize`](Self::try_finalize); only the first
/// caller gets `true`. The flag is never cleared for the life of the session.
#[derive(Debug, Default)]
pub struct SaveGuard {
    saved: AtomicBool,
}

impl SaveGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_finalize(&self) -> bool {
        self.saved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn save_guard_has_exactly_one_winner_across_threads() {
        let guard = Arc::new(SaveGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.try_finalize())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(guard.is_saved());
        assert!(!guard.try_finalize());
    }

    #[test]
    fn completion_percentage_counts_phase_in_progress() {
        assert_eq!(completion_percentage(0, 4), 25);
        assert_eq!(completion_percentage(1, 3), 67);
        assert_eq!(completion_percentage(2, 3), 100);
        assert_eq!(completion_percentage(9, 3), 100);
        assert_eq!(completion_percentage(0, 0), 0);
    }
}
