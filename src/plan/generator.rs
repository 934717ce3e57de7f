use crate::error::{FocusError, FocusResult};

use super::types::{Phase, PhaseKind, SessionPlan};

/// Hard ceiling on a single session.
pub const MAX_TOTAL_MINUTES: u32 = 240;

/// Slack added on top of the worst-case phase count before giving up.
const LOOP_CAP_SLACK: usize = 5;

/// Turns raw UI input (a JSON number) into whole minutes.
pub fn validate_total_minutes(raw: f64) -> FocusResult<u32> {
    if !raw.is_finite() || raw <= 0.0 || raw.fract() != 0.0 {
        return Err(FocusError::InvalidInput(format!(
            "total time must be a positive whole number of minutes, got {raw}"
        )));
    }
    if raw > f64::from(MAX_TOTAL_MINUTES) {
        return Err(FocusError::InvalidInput(format!(
            "total time cannot exceed {MAX_TOTAL_MINUTES} minutes"
        )));
    }
    Ok(raw as u32)
}

/// Splits `total_minutes` into alternating study/break phases.
///
/// Starts with study. Full phases are emitted while time allows; whatever is
/// left becomes one partial phase which always ends the plan. A partial study
/// phase is never followed by a break.
pub fn generate_plan(
    total_minutes: u32,
    study_minutes_per_phase: u32,
    break_minutes_per_phase: u32,
) -> FocusResult<SessionPlan> {
    if study_minutes_per_phase == 0 || break_minutes_per_phase == 0 {
        return Err(FocusError::InvalidInput(format!(
            "parent settings must use positive phase lengths (study {study_minutes_per_phase}, break {break_minutes_per_phase})"
        )));
    }
    if total_minutes == 0 {
        return Err(FocusError::InvalidInput(
            "total time must be a positive whole number of minutes".into(),
        ));
    }
    if total_minutes > MAX_TOTAL_MINUTES {
        return Err(FocusError::InvalidInput(format!(
            "total time cannot exceed {MAX_TOTAL_MINUTES} minutes"
        )));
    }

    let shortest = study_minutes_per_phase.min(break_minutes_per_phase);
    if total_minutes < shortest {
        return Err(FocusError::InvalidInput(format!(
            "total time must be at least {shortest} minutes"
        )));
    }

    let cap = loop_cap(total_minutes, shortest);
    let mut phases: Vec<Phase> = Vec::new();
    let mut remaining = total_minutes;
    let mut iterations = 0usize;

    while remaining > 0 {
        iterations += 1;
        if iterations > cap {
            return Err(FocusError::PlanGeneration { cap });
        }

        if remaining >= study_minutes_per_phase {
            push(&mut phases, PhaseKind::Study, study_minutes_per_phase, false);
            remaining -= study_minutes_per_phase;
        } else {
            push(&mut phases, PhaseKind::Study, remaining.max(1), true);
            break;
        }

        if remaining >= break_minutes_per_phase {
            push(&mut phases, PhaseKind::Break, break_minutes_per_phase, false);
            remaining -= break_minutes_per_phase;
        } else if remaining >= 1 {
            push(&mut phases, PhaseKind::Break, remaining, true);
            break;
        }
    }

    if phases.is_empty() {
        return Err(FocusError::InvalidInput(format!(
            "total time must be at least {shortest} minutes"
        )));
    }

    Ok(SessionPlan::new(total_minutes, phases))
}

fn push(phases: &mut Vec<Phase>, kind: PhaseKind, minutes: u32, partial: bool) {
    let index = phases.len();
    phases.push(Phase {
        kind,
        duration_minutes: minutes,
        index,
        partial,
    });
}

fn loop_cap(total_minutes: u32, shortest: u32) -> usize {
    // `shortest` is already checked non-zero; whole minutes put the divisor at one.
    let divisor = shortest.min(1);
    total_minutes.div_ceil(divisor) as usize + LOOP_CAP_SLACK
}
