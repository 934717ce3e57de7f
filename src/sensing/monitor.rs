use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerts::{AlertSeverity, AlertTracker};
use crate::clock::elapsed_secs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub last_detection_at: Option<DateTime<Utc>>,
    pub continuous_absence_secs: u64,
    pub is_face_present: bool,
    /// Real detector failed; samples come from the simulated fallback.
    pub fallback_active: bool,
    pub last_alert: Option<AlertSeverity>,
}

/// Absence bookkeeping fed one sample per second by the sensing loop.
#[derive(Debug, Clone, Default)]
pub struct PresenceMonitor {
    state: PresenceState,
    tracker: AlertTracker,
}

impl PresenceMonitor {
    pub fn new(tracker: AlertTracker) -> Self {
        Self {
            state: PresenceState::default(),
            tracker,
        }
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    /// Camera became ready: the child is assumed present from here.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        let fallback_active = self.state.fallback_active;
        self.state = PresenceState {
            last_detection_at: Some(now),
            is_face_present: true,
            fallback_active,
            ..PresenceState::default()
        };
        self.tracker.reset();
    }

    pub fn record_sample(&mut self, present: bool, now: DateTime<Utc>) -> &PresenceState {
        self.state.is_face_present = present;
        if present {
            self.mark_present(now);
        } else {
            let since = *self.state.last_detection_at.get_or_insert(now);
            self.state.continuous_absence_secs = elapsed_secs(since, now);
        }
        &self.state
    }

    /// "I'm here": treat as a detection without needing a sample.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        self.mark_present(now);
    }

    /// Run the alert table against the current absence. Only call this while
    /// a study phase is active.
    pub fn evaluate_alert(&mut self) -> Option<AlertSeverity> {
        let alert = self.tracker.evaluate(self.state.continuous_absence_secs);
        if alert.is_some() {
            self.state.last_alert = alert;
        }
        alert
    }

    /// Switch to the simulated signal. Returns `true` the first time.
    pub fn enter_fallback(&mut self) -> bool {
        !std::mem::replace(&mut self.state.fallback_active, true)
    }

    pub fn is_fallback(&self) -> bool {
        self.state.fallback_active
    }

    fn mark_present(&mut self, now: DateTime<Utc>) {
        self.state.last_detection_at = Some(now);
        self.state.continuous_absence_secs = 0;
        self.state.last_alert = None;
        self.tracker.reset();
    }
}
