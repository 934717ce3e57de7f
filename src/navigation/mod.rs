//! Keeps the child inside a running session.
//!
//! Back/forward and the exit control are intercepted while the session runs;
//! the child must confirm before the session is cancelled and the navigation
//! goes ahead.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::{
    error::FocusResult,
    events::{EngineEvent, EventSink},
    recorder::SessionRecord,
    timer::{FocusController, StopReason},
    utils::lock,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const LEAVE_PROMPT: &str =
    "Leaving now will end your focus session and it will be saved as cancelled. Leave anyway?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NavigationAttempt {
    HistoryBack,
    HistoryForward,
    ExitControl { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// No session running; perform the navigation.
    Allow(NavigationAttempt),
    /// Navigation held back until the child answers the prompt.
    Confirm { prompt: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitChoice {
    Stay,
    Leave,
}

/// Result of answering the leave prompt.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Prompt dismissed; the guard is armed again.
    Stayed,
    /// Session stopped first; the caller now performs `attempt`.
    Left {
        attempt: NavigationAttempt,
        record: Option<SessionRecord>,
    },
    /// Nothing was waiting for an answer.
    NothingPending,
}

pub struct NavigationGuard {
    controller: FocusController,
    events: Arc<dyn EventSink>,
    pending: Mutex<Option<NavigationAttempt>>,
}

impl NavigationGuard {
    pub fn new(controller: FocusController, events: Arc<dyn EventSink>) -> Self {
        Self {
            controller,
            events,
            pending: Mutex::new(None),
        }
    }

    /// Armed exactly while the session runs and no prompt is open.
    pub fn is_armed(&self) -> bool {
        self.controller.is_running() && lock(&self.pending).is_none()
    }

    pub fn pending(&self) -> Option<NavigationAttempt> {
        lock(&self.pending).clone()
    }

    pub fn intercept(&self, attempt: NavigationAttempt) -> Interception {
        if !self.controller.is_running() {
            // A prompt left over from a session that has since ended.
            lock(&self.pending).take();
            return Interception::Allow(attempt);
        }

        log_warn!("navigation blocked during focus session: {attempt:?}");
        self.events.emit(EngineEvent::NavigationBlocked {
            attempt: attempt.clone(),
        });
        // A newer attempt replaces one still waiting on the prompt.
        *lock(&self.pending) = Some(attempt);
        Interception::Confirm {
            prompt: LEAVE_PROMPT,
        }
    }

    /// Answer the open prompt. A prompt that outlived its session (finished,
    /// stopped elsewhere, or replaced by a new plan) is discarded unanswered.
    pub async fn resolve(&self, choice: ExitChoice) -> FocusResult<Resolution> {
        let Some(attempt) = lock(&self.pending).take() else {
            return Ok(Resolution::NothingPending);
        };
        if !self.controller.is_running() {
            log_info!("dropping navigation prompt for a session that already ended");
            return Ok(Resolution::NothingPending);
        }

        match choice {
            ExitChoice::Stay => {
                log_info!("child chose to stay in the session");
                Ok(Resolution::Stayed)
            }
            ExitChoice::Leave => {
                let record = self.controller.stop(StopReason::Manual).await?;
                Ok(Resolution::Left { attempt, record })
            }
        }
    }
}
