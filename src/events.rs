//! Notifications pushed from the engine to whatever hosts it.
//!
//! The host turns these into UI updates and sounds; the engine never waits on
//! a sink, so emitting is fire-and-forget.

use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    navigation::NavigationAttempt,
    plan::Phase,
    recorder::{CompletionStats, SessionOutcome},
    sensing::AlertSeverity,
    timer::{CountdownCue, SessionSnapshot},
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    StateChanged {
        snapshot: SessionSnapshot,
    },
    Heartbeat {
        snapshot: SessionSnapshot,
    },
    CountdownCue {
        cue: CountdownCue,
        remaining_secs: u64,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    PresenceAlert {
        severity: AlertSeverity,
        absence_secs: u64,
        message: &'static str,
    },
    DetectorFallback {
        reason: String,
    },
    SessionCompleted {
        stats: CompletionStats,
    },
    SessionSaved {
        session_id: String,
        status: SessionOutcome,
    },
    PersistenceFailed {
        session_id: String,
        message: String,
    },
    BreakTimeCredited {
        minutes: u32,
    },
    SuddenClosureCaptured {
        session_id: String,
    },
    NavigationBlocked {
        attempt: NavigationAttempt,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "focus-state-changed",
            EngineEvent::Heartbeat { .. } => "focus-heartbeat",
            EngineEvent::CountdownCue { .. } => "countdown-cue",
            EngineEvent::PhaseChanged { .. } => "phase-changed",
            EngineEvent::PresenceAlert { .. } => "presence-alert",
            EngineEvent::DetectorFallback { .. } => "detector-fallback",
            EngineEvent::SessionCompleted { .. } => "session-completed",
            EngineEvent::SessionSaved { .. } => "session-saved",
            EngineEvent::PersistenceFailed { .. } => "persistence-failed",
            EngineEvent::BreakTimeCredited { .. } => "break-time-credited",
            EngineEvent::SuddenClosureCaptured { .. } => "sudden-closure-captured",
            EngineEvent::NavigationBlocked { .. } => "navigation-blocked",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Forwards events into an unbounded channel for the host's event loop.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the host is tearing down; nothing left to notify.
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log. Used when no host is listening.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::PersistenceFailed { message, .. } => {
                warn!("{}: {message}", event.name())
            }
            EngineEvent::PresenceAlert {
                severity,
                absence_secs,
                message,
            } => warn!(
                "{}: {:?} after {absence_secs}s: {message}",
                event.name(),
                severity
            ),
            EngineEvent::StateChanged { .. } | EngineEvent::Heartbeat { .. } => {
                log::debug!("{}", event.name())
            }
            other => info!(
                "{}: {}",
                other.name(),
                serde_json::to_string(other).unwrap_or_default()
            ),
        }
    }
}
