//! Error taxonomy for the focus session engine.
//!
//! Storage, settings and scratch internals use `anyhow` with context; the
//! variants here are what callers of the engine actually branch on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FocusError {
    /// Bad total-minutes from the UI or bad parent settings. No state change.
    #[error("{0}")]
    InvalidInput(String),

    /// The generator hit its iteration cap; the plan is left empty.
    #[error("plan generation exceeded its safety cap of {cap} iterations")]
    PlanGeneration { cap: usize },

    /// Recovered locally by the presence monitor; only surfaced as a status flag.
    #[error("face detector unavailable: {0}")]
    DetectorUnavailable(String),

    /// The single persistence attempt failed. The session stays finalized.
    #[error("failed to save focus session: {0}")]
    Persistence(String),

    #[error("no session plan loaded")]
    NoPlanLoaded,

    #[error("a focus session is already running")]
    SessionActive,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type FocusResult<T> = std::result::Result<T, FocusError>;
