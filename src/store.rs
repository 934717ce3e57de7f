//! Persistence capability consumed by the engine.
//!
//! Every call is a single attempt from the engine's point of view; failures
//! are surfaced, never retried.

use std::{future::Future, pin::Pin};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::recorder::SessionRecord;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const DEFAULT_STUDY_MINUTES: u32 = 30;
pub const DEFAULT_BREAK_MINUTES: u32 = 15;

/// Study/break ratio chosen by the parent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParentSettings {
    pub study_minutes_per_phase: u32,
    pub break_minutes_per_phase: u32,
}

impl Default for ParentSettings {
    fn default() -> Self {
        Self {
            study_minutes_per_phase: DEFAULT_STUDY_MINUTES,
            break_minutes_per_phase: DEFAULT_BREAK_MINUTES,
        }
    }
}

pub trait FocusStore: Send + Sync {
    fn create_focus_session<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, Result<()>>;

    /// Credit earned break time to the child's account.
    fn update_break_time<'a>(&'a self, minutes: u32) -> BoxFuture<'a, Result<()>>;

    fn get_parent_settings<'a>(&'a self) -> BoxFuture<'a, Result<ParentSettings>>;
}
