use std::sync::Arc;

use crate::{
    error::FocusError,
    plan::{generate_plan, validate_total_minutes, SessionPlan},
    recorder::{CompletionStats, SessionRecord},
    sensing::PresenceState,
    store::FocusStore,
    timer::{FocusController, PhaseRuntime, SessionSnapshot, StopReason},
};

/// Entry points for the UI layer. Errors come back as display strings.
#[derive(Clone)]
pub struct FocusCommands {
    controller: FocusController,
    store: Arc<dyn FocusStore>,
}

fn to_message(err: FocusError) -> String {
    err.to_string()
}

impl FocusCommands {
    pub fn new(controller: FocusController, store: Arc<dyn FocusStore>) -> Self {
        Self { controller, store }
    }

    pub fn controller(&self) -> &FocusController {
        &self.controller
    }

    /// Validate the requested total, fetch the parent's ratio and load the
    /// generated plan.
    pub async fn create_plan(&self, total_minutes: f64) -> Result<SessionPlan, String> {
        let total = validate_total_minutes(total_minutes).map_err(to_message)?;
        let parent = self
            .store
            .get_parent_settings()
            .await
            .map_err(|e| format!("could not load parent settings: {e}"))?;

        let plan = generate_plan(
            total,
            parent.study_minutes_per_phase,
            parent.break_minutes_per_phase,
        )
        .map_err(to_message)?;
        self.controller
            .load_plan(plan.clone())
            .map_err(to_message)?;
        Ok(plan)
    }

    pub async fn start(&self) -> Result<PhaseRuntime, String> {
        self.controller.start().await.map_err(to_message)
    }

    pub async fn stop(&self, reason: StopReason) -> Result<Option<SessionRecord>, String> {
        self.controller.stop(reason).await.map_err(to_message)
    }

    pub fn acknowledge_presence(&self) -> PresenceState {
        self.controller.acknowledge_presence()
    }

    pub fn runtime_snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn presence_snapshot(&self) -> PresenceState {
        self.controller.presence()
    }

    pub fn last_record(&self) -> Option<SessionRecord> {
        self.controller.last_record()
    }

    pub fn completion_stats(&self) -> Option<CompletionStats> {
        self.controller.completion_stats()
    }
}
