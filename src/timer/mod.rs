pub mod commands;
pub mod controller;
pub mod schedule;
pub mod state;

pub use commands::FocusCommands;
pub use controller::FocusController;
pub use state::{
    cue_for, CountdownCue, EngineStatus, FocusSession, PhaseRuntime, PhaseTransition,
    SessionAccumulators, SessionSnapshot, StopReason, TickOutcome,
};
