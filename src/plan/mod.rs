pub mod generator;
pub mod types;

pub use generator::{generate_plan, validate_total_minutes, MAX_TOTAL_MINUTES};
pub use types::{Phase, PhaseKind, SessionPlan};
