pub mod alerts;
pub mod controller;
pub mod detector;
pub mod loop_worker;
pub mod monitor;

pub use alerts::{AlertBand, AlertSeverity, AlertTracker, DEFAULT_ALERT_BANDS};
pub use controller::SensingController;
pub use detector::{
    faces_present, Detector, FallbackDetector, UnavailableDetector,
    DEFAULT_FALLBACK_PRESENCE_PROBABILITY,
};
pub use loop_worker::SamplingConfig;
pub use monitor::{PresenceMonitor, PresenceState};
