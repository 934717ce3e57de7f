use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    error::FocusError,
    events::{EngineEvent, EventSink},
    plan::PhaseKind,
    utils::lock,
};

use super::{
    detector::{Detector, FallbackDetector},
    monitor::PresenceMonitor,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const SAMPLE_INTERVAL_SECS: u64 = 1;
const CAMERA_READY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    pub interval: Duration,
    pub sample_timeout: Duration,
    pub ready_timeout: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(SAMPLE_INTERVAL_SECS),
            sample_timeout: Duration::from_millis(800),
            ready_timeout: Duration::from_secs(CAMERA_READY_TIMEOUT_SECS),
        }
    }
}

pub struct PresenceLoop {
    pub detector: Arc<dyn Detector>,
    pub fallback: Arc<FallbackDetector>,
    pub monitor: Arc<Mutex<PresenceMonitor>>,
    pub phase_rx: watch::Receiver<Option<PhaseKind>>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    pub config: SamplingConfig,
}

/// Samples presence once per interval until cancelled.
///
/// Waits for the camera first. Any detector failure, at start-up or later,
/// flips the monitor to the simulated fallback for the rest of the session.
pub async fn presence_loop(ctx: PresenceLoop, cancel_token: CancellationToken) {
    let ready = tokio::select! {
        result = tokio::time::timeout(ctx.config.ready_timeout, ctx.detector.initialize()) => result,
        _ = cancel_token.cancelled() => return,
    };
    match ready {
        Ok(Ok(())) => log_info!("camera ready, presence sampling started"),
        Ok(Err(err)) => enter_fallback(&ctx, &format!("{err:#}")),
        Err(_) => enter_fallback(&ctx, "camera did not become ready in time"),
    }

    lock(&ctx.monitor).begin(ctx.clock.now());

    let mut ticker = tokio::time::interval_at(Instant::now() + ctx.config.interval, ctx.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let present = sample_once(&ctx).await;
                evaluate_sample(&ctx, present);
            }
            _ = cancel_token.cancelled() => {
                log_info!("presence loop shutting down");
                break;
            }
        }
    }
}

async fn sample_once(ctx: &PresenceLoop) -> bool {
    if lock(&ctx.monitor).is_fallback() {
        return ctx.fallback.sample_now();
    }

    match tokio::time::timeout(ctx.config.sample_timeout, ctx.detector.sample()).await {
        Ok(Ok(present)) => present,
        Ok(Err(err)) => {
            enter_fallback(ctx, &format!("{err:#}"));
            ctx.fallback.sample_now()
        }
        Err(_) => {
            enter_fallback(ctx, "face detection timed out");
            ctx.fallback.sample_now()
        }
    }
}

fn evaluate_sample(ctx: &PresenceLoop, present: bool) {
    let now = ctx.clock.now();
    let studying = *ctx.phase_rx.borrow() == Some(PhaseKind::Study);

    let (alert, absence_secs) = {
        let mut monitor = lock(&ctx.monitor);
        let absence_secs = monitor.record_sample(present, now).continuous_absence_secs;
        let alert = if studying {
            monitor.evaluate_alert()
        } else {
            None
        };
        (alert, absence_secs)
    };

    if let Some(severity) = alert {
        log_debug!("presence alert {severity:?} after {absence_secs}s away");
        ctx.events.emit(EngineEvent::PresenceAlert {
            severity,
            absence_secs,
            message: severity.message(),
        });
    }
}

fn enter_fallback(ctx: &PresenceLoop, reason: &str) {
    if lock(&ctx.monitor).enter_fallback() {
        let err = FocusError::DetectorUnavailable(reason.to_string());
        log_warn!("{err}; using simulated presence");
        ctx.events.emit(EngineEvent::DetectorFallback {
            reason: reason.to_string(),
        });
    }
}
