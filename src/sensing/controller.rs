use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    events::EventSink,
    plan::PhaseKind,
    timer::schedule::ScheduledTask,
};

use super::{
    detector::{Detector, FallbackDetector},
    loop_worker::{presence_loop, PresenceLoop, SamplingConfig},
    monitor::PresenceMonitor,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Owns the presence sampling task for the current session.
pub struct SensingController {
    task: Option<ScheduledTask>,
    config: SamplingConfig,
}

impl SensingController {
    pub fn new(config: SamplingConfig) -> Self {
        Self { task: None, config }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start_sensing(
        &mut self,
        parent: &CancellationToken,
        detector: Arc<dyn Detector>,
        fallback: Arc<FallbackDetector>,
        monitor: Arc<Mutex<PresenceMonitor>>,
        phase_rx: watch::Receiver<Option<PhaseKind>>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<()> {
        if self.is_active() {
            bail!("sensing already active");
        }

        let ctx = PresenceLoop {
            detector,
            fallback,
            monitor,
            phase_rx,
            events,
            clock,
            config: self.config,
        };
        self.task = Some(ScheduledTask::spawn("presence", parent, move |token| {
            presence_loop(ctx, token)
        }));
        log_info!("presence sampling scheduled");
        Ok(())
    }

    pub fn stop_sensing(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::TimeZone;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::clock::PausedClock;
    use crate::events::{ChannelSink, EngineEvent};
    use crate::sensing::AlertSeverity;
    use crate::store::BoxFuture;
    use crate::utils::lock;

    /// Replays a fixed script of samples, then keeps returning the last one.
    struct ScriptedDetector {
        ready: bool,
        script: Mutex<VecDeque<Result<bool, String>>>,
        last: Mutex<Result<bool, String>>,
    }

    impl ScriptedDetector {
        fn new(ready: bool, script: Vec<Result<bool, String>>) -> Self {
            Self {
                ready,
                script: Mutex::new(script.into()),
                last: Mutex::new(Ok(true)),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn initialize<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                if self.ready {
                    Ok(())
                } else {
                    Err(anyhow!("camera permission denied"))
                }
            })
        }

        fn sample<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<bool>> {
            Box::pin(async move {
                let next = lock(&self.script).pop_front();
                let result = match next {
                    Some(result) => {
                        *lock(&self.last) = result.clone();
                        result
                    }
                    None => lock(&self.last).clone(),
                };
                result.map_err(|message| anyhow!(message))
            })
        }
    }

    struct Harness {
        sensing: SensingController,
        monitor: Arc<Mutex<PresenceMonitor>>,
        phase_tx: watch::Sender<Option<PhaseKind>>,
        rx: UnboundedReceiver<EngineEvent>,
        root: CancellationToken,
    }

    fn start(detector: ScriptedDetector, phase: Option<PhaseKind>) -> Harness {
        let (sink, rx) = ChannelSink::new();
        let monitor = Arc::new(Mutex::new(PresenceMonitor::default()));
        let (phase_tx, phase_rx) = watch::channel(phase);
        let root = CancellationToken::new();
        let clock = PausedClock::new(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap());

        let mut sensing = SensingController::new(SamplingConfig::default());
        sensing
            .start_sensing(
                &root,
                Arc::new(detector),
                Arc::new(FallbackDetector::seeded(1.0, 3)),
                monitor.clone(),
                phase_rx,
                Arc::new(sink),
                Arc::new(clock),
            )
            .unwrap();

        Harness {
            sensing,
            monitor,
            phase_tx,
            rx,
            root,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn alerts(events: &[EngineEvent]) -> Vec<(AlertSeverity, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::PresenceAlert {
                    severity,
                    absence_secs,
                    ..
                } => Some((*severity, *absence_secs)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_absence_during_study_escalates() {
        let detector = ScriptedDetector::new(true, vec![Ok(false)]);
        let mut h = start(detector, Some(PhaseKind::Study));

        tokio::time::sleep(Duration::from_millis(20_500)).await;
        let fired = alerts(&drain(&mut h.rx));

        assert_eq!(fired.iter().filter(|(s, _)| *s == AlertSeverity::Moderate).count(), 1);
        assert_eq!(fired.iter().filter(|(s, _)| *s == AlertSeverity::Severe).count(), 1);
        let critical: Vec<u64> = fired
            .iter()
            .filter(|(s, _)| *s == AlertSeverity::Critical)
            .map(|(_, t)| *t)
            .collect();
        assert_eq!(critical, (15..=20).collect::<Vec<_>>());

        h.sensing.stop_sensing();
        assert!(!h.sensing.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn no_alerts_outside_study_phases() {
        let detector = ScriptedDetector::new(true, vec![Ok(false)]);
        let mut h = start(detector, Some(PhaseKind::Break));

        tokio::time::sleep(Duration::from_millis(16_500)).await;
        assert!(alerts(&drain(&mut h.rx)).is_empty());
        assert_eq!(lock(&h.monitor).state().continuous_absence_secs, 16);

        h.phase_tx.send_replace(Some(PhaseKind::Study));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(alerts(&drain(&mut h.rx)), vec![(AlertSeverity::Critical, 17)]);
        h.root.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_resets_absence_between_samples() {
        let detector = ScriptedDetector::new(true, vec![Ok(false)]);
        let mut h = start(detector, Some(PhaseKind::Study));

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        lock(&h.monitor).acknowledge(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 9).unwrap());
        drain(&mut h.rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(lock(&h.monitor).state().continuous_absence_secs <= 1);
        assert!(alerts(&drain(&mut h.rx)).is_empty());
        h.sensing.stop_sensing();
    }

    #[tokio::test(start_paused = true)]
    async fn detector_failure_switches_to_fallback_once() {
        let detector = ScriptedDetector::new(true, vec![Ok(true), Err("model crashed".into())]);
        let mut h = start(detector, Some(PhaseKind::Study));

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        let events = drain(&mut h.rx);
        let fallbacks = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::DetectorFallback { .. }))
            .count();
        assert_eq!(fallbacks, 1);

        let state = lock(&h.monitor).state().clone();
        assert!(state.fallback_active);
        // Fallback seeded at probability 1.0 always reports presence.
        assert!(state.is_face_present);
        assert_eq!(state.continuous_absence_secs, 0);
        h.sensing.stop_sensing();
    }

    #[tokio::test(start_paused = true)]
    async fn camera_that_never_gets_ready_still_monitors() {
        let detector = ScriptedDetector::new(false, vec![]);
        let mut h = start(detector, Some(PhaseKind::Study));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(lock(&h.monitor).is_fallback());
        assert!(h.sensing.is_active());
        assert!(matches!(
            drain(&mut h.rx).first(),
            Some(EngineEvent::DetectorFallback { .. })
        ));
        h.sensing.stop_sensing();
    }
}
