use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    sync::watch,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, SystemClock},
    error::{FocusError, FocusResult},
    events::{EngineEvent, EventSink},
    plan::{PhaseKind, SessionPlan},
    recorder::{CompletionStats, SessionRecord, SessionRecorder},
    sensing::{Detector, FallbackDetector, PresenceMonitor, PresenceState, SensingController},
    settings::{debug_mode, EngineSettings},
    utils::lock,
};

use super::{
    schedule::ScheduledTask,
    state::{EngineStatus, FocusSession, PhaseRuntime, PhaseTransition, SessionSnapshot, StopReason},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

struct SessionTasks {
    root: CancellationToken,
    countdown: Option<ScheduledTask>,
    sensing: SensingController,
}

/// Drives one focus session at a time: countdown, presence sampling and the
/// hand-off of the finished record to the recorder.
#[derive(Clone)]
pub struct FocusController {
    session: Arc<Mutex<FocusSession>>,
    presence: Arc<Mutex<PresenceMonitor>>,
    recorder: SessionRecorder,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    detector: Arc<dyn Detector>,
    fallback: Arc<FallbackDetector>,
    settings: EngineSettings,
    phase_tx: Arc<watch::Sender<Option<PhaseKind>>>,
    tasks: Arc<Mutex<SessionTasks>>,
    tick_interval: Duration,
    heartbeat_every_ticks: u32,
}

impl FocusController {
    pub fn new(
        recorder: SessionRecorder,
        detector: Arc<dyn Detector>,
        events: Arc<dyn EventSink>,
        settings: EngineSettings,
    ) -> Self {
        let (phase_tx, _) = watch::channel(None);

        Self {
            session: Arc::new(Mutex::new(FocusSession::new())),
            presence: Arc::new(Mutex::new(PresenceMonitor::default())),
            recorder,
            events,
            clock: Arc::new(SystemClock),
            detector,
            fallback: Arc::new(FallbackDetector::new(settings.fallback_presence_probability)),
            tasks: Arc::new(Mutex::new(SessionTasks {
                root: CancellationToken::new(),
                countdown: None,
                sensing: SensingController::new(settings.sampling()),
            })),
            settings,
            phase_tx: Arc::new(phase_tx),
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: if debug_mode() { 1 } else { 10 },
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<FallbackDetector>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn status(&self) -> EngineStatus {
        lock(&self.session).status()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session).is_running()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.session).snapshot()
    }

    pub fn runtime(&self) -> PhaseRuntime {
        lock(&self.session).runtime().clone()
    }

    pub fn presence(&self) -> PresenceState {
        lock(&self.presence).state().clone()
    }

    pub fn last_record(&self) -> Option<SessionRecord> {
        lock(&self.session).last_record().cloned()
    }

    pub fn completion_stats(&self) -> Option<CompletionStats> {
        lock(&self.session).completion()
    }

    pub fn load_plan(&self, plan: SessionPlan) -> FocusResult<()> {
        let phases = plan.len();
        lock(&self.session).load_plan(plan)?;
        self.phase_tx.send_replace(None);
        log_info!("plan loaded with {phases} phases");
        self.emit_state_changed();
        Ok(())
    }

    pub async fn start(&self) -> FocusResult<PhaseRuntime> {
        let now = self.clock.now();
        let (runtime, phase) = {
            let mut session = lock(&self.session);
            let runtime = session.start(now)?;
            (runtime, session.active_phase())
        };

        *lock(&self.presence) = PresenceMonitor::default();
        self.phase_tx.send_replace(phase);

        {
            let mut tasks = lock(&self.tasks);
            tasks.root = CancellationToken::new();
            let root = tasks.root.clone();

            let ctx = CountdownLoop {
                session: self.session.clone(),
                phase_tx: self.phase_tx.clone(),
                events: self.events.clone(),
                recorder: self.recorder.clone(),
                clock: self.clock.clone(),
                root: root.clone(),
                tick_interval: self.tick_interval,
                heartbeat_every_ticks: self.heartbeat_every_ticks.max(1),
                cues_enabled: self.settings.countdown_cues_enabled,
            };
            tasks.countdown = Some(ScheduledTask::spawn("countdown", &root, move |token| {
                countdown_loop(ctx, token)
            }));

            if self.settings.camera_enabled {
                tasks.sensing.stop_sensing();
                let started = tasks.sensing.start_sensing(
                    &root,
                    self.detector.clone(),
                    self.fallback.clone(),
                    self.presence.clone(),
                    self.phase_tx.subscribe(),
                    self.events.clone(),
                    self.clock.clone(),
                );
                if let Err(err) = started {
                    log_warn!("presence sampling not started: {err:#}");
                }
            }
        }

        log_info!(
            "focus session started, first phase {} for {}s",
            runtime.mode.as_str(),
            runtime.time_remaining_secs
        );
        self.emit_state_changed();
        Ok(runtime)
    }

    /// Stop on the user's behalf. The record is returned only to the call
    /// that finalized the session; a failed save is reported through the
    /// event sink, not as an error.
    pub async fn stop(&self, reason: StopReason) -> FocusResult<Option<SessionRecord>> {
        if reason == StopReason::NaturalComplete {
            return Err(FocusError::InvalidInput(
                "natural completion is driven by the countdown".into(),
            ));
        }

        let record = lock(&self.session).stop(reason, self.clock.now());
        self.teardown();
        self.phase_tx.send_replace(None);
        self.emit_state_changed();

        if let Some(record) = &record {
            log_info!(
                "session {} stopped at {}%",
                record.id,
                record.completion_percentage
            );
            if let Err(err) = self.recorder.persist(record).await {
                log_warn!("stop of session {} left unsaved: {err}", record.id);
            }
        }
        Ok(record)
    }

    /// Shutdown hook. Synchronous: only local writes, no awaits.
    pub fn capture_sudden_closure(&self) -> Option<SessionRecord> {
        let record = lock(&self.session).capture_sudden_closure(self.clock.now())?;
        if let Err(err) = self.recorder.capture_locally(&record) {
            log_error!("failed to capture session {} locally: {err:#}", record.id);
        }
        self.teardown();
        self.phase_tx.send_replace(None);
        Some(record)
    }

    pub fn acknowledge_presence(&self) -> PresenceState {
        let mut presence = lock(&self.presence);
        presence.acknowledge(self.clock.now());
        presence.state().clone()
    }

    fn teardown(&self) {
        let mut tasks = lock(&self.tasks);
        tasks.root.cancel();
        if let Some(mut countdown) = tasks.countdown.take() {
            countdown.cancel();
        }
        tasks.sensing.stop_sensing();
    }

    fn emit_state_changed(&self) {
        let snapshot = self.snapshot();
        self.events.emit(EngineEvent::StateChanged { snapshot });
    }
}

struct CountdownLoop {
    session: Arc<Mutex<FocusSession>>,
    phase_tx: Arc<watch::Sender<Option<PhaseKind>>>,
    events: Arc<dyn EventSink>,
    recorder: SessionRecorder,
    clock: Arc<dyn Clock>,
    root: CancellationToken,
    tick_interval: Duration,
    heartbeat_every_ticks: u32,
    cues_enabled: bool,
}

async fn countdown_loop(ctx: CountdownLoop, cancel_token: CancellationToken) {
    let mut interval = time::interval_at(Instant::now() + ctx.tick_interval, ctx.tick_interval);
    // A stalled runtime catches up tick by tick so the countdown never skips seconds.
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel_token.cancelled() => break,
        }

        let (outcome, snapshot) = {
            let mut session = lock(&ctx.session);
            if !session.is_running() {
                break;
            }
            let outcome = session.tick(ctx.clock.now());
            (outcome, session.snapshot())
        };

        if ctx.cues_enabled {
            if let Some(cue) = outcome.cue {
                ctx.events.emit(EngineEvent::CountdownCue {
                    cue,
                    remaining_secs: outcome.remaining_secs,
                });
            }
        }

        match outcome.transition {
            Some(PhaseTransition::Advanced { from, to }) => {
                log_info!(
                    "phase {} ({}) done, starting {} for {} min",
                    from.index,
                    from.kind.as_str(),
                    to.kind.as_str(),
                    to.duration_minutes
                );
                ctx.phase_tx.send_replace(Some(to.kind));
                ctx.events.emit(EngineEvent::PhaseChanged { from, to });
                ctx.events.emit(EngineEvent::StateChanged {
                    snapshot: snapshot.clone(),
                });
            }
            Some(PhaseTransition::Completed { stats, record }) => {
                ctx.phase_tx.send_replace(None);
                // Stops presence sampling; this task exits right after.
                ctx.root.cancel();
                ctx.events.emit(EngineEvent::StateChanged { snapshot });
                ctx.events.emit(EngineEvent::SessionCompleted { stats });
                log_info!(
                    "session completed: {} phases, {} min total",
                    stats.total_phases,
                    stats.total_minutes
                );

                if let Some(record) = record {
                    let recorder = ctx.recorder.clone();
                    tokio::spawn(async move {
                        if let Err(err) = recorder.persist(&record).await {
                            log_warn!("completed session {} left unsaved: {err}", record.id);
                        }
                    });
                }
                break;
            }
            None => {}
        }

        ticks = ticks.wrapping_add(1);
        if ticks % ctx.heartbeat_every_ticks == 0 {
            ctx.events.emit(EngineEvent::Heartbeat { snapshot });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::clock::PausedClock;
    use crate::events::ChannelSink;
    use crate::plan::generate_plan;
    use crate::recorder::{PendingClosures, SessionOutcome};
    use crate::sensing::UnavailableDetector;
    use crate::store::memory::MemoryStore;

    pub(crate) struct Harness {
        pub controller: FocusController,
        pub store: Arc<MemoryStore>,
        pub rx: UnboundedReceiver<EngineEvent>,
        _dir: tempfile::TempDir,
    }

    pub(crate) fn harness(settings: EngineSettings) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let (sink, rx) = ChannelSink::new();
        let sink: Arc<dyn EventSink> = Arc::new(sink);
        let scratch = Arc::new(PendingClosures::new(dir.path().join("pending.json")).unwrap());
        let recorder = SessionRecorder::new(store.clone(), scratch, sink.clone());
        let clock = PausedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap());

        let controller = FocusController::new(recorder, Arc::new(UnavailableDetector), sink, settings)
            .with_clock(Arc::new(clock))
            .with_fallback(Arc::new(FallbackDetector::seeded(1.0, 11)));

        Harness {
            controller,
            store,
            rx,
            _dir: dir,
        }
    }

    fn no_camera() -> EngineSettings {
        EngineSettings {
            camera_enabled: false,
            ..EngineSettings::default()
        }
    }

    fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_plan_is_rejected() {
        let h = harness(no_camera());
        assert!(matches!(h.controller.start().await, Err(FocusError::NoPlanLoaded)));
        assert!(matches!(
            h.controller.stop(StopReason::NaturalComplete).await,
            Err(FocusError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_natural_completion_and_credits_break_time() {
        let mut h = harness(no_camera());
        h.controller.load_plan(generate_plan(2, 1, 1).unwrap()).unwrap();
        h.controller.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(121)).await;

        assert_eq!(h.controller.status(), EngineStatus::Completed);
        let record = h.controller.last_record().unwrap();
        assert_eq!(record.status, SessionOutcome::Completed);
        assert_eq!(record.completion_percentage, 100);
        assert_eq!(record.actual_study_minutes, 1);
        assert_eq!(record.actual_break_minutes, 1);

        assert_eq!(h.store.records().len(), 1);
        assert_eq!(h.store.credits(), vec![1]);

        let stats = h.controller.completion_stats().unwrap();
        assert_eq!(stats.total_phases, 2);
        assert_eq!(stats.total_minutes, 2);

        let events = drain(&mut h.rx);
        let names: Vec<_> = events.iter().map(EngineEvent::name).collect();
        assert_eq!(names.iter().filter(|n| **n == "phase-changed").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "session-completed").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "countdown-cue").count(), 20);
        assert_eq!(names.iter().filter(|n| **n == "focus-heartbeat").count(), 11);

        // Stopping a completed session writes nothing new.
        assert!(h.controller.stop(StopReason::Manual).await.unwrap().is_none());
        assert_eq!(h.store.create_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_stops_persist_exactly_one_record() {
        let h = harness(no_camera());
        h.controller.load_plan(generate_plan(90, 30, 15).unwrap()).unwrap();
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(90)).await;

        let (a, b) = tokio::join!(
            h.controller.stop(StopReason::Manual),
            h.controller.stop(StopReason::Manual)
        );
        let records: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, SessionOutcome::Cancelled);
        assert_eq!(records[0].actual_study_minutes, 1);

        assert_eq!(h.store.records().len(), 1);
        assert!(h.store.credits().is_empty());
        assert_eq!(h.controller.status(), EngineStatus::Cancelled);

        // The countdown is gone.
        let before = h.controller.runtime();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.controller.runtime(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_reported_and_not_retried() {
        let mut h = harness(no_camera());
        h.store.fail_creates.store(true, Ordering::SeqCst);
        h.controller.load_plan(generate_plan(30, 30, 15).unwrap()).unwrap();
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(65)).await;

        let record = h.controller.stop(StopReason::Manual).await.unwrap();
        assert!(record.is_some());
        assert!(h.controller.stop(StopReason::Manual).await.unwrap().is_none());
        assert_eq!(h.store.create_attempts.load(Ordering::SeqCst), 1);
        assert!(drain(&mut h.rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::PersistenceFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_after_completion_is_reported_once() {
        let mut h = harness(no_camera());
        h.store.fail_creates.store(true, Ordering::SeqCst);
        h.controller.load_plan(generate_plan(2, 1, 1).unwrap()).unwrap();
        h.controller.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(h.controller.status(), EngineStatus::Completed);
        assert_eq!(h.store.create_attempts.load(Ordering::SeqCst), 1);
        assert!(h.store.records().is_empty());
        assert!(h.store.credits().is_empty());
        let failures = drain(&mut h.rx)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::PersistenceFailed { .. }))
            .count();
        assert_eq!(failures, 1);
        assert!(h.controller.stop(StopReason::Manual).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sudden_closure_is_captured_locally_then_reconciled() {
        let h = harness(no_camera());
        h.controller.load_plan(generate_plan(90, 30, 15).unwrap()).unwrap();
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(150)).await;

        let record = h.controller.capture_sudden_closure().unwrap();
        assert_eq!(record.status, SessionOutcome::SuddenClosure);
        assert!(record.abnormal);
        assert_eq!(record.actual_study_minutes, 2);
        assert!(h.store.records().is_empty());
        assert!(h.controller.capture_sudden_closure().is_none());
        assert!(h.controller.stop(StopReason::Manual).await.unwrap().is_none());

        assert_eq!(h.controller.recorder().reconcile_pending().await.unwrap(), 1);
        assert_eq!(h.store.records()[0].id, record.id);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_camera_falls_back_to_simulated_presence() {
        let mut h = harness(EngineSettings::default());
        h.controller.load_plan(generate_plan(30, 30, 15).unwrap()).unwrap();
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let presence = h.controller.presence();
        assert!(presence.fallback_active);
        assert!(presence.is_face_present);
        assert!(drain(&mut h.rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::DetectorFallback { .. })));

        let acknowledged = h.controller.acknowledge_presence();
        assert_eq!(acknowledged.continuous_absence_secs, 0);
        h.controller.stop(StopReason::Manual).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn new_plan_is_rejected_while_running() {
        let h = harness(no_camera());
        h.controller.load_plan(generate_plan(30, 30, 15).unwrap()).unwrap();
        h.controller.start().await.unwrap();
        assert!(matches!(
            h.controller.load_plan(generate_plan(30, 30, 15).unwrap()),
            Err(FocusError::SessionActive)
        ));
        assert!(matches!(h.controller.start().await, Err(FocusError::SessionActive)));
        h.controller.stop(StopReason::Manual).await.unwrap();
    }
}
