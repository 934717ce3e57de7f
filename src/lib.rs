pub mod clock;
pub mod db;
pub mod error;
pub mod events;
pub mod navigation;
pub mod plan;
pub mod recorder;
pub mod sensing;
pub mod settings;
pub mod store;
pub mod timer;
pub mod utils;

use std::{future::Future, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::task::JoinHandle;

use db::Database;
use events::{EventSink, LogSink};
use navigation::NavigationGuard;
use recorder::{PendingClosures, SessionRecorder};
use sensing::{Detector, UnavailableDetector};
use settings::SettingsStore;
use store::FocusStore;
use timer::{FocusCommands, FocusController};

const DB_FILE: &str = "focusguard.sqlite3";
const SETTINGS_FILE: &str = "settings.json";
const PENDING_FILE: &str = "pending_closures.json";

/// Everything a host needs to run focus sessions, wired together.
pub struct FocusApp {
    pub db: Database,
    pub settings: SettingsStore,
    pub controller: FocusController,
    pub commands: FocusCommands,
    pub navigation: NavigationGuard,
}

impl FocusApp {
    /// Open storage under `data_dir`, push any sessions left behind by an
    /// abrupt exit, and build the engine.
    pub async fn bootstrap(
        data_dir: &Path,
        detector: Arc<dyn Detector>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        utils::logging::init_logging();

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DB_FILE))?;
        let store: Arc<dyn FocusStore> = Arc::new(db.clone());
        let scratch = Arc::new(PendingClosures::new(data_dir.join(PENDING_FILE))?);
        let recorder = SessionRecorder::new(store.clone(), scratch, events.clone());

        // Sessions captured by the shutdown hook last time around.
        match recorder.reconcile_pending().await {
            Ok(0) => {}
            Ok(count) => warn!("Recovered {count} session(s) closed without a clean stop"),
            Err(err) => warn!("Could not reconcile pending sessions: {err:#}"),
        }

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let controller = FocusController::new(recorder, detector, events.clone(), settings.engine());
        let commands = FocusCommands::new(controller.clone(), store);
        let navigation = NavigationGuard::new(controller.clone(), events);

        Ok(Self {
            db,
            settings,
            controller,
            commands,
            navigation,
        })
    }

    /// Capture the running session locally when the process is interrupted
    /// or terminated.
    pub fn spawn_shutdown_hook(&self) -> JoinHandle<()> {
        self.spawn_shutdown_hook_with(shutdown_signal())
    }

    /// Same as [`spawn_shutdown_hook`](Self::spawn_shutdown_hook), firing when
    /// `signal` resolves.
    pub fn spawn_shutdown_hook_with<F>(&self, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let controller = self.controller.clone();
        tokio::spawn(async move {
            signal.await;
            if let Some(record) = controller.capture_sudden_closure() {
                warn!("Interrupted during session {}; captured locally", record.id);
            }
        })
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Could not listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Headless runner: plans `total_minutes` with the stored parent ratio and
/// runs the session to completion or until interrupted.
pub fn run(data_dir: &Path, total_minutes: f64) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        let app = FocusApp::bootstrap(
            data_dir,
            Arc::new(UnavailableDetector),
            Arc::new(LogSink),
        )
        .await?;

        info!("FocusGuard starting a {total_minutes} minute session");
        let plan = app
            .commands
            .create_plan(total_minutes)
            .await
            .map_err(anyhow::Error::msg)?;
        for phase in plan.phases() {
            info!(
                "  phase {}: {} for {} min{}",
                phase.index,
                phase.kind.as_str(),
                phase.duration_minutes,
                if phase.partial { " (partial)" } else { "" }
            );
        }

        let hook = app.spawn_shutdown_hook();
        app.commands.start().await.map_err(anyhow::Error::msg)?;

        while !app.controller.status().is_terminal() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        hook.abort();

        // Let the completion path finish its save before the runtime goes away.
        tokio::time::sleep(Duration::from_millis(200)).await;
        match app.controller.last_record() {
            Some(record) => info!(
                "Session {} ended as {} at {}%",
                record.id,
                record.status.as_str(),
                record.completion_percentage
            ),
            None => info!("Session ended without a record"),
        }
        info!(
            "Break time earned so far: {} min",
            app.db.total_break_credit().await?
        );
        Ok(())
    })
}
