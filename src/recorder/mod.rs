pub mod record;
pub mod scratch;

use std::sync::Arc;

use anyhow::Result;

pub use record::{
    completion_percentage, CompletionStats, SaveGuard, SessionOutcome, SessionRecord,
};
pub use scratch::PendingClosures;

use crate::{
    error::{FocusError, FocusResult},
    events::{EngineEvent, EventSink},
    store::FocusStore,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Ships finalized records to the store and the local scratch list.
///
/// Deciding *whether* a record exists is the session's job (its
/// [`SaveGuard`]); this type only moves records that already won.
#[derive(Clone)]
pub struct SessionRecorder {
    store: Arc<dyn FocusStore>,
    scratch: Arc<PendingClosures>,
    events: Arc<dyn EventSink>,
}

impl SessionRecorder {
    pub fn new(
        store: Arc<dyn FocusStore>,
        scratch: Arc<PendingClosures>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            scratch,
            events,
        }
    }

    /// One attempt at saving `record`; properly completed sessions also get
    /// their break time credited.
    ///
    /// A failed save is reported but the record stays final: callers must not
    /// clear the save guard or try again.
    pub async fn persist(&self, record: &SessionRecord) -> FocusResult<()> {
        if let Err(err) = self.store.create_focus_session(record).await {
            log_error!("failed to save focus session {}: {err:#}", record.id);
            self.events.emit(EngineEvent::PersistenceFailed {
                session_id: record.id.clone(),
                message: format!("Your session could not be saved: {err}"),
            });
            return Err(FocusError::Persistence(err.to_string()));
        }

        log_info!(
            "saved focus session {} ({}, {}%)",
            record.id,
            record.status.as_str(),
            record.completion_percentage
        );
        self.events.emit(EngineEvent::SessionSaved {
            session_id: record.id.clone(),
            status: record.status,
        });

        if record.properly_completed {
            let minutes = record.total_break_minutes;
            match self.store.update_break_time(minutes).await {
                Ok(()) => self.events.emit(EngineEvent::BreakTimeCredited { minutes }),
                Err(err) => {
                    log_warn!("failed to credit {minutes} break minutes for {}: {err:#}", record.id)
                }
            }
        }

        Ok(())
    }

    /// Synchronous local write for the shutdown path. No network involved.
    pub fn capture_locally(&self, record: &SessionRecord) -> Result<()> {
        self.scratch.append(record)?;
        log_warn!(
            "captured sudden closure of session {} into {}",
            record.id,
            self.scratch.path().display()
        );
        self.events.emit(EngineEvent::SuddenClosureCaptured {
            session_id: record.id.clone(),
        });
        Ok(())
    }

    /// Push records left behind by earlier abrupt exits to the store.
    ///
    /// Records the store rejects stay in the scratch list for the next run.
    /// Returns how many were delivered.
    pub async fn reconcile_pending(&self) -> Result<usize> {
        let pending = self.scratch.load()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0;
        let mut remaining = Vec::new();
        for record in pending {
            match self.store.create_focus_session(&record).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    log_warn!("could not reconcile closed session {}: {err:#}", record.id);
                    remaining.push(record);
                }
            }
        }

        self.scratch.replace(&remaining)?;
        log_info!(
            "reconciled {delivered} abruptly closed session(s), {} left pending",
            remaining.len()
        );
        Ok(delivered)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::events::ChannelSink;
    use crate::plan::generate_plan;
    use crate::store::memory::MemoryStore;
    use crate::timer::SessionAccumulators;

    pub(crate) fn sample_record(id: &str, status: SessionOutcome) -> SessionRecord {
        let plan = generate_plan(90, 30, 15).unwrap();
        let accumulators = SessionAccumulators {
            actual_study_minutes: 60,
            actual_break_minutes: 30,
            completed_phases: 4,
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap();
        SessionRecord::build(record::RecordInput {
            id,
            plan: &plan,
            accumulators: &accumulators,
            current_phase_index: 3,
            status,
            abnormal: status == SessionOutcome::SuddenClosure,
            started_at: at,
            ended_at: at,
        })
    }

    fn recorder(
        store: Arc<MemoryStore>,
        dir: &tempfile::TempDir,
    ) -> (
        SessionRecorder,
        tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        let (sink, rx) = ChannelSink::new();
        let scratch = Arc::new(PendingClosures::new(dir.path().join("pending.json")).unwrap());
        (SessionRecorder::new(store, scratch, Arc::new(sink)), rx)
    }

    #[tokio::test]
    async fn completed_session_is_saved_and_credited() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let (recorder, mut rx) = recorder(store.clone(), &dir);

        let record = sample_record("done", SessionOutcome::Completed);
        assert!(record.properly_completed);
        recorder.persist(&record).await.unwrap();

        assert_eq!(store.records().len(), 1);
        assert_eq!(store.credits(), vec![30]);
        assert!(matches!(rx.recv().await, Some(EngineEvent::SessionSaved { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::BreakTimeCredited { minutes: 30 })
        ));
    }

    #[tokio::test]
    async fn cancelled_session_earns_no_break_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let (recorder, _rx) = recorder(store.clone(), &dir);

        recorder
            .persist(&sample_record("stop", SessionOutcome::Cancelled))
            .await
            .unwrap();
        assert_eq!(store.records().len(), 1);
        assert!(store.credits().is_empty());
    }

    #[tokio::test]
    async fn failed_save_is_surfaced_once_and_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.fail_creates.store(true, Ordering::SeqCst);
        let (recorder, mut rx) = recorder(store.clone(), &dir);

        let err = recorder
            .persist(&sample_record("x", SessionOutcome::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, FocusError::Persistence(_)));
        assert_eq!(store.create_attempts.load(Ordering::SeqCst), 1);
        assert!(store.credits().is_empty());
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::PersistenceFailed { .. })
        ));
    }

    #[tokio::test]
    async fn failed_break_credit_does_not_undo_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.fail_credits.store(true, Ordering::SeqCst);
        let (recorder, _rx) = recorder(store.clone(), &dir);

        recorder
            .persist(&sample_record("y", SessionOutcome::Completed))
            .await
            .unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_keeps_only_rejected_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let (recorder, _rx) = recorder(store.clone(), &dir);

        recorder
            .capture_locally(&sample_record("crash-1", SessionOutcome::SuddenClosure))
            .unwrap();
        recorder
            .capture_locally(&sample_record("crash-2", SessionOutcome::SuddenClosure))
            .unwrap();

        store.fail_creates.store(true, Ordering::SeqCst);
        assert_eq!(recorder.reconcile_pending().await.unwrap(), 0);
        assert_eq!(recorder.scratch.load().unwrap().len(), 2);

        store.fail_creates.store(false, Ordering::SeqCst);
        assert_eq!(recorder.reconcile_pending().await.unwrap(), 2);
        assert!(recorder.scratch.load().unwrap().is_empty());
        assert!(store.records().iter().all(|r| r.abnormal));
    }
}
