use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Owned handle for one periodic engine task (countdown or presence sampling).
///
/// Dropping the handle cancels the task's token and aborts it, so every exit
/// path that releases the handle also stops the timer.
pub struct ScheduledTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `task` with a child of `parent`; cancelling `parent` stops it too.
    pub fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let handle = tokio::spawn(task(token.clone()));
        log_debug!("scheduled task '{name}' started");
        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn cancel(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log_debug!("scheduled task '{}' cancelled", self.name);
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };
    use std::time::Duration;

    use super::*;

    fn counting_task(
        counter: Arc<AtomicU32>,
    ) -> impl FnOnce(CancellationToken) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |token| {
            Box::pin(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = interval.tick() => { counter.fetch_add(1, Ordering::SeqCst); }
                        _ = token.cancelled() => break,
                    }
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_timer() {
        let counter = Arc::new(AtomicU32::new(0));
        let root = CancellationToken::new();
        let task = ScheduledTask::spawn("count", &root, counting_task(counter.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        drop(task);
        let seen = counter.load(Ordering::SeqCst);
        assert!(seen >= 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_parent_stops_children() {
        let counter = Arc::new(AtomicU32::new(0));
        let root = CancellationToken::new();
        let task = ScheduledTask::spawn("count", &root, counting_task(counter.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        root.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_is_idempotent() {
        crate::utils::logging::init_logging();
        let counter = Arc::new(AtomicU32::new(0));
        let root = CancellationToken::new();
        let mut task = ScheduledTask::spawn("count", &root, counting_task(counter.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        task.cancel();
        task.cancel();
        assert!(task.is_finished());
        assert_eq!(task.name(), "count");
        assert!(!root.is_cancelled());

        let seen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }
}
