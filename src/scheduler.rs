//! Background task scheduling.
//!
//! The bridge never spawns maintenance work directly. It goes through a
//! [`Scheduler`] so a host application can route the tasks onto its own
//! executor; [`TokioScheduler`] is the default.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// A repeating task body. Called once per tick.
pub type RepeatingTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Run `task` every `interval`, starting one interval from now.
    fn schedule_repeating(&self, name: &str, interval: Duration, task: RepeatingTask) -> TaskHandle;

    /// Run `future` once in the background.
    fn spawn(&self, name: &str, future: BoxFuture<'static, ()>) -> TaskHandle;
}

/// Cancels its task on [`TaskHandle::cancel`]. Dropping the handle detaches.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, abort: Option<AbortHandle>) -> Self {
        Self {
            name: name.into(),
            abort,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            debug!(task = %self.name, "Cancelling background task");
            abort.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().is_none_or(AbortHandle::is_finished)
    }
}

/// Runs tasks on the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, name: &str, interval: Duration, task: RepeatingTask) -> TaskHandle {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!(task = %task_name, "Running scheduled task");
                task().await;
            }
        });
        TaskHandle::new(name, Some(handle.abort_handle()))
    }

    fn spawn(&self, name: &str, future: BoxFuture<'static, ()>) -> TaskHandle {
        let handle = tokio::spawn(future);
        TaskHandle::new(name, Some(handle.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_repeating_task_skips_first_tick_and_cancels() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = TokioScheduler.schedule_repeating(
            "count",
            Duration::from_secs(10),
            Arc::new(move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(handle.name(), "count");
    }

    #[tokio::test]
    async fn test_spawn_runs_once() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = TokioScheduler.spawn(
            "once",
            Box::pin(async move {
                let _ = tx.send(42);
            }),
        );
        assert_eq!(rx.await.unwrap(), 42);
        tokio::task::yield_now().await;
        assert_eq!(handle.name(), "once");
    }
}
