use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::warn;

/// A repeating unit of work.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// Handle to a scheduled repeating task.
pub trait ScheduledTask: Send + Sync {
    /// Stop future runs. A run already in progress is allowed to finish.
    ///
    /// Must not block on the task itself, since the task may be the caller.
    fn cancel(&self);
}

/// Runs repeating tasks off the caller's thread.
pub trait Scheduler: Send + Sync {
    /// Run `task` every `delay`, starting `delay` from now, until cancelled.
    fn schedule_with_fixed_delay(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask>;
}

/// Scheduler that gives each repeating task its own named thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadScheduler {
    thread_name: Option<String>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the worker threads (useful in debuggers and logs).
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }
}

struct CancelSignal {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

struct ThreadTask {
    signal: Arc<CancelSignal>,
}

impl ScheduledTask for ThreadTask {
    fn cancel(&self) {
        let mut cancelled = self
            .signal
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.signal.cond.notify_all();
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_with_fixed_delay(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
        let signal = Arc::new(CancelSignal {
            cancelled: Mutex::new(false),
            cond: Condvar::new(),
        });

        let worker_signal = Arc::clone(&signal);
        let name = self
            .thread_name
            .clone()
            .unwrap_or_else(|| "syncwire-scheduler".to_string());
        let spawned = std::thread::Builder::new().name(name).spawn(move || loop {
            let cancelled = worker_signal
                .cancelled
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let (cancelled, _) = worker_signal
                .cond
                .wait_timeout_while(cancelled, delay, |cancelled| !*cancelled)
                .unwrap_or_else(PoisonError::into_inner);
            if *cancelled {
                return;
            }
            drop(cancelled);
            task();
        });

        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn scheduler thread");
        }

        Box::new(ThreadTask { signal })
    }
}

/// Scheduler backed by a tokio runtime.
///
/// Each run is moved to the blocking pool so stream teardown never stalls
/// runtime workers.
#[cfg(feature = "async")]
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "async")]
impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the current context.
    ///
    /// Panics when called outside a tokio runtime, like
    /// [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

#[cfg(feature = "async")]
struct TokioTask {
    handle: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "async")]
impl ScheduledTask for TokioTask {
    fn cancel(&self) {
        self.handle.abort();
    }
}

#[cfg(feature = "async")]
impl Scheduler for TokioScheduler {
    fn schedule_with_fixed_delay(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
        let handle = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + delay;
            let mut interval = tokio::time::interval_at(start, delay);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let run = Arc::clone(&task);
                if let Err(err) = tokio::task::spawn_blocking(move || run()).await {
                    warn!(error = %err, "scheduled task failed");
                }
            }
        });
        Box::new(TokioTask { handle })
    }
}
