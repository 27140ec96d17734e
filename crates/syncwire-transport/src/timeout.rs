//! Inactivity deadlines for input streams.
//!
//! Raw carrier streams may block forever without signalling end-of-stream.
//! [`TimeoutMonitor::wrap`] registers a stream with a shared registry; one
//! repeating sweep, running only while the registry is non-empty, closes any
//! stream that has gone longer than its own timeout without producing data.
//! A blocked reader then sees end-of-stream or an I/O error from its carrier.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::scheduler::{ScheduledTask, Scheduler, ThreadScheduler};

/// Default interval between timeout sweeps.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Something that can close a stream from another thread, unblocking any
/// read in progress on it.
pub trait StreamCloser: Send + Sync {
    fn close(&self) -> io::Result<()>;
}

impl StreamCloser for TcpStream {
    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

#[cfg(unix)]
impl StreamCloser for std::os::unix::net::UnixStream {
    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<T: StreamCloser + ?Sized> StreamCloser for Arc<T> {
    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

/// Configuration for the timeout monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutMonitorConfig {
    /// Interval between sweeps. Should not exceed the smallest timeout
    /// passed to [`TimeoutMonitor::wrap`].
    pub check_interval: Duration,
}

impl Default for TimeoutMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Closes wrapped input streams that stop producing data.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct TimeoutMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: TimeoutMonitorConfig,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    streams: Vec<Arc<MonitoredStream>>,
    task: Option<Box<dyn ScheduledTask>>,
}

struct MonitoredStream {
    closer: Box<dyn StreamCloser>,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
    last_read: AtomicU64,
    closed: AtomicBool,
    monitor: Weak<MonitorInner>,
}

impl TimeoutMonitor {
    /// Monitor with explicit scheduler and clock.
    pub fn new(
        config: TimeoutMonitorConfig,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                scheduler,
                clock,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Monitor using a dedicated sweep thread and the system clock.
    pub fn with_config(config: TimeoutMonitorConfig) -> Self {
        Self::new(
            config,
            Arc::new(ThreadScheduler::new().with_thread_name("syncwire-timeouts")),
            Arc::new(SystemClock),
        )
    }

    /// Wrap `inner` so that it is closed through `closer` if no read
    /// returns data for longer than `timeout`.
    pub fn wrap<R, C>(&self, inner: R, closer: C, timeout: Duration) -> TimeoutInputStream<R>
    where
        R: Read,
        C: StreamCloser + 'static,
    {
        if timeout < self.inner.config.check_interval {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                check_interval_ms = self.inner.config.check_interval.as_millis() as u64,
                "stream timeout is shorter than the check interval"
            );
        }

        let stream = Arc::new(MonitoredStream {
            closer: Box::new(closer),
            clock: Arc::clone(&self.inner.clock),
            timeout_ms: timeout.as_millis() as u64,
            last_read: AtomicU64::new(self.inner.clock.now_millis()),
            closed: AtomicBool::new(false),
            monitor: Arc::downgrade(&self.inner),
        });

        {
            let mut registry = self.inner.lock();
            if registry.streams.is_empty() {
                let weak = Arc::downgrade(&self.inner);
                let task = self.inner.scheduler.schedule_with_fixed_delay(
                    self.inner.config.check_interval,
                    Arc::new(move || {
                        if let Some(monitor) = weak.upgrade() {
                            monitor.check_timeouts();
                        }
                    }),
                );
                registry.task = Some(task);
                debug!("started timeout checks");
            }
            registry.streams.push(Arc::clone(&stream));
        }

        TimeoutInputStream { inner, stream }
    }

    /// Number of streams currently monitored.
    pub fn monitored_count(&self) -> usize {
        self.inner.lock().streams.len()
    }

    /// True while the repeating sweep is scheduled.
    pub fn is_checking(&self) -> bool {
        self.inner.lock().task.is_some()
    }

    /// Run one sweep now.
    pub fn check_timeouts(&self) {
        self.inner.check_timeouts();
    }
}

impl Default for TimeoutMonitor {
    fn default() -> Self {
        Self::with_config(TimeoutMonitorConfig::default())
    }
}

impl std::fmt::Debug for TimeoutMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutMonitor")
            .field("config", &self.inner.config)
            .field("monitored", &self.monitored_count())
            .finish()
    }
}

impl MonitorInner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, stream: &Arc<MonitoredStream>) {
        let to_cancel = {
            let mut registry = self.lock();
            let before = registry.streams.len();
            registry.streams.retain(|s| !Arc::ptr_eq(s, stream));
            if registry.streams.len() < before && registry.streams.is_empty() {
                registry.task.take()
            } else {
                None
            }
        };
        if let Some(task) = to_cancel {
            task.cancel();
            debug!("stopped timeout checks");
        }
    }

    fn check_timeouts(&self) {
        // Closing may block, so never do it under the registry lock.
        let snapshot: Vec<Arc<MonitoredStream>> = self.lock().streams.clone();
        let now = self.clock.now_millis();
        for stream in snapshot {
            if stream.has_timed_out(now) {
                info!(timeout_ms = stream.timeout_ms, "input stream has timed out");
                if let Err(err) = stream.close_once() {
                    warn!(error = %err, "failed to close timed-out stream");
                }
            }
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = registry.task.take() {
            task.cancel();
        }
    }
}

impl MonitoredStream {
    fn has_timed_out(&self, now: u64) -> bool {
        now.saturating_sub(self.last_read.load(Ordering::Acquire)) > self.timeout_ms
    }

    fn touch(&self) {
        self.last_read
            .store(self.clock.now_millis(), Ordering::Release);
    }

    fn close_once(self: &Arc<Self>) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.closer.close();
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.remove(self);
        }
        result
    }
}

/// An input stream with an inactivity deadline.
///
/// Closing (explicitly, by dropping, or by the monitor) closes the
/// underlying carrier through its [`StreamCloser`] and unregisters the
/// stream exactly once.
pub struct TimeoutInputStream<R> {
    inner: R,
    stream: Arc<MonitoredStream>,
}

impl<R> TimeoutInputStream<R> {
    /// Close the underlying stream and stop monitoring it.
    pub fn close(&mut self) -> io::Result<()> {
        self.stream.close_once()
    }

    /// True once the stream was closed by its owner or by a timeout.
    pub fn is_closed(&self) -> bool {
        self.stream.closed.load(Ordering::Acquire)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read> Read for TimeoutInputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if read > 0 {
            self.stream.touch();
        }
        Ok(read)
    }
}

impl<R> Drop for TimeoutInputStream<R> {
    fn drop(&mut self) {
        if let Err(err) = self.stream.close_once() {
            debug!(error = %err, "error closing input stream on drop");
        }
    }
}

impl<R> std::fmt::Debug for TimeoutInputStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutInputStream")
            .field("timeout_ms", &self.stream.timeout_ms)
            .field("closed", &self.is_closed())
            .finish()
    }
}
