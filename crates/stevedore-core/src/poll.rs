use crate::CoreError;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use stevedore_remote::ControlPlane;
use stevedore_types::AppStatus;
use tracing::debug;

/// Lower bound on the delay between two status reads.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Source of time for polling loops.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock; sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock whose `sleep` advances time instantly.
#[derive(Debug)]
pub struct VirtualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Total virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PollOptions {
    /// Delay actually slept between reads, never below [`MIN_POLL_INTERVAL`].
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// The application reached a non-transitional status.
    Status(AppStatus),
    /// The application disappeared after it was seen deleting.
    Gone,
}

pub struct StatusPoller<'a> {
    plane: &'a dyn ControlPlane,
    clock: &'a dyn Clock,
    options: PollOptions,
}

impl<'a> StatusPoller<'a> {
    pub fn new(plane: &'a dyn ControlPlane, clock: &'a dyn Clock, options: PollOptions) -> Self {
        Self {
            plane,
            clock,
            options,
        }
    }

    /// Read the status of `app` until it leaves the transitional states.
    ///
    /// A missing app is `AppNotFound`, unless it was previously observed
    /// deleting, in which case the wait settles as [`Settled::Gone`].
    /// Exceeding the configured timeout yields [`CoreError::Timeout`]. A
    /// timeout too large to represent as an instant means no deadline.
    pub fn await_ready(&self, app: &str) -> Result<Settled, CoreError> {
        let started = self.clock.now();
        let deadline = started.checked_add(self.options.timeout);
        let mut last_status: Option<AppStatus> = None;
        let mut seen_deleting = false;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.plane.app_get(app) {
                Ok(found) => {
                    debug!("poll {polls}: {app} is {}", found.status);
                    if !found.status.is_transitional() {
                        return Ok(Settled::Status(found.status));
                    }
                    seen_deleting |= found.status == AppStatus::Deleting;
                    last_status = Some(found.status);
                }
                Err(e) if e.is_not_found() => {
                    return if seen_deleting {
                        debug!("poll {polls}: {app} is gone");
                        Ok(Settled::Gone)
                    } else {
                        Err(CoreError::AppNotFound(app.to_owned()))
                    };
                }
                Err(e) => return Err(e.into()),
            }

            let now = self.clock.now();
            let mut pause = self.options.effective_interval();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(CoreError::Timeout {
                        app: app.to_owned(),
                        waited: now.duration_since(started),
                        last_status,
                    });
                }
                pause = pause
                    .min(deadline.duration_since(now))
                    .max(MIN_POLL_INTERVAL);
            }
            self.clock.sleep(pause);
        }
    }
}
