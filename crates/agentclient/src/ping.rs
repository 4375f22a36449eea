//! Bounded retry for agent liveness.
//!
//! [`PingPolicy::decide`] is a pure function of elapsed time and the outcome
//! of the latest probe. [`wait_until_ready`] drives it, sleeping through a
//! [`Clock`] so tests can run it without waiting.

use crate::AgentClient;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Shortest pause between probes.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Time source used by [`wait_until_ready`].
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock; `sleep` blocks the thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Clock that only advances when slept on.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Total time slept so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner()) += duration;
    }
}

/// What to do after a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingDecision {
    /// The probe succeeded.
    Reachable,
    /// Probe again after the given pause.
    Retry(Duration),
    /// The overall timeout has elapsed without a successful probe.
    Unreachable,
}

/// Poll at `delay` intervals until a ping succeeds or `timeout` elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPolicy {
    /// Overall time allowed for the agent to answer.
    pub timeout: Duration,
    /// Pause between probes.
    pub delay: Duration,
}

impl PingPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(timeout: Duration, delay: Duration) -> Self {
        Self { timeout, delay }
    }

    /// Decide the next step given the time spent so far and whether the
    /// latest probe succeeded.
    ///
    /// The last pause is shortened so that one final probe happens at the
    /// deadline.
    #[must_use]
    pub fn decide(&self, elapsed: Duration, ping_ok: bool) -> PingDecision {
        if ping_ok {
            return PingDecision::Reachable;
        }
        if elapsed >= self.timeout {
            return PingDecision::Unreachable;
        }
        let remaining = self.timeout - elapsed;
        PingDecision::Retry(self.delay.max(MIN_DELAY).min(remaining))
    }
}

impl Default for PingPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of [`wait_until_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    /// A ping succeeded.
    Reachable {
        /// State reported by the agent.
        state: String,
    },
    /// No ping succeeded before the timeout.
    Unreachable {
        /// Number of probes sent.
        attempts: u32,
        /// Error from the final probe.
        last_error: String,
    },
}

impl Reachability {
    /// Whether the agent answered.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

/// Ping `client` until it answers or `policy` gives up.
pub fn wait_until_ready(
    client: &dyn AgentClient,
    policy: &PingPolicy,
    clock: &dyn Clock,
) -> Reachability {
    let start = clock.now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let error = match client.ping() {
            Ok(state) => {
                log::debug!("Agent answered ping after {} attempt(s)", attempts);
                return Reachability::Reachable { state };
            }
            Err(e) => e,
        };

        let elapsed = clock.now().saturating_duration_since(start);
        match policy.decide(elapsed, false) {
            PingDecision::Retry(delay) => {
                log::debug!(
                    "Ping attempt {} failed: {}. Retrying in {}ms...",
                    attempts,
                    error,
                    delay.as_millis()
                );
                clock.sleep(delay);
            }
            PingDecision::Reachable | PingDecision::Unreachable => {
                log::info!(
                    "Agent unreachable after {} attempt(s) over {:?}: {}",
                    attempts,
                    elapsed,
                    error
                );
                return Reachability::Unreachable {
                    attempts,
                    last_error: error.to_string(),
                };
            }
        }
    }
}
