use crate::error::{BridgeError, BridgeResult};
use crate::utils::CancelToken;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How often a blocked pause re-checks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(25);
/// Deadline used when `now + delay` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackoffConfig {
    /// Delay of the first pause.
    #[serde(default = "BackoffConfig::default_period_ms")]
    pub period_ms: u64,
    /// Ceiling applied to every pause.
    #[serde(default = "BackoffConfig::default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffConfig {
    fn default_period_ms() -> u64 {
        1_000
    }

    fn default_max_delay_ms() -> u64 {
        60_000
    }

    pub fn new(period: Duration, max_delay: Duration) -> Self {
        Self {
            period_ms: period.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            period_ms: Self::default_period_ms(),
            max_delay_ms: Self::default_max_delay_ms(),
        }
    }
}

/// Delay strategy consulted between reconnect attempts.
pub trait ReconnectDelay: Send + Sync {
    /// Blocks until the next delay elapses, `reset` is called, or `cancel`
    /// fires. Cancellation yields [`BridgeError::Interrupted`].
    fn pause(&self, cancel: &CancelToken) -> BridgeResult<()>;

    /// Restarts the delay sequence and releases any blocked `pause`.
    fn reset(&self);
}

#[derive(Debug, Default)]
struct BackoffState {
    attempt: u32,
    waiting: bool,
}

/// Truncated exponential backoff: the n-th pause since the last reset waits
/// `min(max_delay, period * 2^n)`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    cfg: BackoffConfig,
    state: Mutex<BackoffState>,
    released: Condvar,
}

impl ExponentialBackoff {
    pub fn new(cfg: BackoffConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(BackoffState::default()),
            released: Condvar::new(),
        }
    }

    /// Delay the pause numbered `attempt` would wait for.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .cfg
            .period_ms
            .saturating_mul(factor)
            .min(self.cfg.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Pauses taken since the last reset.
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.cfg
    }
}

impl ReconnectDelay for ExponentialBackoff {
    fn pause(&self, cancel: &CancelToken) -> BridgeResult<()> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Interrupted);
        }

        let mut state = self.state.lock();
        let delay = self.delay_for(state.attempt);
        state.attempt = state.attempt.saturating_add(1);
        state.waiting = true;

        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);
        while state.waiting {
            if cancel.is_cancelled() {
                state.waiting = false;
                return Err(BridgeError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wake_at = deadline.min(now + CANCEL_POLL);
            let _ = self.released.wait_until(&mut state, wake_at);
        }
        state.waiting = false;
        Ok(())
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.attempt = 0;
        state.waiting = false;
        self.released.notify_all();
    }
}
