//! # Pausable Timer
//!
//! Repeating tick that can be paused and resumed without losing its delay or
//! callback. Backs the watch position tracker and segment polling.
//!
//! Each `resume` spawns a tokio task driving an interval; `pause` cancels it
//! through a [`CancellationToken`]. Ticks run sequentially on that task, so
//! they never overlap, and cancellation is only observed between ticks.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

enum TimerState {
    Paused,
    Running(CancellationToken),
    Destroyed,
}

/// A repeating, pausable timer.
///
/// Must be resumed from within a tokio runtime.
pub struct PausableTimer {
    name: &'static str,
    delay: Duration,
    on_tick: Arc<dyn Fn() + Send + Sync>,
    state: Mutex<TimerState>,
}

impl fmt::Debug for PausableTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PausableTimer")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("running", &self.is_running())
            .finish()
    }
}

impl PausableTimer {
    /// Create a paused timer that calls `on_tick` every `delay` once resumed.
    pub fn new<F>(name: &'static str, delay: Duration, on_tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name,
            delay,
            on_tick: Arc::new(on_tick),
            state: Mutex::new(TimerState::Paused),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), TimerState::Running(_))
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(*self.state.lock(), TimerState::Destroyed)
    }

    /// Arm the timer; the first tick fires one delay from now.
    ///
    /// No-op while running or after `destroy`.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, TimerState::Paused) {
            return;
        }

        let token = CancellationToken::new();
        *state = TimerState::Running(token.clone());
        drop(state);

        let delay = self.delay;
        let on_tick = Arc::clone(&self.on_tick);
        let name = self.name;
        trace!(timer = name, delay_ms = delay.as_millis() as u64, "Timer resumed");

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + delay, delay);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => on_tick(),
                }
            }
            trace!(timer = name, "Timer task finished");
        });
    }

    /// Disarm the timer; `resume` arms it again.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if let TimerState::Running(token) = &*state {
            token.cancel();
            *state = TimerState::Paused;
        }
    }

    /// Disarm the timer for good.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if let TimerState::Running(token) = &*state {
            token.cancel();
        }
        *state = TimerState::Destroyed;
    }
}

impl Drop for PausableTimer {
    fn drop(&mut self) {
        if let TimerState::Running(token) = &*self.state.get_mut() {
            token.cancel();
        }
    }
}
