//! Repeating-tick scheduler for acquisition and reporting loops.
//!
//! A [`Sampler`] is either `Idle` or `Polling`.  While polling it drives a
//! caller-supplied tick on a fixed interval from a background tokio task.
//! Ticks never overlap: the next tick is armed only after the current one
//! returns.  Stopping is advisory: the flag is checked before every tick, so
//! a tick that is already running drains to completion but nothing runs
//! after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Error;

/// Observable state of a [`Sampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// No acquisition in flight.
    Idle,
    /// A repeating tick is scheduled.
    Polling,
}

/// Fixed-interval tick driver with explicit `Idle`/`Polling` states.
///
/// The tick closure returns `Result<(), Error>`; an error logs a diagnostic,
/// stops the loop, and returns the sampler to `Idle`, so a dead transport
/// stops only its own polling loop.
///
/// Must be used from within a tokio runtime.
pub struct Sampler {
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(true)),
            task: None,
        }
    }

    /// Current state.  `Polling` only while a live, unstopped task exists.
    pub fn state(&self) -> SamplerState {
        match &self.task {
            Some(task) if !task.is_finished() && !self.stop.load(Ordering::Acquire) => {
                SamplerState::Polling
            }
            _ => SamplerState::Idle,
        }
    }

    /// Transition `Idle -> Polling`: spawn a task calling `tick` every
    /// `interval`, starting one interval from now.
    ///
    /// No-op when already polling; call [`Sampler::stop`] first to change
    /// the interval or the tick.
    pub fn start<F>(&mut self, interval: Duration, mut tick: F)
    where
        F: FnMut() -> Result<(), Error> + Send + 'static,
    {
        if self.state() == SamplerState::Polling {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Arc::clone(&stop);
        self.task = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // A slow tick delays the next one instead of bursting to catch
            // up; ticks must never overlap or pile up.
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; swallow that so the first tick
            // lands one full interval after start().
            timer.tick().await;

            loop {
                timer.tick().await;
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = tick() {
                    warn!("sampler: tick failed, polling stopped: {e}");
                    break;
                }
            }
        }));
    }

    /// Transition `Polling -> Idle`.  Safe to call from `Idle` (no-op).
    ///
    /// After this returns, no new tick will start; a tick already executing
    /// finishes but cannot requeue itself.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // The task observes the flag at its next tick boundary and exits;
        // dropping the handle does not abort it mid-tick.
        self.task.take();
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn ticks_repeat_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let tick_count = Arc::clone(&count);

        let mut sampler = Sampler::new();
        assert_eq!(sampler.state(), SamplerState::Idle);

        sampler.start(Duration::from_millis(5), move || {
            tick_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(sampler.state(), SamplerState::Polling);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::Idle);
        // One already-in-flight tick may still drain; give it a moment,
        // then the count must hold steady.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let at_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test]
    async fn stop_from_idle_is_a_no_op() {
        let mut sampler = Sampler::new();
        sampler.stop();
        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::Idle);
    }

    #[tokio::test]
    async fn start_while_polling_keeps_existing_loop() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut sampler = Sampler::new();
        let counter = Arc::clone(&first);
        sampler.start(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let counter = Arc::clone(&second);
        sampler.start(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        sampler.stop();
        assert!(first.load(Ordering::SeqCst) >= 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn erroring_tick_returns_to_idle() {
        let count = Arc::new(AtomicUsize::new(0));
        let tick_count = Arc::clone(&count);

        let mut sampler = Sampler::new();
        sampler.start(Duration::from_millis(5), move || {
            tick_count.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transport("bus gone".into()))
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sampler.state(), SamplerState::Idle);
    }
}
