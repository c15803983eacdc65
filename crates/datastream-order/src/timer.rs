//! Gap-fill timers.
//!
//! A timer is a tokio task that posts a [`GapTick`] into a channel at a fixed
//! interval. The owner of the channel (the client) routes each tick back to
//! the buffer that armed it. Dropping the [`GapTimer`] aborts the task, so a
//! buffer can never leave a timer running behind it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use datastream_core::{ChainKey, SubscriptionId};

/// One firing of a gap timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapTick {
    /// Subscription whose buffer armed the timer.
    pub owner: SubscriptionId,
    pub chain: ChainKey,
    /// Identifies the arming; ticks of an older arming are stale.
    pub generation: u64,
}

pub type GapTickSender = mpsc::UnboundedSender<GapTick>;
pub type GapTickReceiver = mpsc::UnboundedReceiver<GapTick>;

/// Create the channel gap timers post into.
pub fn gap_tick_channel() -> (GapTickSender, GapTickReceiver) {
    mpsc::unbounded_channel()
}

/// Handle to an armed gap timer.
#[derive(Debug)]
pub struct GapTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl GapTimer {
    /// Spawn a repeating timer. The first tick fires one `period` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(period: Duration, tick: GapTick, sender: GapTickSender) -> Self {
        let generation = tick.generation;
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if sender.send(tick.clone()).is_err() {
                    break;
                }
            }
        });
        Self {
            generation,
            task: Some(task),
        }
    }

    /// A timer with no task behind it; ticks are delivered by hand.
    pub fn manual(generation: u64) -> Self {
        Self {
            generation,
            task: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for GapTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
