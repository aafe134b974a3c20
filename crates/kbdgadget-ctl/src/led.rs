//! The LED monitor: turns the gadget's host-driven LED status byte into
//! blocking, timeout-bound wait primitives.
//!
//! A single reader task owns the device read path, but it only pumps
//! the device while at least one waiter is subscribed. That detail is
//! what closes the missed-wakeup window: an LED report the host sent
//! while nobody was waiting (typical right after boot) stays buffered
//! in the gadget endpoint instead of being consumed and absorbed into
//! some earlier snapshot. The first waiter samples the monitor's
//! last-known state as its baseline synchronously at call entry, kicks
//! the reader, and the buffered past change arrives as the very first
//! observed change.
//!
//! Waiters receive the state stream over a broadcast channel, so rapid
//! on/off pulses are delivered individually (a `watch`-style
//! latest-value cell would collapse an on→off pulse into nothing).
//! Every waiter holds its own receiver and baseline; concurrent waits
//! with the same or different masks never disturb each other.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use kbdgadget_core::keycodes::led;

use crate::device::DevicePort;

/// Buffered state events per waiter. Deep enough that a waiter doing a
/// masked comparison never lags behind a blinking host.
const EVENT_BUFFER: usize = 64;

/// Error type for LED waits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedError {
    /// The wait bound elapsed before a qualifying change.
    #[error("timeout waiting for LED state change")]
    Timeout,

    /// The monitor's reader stopped (device closed or failed).
    #[error("LED monitor stopped")]
    MonitorStopped,
}

/// Snapshot of the host-driven LED state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedState {
    pub mask: u8,
}

impl LedState {
    pub fn num_lock(&self) -> bool {
        self.mask & led::NUM_LOCK != 0
    }

    pub fn caps_lock(&self) -> bool {
        self.mask & led::CAPS_LOCK != 0
    }

    pub fn scroll_lock(&self) -> bool {
        self.mask & led::SCROLL_LOCK != 0
    }
}

/// State shared between the reader task and the wait primitives.
struct LedShared {
    /// Last state confirmed by a device read.
    last: StdMutex<LedState>,
    /// Fan-out of confirmed states to subscribed waiters.
    events: broadcast::Sender<LedState>,
    /// Kicks the reader out of its idle park when a waiter subscribes.
    wake: Notify,
    /// Flipped to `true` when the reader dies, releasing blocked
    /// waiters with [`LedError::MonitorStopped`].
    stopped: watch::Sender<bool>,
}

/// Monitors the device's LED status byte and serves wait primitives.
pub struct LedMonitor {
    shared: Arc<LedShared>,
    reader: JoinHandle<()>,
}

impl LedMonitor {
    /// Starts the monitor and its reader task.
    pub fn start(port: Arc<dyn DevicePort>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (stopped, _) = watch::channel(false);
        let shared = Arc::new(LedShared {
            last: StdMutex::new(LedState::default()),
            events,
            wake: Notify::new(),
            stopped,
        });

        let reader = tokio::spawn(Self::read_loop(Arc::clone(&shared), port));
        Self { shared, reader }
    }

    /// Reader task: park while nobody waits, otherwise pump the device
    /// and publish each confirmed state.
    async fn read_loop(shared: Arc<LedShared>, port: Arc<dyn DevicePort>) {
        loop {
            // Leave host LED reports buffered in the endpoint while no
            // waiter is subscribed.
            while shared.events.receiver_count() == 0 {
                shared.wake.notified().await;
            }

            match port.read_status().await {
                Ok(byte) => {
                    let state = LedState {
                        mask: byte & led::ANY,
                    };
                    debug!(mask = format_args!("0x{:02X}", state.mask), "LED state read");
                    // Order matters: update the snapshot before fan-out
                    // so a new waiter can never baseline on a state
                    // older than one already delivered.
                    *shared.last.lock().unwrap() = state;
                    let _ = shared.events.send(state);
                }
                Err(err) => {
                    warn!(error = %err, "LED reader stopped");
                    shared.stopped.send_replace(true);
                    break;
                }
            }
        }
    }

    /// The last confirmed LED state (non-blocking).
    pub fn current(&self) -> LedState {
        *self.shared.last.lock().unwrap()
    }

    /// Blocks until a state arrives whose bits under `mask` differ from
    /// the state known at call entry, or until `wait` elapses.
    ///
    /// A change the host pushed before this call, still buffered in the
    /// device, qualifies: it is read and delivered as the first change.
    ///
    /// # Errors
    ///
    /// [`LedError::Timeout`] when the bound elapses,
    /// [`LedError::MonitorStopped`] when the reader has died.
    pub async fn wait_change(&self, mask: u8, wait: Duration) -> Result<LedState, LedError> {
        let (mut rx, mut stopped, baseline) = self.subscribe()?;
        match timeout(
            wait,
            Self::next_masked_change(&mut rx, &mut stopped, mask, baseline),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(LedError::Timeout),
        }
    }

    /// Waits for `count` qualifying changes under `mask`. Each single
    /// wait is bounded by `per_event`, the whole call by `overall`.
    /// Returns the state of the final qualifying change; re-baselines
    /// after each one so a single flip never counts twice.
    ///
    /// # Errors
    ///
    /// [`LedError::Timeout`] if either bound is exceeded before `count`
    /// changes were seen.
    pub async fn wait_change_repeated(
        &self,
        mask: u8,
        count: usize,
        per_event: Duration,
        overall: Duration,
    ) -> Result<LedState, LedError> {
        let (mut rx, mut stopped, mut baseline) = self.subscribe()?;

        let repeated = async {
            let mut last = baseline;
            for _ in 0..count {
                match timeout(
                    per_event,
                    Self::next_masked_change(&mut rx, &mut stopped, mask, baseline),
                )
                .await
                {
                    Ok(Ok(state)) => {
                        baseline = state;
                        last = state;
                    }
                    Ok(Err(err)) => return Err(err),
                    Err(_elapsed) => return Err(LedError::Timeout),
                }
            }
            Ok(last)
        };

        match timeout(overall, repeated).await {
            Ok(result) => result,
            Err(_elapsed) => Err(LedError::Timeout),
        }
    }

    /// Subscribes to the state stream and samples the baseline.
    ///
    /// Subscription happens before the baseline sample, so a state
    /// published in between is both in the baseline and in the stream –
    /// it gets skipped by the masked comparison instead of lost.
    fn subscribe(
        &self,
    ) -> Result<(broadcast::Receiver<LedState>, watch::Receiver<bool>, LedState), LedError> {
        let rx = self.shared.events.subscribe();
        let mut stopped = self.shared.stopped.subscribe();
        if *stopped.borrow_and_update() {
            return Err(LedError::MonitorStopped);
        }
        let baseline = *self.shared.last.lock().unwrap();
        self.shared.wake.notify_one();
        Ok((rx, stopped, baseline))
    }

    /// Awaits the next state whose masked bits differ from `baseline`.
    async fn next_masked_change(
        rx: &mut broadcast::Receiver<LedState>,
        stopped: &mut watch::Receiver<bool>,
        mask: u8,
        baseline: LedState,
    ) -> Result<LedState, LedError> {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(state) if state.mask & mask != baseline.mask & mask => return Ok(state),
                    Ok(_) => continue,
                    // Skipped events were older than what follows; keep
                    // receiving.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(LedError::MonitorStopped)
                    }
                },
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        return Err(LedError::MonitorStopped);
                    }
                }
            }
        }
    }
}

impl Drop for LedMonitor {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
