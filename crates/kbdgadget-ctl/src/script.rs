//! The script-engine boundary: host bindings exposed to an embedded
//! evaluator, plus the trait the evaluator implements.
//!
//! The script language itself (parsing, loops, conditionals) is an
//! external collaborator. This module owns only the host side of the
//! bridge: `press`, `type`, `delay`, LED waits and a logging sink, each
//! routed into the keyboard controller, the LED monitor or the runtime.
//! Cooperative cancellation lives here too – every host call checks the owning
//! job's cancel flag first and bails out with
//! [`HostError::Cancelled`], so a cancelled script stops at its next
//! host-call boundary and an in-flight device write is never
//! interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::keyboard::{KeyboardController, KeyboardError};
use crate::led::{LedError, LedMonitor, LedState};

/// Error type for host calls made by a running script.
#[derive(Debug, Error)]
pub enum HostError {
    /// The job was cancelled; observed at this host-call boundary.
    #[error("script cancelled")]
    Cancelled,

    /// A keyboard operation invoked by the script failed.
    #[error(transparent)]
    Keyboard(#[from] KeyboardError),

    /// An LED wait invoked by the script timed out or lost its monitor.
    #[error(transparent)]
    Led(#[from] LedError),
}

/// Error type for script evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A host call failed (including cooperative cancellation).
    #[error(transparent)]
    Host(#[from] HostError),

    /// The script itself failed to parse or evaluate.
    #[error("script evaluation failed: {0}")]
    Eval(String),
}

impl EngineError {
    /// Whether this error is the cooperative-cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Host(HostError::Cancelled))
    }
}

/// The host-call bridge handed to the evaluator for one script run.
///
/// Cheap to clone; all clones share the same cancel flag.
#[derive(Clone)]
pub struct ScriptHost {
    keyboard: Arc<KeyboardController>,
    leds: Arc<LedMonitor>,
    cancel: Arc<AtomicBool>,
    job_id: u64,
}

impl ScriptHost {
    pub fn new(
        keyboard: Arc<KeyboardController>,
        leds: Arc<LedMonitor>,
        cancel: Arc<AtomicBool>,
        job_id: u64,
    ) -> Self {
        Self {
            keyboard,
            leds,
            cancel,
            job_id,
        }
    }

    /// Id of the job this host bridge belongs to.
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    fn check_cancelled(&self) -> Result<(), HostError> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(HostError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// `press(combo)` – presses a key combo atomically.
    pub async fn press(&self, combo: &str) -> Result<(), HostError> {
        self.check_cancelled()?;
        Ok(self.keyboard.press_key_combo(combo).await?)
    }

    /// `type(text)` – types a string via the active language map.
    pub async fn type_string(&self, text: &str) -> Result<(), HostError> {
        self.check_cancelled()?;
        Ok(self.keyboard.type_string(text).await?)
    }

    /// `delay(ms)` – suspends the script.
    pub async fn delay(&self, millis: u64) -> Result<(), HostError> {
        self.check_cancelled()?;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(())
    }

    /// `waitLED(mask, ms)` – blocks until a host LED change under `mask`.
    pub async fn wait_led(&self, mask: u8, timeout_millis: u64) -> Result<LedState, HostError> {
        self.check_cancelled()?;
        Ok(self
            .leds
            .wait_change(mask, Duration::from_millis(timeout_millis))
            .await?)
    }

    /// `waitLEDRepeat(mask, count, perEventMs, overallMs)` – blocks
    /// until `count` qualifying LED changes under `mask`.
    pub async fn wait_led_repeated(
        &self,
        mask: u8,
        count: usize,
        per_event_millis: u64,
        overall_millis: u64,
    ) -> Result<LedState, HostError> {
        self.check_cancelled()?;
        Ok(self
            .leds
            .wait_change_repeated(
                mask,
                count,
                Duration::from_millis(per_event_millis),
                Duration::from_millis(overall_millis),
            )
            .await?)
    }

    /// `console.log(...)` – the script's logging sink.
    pub fn log(&self, message: &str) {
        info!(job = self.job_id, "script: {message}");
    }
}

/// An embeddable script evaluator.
///
/// Implementations parse and run `script`, routing its side effects
/// through `host`. An implementation must propagate
/// [`HostError::Cancelled`] outward promptly instead of swallowing it.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    async fn eval(&self, script: &str, host: &ScriptHost)
        -> Result<serde_json::Value, EngineError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
