//! The controller facade: one object owning the keyboard, the LED
//! monitor and the script job manager over a single gadget device.
//!
//! All three share the same [`DevicePort`], so the composition rules
//! live here: the keyboard serializes its report sequences through its
//! own lock, the LED monitor is the sole reader, and every script job
//! routes its key presses through the shared keyboard controller.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use kbdgadget_core::langmap::MapStore;

use crate::config::KeyboardConfig;
use crate::device::DevicePort;
use crate::jobs::{JobError, JobManager, ScriptJob};
use crate::keyboard::{KeyboardController, KeyboardError};
use crate::led::{LedError, LedMonitor, LedState};
use crate::script::ScriptEngine;

/// Facade over one keyboard gadget device.
pub struct HidController {
    keyboard: Arc<KeyboardController>,
    leds: Arc<LedMonitor>,
    jobs: JobManager,
}

impl HidController {
    /// Wires up the controller over `port`, with `maps` as the language
    /// map store and `engine` evaluating scripts.
    pub fn new(
        port: Arc<dyn DevicePort>,
        maps: Arc<RwLock<MapStore>>,
        engine: Arc<dyn ScriptEngine>,
    ) -> Self {
        let keyboard = Arc::new(KeyboardController::new(Arc::clone(&port), maps));
        let leds = Arc::new(LedMonitor::start(port));
        let jobs = JobManager::new(engine, Arc::clone(&keyboard), Arc::clone(&leds));
        Self {
            keyboard,
            leds,
            jobs,
        }
    }

    /// Applies typing-related settings.
    pub async fn apply_keyboard_config(&self, cfg: &KeyboardConfig) -> Result<(), KeyboardError> {
        self.keyboard
            .set_key_delay(Duration::from_millis(cfg.key_delay_ms));
        self.keyboard
            .set_key_delay_jitter(Duration::from_millis(cfg.key_delay_jitter_ms));
        if let Some(name) = &cfg.active_map {
            self.keyboard.set_active_language_map(name).await?;
        }
        info!(
            delay_ms = cfg.key_delay_ms,
            jitter_ms = cfg.key_delay_jitter_ms,
            "keyboard configuration applied"
        );
        Ok(())
    }

    pub fn keyboard(&self) -> &Arc<KeyboardController> {
        &self.keyboard
    }

    pub fn leds(&self) -> &Arc<LedMonitor> {
        &self.leds
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    /// Types a string via the active language map. See
    /// [`KeyboardController::type_string`] for the skip-and-report
    /// handling of unmapped symbols.
    pub async fn type_string(&self, s: &str) -> Result<(), KeyboardError> {
        self.keyboard.type_string(s).await
    }

    /// Presses a combo string as one atomic chord.
    pub async fn press_key_combo(&self, combo: &str) -> Result<(), KeyboardError> {
        self.keyboard.press_key_combo(combo).await
    }

    // ── LEDs ──────────────────────────────────────────────────────────────────

    /// Blocks until an LED bit under `mask` changes, or `wait` elapses.
    pub async fn wait_led_change(&self, mask: u8, wait: Duration) -> Result<LedState, LedError> {
        self.leds.wait_change(mask, wait).await
    }

    // ── Scripts ───────────────────────────────────────────────────────────────

    /// Runs a script to completion and returns its result value.
    pub async fn run_script(&self, script: &str) -> Result<Value, JobError> {
        self.jobs.run_sync(script).await
    }

    /// Starts a script as a background job; returns its id and handle.
    pub fn start_script_background(&self, script: &str) -> (u64, Arc<ScriptJob>) {
        self.jobs.start_background(script)
    }

    /// Signals cancellation to one background job.
    pub fn cancel_background_job(&self, id: u64) -> Result<(), JobError> {
        self.jobs.cancel(id)
    }

    /// Signals cancellation to every tracked job.
    pub fn cancel_all_background_jobs(&self) {
        self.jobs.cancel_all()
    }

    /// Ids of all currently running background jobs, ascending.
    pub fn running_background_jobs(&self) -> Vec<u64> {
        self.jobs.running_ids()
    }

    /// Blocks until job `id` finishes and returns its stored result.
    pub async fn wait_script_result(&self, id: u64) -> Result<Value, JobError> {
        self.jobs.wait_result(id).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
