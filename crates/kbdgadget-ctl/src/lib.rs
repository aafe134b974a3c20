//! # kbdgadget-ctl
//!
//! Controller runtime for a Linux USB HID keyboard gadget
//! (`/dev/hidgN`): typed text and key combos out, host LED state in,
//! and background script jobs driving both.
//!
//! - **`device`** – The raw gadget port: 8-byte report writes and
//!   single-byte LED status reads, plus a recording mock for tests.
//!
//! - **`keyboard`** – Typing and combo presses over the port, with
//!   configurable inter-key delay and jitter.
//!
//! - **`led`** – Blocking, timeout-bound waits on host-driven LED
//!   state changes (the gadget's only back-channel from the host).
//!
//! - **`script`** – Host bindings handed to an embedded script
//!   evaluator, with cooperative cancellation at every call boundary.
//!
//! - **`jobs`** – The script job manager: concurrent, individually
//!   cancellable, re-runnable script jobs with shared result waiting.
//!
//! - **`controller`** – The facade composing all of the above over one
//!   device.
//!
//! - **`config`** – TOML configuration for the headless binary.

pub mod config;
pub mod controller;
pub mod device;
pub mod jobs;
pub mod keyboard;
pub mod led;
pub mod script;

pub use controller::HidController;
pub use device::{DeviceError, DevicePort, GadgetPort};
pub use jobs::{JobError, JobManager, JobState, ScriptJob};
pub use keyboard::{KeyboardController, KeyboardError};
pub use led::{LedError, LedMonitor, LedState};
pub use script::{EngineError, HostError, ScriptEngine, ScriptHost};
