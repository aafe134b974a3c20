//! # kbdgadget-core
//!
//! Shared library for the HID keyboard gadget controller containing the
//! output report codec, the HID usage-ID tables, the key-combo grammar,
//! and the language map store.
//!
//! This crate is pure data and parsing: it has zero dependencies on the
//! async runtime, the gadget device, or any OS API, so every piece of it
//! is unit-testable on any host.
//!
//! - **`report`** – The 8-byte keyboard output report written to the
//!   gadget device: one modifier bitmask plus up to six simultaneous
//!   keycodes, and the all-zero neutral report that releases everything.
//!
//! - **`keycodes`** – USB HID Usage IDs (keyboard/keypad page 0x07),
//!   modifier bitmask constants, and the LED status bit masks reported
//!   back by the host.
//!
//! - **`combo`** – The caller-facing combo grammar: whitespace-separated,
//!   case-insensitive tokens (`"CTRL ALT DELETE"`, `"SHIFT 1"`) folded
//!   into a single chord report.
//!
//! - **`langmap`** – Named language maps translating input symbols to
//!   report sequences, persisted as JSON documents, plus the store that
//!   tracks loaded maps and the active selection.

pub mod combo;
pub mod keycodes;
pub mod langmap;
pub mod report;

pub use combo::{parse_combo, ComboError};
pub use langmap::{LanguageMap, LoadReport, MapError, MapStore};
pub use report::{KeyboardOutReport, ReportError};
