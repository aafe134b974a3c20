//! The keyboard controller: turns strings and combo names into timed
//! report sequences on the device port.
//!
//! Two deliberately different failure policies live here. Typing is
//! best-effort per character: an unmapped symbol is skipped and
//! collected, and the rest of the string still goes out. A combo press
//! is atomic: one unknown token fails the whole combo before anything
//! touches the device. Device-write failures abort either operation
//! immediately; frames already written stay written (at-least-once per
//! report).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use kbdgadget_core::combo::{parse_combo, ComboError};
use kbdgadget_core::langmap::{MapError, MapStore};
use kbdgadget_core::report::KeyboardOutReport;

use crate::device::{DeviceError, DevicePort};

/// Error type for typing and combo operations.
#[derive(Debug, Error)]
pub enum KeyboardError {
    /// Some symbols had no mapping in the active language map. The
    /// mapped remainder of the string was still typed.
    #[error("no mapping for symbol(s) {0:?} in active language map")]
    UnmappedSymbols(Vec<char>),

    /// The combo string did not parse; nothing was pressed.
    #[error(transparent)]
    Combo(#[from] ComboError),

    /// Language map store failure (no active map, unknown map name).
    #[error(transparent)]
    Map(#[from] MapError),

    /// The device write failed; the current call was aborted.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Shared keyboard controller over one device port and one map store.
pub struct KeyboardController {
    port: Arc<dyn DevicePort>,
    maps: Arc<RwLock<MapStore>>,
    // Guards a full mapped sequence (press reports + neutral release)
    // as one critical section, so concurrent callers interleave whole
    // sequences rather than individual frames.
    sequence_lock: Mutex<()>,
    key_delay_ms: AtomicU64,
    key_delay_jitter_ms: AtomicU64,
}

impl KeyboardController {
    pub fn new(port: Arc<dyn DevicePort>, maps: Arc<RwLock<MapStore>>) -> Self {
        Self {
            port,
            maps,
            sequence_lock: Mutex::new(()),
            key_delay_ms: AtomicU64::new(0),
            key_delay_jitter_ms: AtomicU64::new(0),
        }
    }

    /// Sets the base inter-report delay.
    pub fn set_key_delay(&self, delay: Duration) {
        self.key_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Sets the upper bound for the additional random inter-report delay.
    pub fn set_key_delay_jitter(&self, jitter: Duration) {
        self.key_delay_jitter_ms
            .store(jitter.as_millis() as u64, Ordering::Relaxed);
    }

    /// Sleeps `key_delay + uniform(0, key_delay_jitter)`.
    async fn inter_key_pause(&self) {
        let base = self.key_delay_ms.load(Ordering::Relaxed);
        let jitter = self.key_delay_jitter_ms.load(Ordering::Relaxed);
        let mut total = base;
        if jitter > 0 {
            total += fastrand::u64(0..=jitter);
        }
        if total > 0 {
            tokio::time::sleep(Duration::from_millis(total)).await;
        }
    }

    /// Writes one mapped sequence plus the trailing neutral release as
    /// an atomic critical section.
    async fn write_sequence(&self, reports: &[KeyboardOutReport]) -> Result<(), DeviceError> {
        let _guard = self.sequence_lock.lock().await;
        for report in reports {
            self.port.write_report(&report.as_bytes()).await?;
            self.inter_key_pause().await;
        }
        self.port
            .write_report(&KeyboardOutReport::NEUTRAL.as_bytes())
            .await
    }

    /// Types `s` using the active language map.
    ///
    /// Symbols are the string's characters (a multi-byte character is
    /// one symbol). Unmapped symbols are skipped and the remainder is
    /// still typed; after the string is done they are returned together
    /// as [`KeyboardError::UnmappedSymbols`].
    ///
    /// # Errors
    ///
    /// - [`KeyboardError::Map`] if no language map is active (nothing
    ///   is written).
    /// - [`KeyboardError::Device`] aborts the call at the failing frame.
    /// - [`KeyboardError::UnmappedSymbols`] after best-effort typing.
    pub async fn type_string(&self, s: &str) -> Result<(), KeyboardError> {
        let mut unmapped: Vec<char> = Vec::new();

        for symbol in s.chars() {
            // Clone the sequence out so the store lock is not held
            // across device writes and sleeps.
            let reports: Option<Vec<KeyboardOutReport>> = {
                let store = self.maps.read().await;
                store
                    .active()?
                    .reports_for(&symbol.to_string())
                    .map(|r| r.to_vec())
            };

            match reports {
                Some(reports) => {
                    trace!(?symbol, frames = reports.len(), "typing symbol");
                    self.write_sequence(&reports).await?;
                }
                None => {
                    debug!(?symbol, "symbol not in active language map, skipping");
                    unmapped.push(symbol);
                }
            }
        }

        if unmapped.is_empty() {
            Ok(())
        } else {
            Err(KeyboardError::UnmappedSymbols(unmapped))
        }
    }

    /// Parses a combo string and presses it as one chord.
    ///
    /// # Errors
    ///
    /// Returns [`KeyboardError::Combo`] on any unknown token; the whole
    /// combo fails atomically and nothing is written to the device.
    pub async fn press_key_combo(&self, combo: &str) -> Result<(), KeyboardError> {
        let chord = parse_combo(combo)?;
        debug!(combo, "pressing key combo");
        self.write_sequence(std::slice::from_ref(&chord)).await?;
        Ok(())
    }

    /// Names of all loaded language maps, in load order.
    pub async fn list_language_map_names(&self) -> Vec<String> {
        self.maps.read().await.names()
    }

    /// Switches the active language map.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::NotFound`] (as [`KeyboardError::Map`]) for an
    /// unknown name; the previous active map stays in effect.
    pub async fn set_active_language_map(&self, name: &str) -> Result<(), KeyboardError> {
        self.maps.write().await.set_active(name)?;
        debug!(name, "active language map switched");
        Ok(())
    }

    /// Name of the active language map, if one is set.
    pub async fn active_language_map_name(&self) -> Option<String> {
        self.maps.read().await.active().ok().map(|m| m.name.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::RecordingPort;
    use kbdgadget_core::keycodes::{KEY_DELETE, KEY_TAB, MOD_LEFT_ALT, MOD_LEFT_CTRL, MOD_LEFT_SHIFT};
    use kbdgadget_core::langmap::builtin;

    fn neutral_frame() -> [u8; 8] {
        KeyboardOutReport::NEUTRAL.as_bytes()
    }

    fn make_keyboard() -> (KeyboardController, Arc<RecordingPort>) {
        let (port, _led_tx) = RecordingPort::new();
        let port = Arc::new(port);
        let mut store = MapStore::new();
        store.insert(builtin::us_ascii());
        let keyboard = KeyboardController::new(
            Arc::clone(&port) as Arc<dyn DevicePort>,
            Arc::new(RwLock::new(store)),
        );
        (keyboard, port)
    }

    // ── type_string ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_type_string_emits_mapped_sequence_then_neutral_per_symbol() {
        // Arrange
        let (keyboard, port) = make_keyboard();

        // Act
        keyboard.type_string("ab").await.unwrap();

        // Assert – each symbol: one press frame, one neutral frame
        let frames = port.written();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0][2], kbdgadget_core::keycodes::KEY_A);
        assert_eq!(frames[1], neutral_frame());
        assert_eq!(frames[2][2], kbdgadget_core::keycodes::KEY_B);
        assert_eq!(frames[3], neutral_frame());
    }

    #[tokio::test]
    async fn test_type_string_uppercase_carries_shift_modifier() {
        let (keyboard, port) = make_keyboard();

        keyboard.type_string("A").await.unwrap();

        let frames = port.written();
        assert_eq!(frames[0][0], MOD_LEFT_SHIFT);
        assert_eq!(frames[0][2], kbdgadget_core::keycodes::KEY_A);
    }

    #[tokio::test]
    async fn test_type_string_skips_unmapped_symbols_and_reports_them() {
        // Arrange – 'ü' is not in the US map
        let (keyboard, port) = make_keyboard();

        // Act
        let result = keyboard.type_string("aüb").await;

        // Assert – both mapped symbols were still typed
        match result {
            Err(KeyboardError::UnmappedSymbols(symbols)) => assert_eq!(symbols, vec!['ü']),
            other => panic!("expected UnmappedSymbols, got {other:?}"),
        }
        assert_eq!(port.written().len(), 4); // a + neutral, b + neutral
    }

    #[tokio::test]
    async fn test_type_string_with_no_active_map_writes_nothing() {
        let (port, _led_tx) = RecordingPort::new();
        let port = Arc::new(port);
        let keyboard = KeyboardController::new(
            Arc::clone(&port) as Arc<dyn DevicePort>,
            Arc::new(RwLock::new(MapStore::new())),
        );

        let result = keyboard.type_string("a").await;

        assert!(matches!(
            result,
            Err(KeyboardError::Map(MapError::NoActiveMap))
        ));
        assert!(port.written().is_empty());
    }

    #[tokio::test]
    async fn test_type_string_aborts_on_device_failure() {
        let (keyboard, port) = make_keyboard();
        port.fail_writes.store(true, Ordering::Relaxed);

        let result = keyboard.type_string("abc").await;

        assert!(matches!(result, Err(KeyboardError::Device(_))));
        assert!(port.written().is_empty());
    }

    // ── press_key_combo ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_press_combo_writes_chord_then_neutral() {
        // Arrange
        let (keyboard, port) = make_keyboard();

        // Act
        keyboard.press_key_combo("CTRL ALT DELETE").await.unwrap();

        // Assert
        let frames = port.written();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], MOD_LEFT_CTRL | MOD_LEFT_ALT);
        assert_eq!(frames[0][2], KEY_DELETE);
        assert_eq!(frames[1], neutral_frame());
    }

    #[tokio::test]
    async fn test_press_combo_with_unknown_token_writes_nothing() {
        let (keyboard, port) = make_keyboard();

        let result = keyboard.press_key_combo("ALT NOSUCHKEY").await;

        assert!(matches!(
            result,
            Err(KeyboardError::Combo(ComboError::UnknownToken(_)))
        ));
        assert!(port.written().is_empty(), "atomic failure must not press anything");
    }

    #[tokio::test]
    async fn test_press_combo_alt_tabulator_alias() {
        let (keyboard, port) = make_keyboard();

        keyboard.press_key_combo("ALT TABULATOR").await.unwrap();

        let frames = port.written();
        assert_eq!(frames[0][0], MOD_LEFT_ALT);
        assert_eq!(frames[0][2], KEY_TAB);
    }

    // ── Map pass-throughs ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_set_active_language_map_unknown_name_keeps_previous() {
        let (keyboard, _port) = make_keyboard();

        let result = keyboard.set_active_language_map("KLINGON").await;

        assert!(matches!(
            result,
            Err(KeyboardError::Map(MapError::NotFound(_)))
        ));
        assert_eq!(keyboard.active_language_map_name().await.as_deref(), Some("US"));
    }

    #[tokio::test]
    async fn test_list_language_map_names_reflects_store() {
        let (keyboard, _port) = make_keyboard();
        assert_eq!(keyboard.list_language_map_names().await, vec!["US"]);
    }
}
