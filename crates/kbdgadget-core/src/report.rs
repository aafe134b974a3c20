//! The keyboard output report: one atomic "keys currently held" snapshot.
//!
//! A boot-protocol USB keyboard reports its state as an 8-byte frame:
//! one modifier bitmask byte, one reserved byte, and six keycode slots.
//! Six slots means at most six non-modifier keys can be held at once;
//! asking for more fails with [`ReportError::TooManyKeys`] rather than
//! silently dropping keys.
//!
//! Reports are immutable once constructed. A key *press* is expressed as
//! a report carrying the key, and the matching *release* is the all-zero
//! [`KeyboardOutReport::NEUTRAL`] report written afterwards. The
//! controller always terminates a mapped sequence with the neutral
//! report so a device failure mid-sequence can never leave keys stuck
//! down on the host longer than one write.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of simultaneous non-modifier keys in one report.
pub const MAX_KEYS_PER_REPORT: usize = 6;

/// Error type for report construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    /// More keys were requested than the boot protocol frame can carry.
    #[error("chord requests {requested} keys, but a report carries at most {MAX_KEYS_PER_REPORT}")]
    TooManyKeys { requested: usize },
}

/// One keyboard output report: modifier bitmask plus up to six keycodes.
///
/// Unused keycode slots are zero. Slot order is preserved from
/// construction, which keeps equality and the emitted wire frame
/// deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardOutReport {
    /// Modifier bitmask (see [`crate::keycodes`] `MOD_*` constants).
    pub modifiers: u8,
    /// Keycode slots, zero-padded.
    pub keys: [u8; MAX_KEYS_PER_REPORT],
}

impl KeyboardOutReport {
    /// The all-zero report: no modifiers, no keys. Writing it releases
    /// everything currently held.
    pub const NEUTRAL: KeyboardOutReport = KeyboardOutReport {
        modifiers: 0,
        keys: [0; MAX_KEYS_PER_REPORT],
    };

    /// Builds a report from a modifier mask and a slice of keycodes.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::TooManyKeys`] if more than six keycodes are
    /// given.
    pub fn new(modifiers: u8, keycodes: &[u8]) -> Result<Self, ReportError> {
        if keycodes.len() > MAX_KEYS_PER_REPORT {
            return Err(ReportError::TooManyKeys {
                requested: keycodes.len(),
            });
        }
        let mut keys = [0u8; MAX_KEYS_PER_REPORT];
        keys[..keycodes.len()].copy_from_slice(keycodes);
        Ok(Self { modifiers, keys })
    }

    /// Returns `true` for the neutral (all released) report.
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// Encodes the report as the 8-byte gadget wire frame:
    /// modifier byte, reserved byte, six keycode bytes.
    pub fn as_bytes(&self) -> [u8; 8] {
        let mut frame = [0u8; 8];
        frame[0] = self.modifiers;
        // frame[1] is the reserved byte, always zero.
        frame[2..8].copy_from_slice(&self.keys);
        frame
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
