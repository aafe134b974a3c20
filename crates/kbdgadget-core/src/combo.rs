//! The combo grammar: whitespace-separated, case-insensitive tokens
//! folded into a single chord report.
//!
//! `"CTRL ALT DELETE"`, `"shift 1"`, `"  WIN "` and `"ALT TABULATOR"`
//! are all valid combos. Modifier tokens accumulate into the modifier
//! bitmask; key tokens occupy keycode slots. Parsing is atomic: a single
//! unknown token fails the whole combo and nothing is pressed.

use thiserror::Error;

use crate::keycodes::*;
use crate::report::{KeyboardOutReport, ReportError};

/// Error type for combo parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComboError {
    /// A token matched neither a modifier alias, a named key, nor a
    /// single printable character.
    #[error("unknown combo token '{0}'")]
    UnknownToken(String),

    /// The combo contained no tokens at all.
    #[error("empty combo string")]
    Empty,

    /// The combo named more keys than one report can carry.
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// What a single recognised token contributes to the chord.
enum TokenValue {
    Modifier(u8),
    Key(u8),
    /// A key that only produces its glyph with shift held (US layout).
    ShiftedKey(u8),
}

/// Resolves one upper-cased token against the fixed name table.
fn resolve_token(token: &str) -> Option<TokenValue> {
    use TokenValue::{Key, Modifier, ShiftedKey};

    let value = match token {
        // Modifier aliases. GUI/WIN/META are synonyms for the same bit.
        "SHIFT" => Modifier(MOD_LEFT_SHIFT),
        "CTRL" | "CONTROL" => Modifier(MOD_LEFT_CTRL),
        "ALT" => Modifier(MOD_LEFT_ALT),
        "ALTGR" => Modifier(MOD_RIGHT_ALT),
        "GUI" | "WIN" | "META" => Modifier(MOD_LEFT_GUI),

        // Named keys.
        "ENTER" | "RETURN" => Key(KEY_ENTER),
        "TAB" | "TABULATOR" => Key(KEY_TAB),
        "ESC" | "ESCAPE" => Key(KEY_ESC),
        "SPACE" => Key(KEY_SPACE),
        "BACKSPACE" => Key(KEY_BACKSPACE),
        "DELETE" | "DEL" => Key(KEY_DELETE),
        "INSERT" => Key(KEY_INSERT),
        "HOME" => Key(KEY_HOME),
        "END" => Key(KEY_END),
        "PAGEUP" => Key(KEY_PAGE_UP),
        "PAGEDOWN" => Key(KEY_PAGE_DOWN),
        "UP" => Key(KEY_UP),
        "DOWN" => Key(KEY_DOWN),
        "LEFT" => Key(KEY_LEFT),
        "RIGHT" => Key(KEY_RIGHT),
        "CAPS" | "CAPSLOCK" => Key(KEY_CAPS_LOCK),
        "NUMLOCK" => Key(KEY_NUM_LOCK),
        "SCROLLLOCK" => Key(KEY_SCROLL_LOCK),
        "PRINT" | "PRINTSCREEN" => Key(KEY_PRINT),
        "PAUSE" => Key(KEY_PAUSE),
        "F1" => Key(KEY_F1),
        "F2" => Key(KEY_F2),
        "F3" => Key(KEY_F3),
        "F4" => Key(KEY_F4),
        "F5" => Key(KEY_F5),
        "F6" => Key(KEY_F6),
        "F7" => Key(KEY_F7),
        "F8" => Key(KEY_F8),
        "F9" => Key(KEY_F9),
        "F10" => Key(KEY_F10),
        "F11" => Key(KEY_F11),
        "F12" => Key(KEY_F12),

        // Single printable characters: letters, digits and punctuation
        // map to their physical US-layout key positions; glyphs that
        // live on a shifted position carry the shift bit.
        _ => {
            let mut chars = token.chars();
            let (first, rest) = (chars.next()?, chars.next());
            if rest.is_some() {
                return None;
            }
            match first {
                'A'..='Z' => Key(KEY_A + (first as u8 - b'A')),
                '1'..='9' => Key(KEY_1 + (first as u8 - b'1')),
                '0' => Key(KEY_0),
                '-' => Key(KEY_MINUS),
                '=' => Key(KEY_EQUAL),
                '[' => Key(KEY_LEFT_BRACE),
                ']' => Key(KEY_RIGHT_BRACE),
                '\\' => Key(KEY_BACKSLASH),
                ';' => Key(KEY_SEMICOLON),
                '\'' => Key(KEY_APOSTROPHE),
                '`' => Key(KEY_GRAVE),
                ',' => Key(KEY_COMMA),
                '.' => Key(KEY_DOT),
                '/' => Key(KEY_SLASH),
                '!' => ShiftedKey(KEY_1),
                '@' => ShiftedKey(KEY_2),
                '#' => ShiftedKey(KEY_3),
                '$' => ShiftedKey(KEY_4),
                '%' => ShiftedKey(KEY_5),
                '^' => ShiftedKey(KEY_6),
                '&' => ShiftedKey(KEY_7),
                '*' => ShiftedKey(KEY_8),
                '(' => ShiftedKey(KEY_9),
                ')' => ShiftedKey(KEY_0),
                '_' => ShiftedKey(KEY_MINUS),
                '+' => ShiftedKey(KEY_EQUAL),
                '{' => ShiftedKey(KEY_LEFT_BRACE),
                '}' => ShiftedKey(KEY_RIGHT_BRACE),
                '|' => ShiftedKey(KEY_BACKSLASH),
                ':' => ShiftedKey(KEY_SEMICOLON),
                '"' => ShiftedKey(KEY_APOSTROPHE),
                '~' => ShiftedKey(KEY_GRAVE),
                '<' => ShiftedKey(KEY_COMMA),
                '>' => ShiftedKey(KEY_DOT),
                '?' => ShiftedKey(KEY_SLASH),
                _ => return None,
            }
        }
    };
    Some(value)
}

/// Parses a combo string into a single chord report.
///
/// Tokens are separated by any amount of whitespace and matched
/// case-insensitively. The resulting chord carries the union of all
/// modifier bits and the union of all named keycodes (duplicates
/// collapse into one slot).
///
/// # Errors
///
/// - [`ComboError::Empty`] if the string holds no tokens.
/// - [`ComboError::UnknownToken`] on the first unrecognised token;
///   nothing is accumulated, the whole combo fails.
/// - [`ComboError::Report`] if more than six distinct keys are named.
pub fn parse_combo(combo: &str) -> Result<KeyboardOutReport, ComboError> {
    let mut modifiers = 0u8;
    let mut keycodes: Vec<u8> = Vec::new();
    let mut saw_token = false;

    for token in combo.split_whitespace() {
        saw_token = true;
        let upper = token.to_uppercase();
        match resolve_token(&upper) {
            Some(TokenValue::Modifier(bit)) => modifiers |= bit,
            Some(TokenValue::Key(code)) => {
                if !keycodes.contains(&code) {
                    keycodes.push(code);
                }
            }
            Some(TokenValue::ShiftedKey(code)) => {
                modifiers |= MOD_LEFT_SHIFT;
                if !keycodes.contains(&code) {
                    keycodes.push(code);
                }
            }
            None => return Err(ComboError::UnknownToken(token.to_string())),
        }
    }

    if !saw_token {
        return Err(ComboError::Empty);
    }

    Ok(KeyboardOutReport::new(modifiers, &keycodes)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
