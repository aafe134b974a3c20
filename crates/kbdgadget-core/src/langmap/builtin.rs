//! Built-in US-layout language map.
//!
//! Generated rather than shipped as a fixture so the demo binary and the
//! test suites always have a complete printable-ASCII layout available,
//! even before any map documents exist on disk.

use std::collections::HashMap;

use crate::keycodes::*;
use crate::langmap::LanguageMap;
use crate::report::KeyboardOutReport;

/// Symbol table for the US layout: (character, keycode, shifted).
const US_TABLE: &[(char, u8, bool)] = &[
    (' ', KEY_SPACE, false),
    ('!', KEY_1, true),
    ('"', KEY_APOSTROPHE, true),
    ('#', KEY_3, true),
    ('$', KEY_4, true),
    ('%', KEY_5, true),
    ('&', KEY_7, true),
    ('\'', KEY_APOSTROPHE, false),
    ('(', KEY_9, true),
    (')', KEY_0, true),
    ('*', KEY_8, true),
    ('+', KEY_EQUAL, true),
    (',', KEY_COMMA, false),
    ('-', KEY_MINUS, false),
    ('.', KEY_DOT, false),
    ('/', KEY_SLASH, false),
    (':', KEY_SEMICOLON, true),
    (';', KEY_SEMICOLON, false),
    ('<', KEY_COMMA, true),
    ('=', KEY_EQUAL, false),
    ('>', KEY_DOT, true),
    ('?', KEY_SLASH, true),
    ('@', KEY_2, true),
    ('[', KEY_LEFT_BRACE, false),
    ('\\', KEY_BACKSLASH, false),
    (']', KEY_RIGHT_BRACE, false),
    ('^', KEY_6, true),
    ('_', KEY_MINUS, true),
    ('`', KEY_GRAVE, false),
    ('{', KEY_LEFT_BRACE, true),
    ('|', KEY_BACKSLASH, true),
    ('}', KEY_RIGHT_BRACE, true),
    ('~', KEY_GRAVE, true),
    ('\n', KEY_ENTER, false),
    ('\t', KEY_TAB, false),
];

/// Builds the built-in US-layout map covering printable ASCII plus
/// newline and tab.
pub fn us_ascii() -> LanguageMap {
    let mut mapping = HashMap::new();

    let mut add = |symbol: char, keycode: u8, shifted: bool| {
        let modifiers = if shifted { MOD_LEFT_SHIFT } else { 0 };
        // Keycode values here are always in range, new() cannot fail.
        let report = KeyboardOutReport {
            modifiers,
            keys: [keycode, 0, 0, 0, 0, 0],
        };
        mapping.insert(symbol.to_string(), vec![report]);
    };

    for c in 'a'..='z' {
        add(c, KEY_A + (c as u8 - b'a'), false);
    }
    for c in 'A'..='Z' {
        add(c, KEY_A + (c as u8 - b'A'), true);
    }
    for c in '1'..='9' {
        add(c, KEY_1 + (c as u8 - b'1'), false);
    }
    add('0', KEY_0, false);
    for &(symbol, keycode, shifted) in US_TABLE {
        add(symbol, keycode, shifted);
    }

    LanguageMap {
        name: "US".to_string(),
        description: "US ASCII to USB keyboard report mapping".to_string(),
        mapping,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
