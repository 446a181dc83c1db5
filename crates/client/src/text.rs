//! Repair of double-encoded text from the backend.
//!
//! Some restaurant and package names arrive with UTF-8 bytes that were
//! decoded as Windows-1252 and re-encoded ("Ã¼" instead of "ü", "ÅŸ" instead
//! of "ş"). The repair maps every character back to its single-byte value and
//! re-decodes; text is only replaced when that yields valid UTF-8.

use std::borrow::Cow;

/// Windows-1252 characters in the 0x80..=0x9F range and their byte values.
const CP1252_HIGH: &[(char, u8)] = &[
    ('€', 0x80),
    ('‚', 0x82),
    ('ƒ', 0x83),
    ('„', 0x84),
    ('…', 0x85),
    ('†', 0x86),
    ('‡', 0x87),
    ('ˆ', 0x88),
    ('‰', 0x89),
    ('Š', 0x8A),
    ('‹', 0x8B),
    ('Œ', 0x8C),
    ('Ž', 0x8E),
    ('‘', 0x91),
    ('’', 0x92),
    ('“', 0x93),
    ('”', 0x94),
    ('•', 0x95),
    ('–', 0x96),
    ('—', 0x97),
    ('˜', 0x98),
    ('™', 0x99),
    ('š', 0x9A),
    ('›', 0x9B),
    ('œ', 0x9C),
    ('ž', 0x9E),
    ('Ÿ', 0x9F),
];

fn cp1252_byte(c: char) -> Option<u8> {
    if let Ok(byte) = u8::try_from(u32::from(c)) {
        return Some(byte);
    }
    CP1252_HIGH
        .iter()
        .find_map(|&(ch, byte)| (ch == c).then_some(byte))
}

/// Undo one round of UTF-8-as-Windows-1252 mis-decoding.
///
/// Returns the input unchanged when it is plain ASCII, contains characters
/// outside Windows-1252, or does not re-decode as UTF-8.
#[must_use]
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }

    let Some(bytes) = text.chars().map(cp1252_byte).collect::<Option<Vec<u8>>>() else {
        return Cow::Borrowed(text);
    };

    match String::from_utf8(bytes) {
        Ok(repaired) if repaired != text => Cow::Owned(repaired),
        _ => Cow::Borrowed(text),
    }
}
