//! Static mapping from human-readable button names to engine button codes.
//!
//! Codes follow virtual-key numbering: letters and digits map to their ASCII
//! value, the remaining keys use their VK constants.

/// Named keys that are not plain letters or digits.
const NAMED_BUTTONS: &[(&str, u8)] = &[
    ("UP", 0x26),
    ("DOWN", 0x28),
    ("LEFT", 0x25),
    ("RIGHT", 0x27),
    ("SHIFT", 0x10),
    ("CTRL", 0x11),
    ("SPACE", 0x20),
    ("TAB", 0x09),
    ("ENTER", 0x0D),
    ("MOUSE_LEFT", 0x01),
    ("MOUSE_RIGHT", 0x02),
    ("MOUSE_MIDDLE", 0x04),
];

/// Looks up the code for a button name. Matching is case-insensitive; names
/// outside the table yield `None`.
pub fn button_code(name: &str) -> Option<u8> {
    let upper = name.to_ascii_uppercase();
    let mut chars = upper.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_uppercase() || ch.is_ascii_digit() {
            return Some(ch as u8);
        }
    }
    NAMED_BUTTONS
        .iter()
        .find(|(named, _)| *named == upper)
        .map(|(_, code)| *code)
}

/// Maps a list of names to their codes, silently dropping unknown names.
pub fn button_codes<I, S>(names: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| button_code(name.as_ref()))
        .collect()
}
