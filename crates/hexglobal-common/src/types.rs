//! Protocol constants and small helpers for HexGlobal.

/// Path of the single WebSocket endpoint served by the hub.
pub const WS_PATH: &str = "/ws";

/// Listen port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

/// Country label used by clients that cannot resolve their location.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Country code used by clients that cannot resolve their location.
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

/// Shown in place of a flag when the country code is not two ASCII letters.
pub const GLOBE: &str = "\u{1F30D}";

const REGIONAL_INDICATOR_A: u32 = 0x1F1E6;

/// Render a two-letter ISO 3166 country code as its flag emoji.
///
/// ```
/// use hexglobal_common::types::country_flag;
/// assert_eq!(country_flag("fr"), "\u{1F1EB}\u{1F1F7}");
/// assert_eq!(country_flag("France"), "\u{1F30D}");
/// ```
#[must_use]
pub fn country_flag(code: &str) -> String {
    let bytes = code.as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_alphabetic) {
        return GLOBE.to_string();
    }
    bytes
        .iter()
        .filter_map(|b| {
            let offset = u32::from(b.to_ascii_uppercase() - b'A');
            char::from_u32(REGIONAL_INDICATOR_A + offset)
        })
        .collect()
}
