//! Filing and action date parsing.

use chrono::NaiveDate;

/// Parse a date from the forms bulk and API sources use.
///
/// Accepted: `YYYYMMDD` ("20240517"), ISO `YYYY-MM-DD`, and an ISO timestamp
/// whose first ten characters are an ISO date ("2024-05-17T00:00:00Z").
/// Anything else, including impossible calendar dates, is `None`; callers
/// treat that as a malformed record rather than defaulting.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let bytes = s.as_bytes();

    if bytes.len() == 8 && bytes.iter().all(u8::is_ascii_digit) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }

    let iso = match bytes.len() {
        10 => s,
        n if n > 10 && matches!(bytes[10], b'T' | b't' | b' ') => s.get(..10)?,
        _ => return None,
    };
    NaiveDate::parse_from_str(iso, "%Y-%m-%d").ok()
}
