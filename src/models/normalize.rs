use chrono::{NaiveDate, NaiveDateTime, Utc};
use md5::{Digest, Md5};

/// Placeholder for players whose name is empty after sanitization.
pub const NULL_NAME: &str = "<NULL>";

/// Earliest plausible play time of a record (the title's release date).
pub fn earliest_game_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1999, 3, 30)
        .expect("static date")
        .and_hms_opt(0, 0, 0)
        .expect("static time")
}

/// Strip unprintable ASCII from a player name and trim whitespace.
///
/// Code points at or above 0x80 pass through untouched, so non-Latin names
/// survive. An empty result becomes [`NULL_NAME`].
pub fn sanitize_player_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| (*c as u32) >= 0x80 || c.is_ascii_graphic() || c.is_ascii_whitespace())
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        NULL_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercase hex md5 of a sanitized player name, the stable cross-game key.
pub fn name_hash(sanitized: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(sanitized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Clamp a derived play time into [release date, now]; out-of-range values
/// are untrustworthy file metadata and collapse to now.
pub fn clamp_game_time(t: NaiveDateTime) -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    if t < earliest_game_time() || t > now { now } else { t }
}

/// ISO-8601 stamp carried by every read-API response body.
pub fn generated_at() -> String {
    Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// True for the canonical 32-hex game identifier.
pub fn is_guid(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn sanitize_keeps_high_codepoints() {
        assert_eq!(sanitize_player_name("  木村_Player\u{1}  "), "木村_Player");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_player_name("\u{7f}ok \u{90}名前 ");
        assert_eq!(sanitize_player_name(&once), once);
    }

    #[test]
    fn empty_name_becomes_null_marker() {
        assert_eq!(sanitize_player_name(" \u{3} "), NULL_NAME);
        assert_eq!(name_hash(NULL_NAME), "3a7ac8a2092fc743e423336f473c7dac");
    }

    #[test]
    fn game_time_outside_range_collapses_to_now() {
        let stone_age = NaiveDate::from_ymd_opt(1997, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let clamped = clamp_game_time(stone_age);
        assert!(clamped > earliest_game_time());

        let future = Utc::now().naive_utc() + chrono::Duration::days(365);
        assert!(clamp_game_time(future) < future);
    }

    #[test]
    fn in_range_game_time_is_preserved() {
        let t = NaiveDate::from_ymd_opt(2021, 5, 4).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(clamp_game_time(t), t);
    }

    #[test]
    fn guid_check() {
        assert!(is_guid("0123456789abcdef0123456789abcdef"));
        assert!(!is_guid("0123456789abcdef0123456789abcde"));
        assert!(!is_guid("0123456789abcdef0123456789abcdeZ"));
    }
}
