use chrono::Utc;

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for store snapshots/logs).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Log Helpers ==============

/// Max chars of message text included in log lines.
pub const LOG_PREVIEW_LEN: usize = 120;

/// Truncate on a char boundary and mark the cut with `...`.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// Single-line preview of message text for log output.
pub fn log_preview(s: &str) -> String {
    truncate_text(&s.replace('\n', " "), LOG_PREVIEW_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(LOG_PREVIEW_LEN + 10);
        let t = truncate_text(&s, LOG_PREVIEW_LEN);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), LOG_PREVIEW_LEN + 3);
    }

    #[test]
    fn truncate_text_respects_char_boundaries() {
        let t = truncate_text("привет мир", 6);
        assert_eq!(t, "привет...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn preview_is_single_line() {
        assert_eq!(log_preview("a\nb"), "a b");
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let ts = iso_timestamp_utc();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
