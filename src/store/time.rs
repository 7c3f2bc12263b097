use chrono::{SecondsFormat, Utc};

/// UTC timestamp truncated to whole seconds, formatted as ISO-8601 with a
/// literal `Z` suffix rather than `+00:00`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_a_z_suffixed_timestamp() {
        let stamp = now_iso();
        assert!(stamp.ends_with('Z'));
        assert!(stamp.contains('T'));
    }
}
