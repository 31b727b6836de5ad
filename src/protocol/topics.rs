//! MQTT topic filter matching
//!
//! The configured topic may be a filter with `+` and `#` wildcards; inbound
//! publishes are only decoded when their topic matches it.

/// Check whether a concrete topic name matches a subscription filter
pub fn topic_matches_filter(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    // Topics starting with '$' are not matched by leading wildcards
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
