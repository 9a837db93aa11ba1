//! Record identity and clock.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Generate a new record identity.
///
/// UUIDv7 strings are globally unique and sort lexically by creation time,
/// so ordering by `id` approximates insertion order.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_time_sortable() {
        let ids: Vec<String> = (0..64).map(|_| new_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_now_is_rfc3339() {
        let ts = now();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }
}
