//! Durable key names.
//!
//! Two independent records are kept so that a corrupted chat history never
//! takes the user's settings down with it, and vice versa.

/// Session and model state.
pub const CHAT: &str = "chat-store";

/// User settings.
pub const SETTINGS: &str = "settings-store";

/// Scratch key written and removed again to test remaining capacity.
pub const CAPACITY_CHECK: &str = "storage-test";

/// Keys owned by the application, in the order they are validated.
#[must_use]
pub const fn app_keys() -> [&'static str; 2] {
    [CHAT, SETTINGS]
}

/// Bytes a single entry counts against the quota.
#[must_use]
pub fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_key_is_not_an_app_key() {
        assert!(!app_keys().contains(&CAPACITY_CHECK));
    }

    #[test]
    fn entry_size_counts_key_and_value() {
        assert_eq!(entry_size("chat-store", "{}"), 12);
    }
}
