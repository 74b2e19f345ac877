//! Channel and storage key naming scoped to one addon configuration.

/// Prefix shared by every cross-tab channel name.
pub const CHANNEL_PREFIX: &str = "submaker-stream";

/// Deterministic short hash of an addon configuration string.
///
/// 31-multiplier rolling hash over UTF-16 code units, rendered in base 36.
/// Tabs with different configurations land on different channels.
#[must_use]
pub fn config_hash(config: &str) -> String {
    let mut hash: i32 = 0;
    for unit in config.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Names of every shared resource used by one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    /// Broadcast channel name.
    pub channel: String,
    /// Shared-store key holding the owner lease.
    pub owner_key: String,
    /// Shared-store key used for the storage-event fallback.
    pub event_key: String,
}

impl ChannelNames {
    /// Derive the names for a configuration string.
    #[must_use]
    pub fn for_config(config: &str) -> Self {
        let channel = format!("{CHANNEL_PREFIX}-{}", config_hash(config));
        Self {
            owner_key: format!("{channel}-owner"),
            event_key: format!("{channel}-evt"),
            channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_config_scoped() {
        assert_eq!(config_hash("abc"), config_hash("abc"));
        assert_ne!(config_hash("abc"), config_hash("abd"));
        assert_eq!(config_hash(""), "0");
    }

    #[test]
    fn hash_matches_known_value() {
        // "abc" -> 96354 -> "22ci" in base 36
        assert_eq!(config_hash("abc"), "22ci");
    }

    #[test]
    fn names_share_the_channel_prefix() {
        let names = ChannelNames::for_config("cfg");
        assert!(names.channel.starts_with(CHANNEL_PREFIX));
        assert_eq!(names.event_key, format!("{}-evt", names.channel));
        assert_eq!(names.owner_key, format!("{}-owner", names.channel));
    }
}
