//! Topic and subscription naming rules.

const TOPIC_LENGTH: std::ops::RangeInclusive<usize> = 3..=63;
const SUBSCRIPTION_LENGTH: std::ops::RangeInclusive<usize> = 1..=50;

fn is_valid(name: &str, length: std::ops::RangeInclusive<usize>) -> bool {
    length.contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

/// Returns true if `name` can be used as a topic name.
pub fn is_valid_topic_name(name: &str) -> bool {
    is_valid(name, TOPIC_LENGTH)
}

/// Returns true if `name` can be used as a subscription name.
pub fn is_valid_subscription_name(name: &str) -> bool {
    is_valid(name, SUBSCRIPTION_LENGTH)
}

/// # Panics
///
/// Panics if the topic name is invalid.
pub fn require_topic_name(name: &str) {
    assert!(
        is_valid_topic_name(name),
        "invalid topic name {name:?}: use 3-63 lowercase letters, digits, '-', '_' or '.'"
    );
}

/// # Panics
///
/// Panics if the subscription name is invalid.
pub fn require_subscription_name(name: &str) {
    assert!(
        is_valid_subscription_name(name),
        "invalid subscription name {name:?}: use 1-50 lowercase letters, digits, '-', '_' or '.'"
    );
}
