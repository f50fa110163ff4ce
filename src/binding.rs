//! Channel id to realtime binding translation.
//!
//! The event bus reserves `-` and `_`, so channel ids are rewritten before
//! they are used as subscription routes.

/// Translate a channel id into a binding: `-` becomes `.`, `_` becomes `#`.
///
/// Every other character is kept as is, so the output never contains `-` or
/// `_` and translating it again is a no-op.
pub fn to_binding(channel_id: &str) -> String {
    channel_id
        .chars()
        .map(|c| match c {
            '-' => '.',
            '_' => '#',
            other => other,
        })
        .collect()
}

/// Full route for a channel: the configured prefix followed by its binding.
pub fn realtime_binding(prefix: &str, channel_id: &str) -> String {
    format!("{prefix}{}", to_binding(channel_id))
}
