//! Coordination-store key layout. Every key embeds the user id so operations
//! on different users never touch the same record.

const PREFIX: &str = "scout";

/// Existence of this key means the user's agents are paused.
pub fn pause_flag(user_id: &str) -> String {
    format!("{PREFIX}:brake:pause:{user_id}")
}

/// Hash holding the user's brake state record.
pub fn brake_state(user_id: &str) -> String {
    format!("{PREFIX}:brake:state:{user_id}")
}

/// Pub/sub channel for the user's real-time notifications.
pub fn events_channel(user_id: &str) -> String {
    format!("{PREFIX}:events:{user_id}")
}

/// Cached shared agent context.
pub fn shared_context(user_id: &str) -> String {
    format!("{PREFIX}:context:{user_id}")
}
