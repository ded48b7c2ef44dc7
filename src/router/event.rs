//! Inbound event type shared by the dispatcher and the router.

use chrono::{DateTime, Utc};

/// One inbound chat event. Constructed per update, never persisted as-is.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: i64,
    pub username: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Display name for attribution in relays and archive rows.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("(без username)")
    }

    /// Arrival time in the store's timestamp format.
    pub fn timestamp_str(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
