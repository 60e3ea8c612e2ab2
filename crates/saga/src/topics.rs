//! Topic and key names shared by every service on the bus.

pub const PLAYER_TOPIC: &str = "player";
pub const INVENTORY_TOPIC: &str = "inventory";
pub const PAYMENT_TOPIC: &str = "payment";

pub const KEY_BUY: &str = "buy";
pub const KEY_SELL: &str = "sell";
pub const KEY_ROLLBACK_TRANSACTION: &str = "rtransaction";
pub const KEY_ROLLBACK_GRANT: &str = "radd";
pub const KEY_ROLLBACK_REVOKE: &str = "rremove";

/// Service names under which offset cursors are stored.
pub const PLAYER_SERVICE: &str = "player";
pub const INVENTORY_SERVICE: &str = "inventory";
pub const PAYMENT_SERVICE: &str = "payment";

/// Suffix appended to a topic to name its dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = "dlq";

/// Dead-letter topic for `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}.{DEAD_LETTER_SUFFIX}")
}
