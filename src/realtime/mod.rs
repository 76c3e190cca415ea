//! Real-time Fan-out (§4.7): persistent bidirectional channels per
//! `(vault, device_id)` relaying CRDT updates between connected clients.

pub mod channel;
pub mod fanout;
pub mod types;

pub use channel::{Channel, ChannelTable, OpenedChannel};
pub use fanout::{Applier, handle_inbound};
pub use types::{ChannelMessage, MessageType};

/// A channel is closed if the server has not heard from it in this many
/// seconds (§4.7 "Heartbeat").
pub const STALE_AFTER_SECS: i64 = 60;
/// How often the heartbeat sweep runs (§4.7).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
