//! Cluster topic names. Publishers and subscribers must agree on these exactly,
//! so nothing outside this module spells them out.

pub const MESSAGE_RECEIVED: &str = "chat:message:received";
pub const CHANNEL_CREATION: &str = "chat:channel:creation";
pub const TOPIC_UPDATED: &str = "chat:channel:topic_updated";
pub const USER_STATE: &str = "user:state";
pub const USERS_MENTION: &str = "chat:users:mention";
pub const USER_TYPING: &str = "chat:user:typing";

/// Every topic the gateway relays to sockets.
pub const GATEWAY_TOPICS: [&str; 6] = [
    MESSAGE_RECEIVED,
    CHANNEL_CREATION,
    TOPIC_UPDATED,
    USER_STATE,
    USERS_MENTION,
    USER_TYPING,
];

/// Message type of the transient "user is typing" signal.
pub const USER_TYPING_TYPE: &str = "user_typing";

/// Subtype of the system message emitted when a topic changes.
pub const TOPIC_SUBTYPE: &str = "channel:topic";

/// Name of the open channel created when none exists.
pub const DEFAULT_CHANNEL: &str = "general";
