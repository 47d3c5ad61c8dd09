use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ClientMessage, Conversation, IncomingEvent, IncomingMessage, NewMessage, StoredMessage, Topic,
};
use crate::topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Connected,
    Disconnected,
}

/// System message published when a conversation topic changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: String,
    pub date: DateTime<Utc>,
    pub channel: Uuid,
    pub user: Uuid,
    pub topic: Topic,
    pub text: String,
}

impl TopicUpdate {
    pub fn new(channel: Uuid, topic: Topic) -> Self {
        Self {
            kind: "text".to_string(),
            subtype: topics::TOPIC_SUBTYPE.to_string(),
            date: Utc::now(),
            channel,
            user: topic.creator,
            text: format!("set the channel topic: {}", topic.value),
            topic,
        }
    }
}

/// Events carried by the cluster-wide bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClusterEvent {
    /// A client message as stamped by the gateway, before authorization and
    /// persistence. Fan-out never delivers these.
    Submitted(IncomingEvent),

    /// The canonical stored message, published by the ingestion pipeline.
    MessageReceived {
        room: Option<String>,
        message: StoredMessage,
    },

    ChannelCreated(Conversation),

    TopicUpdated(TopicUpdate),

    UserState { user_id: Uuid, state: UserState },

    UserMention {
        room: Option<String>,
        message: NewMessage,
        #[serde(rename = "for")]
        for_user: Uuid,
    },

    UserTyping(IncomingEvent),
}

impl ClusterEvent {
    /// Topic this event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Submitted(_) | Self::MessageReceived { .. } => topics::MESSAGE_RECEIVED,
            Self::ChannelCreated(_) => topics::CHANNEL_CREATION,
            Self::TopicUpdated(_) => topics::TOPIC_UPDATED,
            Self::UserState { .. } => topics::USER_STATE,
            Self::UserMention { .. } => topics::USERS_MENTION,
            Self::UserTyping(_) => topics::USER_TYPING,
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, namespace: String },

    /// A stored message
    Message {
        room: Option<String>,
        message: StoredMessage,
    },

    /// A member is typing in a conversation
    UserTyping {
        room: Option<String>,
        message: IncomingMessage,
    },

    /// A user connected or disconnected
    UserState { user_id: Uuid, state: UserState },

    /// A conversation was created
    ChannelCreation(Conversation),

    /// A conversation topic changed
    TopicUpdated(TopicUpdate),

    /// The receiving user was mentioned
    UserMention {
        room: Option<String>,
        message: NewMessage,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start listening on a room
    Subscribe { room: String },

    /// Stop listening on a room
    Unsubscribe { room: String },

    /// Post a message into a subscribed room
    Message { room: String, message: ClientMessage },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_and_stored_share_the_message_topic() {
        let now = Utc::now();
        let stored = StoredMessage {
            id: Uuid::new_v4(),
            kind: "text".into(),
            subtype: None,
            channel: Uuid::new_v4(),
            creator: Uuid::new_v4(),
            text: "hi".into(),
            date: now,
            attachments: vec![],
            created_at: now,
        };
        let event = ClusterEvent::MessageReceived {
            room: None,
            message: stored,
        };
        assert_eq!(event.topic(), topics::MESSAGE_RECEIVED);
    }

    #[test]
    fn message_command_parses_with_extra_fields() {
        let channel = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"Message","data":{{"room":"general","message":{{"type":"text","channel":"{}","text":"hi","color":"red"}}}}}}"#,
            channel
        );
        let cmd: GatewayCommand = serde_json::from_str(&raw).unwrap();
        match cmd {
            GatewayCommand::Message { room, message } => {
                assert_eq!(room, "general");
                assert_eq!(message.channel, channel);
                assert_eq!(message.extra.get("color"), Some(&serde_json::json!("red")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn normalized_strips_unknown_fields() {
        let creator = Uuid::new_v4();
        let raw = serde_json::json!({
            "type": "text",
            "channel": Uuid::new_v4(),
            "text": "hello",
            "attachments": ["a", "b"],
            "user_mentions": [Uuid::new_v4()],
            "injected": true,
        });
        let client: ClientMessage = serde_json::from_value(raw).unwrap();
        let incoming = client.stamp(creator, Utc::now());
        let normalized = serde_json::to_value(incoming.normalized()).unwrap();

        let keys: Vec<&str> = normalized
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert!(!keys.contains(&"injected"));
        assert!(!keys.contains(&"user_mentions"));
        assert_eq!(normalized["creator"], serde_json::json!(creator));
        assert_eq!(normalized["attachments"], serde_json::json!(["a", "b"]));
    }
}
