use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Data field of LISTEN and UNLISTEN messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenData {
    /// topics to (un)subscribe
    pub topics: Vec<String>,
    /// oauth token owning the topics
    pub auth_token: String,
}

/// Data field of MESSAGE messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// topic the message was published on
    pub topic: String,
    /// json encoded inner message
    pub message: String,
}

/// Decoded inner message of a MESSAGE envelope.
///
/// Its `data` field, when present as a string, has already been decoded a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerMessage {
    pub(crate) body: Map<String, Value>,
}

impl InnerMessage {
    /// inner `type` field, e.g. `whisper_received` or `thread`
    pub fn message_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    /// Whisper thread metadata, carries no event
    pub fn is_thread(&self) -> bool {
        self.message_type() == Some("thread")
    }

    /// decoded `data` field
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// whole message as json value, this is what listeners receive
    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}
