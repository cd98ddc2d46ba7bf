//! Twitch PubSub websocket message types.

pub(crate) mod stream;
mod types;

pub use stream::{Inbound, MessageStreamSink, MessageStreamSinkError};
pub use types::{InnerMessage, ListenData, MessageData};

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;

/// Error when parse frame data as message
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ParseMessageError {
    /// data is invalid json
    #[snafu(display("parse json failed: {source:?}"))]
    ParseJSONFailed {
        /// data for decode
        data: Bytes,
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("parsed message is not object: {json}"))]
    MessageNotObject {
        /// json string
        json: String,
    },

    /// data json has no type field
    #[snafu(display("message has no type field: {json}"))]
    NoMessageType {
        /// json string
        json: String,
    },

    /// data json type field is not a string
    #[snafu(display("message has non-string type field: {json}"))]
    MessageTypeNotString {
        /// json string
        json: String,
    },

    /// data json has an unknown type
    #[snafu(display("message has unknown type {t}"))]
    UnknownMessageType {
        /// type name
        t: String,
    },

    /// data json is not valid typed message
    #[snafu(display("parse to {type_name} message failed: {source}"))]
    ParseJSONToTypedMessageFailed {
        /// type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },

    /// MESSAGE envelope data has no usable topic
    #[snafu(display("message data has no topic"))]
    NoTopic,

    /// MESSAGE envelope data has no inner message string
    #[snafu(display("message data has no inner message"))]
    NoMessage,

    /// inner message is invalid json
    #[snafu(display("parse inner message of topic {topic} failed: {source}"))]
    ParseInnerMessageFailed {
        /// topic of the envelope
        topic: String,
        /// source error
        source: serde_json::Error,
    },

    /// inner message json is not an object
    #[snafu(display("inner message of topic {topic} is not object: {json}"))]
    InnerMessageNotObject {
        /// topic of the envelope
        topic: String,
        /// json string
        json: String,
    },
}

/// Envelope type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// client -> server
    Listen,
    /// client -> server
    Unlisten,
    /// client -> server
    Ping,
    /// server -> client
    Pong,
    /// server -> client, client should reconnect
    Reconnect,
    /// server -> client, result of a LISTEN/UNLISTEN
    Response,
    /// server -> client, topic traffic
    Message,
}

impl MessageType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "LISTEN" => Some(Self::Listen),
            "UNLISTEN" => Some(Self::Unlisten),
            "PING" => Some(Self::Ping),
            "PONG" => Some(Self::Pong),
            "RECONNECT" => Some(Self::Reconnect),
            "RESPONSE" => Some(Self::Response),
            "MESSAGE" => Some(Self::Message),
            _ => None,
        }
    }

    /// get type name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listen => "LISTEN",
            Self::Unlisten => "UNLISTEN",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Reconnect => "RECONNECT",
            Self::Response => "RESPONSE",
            Self::Message => "MESSAGE",
        }
    }
}

/// Inbound envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// envelope type
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// payload, shape depends on type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// error code of a RESPONSE, empty on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// nonce of a RESPONSE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// any other top level field, kept as received
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Decode frame data to an envelope
    pub fn decode(buff: Bytes) -> Result<Self, ParseMessageError> {
        let value: Value =
            serde_json::from_slice(&buff).context(error::ParseJSONFailed { data: buff.clone() })?;

        let obj = value.as_object().with_context(|| error::MessageNotObject {
            json: String::from_utf8_lossy(&buff),
        })?;

        let t = obj
            .get("type")
            .with_context(|| error::NoMessageType {
                json: String::from_utf8_lossy(&buff),
            })?
            .as_str()
            .with_context(|| error::MessageTypeNotString {
                json: String::from_utf8_lossy(&buff),
            })?;

        let kind = MessageType::from_name(t).with_context(|| error::UnknownMessageType { t })?;

        serde_json::from_value(value).with_context(|_| error::ParseJSONToTypedMessageFailed {
            type_name: kind.as_str(),
        })
    }

    /// Topic and raw inner message of a MESSAGE envelope
    pub fn message_data(&self) -> Result<MessageData, ParseMessageError> {
        let data = self.data.as_ref().and_then(Value::as_object);

        let topic = data
            .and_then(|d| d.get("topic"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .context(error::NoTopic)?;

        let message = data
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .context(error::NoMessage)?;

        Ok(MessageData {
            topic: topic.to_string(),
            message: message.to_string(),
        })
    }
}

impl MessageData {
    /// Decode the inner message, then decode its string `data` field again.
    ///
    /// A `data` string that is not valid json becomes `null`.
    pub fn decode_inner(&self) -> Result<InnerMessage, ParseMessageError> {
        let value: Value =
            serde_json::from_str(&self.message).context(error::ParseInnerMessageFailed {
                topic: &self.topic,
            })?;

        let mut body = match value {
            Value::Object(body) => body,
            other => {
                return error::InnerMessageNotObject {
                    topic: &self.topic,
                    json: other.to_string(),
                }
                .fail()
            }
        };

        if let Some(Value::String(encoded)) = body.get("data") {
            let decoded = serde_json::from_str(encoded).unwrap_or_else(|e| {
                log::debug!(
                    "Inner data of topic {} is not valid json, use null: {}",
                    self.topic,
                    e
                );
                Value::Null
            });
            body.insert("data".to_string(), decoded);
        }

        Ok(InnerMessage { body })
    }
}

/// Outbound message, client -> server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, EnumAsInner)]
#[serde(tag = "type", content = "data", rename_all = "UPPERCASE")]
pub enum Outbound {
    /// subscribe topics
    Listen(ListenData),
    /// unsubscribe topics
    Unlisten(ListenData),
    /// keep alive
    Ping,
}

impl Outbound {
    /// LISTEN for topics of a token
    pub fn listen(token: &str, topics: &[String]) -> Self {
        Self::Listen(ListenData {
            topics: topics.to_vec(),
            auth_token: token.to_string(),
        })
    }

    /// UNLISTEN for topics of a token
    pub fn unlisten(token: &str, topics: &[String]) -> Self {
        Self::Unlisten(ListenData {
            topics: topics.to_vec(),
            auth_token: token.to_string(),
        })
    }

    /// encode to text frame payload
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// get type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Listen(_) => MessageType::Listen.as_str(),
            Self::Unlisten(_) => MessageType::Unlisten.as_str(),
            Self::Ping => MessageType::Ping.as_str(),
        }
    }
}
