//! Twitch PubSub websocket protocol client implement

pub(crate) mod client;
mod event;
pub mod message;

pub use client::{
    ConnectionClosed, ConnectionState, Connector, DispatchError, DispatchFailure, Observers,
    TransportError, WebsocketConnector,
};
pub use event::{Event, EventKind};
