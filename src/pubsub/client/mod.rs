pub(crate) mod connection;
pub(crate) mod fanout;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod observer;
mod pinger;
pub(crate) mod runtime;

pub use connection::ConnectionState;
pub use fanout::DispatchError;
pub use observer::{ConnectionClosed, DispatchFailure, Observers};

use futures_util::{Sink, Stream};
use snafu::prelude::*;
use tokio_tungstenite::{self as websocket, tungstenite};
use url::Url;

use crate::pubsub::message::MessageStreamSinkError;

/// Error of the underlying transport
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum TransportError {
    /// open a connection to the endpoint failed
    #[snafu(display("connect pubsub endpoint {url} failed: {source}"))]
    Open {
        /// endpoint url
        url: String,
        /// source error
        source: tungstenite::Error,
    },

    /// write a message to the connection failed
    #[snafu(display("send {type_name} message on connection #{generation} failed: {source}"))]
    Send {
        /// connection generation the message was sent on
        generation: u64,
        /// type name of the message
        type_name: String,
        /// source error
        source: MessageStreamSinkError,
    },

    /// read from the connection failed and the client can not continue
    #[snafu(display("receive message failed: {source}"))]
    Receive {
        /// source error
        source: MessageStreamSinkError,
    },
}

/// Opens websocket connections. The client only talks to the transport through this trait.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// websocket connection type
    type Socket: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
        + Sink<tungstenite::Message, Error = tungstenite::Error>
        + Send
        + Unpin
        + 'static;

    /// open a new connection to url
    async fn connect(&self, url: &Url) -> Result<Self::Socket, tungstenite::Error>;
}

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Default connector, TLS websocket over tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsocketConnector;

#[async_trait::async_trait]
impl Connector for WebsocketConnector {
    type Socket = WebsocketClient;

    async fn connect(&self, url: &Url) -> Result<Self::Socket, tungstenite::Error> {
        log::debug!("Connecting endpoint: {}", url);

        websocket::connect_async(url.as_str())
            .await
            .map(|(client, _)| client)
    }
}
