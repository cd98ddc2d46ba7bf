use std::{io, pin::Pin, task::Poll};

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::tungstenite::{self as websocket, error::ProtocolError};

use super::{Envelope, Outbound, ParseMessageError};
use crate::pubsub::client::observer::ConnectionClosed;

/// Error when read/write message stream/sink
#[derive(Debug, Snafu)]
#[snafu(module(error), context(suffix(false)))]
pub enum MessageStreamSinkError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: websocket::Error,
    },

    /// received a raw frame with no message payload
    #[snafu(display("received a raw websocket frame"))]
    NotDataFrame,

    /// parse frame to message failed
    #[snafu(display("parse frame to message failed: {source}"))]
    ParseMessageFailed {
        /// source error
        source: ParseMessageError,
    },

    /// encode outbound message failed
    #[snafu(display("encode {type_name} message failed: {source}"))]
    EncodeMessageFailed {
        /// type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

impl MessageStreamSinkError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Websocket { .. } => true,
            Self::NotDataFrame => false,
            Self::ParseMessageFailed { .. } => false,
            Self::EncodeMessageFailed { .. } => false,
        }
    }

    /// Closure detail if this error means the peer went away rather than the transport failing
    pub fn closure(&self) -> Option<ConnectionClosed> {
        let Self::Websocket { source } = self else {
            return None;
        };

        let closed = match source {
            websocket::Error::ConnectionClosed | websocket::Error::AlreadyClosed => true,
            websocket::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
            websocket::Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        };

        closed.then(|| ConnectionClosed {
            code: None,
            reason: source.to_string(),
        })
    }
}

/// Item of the inbound message stream
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum Inbound {
    /// decoded envelope
    Envelope(Envelope),
    /// server closed the connection, or the stream ended
    Closed(ConnectionClosed),
}

/// Twitch PubSub message stream/sink over a websocket connection
#[derive(Debug)]
pub struct MessageStreamSink<S> {
    ws: S,
    ended: bool,
}

impl<S> MessageStreamSink<S> {
    /// Construct a new stream with underlying websocket connection.
    pub fn new(ws: S) -> Self {
        Self { ws, ended: false }
    }
}

fn decode(buffer: Bytes) -> Result<Inbound, MessageStreamSinkError> {
    Envelope::decode(buffer.clone())
        .map(Inbound::Envelope)
        .map_err(|e| {
            log::trace!(
                "Parse failed message data: {}",
                std::str::from_utf8(&buffer).unwrap_or("<not-utf8-binary>")
            );
            e
        })
        .context(error::ParseMessageFailed)
}

impl<S> Stream for MessageStreamSink<S>
where
    S: Stream<Item = Result<websocket::Message, websocket::Error>> + Unpin,
{
    type Item = Result<Inbound, MessageStreamSinkError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if self.ended {
            return Poll::Ready(None);
        }

        loop {
            let frame = match self.ws.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    // report the end once as a closure, then finish
                    self.ended = true;
                    return Poll::Ready(Some(Ok(Inbound::Closed(ConnectionClosed {
                        code: None,
                        reason: "websocket stream ended".to_string(),
                    }))));
                }
                Poll::Ready(Some(frame)) => frame,
            };

            let result = match frame {
                Ok(websocket::Message::Text(text)) => decode(Bytes::from(text)),
                Ok(websocket::Message::Binary(data)) => decode(Bytes::from(data)),
                Ok(websocket::Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    Ok(Inbound::Closed(ConnectionClosed { code, reason }))
                }
                Ok(websocket::Message::Ping(_) | websocket::Message::Pong(_)) => {
                    log::trace!("Skip websocket control frame");
                    continue;
                }
                Ok(_) => error::NotDataFrame.fail(),
                Err(source) => Err(source).context(error::Websocket),
            };

            return Poll::Ready(Some(result));
        }
    }
}

impl<S> Sink<Outbound> for MessageStreamSink<S>
where
    S: Sink<websocket::Message, Error = websocket::Error> + Unpin,
{
    type Error = MessageStreamSinkError;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn start_send(mut self: Pin<&mut Self>, item: Outbound) -> Result<(), Self::Error> {
        let text = item.encode().context(error::EncodeMessageFailed {
            type_name: item.type_name(),
        })?;

        self.ws
            .start_send_unpin(websocket::Message::Text(text))
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }
}

#[cfg(test)]
mod test {
    use futures_util::{stream, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    };

    use super::*;

    fn socket(
        frames: Vec<Result<Message, websocket::Error>>,
    ) -> MessageStreamSink<impl Stream<Item = Result<Message, websocket::Error>> + Unpin> {
        MessageStreamSink::new(stream::iter(frames))
    }

    #[tokio::test]
    async fn test_stream_decode_text_frame() {
        let mut s = socket(vec![Ok(Message::Text(
            json!({"type": "PONG"}).to_string(),
        ))]);

        let envelope = s.next().await.unwrap().unwrap().into_envelope().unwrap();
        assert_eq!(envelope.kind, crate::pubsub::message::MessageType::Pong);
    }

    #[tokio::test]
    async fn test_stream_skips_ping_pong() {
        let mut s = socket(vec![
            Ok(Message::Ping(vec![1])),
            Ok(Message::Pong(vec![2])),
            Ok(Message::Text(json!({"type": "RECONNECT"}).to_string())),
        ]);

        let envelope = s.next().await.unwrap().unwrap().into_envelope().unwrap();
        assert_eq!(envelope.kind, crate::pubsub::message::MessageType::Reconnect);
    }

    #[tokio::test]
    async fn test_stream_parse_error_not_fatal() {
        let mut s = socket(vec![Ok(Message::Text("{".to_string()))]);

        let err = s.next().await.unwrap().unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.closure().is_none());
    }

    #[tokio::test]
    async fn test_stream_close_frame_is_closure() {
        let mut s = socket(vec![Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        })))]);

        let closed = s.next().await.unwrap().unwrap().into_closed().unwrap();
        assert_eq!(closed.code, Some(1001));
        assert_eq!(closed.reason, "bye");
    }

    #[tokio::test]
    async fn test_stream_end_reported_once() {
        let mut s = socket(vec![]);

        assert!(matches!(s.next().await, Some(Ok(Inbound::Closed(_)))));
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_reset_is_closure() {
        let mut s = socket(vec![Err(websocket::Error::Protocol(
            ProtocolError::ResetWithoutClosingHandshake,
        ))]);

        let err = s.next().await.unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.closure().is_some());
    }

    #[tokio::test]
    async fn test_stream_other_error_is_fatal() {
        let mut s = socket(vec![Err(websocket::Error::Utf8)]);

        let err = s.next().await.unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.closure().is_none());
    }
}
