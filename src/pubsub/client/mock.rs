//! Scripted in-memory websocket for tests.

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use futures_util::{future, Sink, Stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self as websocket, Message};
use url::Url;

use super::Connector;

/// How the client side treats writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkMode {
    Accept,
    /// never ready again, like a peer that stopped reading
    Stall,
    Fail,
}

/// Client side of a scripted connection
#[derive(Debug)]
pub(crate) struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Result<Message, websocket::Error>>,
    outbound: mpsc::UnboundedSender<Message>,
    mode: Arc<Mutex<SinkMode>>,
}

/// Server side of a scripted connection
#[derive(Debug)]
pub(crate) struct MockRemote {
    pub inbound: mpsc::UnboundedSender<Result<Message, websocket::Error>>,
    pub outbound: mpsc::UnboundedReceiver<Message>,
    mode: Arc<Mutex<SinkMode>>,
}

impl MockRemote {
    pub fn send_text(&self, text: impl Into<String>) {
        self.inbound.send(Ok(Message::Text(text.into()))).unwrap();
    }

    pub fn set_sink(&self, mode: SinkMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

impl MockSocket {
    fn mode(&self) -> SinkMode {
        *self.mode.lock().unwrap()
    }
}

fn broken_pipe() -> websocket::Error {
    websocket::Error::Io(std::io::ErrorKind::BrokenPipe.into())
}

pub(crate) fn socket_pair() -> (MockSocket, MockRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let mode = Arc::new(Mutex::new(SinkMode::Accept));

    (
        MockSocket {
            inbound: inbound_rx,
            outbound: outbound_tx,
            mode: mode.clone(),
        },
        MockRemote {
            inbound: inbound_tx,
            outbound: outbound_rx,
            mode,
        },
    )
}

impl Stream for MockSocket {
    type Item = Result<Message, websocket::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

impl Sink<Message> for MockSocket {
    type Error = websocket::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.mode() {
            SinkMode::Accept => Poll::Ready(Ok(())),
            SinkMode::Stall => Poll::Pending,
            SinkMode::Fail => Poll::Ready(Err(broken_pipe())),
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        if self.mode() == SinkMode::Fail {
            return Err(broken_pipe());
        }

        self.outbound
            .send(item)
            .map_err(|_| websocket::Error::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.mode() {
            SinkMode::Stall => Poll::Pending,
            _ => Poll::Ready(Ok(())),
        }
    }
}

/// Hands out queued sockets in order, then never finishes connecting
#[derive(Debug)]
pub(crate) struct MockConnector {
    sockets: Mutex<VecDeque<Result<MockSocket, websocket::Error>>>,
    attempts: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(sockets: Vec<Result<MockSocket, websocket::Error>>) -> Self {
        Self {
            sockets: Mutex::new(sockets.into()),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    type Socket = MockSocket;

    async fn connect(&self, _url: &Url) -> Result<Self::Socket, websocket::Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let next = self.sockets.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => future::pending().await,
        }
    }
}
