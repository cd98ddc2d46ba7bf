use std::{future::Future, sync::Arc, time::Duration};

use futures_util::StreamExt;
use snafu::IntoError;

use super::{
    connection::{ConnectionManager, InboundStream},
    error,
    fanout::{DispatchError, Fanout},
    observer::{ConnectionClosed, Observers},
    pinger::{PingWorker, PingWorkerHandle},
    Connector, TransportError,
};
use crate::{
    listener::Dispatcher,
    pubsub::{
        message::{Envelope, Inbound, MessageStreamSinkError, MessageType},
        EventKind,
    },
};

enum Step<T> {
    Shutdown,
    Connected(Result<T, Arc<TransportError>>),
    Received(Option<Result<Inbound, MessageStreamSinkError>>),
}

enum Flow {
    Continue,
    Reconnect,
    Fatal(Arc<TransportError>),
}

/// Top level receive loop of the client
#[derive(Debug)]
pub(crate) struct Runtime<C, D> {
    manager: ConnectionManager<C>,
    fanout: Fanout<D>,
    observers: Observers,
    ping_interval: Duration,
    unlisten_timeout: Duration,
}

impl<C, D> Runtime<C, D>
where
    C: Connector,
    D: Dispatcher,
{
    pub fn new(
        manager: ConnectionManager<C>,
        fanout: Fanout<D>,
        observers: Observers,
        ping_interval: Duration,
        unlisten_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            fanout,
            observers,
            ping_interval,
            unlisten_timeout,
        }
    }

    /// Run until `shutdown` resolves or receiving fails in a way reconnecting can not fix.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), Arc<TransportError>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let pinger = PingWorker::new(self.manager.watch_handle(), self.ping_interval).start();

        let mut stream: Option<InboundStream<C>> = None;
        let mut reconnect = false;

        loop {
            let step = match stream.as_mut() {
                None => {
                    let manager = &mut self.manager;
                    let connect = async {
                        if reconnect {
                            manager.reconnect().await
                        } else {
                            manager.connect().await
                        }
                    };

                    tokio::select! {
                        biased;
                        _ = &mut shutdown => Step::Shutdown,
                        result = connect => Step::Connected(result),
                    }
                }
                Some(s) => {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => Step::Shutdown,
                        item = s.next() => Step::Received(item),
                    }
                }
            };

            match step {
                Step::Shutdown => {
                    self.shutdown(pinger).await;
                    return Ok(());
                }
                Step::Connected(Ok(s)) => {
                    log::info!("Connected, start receiving messages");
                    stream = Some(s);
                }
                Step::Connected(Err(_)) => {
                    // already reported, try again right away
                    reconnect = true;
                    tokio::task::yield_now().await;
                }
                Step::Received(item) => match self.handle(item).await {
                    Flow::Continue => {}
                    Flow::Reconnect => {
                        stream = None;
                        reconnect = true;
                    }
                    Flow::Fatal(err) => {
                        pinger.stop().await;
                        self.manager.close();
                        return Err(err);
                    }
                },
            }
        }
    }

    async fn shutdown(&mut self, pinger: PingWorkerHandle) {
        log::info!(
            "Shutdown requested in {:?} state, unlisten subscriptions",
            self.manager.state()
        );

        self.manager.unlisten(self.unlisten_timeout).await;
        pinger.stop().await;
        self.manager.close();

        log::info!("Stopped");
    }

    fn closed(&self, closed: ConnectionClosed) -> Flow {
        log::warn!(
            "Connection closed: {} ({:?}), reconnecting",
            closed.reason,
            closed.code
        );
        self.observers.closed(closed);
        Flow::Reconnect
    }

    async fn handle(&self, item: Option<Result<Inbound, MessageStreamSinkError>>) -> Flow {
        match item {
            None => self.closed(ConnectionClosed {
                code: None,
                reason: "websocket stream ended".to_string(),
            }),
            Some(Ok(Inbound::Closed(closed))) => self.closed(closed),
            Some(Ok(Inbound::Envelope(envelope))) => self.handle_envelope(envelope).await,
            Some(Err(err)) => {
                if let Some(closed) = err.closure() {
                    self.closed(closed)
                } else if !err.is_fatal() {
                    log::warn!("Message stream error happened but ignored: {}", err);
                    Flow::Continue
                } else {
                    log::error!("Receive message failed, stop: {}", err);
                    let err = Arc::new(error::Receive.into_error(err));
                    self.observers.transport_error(err.clone());
                    Flow::Fatal(err)
                }
            }
        }
    }

    async fn handle_envelope(&self, envelope: Envelope) -> Flow {
        log::trace!("Received new {} message", envelope.kind.as_str());

        if envelope.kind == MessageType::Reconnect {
            log::info!("Server requested reconnect");
            return Flow::Reconnect;
        }

        self.observers.message(&envelope);

        match envelope.kind {
            MessageType::Message => {
                handle_message(&self.fanout, &envelope).await;
            }
            MessageType::Response => match envelope.error.as_deref() {
                Some(err) if !err.is_empty() => {
                    log::warn!("Server rejected request {:?}: {}", envelope.nonce, err)
                }
                _ => log::debug!("Server accepted request {:?}", envelope.nonce),
            },
            // Ignore other message
            _ => {}
        }

        Flow::Continue
    }
}

/// Route a MESSAGE envelope to the fan-out. `None` if the frame was discarded before dispatch.
pub(crate) async fn handle_message<D>(
    fanout: &Fanout<D>,
    envelope: &Envelope,
) -> Option<Result<EventKind, DispatchError>>
where
    D: Dispatcher,
{
    let data = match envelope.message_data() {
        Ok(data) => data,
        Err(err) => {
            log::debug!("Skip message: {}", err);
            return None;
        }
    };

    let inner = match data.decode_inner() {
        Ok(inner) => inner,
        Err(err) => {
            log::debug!("Skip message: {}", err);
            return None;
        }
    };

    if inner.is_thread() {
        log::trace!("Skip whisper thread message of topic {}", data.topic);
        return None;
    }

    Some(fanout.dispatch(&data.topic, inner.into_value()).await)
}
