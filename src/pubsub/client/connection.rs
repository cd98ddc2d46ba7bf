use std::{sync::Arc, time::Duration};

use futures_util::{
    future,
    stream::{SplitSink, SplitStream},
    Sink, SinkExt, StreamExt,
};
use snafu::{prelude::*, IntoError};
use tokio::sync::{mpsc, oneshot, watch};
use url::Url;

use super::{error, observer::Observers, Connector, TransportError};
use crate::{
    pubsub::message::{MessageStreamSink, MessageStreamSinkError, Outbound},
    subscription::Subscriptions,
};

/// Inbound half of a live connection
pub(crate) type InboundStream<C> = SplitStream<MessageStreamSink<<C as Connector>::Socket>>;

/// Connection state machine:
/// `Disconnected -> Connecting -> Connected -> (Reconnecting -> Connecting) | Closing -> Disconnected`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// no connection
    Disconnected,
    /// opening a connection and sending LISTEN
    Connecting,
    /// connection ready
    Connected,
    /// dropping current connection before opening a new one
    Reconnecting,
    /// shutting down
    Closing,
}

#[derive(Debug)]
pub(crate) struct Outgoing {
    message: Outbound,
    written: Option<oneshot::Sender<bool>>,
}

/// Sending side of one connection generation.
///
/// Cheap to clone. Once its generation is replaced every send just returns false.
#[derive(Debug, Clone)]
pub(crate) struct Handle {
    generation: u64,
    tx: mpsc::Sender<Outgoing>,
}

impl Handle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a message, false if the connection is gone
    pub async fn send(&self, message: Outbound) -> bool {
        self.tx
            .send(Outgoing {
                message,
                written: None,
            })
            .await
            .is_ok()
    }

    /// Queue a message and wait until it is written, false if the write did not happen
    pub async fn send_and_wait(&self, message: Outbound) -> bool {
        let (written_tx, written_rx) = oneshot::channel();
        let queued = self
            .tx
            .send(Outgoing {
                message,
                written: Some(written_tx),
            })
            .await
            .is_ok();

        queued && written_rx.await.unwrap_or(false)
    }
}

#[derive(Debug)]
struct Writer {
    close_tx: oneshot::Sender<()>,
}

async fn write_loop<S>(
    generation: u64,
    mut sink: SplitSink<S, Outbound>,
    mut rx: mpsc::Receiver<Outgoing>,
    mut close_rx: oneshot::Receiver<()>,
    observers: Observers,
) where
    S: Sink<Outbound, Error = MessageStreamSinkError>,
{
    log::debug!("Writer of connection #{} start", generation);

    loop {
        tokio::select! {
            biased;

            _ = &mut close_rx => {
                log::debug!("Connection #{} replaced or closing", generation);
                break;
            }

            outgoing = rx.recv() => {
                let Some(Outgoing { message, written }) = outgoing else {
                    break;
                };

                let type_name = message.type_name();
                log::trace!("Send {} message on connection #{}", type_name, generation);

                let result = tokio::select! {
                    biased;

                    _ = &mut close_rx => {
                        // sink is stuck, close would never finish either
                        log::debug!(
                            "Connection #{} closing while {} write stalled",
                            generation,
                            type_name
                        );
                        return;
                    }

                    result = sink.send(message) => result,
                };

                if let Some(written) = written {
                    let _ = written.send(result.is_ok());
                }

                if let Err(source) = result {
                    log::warn!(
                        "Send {} message on connection #{} failed: {}",
                        type_name,
                        generation,
                        source
                    );
                    observers.transport_error(Arc::new(
                        error::Send {
                            generation,
                            type_name,
                        }
                        .into_error(source),
                    ));
                    break;
                }
            }
        }
    }

    if let Err(err) = sink.close().await {
        log::debug!("Close connection #{} failed, ignored: {}", generation, err);
    }

    log::debug!("Writer of connection #{} stop", generation);
}

/// Owns the live connection, at most one at a time.
#[derive(Debug)]
pub(crate) struct ConnectionManager<C> {
    connector: C,
    endpoint: Url,
    subscriptions: Arc<Subscriptions>,
    observers: Observers,
    state: ConnectionState,
    generation: u64,
    handle_tx: watch::Sender<Option<Handle>>,
    writer: Option<Writer>,
}

impl<C> ConnectionManager<C>
where
    C: Connector,
{
    pub fn new(
        connector: C,
        endpoint: Url,
        subscriptions: Arc<Subscriptions>,
        observers: Observers,
    ) -> Self {
        let (handle_tx, _) = watch::channel(None);

        Self {
            connector,
            endpoint,
            subscriptions,
            observers,
            state: ConnectionState::Disconnected,
            generation: 0,
            handle_tx,
            writer: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Watch the current handle, `None` while not connected
    pub fn watch_handle(&self) -> watch::Receiver<Option<Handle>> {
        self.handle_tx.subscribe()
    }

    fn move_to(&mut self, state: ConnectionState) {
        log::debug!("Move to {:?} state", state);
        self.state = state;
    }

    /// Drop current handle and ask its writer to close the connection, without waiting
    fn discard(&mut self) {
        if let Some(old) = self.handle_tx.send_replace(None) {
            log::debug!("Discard connection #{}", old.generation());
        }

        if let Some(writer) = self.writer.take() {
            // writer may already be gone after a send failure
            let _ = writer.close_tx.send(());
        }
    }

    /// Open a new connection, replacing any prior one, and LISTEN every subscription on it.
    ///
    /// Failures are reported on the transport error stream before being returned.
    pub async fn connect(&mut self) -> Result<InboundStream<C>, Arc<TransportError>> {
        self.discard();
        self.move_to(ConnectionState::Connecting);

        self.generation += 1;
        let generation = self.generation;

        let result = self
            .connector
            .connect(&self.endpoint)
            .await
            .context(error::Open {
                url: self.endpoint.as_str(),
            });

        let socket = match result {
            Ok(socket) => socket,
            Err(err) => return Err(self.fail(err)),
        };

        log::debug!(
            "Connection #{} opened, listen {} subscriptions",
            generation,
            self.subscriptions.len()
        );

        let (mut sink, stream) = MessageStreamSink::new(socket).split();

        let subscriptions = self.subscriptions.clone();
        for sub in subscriptions.iter() {
            let message = Outbound::listen(&sub.token, &sub.topics);
            let type_name = message.type_name();

            if let Err(source) = sink.send(message).await {
                let err = error::Send {
                    generation,
                    type_name,
                }
                .into_error(source);
                return Err(self.fail(err));
            }

            log::trace!(
                "Listen {} topics on connection #{}",
                sub.topics.len(),
                generation
            );
        }

        let (tx, rx) = mpsc::channel(32);
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(write_loop(
            generation,
            sink,
            rx,
            close_rx,
            self.observers.clone(),
        ));

        self.writer = Some(Writer { close_tx });
        self.handle_tx.send_replace(Some(Handle { generation, tx }));
        self.move_to(ConnectionState::Connected);

        Ok(stream)
    }

    /// Same as connect, used when server asked for it or the connection dropped.
    pub async fn reconnect(&mut self) -> Result<InboundStream<C>, Arc<TransportError>> {
        log::info!("Reconnecting to {}", self.endpoint);
        self.move_to(ConnectionState::Reconnecting);
        self.connect().await
    }

    fn fail(&mut self, err: TransportError) -> Arc<TransportError> {
        log::warn!("{}", err);
        let err = Arc::new(err);
        self.observers.transport_error(err.clone());
        self.move_to(ConnectionState::Disconnected);
        err
    }

    /// UNLISTEN every subscription on the current connection, waiting at most `wait`.
    pub async fn unlisten(&self, wait: Duration) {
        let handle = self.handle_tx.borrow().clone();
        let Some(handle) = handle else {
            log::debug!("No connection ready, skip unlisten");
            return;
        };

        let sends = self
            .subscriptions
            .iter()
            .map(|sub| handle.send_and_wait(Outbound::unlisten(&sub.token, &sub.topics)));

        match tokio::time::timeout(wait, future::join_all(sends)).await {
            Ok(results) => log::debug!(
                "Unlisten {} of {} subscriptions on connection #{}",
                results.iter().filter(|ok| **ok).count(),
                results.len(),
                handle.generation()
            ),
            Err(_) => log::warn!("Unlisten not finished in {:?}, give up", wait),
        }
    }

    /// Close current connection
    pub fn close(&mut self) {
        self.move_to(ConnectionState::Closing);
        self.discard();
        self.move_to(ConnectionState::Disconnected);
    }
}
