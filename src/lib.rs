//! # Twitch PubSub
//!
//! A long-lived Twitch PubSub listener.
//!
//! It keeps one websocket connection to the PubSub endpoint, LISTENs topics for one or more
//! auth tokens, sends PING itself, reconnects when the server asks for it or the connection
//! drops, and delivers every topic message as a typed [`Event`] to a [`Dispatcher`].

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod listener;
pub mod pubsub;
pub mod subscription;

mod error;
pub use error::{Error, Result};

pub use config::Config;
pub use listener::{Dispatcher, Listener, ListenerError, Listeners};
pub use pubsub::{Event, EventKind, Observers};
pub use subscription::{SubscriptionInput, Subscriptions};

use std::{future::Future, sync::Arc};

use snafu::prelude::*;
use url::Url;

use pubsub::{
    client::{connection::ConnectionManager, fanout::Fanout, runtime::Runtime},
    Connector, WebsocketConnector,
};

/// Twitch PubSub client instance
#[derive(Debug)]
pub struct Client<D, C = WebsocketConnector> {
    config: Config,
    connector: C,
    dispatcher: D,
    observers: Observers,
}

impl<D> Client<D>
where
    D: Dispatcher,
{
    /// Create new client delivering events to `dispatcher`, with default config
    pub fn new(dispatcher: D) -> Self {
        Self::with_config(dispatcher, Config::default())
    }

    /// Create new client with config
    pub fn with_config(dispatcher: D, config: Config) -> Self {
        Self::with_connector(dispatcher, WebsocketConnector, config)
    }
}

impl<D, C> Client<D, C>
where
    D: Dispatcher,
    C: Connector,
{
    /// Create new client using a custom transport
    pub fn with_connector(dispatcher: D, connector: C, config: Config) -> Self {
        let observers = Observers::new(config.observer_capacity);

        Self {
            config,
            connector,
            dispatcher,
            observers,
        }
    }

    /// Observation streams, subscribe before calling [`run`](Self::run)
    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Run the listener until `shutdown` resolves.
    ///
    /// `input` is one auth token listening `topics`, or a json mapping of token to topics
    /// (then `topics` is ignored). Invalid input fails before any connection attempt.
    /// Besides that only a receive failure reconnecting can not fix ends this call.
    pub async fn run<I, F>(self, input: I, topics: Vec<String>, shutdown: F) -> Result<()>
    where
        I: Into<SubscriptionInput>,
        F: Future<Output = ()>,
    {
        let subscriptions =
            Subscriptions::build(input, topics).context(error::InvalidSubscriptions)?;

        let endpoint = Url::parse(&self.config.endpoint).with_context(|_| {
            error::InvalidEndpoint {
                url: &self.config.endpoint,
            }
        })?;

        log::info!(
            "Start listening {} subscriptions on {}",
            subscriptions.len(),
            endpoint
        );

        let manager = ConnectionManager::new(
            self.connector,
            endpoint,
            Arc::new(subscriptions),
            self.observers.clone(),
        );
        let fanout = Fanout::new(self.dispatcher, self.observers.clone());

        Runtime::new(
            manager,
            fanout,
            self.observers,
            self.config.ping_interval,
            self.config.unlisten_timeout,
        )
        .run(shutdown)
        .await
        .context(error::ReceiveFailed)
    }
}
