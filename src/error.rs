//! client error types

use std::sync::Arc;

use snafu::prelude::*;

use crate::{pubsub::TransportError, subscription};

/// client result type
pub type Result<T> = std::result::Result<T, Error>;

/// client error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Subscription input is not a token to topics mapping
    #[snafu(display("subscriptions are not valid: {source}"))]
    InvalidSubscriptions {
        /// source error
        source: subscription::InvalidSubscriptions,
    },

    /// Configured endpoint is not a valid url
    #[snafu(display("invalid pubsub endpoint url {url}"))]
    InvalidEndpoint {
        /// configured url
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// Receiving failed in a way reconnecting can not recover
    #[snafu(display("receive from pubsub failed: {source}"))]
    ReceiveFailed {
        /// source error
        source: Arc<TransportError>,
    },
}
