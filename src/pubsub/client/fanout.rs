use std::{panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use serde_json::Value;
use snafu::prelude::*;

use super::observer::{DispatchFailure, Observers};
use crate::{
    listener::{panic_message, Dispatcher},
    pubsub::{Event, EventKind},
};

/// Why a message was not delivered
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum DispatchError {
    /// topic maps to no event kind
    #[snafu(display("event kind not found for topic {topic:?}"))]
    EventKindUnresolved {
        /// received topic
        topic: String,
    },

    /// dispatcher or one of its listeners failed
    #[snafu(display("listener for event {kind} threw an error: {detail}"))]
    ListenerFailed {
        /// event kind
        kind: EventKind,
        /// event data
        data: Value,
        /// failure message
        detail: String,
    },
}

/// Turns topic messages into events and delivers them, never letting a listener failure escape.
#[derive(Debug)]
pub(crate) struct Fanout<D> {
    dispatcher: D,
    observers: Observers,
}

impl<D> Fanout<D>
where
    D: Dispatcher,
{
    pub fn new(dispatcher: D, observers: Observers) -> Self {
        Self {
            dispatcher,
            observers,
        }
    }

    pub async fn dispatch(&self, topic: &str, data: Value) -> Result<EventKind, DispatchError> {
        let Some(kind) = EventKind::from_topic(topic) else {
            log::warn!("Event kind not found for topic {:?}", topic);
            return error::EventKindUnresolved { topic }.fail();
        };

        let event = Arc::new(Event {
            kind,
            topic: topic.to_string(),
            data,
        });

        log::trace!("Dispatch {} event of topic {}", kind, topic);

        let result = AssertUnwindSafe(self.dispatcher.publish(event.clone()))
            .catch_unwind()
            .await;

        let detail = match result {
            Ok(Ok(())) => return Ok(kind),
            Ok(Err(err)) => err.to_string(),
            Err(panic) => panic_message(&*panic),
        };

        log::warn!("Listener for event {} threw an error: {}", kind, detail);

        self.observers.dispatch_error(DispatchFailure {
            kind,
            data: event.data.clone(),
            detail: detail.clone(),
        });

        error::ListenerFailed {
            kind,
            data: event.data.clone(),
            detail,
        }
        .fail()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::listener::{ListenerError, Listeners};

    #[tokio::test]
    async fn test_dispatch_delivers_event() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut listeners = Listeners::new();
        let h = hits.clone();
        listeners.listen(EventKind::WhisperReceived, move |e: Arc<Event>| {
            let h = h.clone();
            async move {
                assert_eq!(e.data, json!({"foo": "bar"}));
                assert_eq!(e.topic, "whispers.44322889");
                h.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ListenerError>(())
            }
        });

        let fanout = Fanout::new(listeners, Observers::new(8));
        let kind = fanout
            .dispatch("whispers.44322889", json!({"foo": "bar"}))
            .await
            .unwrap();

        assert_eq!(kind, EventKind::WhisperReceived);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unresolved_topic_skips_dispatcher() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl Dispatcher for Unreachable {
            async fn publish(&self, _event: Arc<Event>) -> Result<(), ListenerError> {
                panic!("dispatcher must not be called")
            }
        }

        let observers = Observers::new(8);
        let mut errors = observers.dispatch_errors();
        let fanout = Fanout::new(Unreachable, observers);

        let err = fanout.dispatch("foo", json!({})).await.unwrap_err();

        assert!(matches!(err, DispatchError::EventKindUnresolved { ref topic } if topic == "foo"));
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_listener_error_is_contained() {
        let mut listeners = Listeners::new();
        listeners.listen(EventKind::WhisperReceived, |_: Arc<Event>| async {
            Err::<(), ListenerError>("foo".into())
        });

        let observers = Observers::new(8);
        let mut errors = observers.dispatch_errors();
        let fanout = Fanout::new(listeners, observers);

        let err = fanout
            .dispatch("whispers.44322889", json!({"foo": "bar"}))
            .await
            .unwrap_err();

        match err {
            DispatchError::ListenerFailed { kind, data, detail } => {
                assert_eq!(kind, EventKind::WhisperReceived);
                assert_eq!(data, json!({"foo": "bar"}));
                assert_eq!(detail, "foo");
            }
            other => panic!("unexpected outcome {other}"),
        }

        let reported = errors.try_recv().unwrap();
        assert_eq!(reported.kind, EventKind::WhisperReceived);
        assert_eq!(reported.detail, "foo");
    }

    #[tokio::test]
    async fn test_dispatch_panicking_dispatcher_is_contained() {
        struct Panicking;

        #[async_trait::async_trait]
        impl Dispatcher for Panicking {
            async fn publish(&self, _event: Arc<Event>) -> Result<(), ListenerError> {
                panic!("listener exploded")
            }
        }

        let observers = Observers::new(8);
        let mut errors = observers.dispatch_errors();
        let fanout = Fanout::new(Panicking, observers);

        let result = fanout.dispatch("channel-bits-events-v2.1", json!(1)).await;

        assert!(matches!(result, Err(DispatchError::ListenerFailed { .. })));
        assert_eq!(errors.try_recv().unwrap().detail, "listener exploded");
    }
}
