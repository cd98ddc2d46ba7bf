//! Host event dispatch and listeners.

use std::{
    any::Any, borrow::Cow, collections::HashMap, fmt, future::Future, panic::AssertUnwindSafe,
    sync::Arc,
};

use futures_util::FutureExt;

use crate::pubsub::{Event, EventKind};

/// Error a listener can return
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every event the client resolves. May fail, the client catches it.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// deliver one event to application code
    async fn publish(&self, event: Arc<Event>) -> Result<(), ListenerError>;
}

#[async_trait::async_trait]
impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    async fn publish(&self, event: Arc<Event>) -> Result<(), ListenerError> {
        (**self).publish(event).await
    }
}

/// Listener can be registered for an event kind and process its events.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    /// listener name
    fn name(&self) -> Cow<'static, str>;
    /// callback will be executed for each event of the registered kind
    async fn on_event(self: Arc<Self>, event: Arc<Event>) -> Result<(), ListenerError>;
}

#[async_trait::async_trait]
impl<F, Fut> Listener for F
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send,
{
    fn name(&self) -> Cow<'static, str> {
        "Anonymous Fn Listener".into()
    }

    async fn on_event(self: Arc<Self>, event: Arc<Event>) -> Result<(), ListenerError> {
        self(event).await
    }
}

/// Listener registry, dispatches an event to every listener of its kind in registration order.
///
/// All listeners run even if an earlier one fails or panics, the first failure is returned.
#[derive(Default)]
pub struct Listeners {
    listeners: HashMap<EventKind, Vec<Arc<dyn Listener>>>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, list) in &self.listeners {
            map.entry(kind, &list.iter().map(|l| l.name()).collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl Listeners {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for an event kind
    pub fn listen<L>(&mut self, kind: EventKind, listener: L) -> &mut Self
    where
        L: Listener + 'static,
    {
        log::debug!("Register listener {} for {}", listener.name(), kind);
        self.listeners
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// count of listeners registered for a kind
    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl Dispatcher for Listeners {
    async fn publish(&self, event: Arc<Event>) -> Result<(), ListenerError> {
        let Some(list) = self.listeners.get(&event.kind) else {
            log::trace!("No listener for {}", event.kind);
            return Ok(());
        };

        let mut first_failure = None;

        for listener in list {
            let name = listener.name();
            let result = AssertUnwindSafe(listener.clone().on_event(event.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panic_message(&*panic).into()));

            if let Err(err) = result {
                log::debug!("Listener {} for {} failed: {}", name, event.kind, err);
                first_failure.get_or_insert(err);
            }
        }

        first_failure.map_or(Ok(()), Err)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
