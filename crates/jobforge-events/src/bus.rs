//! The event bus: an in-process broadcast channel wrapping `JobEvent`
//! publication, plus a registry of standing handlers for callers that want
//! a callback instead of a `Receiver` to poll.

use crate::error::EventsError;
use crate::types::JobEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use jobforge_model::JobId;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default channel capacity. Lagging subscribers drop the oldest events
/// rather than block a queue instance's scheduling loop on a slow reader.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A standing callback invoked for every event published on the bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<JobEvent>);
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(Arc<JobEvent>) + Send + Sync,
{
    async fn handle(&self, event: Arc<JobEvent>) {
        (self)(event);
    }
}

/// Bus contract: publish events, subscribe for a `Receiver`, or register a
/// standing handler.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: JobEvent) -> Result<(), EventsError>;
    fn subscribe(&self) -> Subscription;
    /// As [`EventBus::subscribe`], but the returned subscription only ever
    /// yields events for `job_id` — every other event is dropped inside
    /// `recv` before the caller sees it.
    fn subscribe_job(&self, job_id: JobId) -> Subscription;
    fn register_handler(&self, handler: Arc<dyn EventHandler>) -> Uuid;
    fn unregister_handler(&self, id: Uuid) -> bool;
}

/// A live subscription to the bus. Dropping it unsubscribes. When built via
/// `subscribe_job`, events for any other job are filtered out of `recv`
/// before the caller ever sees them.
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<JobEvent>>,
    filter: Option<JobId>,
}

impl Subscription {
    /// Awaits the next event matching this subscription's filter (if any),
    /// or `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<JobEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(job_id) = self.filter {
                        if event.meta().job_id != job_id {
                            continue;
                        }
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The default, in-process `EventBus`: a `broadcast` channel for
/// subscribers plus a `DashMap` of standing handlers that are invoked
/// inline on every publish.
pub struct LocalEventBus {
    sender: broadcast::Sender<Arc<JobEvent>>,
    handlers: DashMap<Uuid, Arc<dyn EventHandler>>,
}

impl LocalEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: DashMap::new(),
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, event: JobEvent) -> Result<(), EventsError> {
        let event = Arc::new(event);
        // A channel with zero subscribers reports `send` as an error;
        // that's not a failure condition for a fire-and-forget bus.
        let _ = self.sender.send(event.clone());
        for handler in self.handlers.iter() {
            handler.handle(event.clone()).await;
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: None,
        }
    }

    fn subscribe_job(&self, job_id: JobId) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: Some(job_id),
        }
    }

    fn register_handler(&self, handler: Arc<dyn EventHandler>) -> Uuid {
        let id = Uuid::new_v4();
        self.handlers.insert(id, handler);
        id
    }

    fn unregister_handler(&self, id: Uuid) -> bool {
        self.handlers.remove(&id).is_some()
    }
}

/// Bridges locally published events to an external system (a message
/// broker, a sibling process, a durable event log). Queue instances never
/// depend on this directly; a host wires it in by registering it as an
/// `EventHandler` on the bus.
#[async_trait]
pub trait ExternalPublisher: Send + Sync {
    /// Stable identifier for the process publishing the event, attached so
    /// downstream consumers can tell which server a job ran on.
    fn server_id(&self) -> &str;

    async fn publish_external(&self, event: Arc<JobEvent>) -> Result<(), EventsError>;
}

/// Adapts any `ExternalPublisher` into an `EventHandler` so it can be
/// registered on a `LocalEventBus`.
pub struct ExternalBridge<P: ExternalPublisher> {
    publisher: P,
}

impl<P: ExternalPublisher> ExternalBridge<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<P: ExternalPublisher> EventHandler for ExternalBridge<P> {
    async fn handle(&self, event: Arc<JobEvent>) {
        if let Err(err) = self.publisher.publish_external(event).await {
            tracing::warn!(
                server_id = self.publisher.server_id(),
                error = %err,
                "failed to publish job event to external system"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventMeta;
    use rstest::rstest;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = LocalEventBus::new();
        let mut sub = bus.subscribe();
        let meta = EventMeta::new(JobId::new(), "q", "t");
        bus.publish(JobEvent::Queued { meta: meta.clone() })
            .await
            .unwrap();

        let received = sub.recv().await.unwrap();
        pretty_assertions::assert_eq!(received.kind(), "queued");
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    #[tokio::test]
    async fn subscribe_job_only_yields_matching_events(#[case] use_filter: bool) {
        let bus = LocalEventBus::new();
        let wanted = JobId::new();
        let other = JobId::new();
        let mut sub = if use_filter {
            bus.subscribe_job(wanted)
        } else {
            bus.subscribe()
        };

        bus.publish(JobEvent::Queued {
            meta: EventMeta::new(other, "q", "t"),
        })
        .await
        .unwrap();
        bus.publish(JobEvent::Queued {
            meta: EventMeta::new(wanted, "q", "t"),
        })
        .await
        .unwrap();

        let received = sub.recv().await.unwrap();
        if use_filter {
            assert_eq!(received.meta().job_id, wanted);
        } else {
            assert_eq!(received.meta().job_id, other);
        }
    }

    #[tokio::test]
    async fn registered_handler_is_invoked() {
        let bus = LocalEventBus::new();
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.register_handler(Arc::new(move |event: Arc<JobEvent>| {
            let seen = seen_clone.clone();
            tokio::spawn(async move {
                seen.lock().await.push(event.kind());
            });
        }));

        let meta = EventMeta::new(JobId::new(), "q", "t");
        bus.publish(JobEvent::Cancelled { meta, reason: None })
            .await
            .unwrap();
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn unregister_handler_stops_invocation() {
        let bus = LocalEventBus::new();
        let id = bus.register_handler(Arc::new(|_event: Arc<JobEvent>| {}));
        assert!(bus.unregister_handler(id));
        assert!(!bus.unregister_handler(id));
    }
}
