use async_trait::async_trait;
use hearth_shared::LifecycleEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Event serialization failed: {0}")]
    Serialization(String),
    #[error("Event sink failed: {0}")]
    Sink(String),
}

/// Which events a subscriber wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Reservation(Uuid),
    Customer(String),
    Slot(Uuid),
    Provider(Uuid),
}

impl EventFilter {
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        let payload = &event.payload;
        match self {
            EventFilter::All => true,
            EventFilter::Reservation(id) => payload.reservation_id == *id,
            EventFilter::Customer(id) => payload.customer_id == *id,
            EventFilter::Slot(id) => payload.slot_id == *id,
            EventFilter::Provider(id) => payload.provider_id == *id,
        }
    }
}

/// External broker that receives a copy of every published event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn forward(&self, event: &LifecycleEvent) -> Result<(), NotifyError>;
}

/// In-process fan-out of lifecycle events. Best effort: nothing is persisted and a
/// subscriber that falls behind the channel capacity skips the events it missed.
#[derive(Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver to current subscribers and return how many received it.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let topic = event.topic;
        let reservation_id = event.payload.reservation_id;
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!("Published {} for reservation {} to {} subscribers", topic, reservation_id, receivers);
                receivers
            }
            // No subscribers is not an error for a fire-and-forget channel.
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Forward every event, in publish order, to `sink` from a background task.
    pub fn forward_to(&self, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = sink.forward(&event).await {
                            warn!("Failed to forward {} for {}: {}", event.topic, event.payload.reservation_id, e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event forwarder lagged, {} events were not forwarded", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// A filtered view of the notifier. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Next matching event; `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}

    pub fn into_stream(self) -> impl Stream<Item = LifecycleEvent> + Send + 'static {
        let filter = self.filter;
        BroadcastStream::new(self.rx).filter_map(move |result| match result {
            Ok(event) if filter.matches(&event) => Some(event),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hearth_shared::{EventPayload, EventTopic};
    use tokio::sync::Mutex;

    fn event(topic: EventTopic, reservation_id: Uuid, customer_id: &str) -> LifecycleEvent {
        LifecycleEvent::new(
            topic,
            EventPayload {
                reservation_id,
                slot_id: Uuid::new_v4(),
                provider_id: Uuid::new_v4(),
                customer_id: customer_id.to_string(),
                booking_id: None,
                expires_at: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let notifier = EventNotifier::new(16);
        assert_eq!(notifier.publish(event(EventTopic::SlotReserved, Uuid::new_v4(), "c1")), 0);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_reservation() {
        let notifier = EventNotifier::new(16);
        let mine = Uuid::new_v4();
        let mut sub = notifier.subscribe(EventFilter::Reservation(mine));

        notifier.publish(event(EventTopic::SlotReserved, Uuid::new_v4(), "c2"));
        notifier.publish(event(EventTopic::SlotReserved, mine, "c1"));
        notifier.publish(event(EventTopic::BookingConfirmed, mine, "c1"));

        assert_eq!(sub.recv().await.unwrap().topic, EventTopic::SlotReserved);
        assert_eq!(sub.recv().await.unwrap().topic, EventTopic::BookingConfirmed);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_customer_filter() {
        let notifier = EventNotifier::new(16);
        let mut sub = notifier.subscribe(EventFilter::Customer("c1".to_string()));

        notifier.publish(event(EventTopic::HoldExpired, Uuid::new_v4(), "c2"));
        notifier.publish(event(EventTopic::HoldExpired, Uuid::new_v4(), "c1"));

        let received = sub.try_recv().unwrap();
        assert_eq!(received.payload.customer_id, "c1");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches() {
        let notifier = EventNotifier::new(16);
        let sub = notifier.subscribe(EventFilter::All);
        assert_eq!(notifier.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_instead_of_blocking() {
        let notifier = EventNotifier::new(2);
        let mut sub = notifier.subscribe(EventFilter::All);
        let last = Uuid::new_v4();

        for _ in 0..5 {
            notifier.publish(event(EventTopic::SlotReserved, Uuid::new_v4(), "c1"));
        }
        notifier.publish(event(EventTopic::HoldReleased, last, "c1"));

        let mut seen = Vec::new();
        while let Some(e) = sub.try_recv() {
            seen.push(e);
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last().unwrap().payload.reservation_id, last);
    }

    struct RecordingSink {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn forward(&self, event: &LifecycleEvent) -> Result<(), NotifyError> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forwarder_preserves_order() {
        let notifier = EventNotifier::new(16);
        let sink = Arc::new(RecordingSink { events: Mutex::new(Vec::new()) });
        let handle = notifier.forward_to(sink.clone());

        let reservation = Uuid::new_v4();
        notifier.publish(event(EventTopic::SlotReserved, reservation, "c1"));
        notifier.publish(event(EventTopic::BookingConfirmed, reservation, "c1"));
        drop(notifier);
        handle.await.unwrap();

        let topics: Vec<EventTopic> = sink.events.lock().await.iter().map(|e| e.topic).collect();
        assert_eq!(topics, vec![EventTopic::SlotReserved, EventTopic::BookingConfirmed]);
    }

    #[tokio::test]
    async fn test_stream_yields_matching_events() {
        let notifier = EventNotifier::new(16);
        let slot_filter_event = event(EventTopic::SlotReserved, Uuid::new_v4(), "c1");
        let slot_id = slot_filter_event.payload.slot_id;
        let mut stream = Box::pin(notifier.subscribe(EventFilter::Slot(slot_id)).into_stream());

        notifier.publish(event(EventTopic::SlotReserved, Uuid::new_v4(), "c9"));
        notifier.publish(slot_filter_event.clone());

        assert_eq!(stream.next().await.unwrap(), slot_filter_event);
    }
}
