//! The lossy, fan-out event bus shared by the Coordinator and every
//! dataset ingester (spec.md 4.1 "Events"; Design Note 9: "model as a
//! multi-producer broadcast with dropped-on-slow-consumer semantics;
//! never as a durable log").

use tokio::sync::broadcast;

/// One lifecycle or dataset-mutation notification. All variants are
/// best-effort: nothing in the engine blocks on a subscriber reading them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Watch { source_url: String },
    Unwatch { source_url: String },
    CrawlStart { source_url: String },
    CrawlFinish { source_url: String },
    CrawlError { source_url: String, error: String },
    CrawlDnsChange { source_url: String },
    CrawlDatasetStart {
        source_url: String,
        dataset: String,
        start_version: u64,
        end_version: u64,
    },
    CrawlDatasetProgress {
        source_url: String,
        dataset: String,
        progress: usize,
        total: usize,
    },
    CrawlDatasetFinish { source_url: String, dataset: String },
    /// `<kind>-added` / `<kind>-updated` / `<kind>-removed` (spec.md 4.3.1).
    RecordAdded {
        source_url: String,
        dataset: String,
        pathname: String,
    },
    RecordUpdated {
        source_url: String,
        dataset: String,
        pathname: String,
    },
    RecordRemoved {
        source_url: String,
        dataset: String,
        pathname: String,
    },
    FollowAdded { source_url: String, dest: String },
    FollowRemoved { source_url: String, dest: String },
    PublishedSiteAdded { source_url: String, dest: String },
    PublishedSiteRemoved { source_url: String, dest: String },
}

/// Cheaply-cloneable handle to the broadcast bus. Every clone shares the
/// same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    /// Fire-and-forget: if there are no subscribers, or a slow subscriber
    /// has fallen behind, the event is simply dropped.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(Event::Watch {
            source_url: "dat://a".into(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(Event::CrawlStart {
            source_url: "dat://a".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            Event::CrawlStart {
                source_url: "dat://a".into()
            }
        );
    }
}
