//! Event Publisher
//!
//! In-process fan-out of bot events to subscribers. Subscribers may filter
//! by bot id; a subscriber without a filter receives everything. Delivery is
//! best effort over unbounded channels, and closed subscribers are pruned on
//! the next publish.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// What a published event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotEventKind {
    /// A confirmed fill with its ledger details.
    Trade,
    /// A lifecycle or runtime-state change.
    Runtime,
}

/// A single event emitted by a bot.
#[derive(Debug, Clone, Serialize)]
pub struct BotEvent {
    pub bot_id: String,
    pub kind: BotEventKind,
    pub payload: serde_json::Value,
}

struct Subscriber {
    /// None means no filter: the subscriber wants every bot.
    filter: Option<HashSet<String>>,
    tx: mpsc::UnboundedSender<BotEvent>,
}

/// Shared publisher handle. Cheap to clone behind an `Arc` by the caller.
#[derive(Default)]
pub struct EventPublisher {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events, optionally restricted to a set of bot ids.
    pub fn subscribe(
        &self,
        filter: Option<HashSet<String>>,
    ) -> mpsc::UnboundedReceiver<BotEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Lock is only poisoned if a publisher panicked mid-push; recover
        // with whatever list is there.
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.push(Subscriber { filter, tx });
        rx
    }

    /// Deliver an event to every interested live subscriber.
    pub fn publish(&self, event: BotEvent) {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        subs.retain(|sub| {
            let interested = match &sub.filter {
                None => true,
                Some(ids) => ids.contains(&event.bot_id),
            };
            if !interested {
                return !sub.tx.is_closed();
            }
            // A failed send means the receiver is gone; drop the subscriber.
            sub.tx.send(event.clone()).is_ok()
        });

        debug!(
            bot_id = %event.bot_id,
            kind = ?event.kind,
            subscribers = subs.len(),
            "published bot event"
        );
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(bot_id: &str) -> BotEvent {
        BotEvent {
            bot_id: bot_id.to_string(),
            kind: BotEventKind::Runtime,
            payload: serde_json::json!({"status": "running"}),
        }
    }

    #[tokio::test]
    async fn test_unfiltered_subscriber_gets_everything() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe(None);

        publisher.publish(event("bot-a"));
        publisher.publish(event("bot-b"));

        assert_eq!(rx.recv().await.unwrap().bot_id, "bot-a");
        assert_eq!(rx.recv().await.unwrap().bot_id, "bot-b");
    }

    #[tokio::test]
    async fn test_filtered_subscriber_only_sees_its_bots() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe(Some(["bot-a".to_string()].into_iter().collect()));

        publisher.publish(event("bot-b"));
        publisher.publish(event("bot-a"));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.bot_id, "bot-a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let publisher = EventPublisher::new();
        let rx = publisher.subscribe(None);
        let _keep = publisher.subscribe(None);
        assert_eq!(publisher.subscriber_count(), 2);

        drop(rx);
        publisher.publish(event("bot-a"));
        assert_eq!(publisher.subscriber_count(), 1);
    }
}
