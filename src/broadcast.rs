// Per-draft event rooms: ordered fan-out to every live subscriber.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::DraftEvent;

/// Fans every committed state transition out to all subscribers of a draft
/// room, preserving publish order per subscriber.
///
/// Subscribers are unbounded channels: publishing never blocks the
/// coordinator, and a subscriber whose receiver is gone is pruned on the
/// next publish -- a dropped connection simply stops receiving until it
/// resubscribes, matching the at-least-once contract. Nothing is replayed;
/// catch-up is the sync adapter's job.
#[derive(Debug, Default)]
pub struct Broadcaster {
    rooms: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<DraftEvent>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Broadcaster::default()
    }

    /// Join the room for `draft_id`. Events published after this call are
    /// delivered in order until the returned receiver is dropped.
    pub fn subscribe(&self, draft_id: &str) -> mpsc::UnboundedReceiver<DraftEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = self.rooms.lock().expect("broadcaster lock poisoned");
        rooms.entry(draft_id.to_string()).or_default().push(tx);
        rx
    }

    /// Deliver `event` to every current subscriber of `draft_id`, dropping
    /// subscribers whose channel has closed.
    pub fn publish(&self, draft_id: &str, event: &DraftEvent) {
        let mut rooms = self.rooms.lock().expect("broadcaster lock poisoned");
        let Some(subscribers) = rooms.get_mut(draft_id) else {
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("room {draft_id} has no subscribers left");
            rooms.remove(draft_id);
        }
    }

    /// Number of live subscribers in a room (stale entries are only pruned
    /// on publish, so this is an upper bound between publishes).
    pub fn subscriber_count(&self, draft_id: &str) -> usize {
        let rooms = self.rooms.lock().expect("broadcaster lock poisoned");
        rooms.get(draft_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ended() -> DraftEvent {
        DraftEvent::DraftEnded
    }

    fn skipped(round: u32, pick: u32) -> DraftEvent {
        DraftEvent::TurnSkipped {
            round,
            pick,
            team_id: "T1".into(),
            next_drafter: None,
            next_pick_time: None,
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe("d1");

        broadcaster.publish("d1", &skipped(1, 1));
        broadcaster.publish("d1", &skipped(1, 2));
        broadcaster.publish("d1", &ended());

        assert_eq!(rx.recv().await.unwrap(), skipped(1, 1));
        assert_eq!(rx.recv().await.unwrap(), skipped(1, 2));
        assert_eq!(rx.recv().await.unwrap(), ended());
    }

    #[tokio::test]
    async fn all_subscribers_receive_every_event() {
        let broadcaster = Broadcaster::new();
        let mut rx_a = broadcaster.subscribe("d1");
        let mut rx_b = broadcaster.subscribe("d1");

        broadcaster.publish("d1", &skipped(1, 1));

        assert_eq!(rx_a.recv().await.unwrap(), skipped(1, 1));
        assert_eq!(rx_b.recv().await.unwrap(), skipped(1, 1));
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let broadcaster = Broadcaster::new();
        let mut rx_one = broadcaster.subscribe("d1");
        let mut rx_two = broadcaster.subscribe("d2");

        broadcaster.publish("d1", &ended());

        assert_eq!(rx_one.recv().await.unwrap(), ended());
        assert!(rx_two.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let broadcaster = Broadcaster::new();
        let rx_a = broadcaster.subscribe("d1");
        let mut rx_b = broadcaster.subscribe("d1");
        assert_eq!(broadcaster.subscriber_count("d1"), 2);

        drop(rx_a);
        broadcaster.publish("d1", &ended());

        assert_eq!(broadcaster.subscriber_count("d1"), 1);
        assert_eq!(rx_b.recv().await.unwrap(), ended());
    }

    #[test]
    fn publish_to_empty_room_is_noop() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish("nobody-home", &ended());
        assert_eq!(broadcaster.subscriber_count("nobody-home"), 0);
    }

    #[tokio::test]
    async fn subscriber_joining_late_misses_earlier_events() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish("d1", &skipped(1, 1));

        let mut rx = broadcaster.subscribe("d1");
        broadcaster.publish("d1", &skipped(1, 2));

        // Only the post-subscription event arrives; catch-up is done via
        // snapshot, not replay.
        assert_eq!(rx.recv().await.unwrap(), skipped(1, 2));
        assert!(rx.try_recv().is_err());
    }
}
