use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Process-wide record of things that should not have happened: malformed
/// broker responses, discard-class ACK errors and messages whose delivery
/// status is unknowable. Mutated concurrently by all connectors.
#[derive(Debug, Default)]
pub struct AnomalyTracker {
    bad_response_count: AtomicU64,
    discard_ack_count: AtomicU64,
    possible_duplicate_count: AtomicU64,
    discards_by_topic: DashMap<String, u64>,
}

impl AnomalyTracker {
    pub fn track_bad_response(&self) {
        self.bad_response_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_discard_ack(&self, topic: &str, msg_count: u64) {
        self.discard_ack_count.fetch_add(msg_count, Ordering::Relaxed);
        *self.discards_by_topic.entry(topic.to_string()).or_insert(0) += msg_count;
    }

    pub fn track_possible_duplicates(&self, msg_count: u64) {
        self.possible_duplicate_count
            .fetch_add(msg_count, Ordering::Relaxed);
    }

    pub fn bad_response_count(&self) -> u64 {
        self.bad_response_count.load(Ordering::Relaxed)
    }

    pub fn discard_ack_count(&self) -> u64 {
        self.discard_ack_count.load(Ordering::Relaxed)
    }

    pub fn possible_duplicate_count(&self) -> u64 {
        self.possible_duplicate_count.load(Ordering::Relaxed)
    }

    pub fn discards_for_topic(&self, topic: &str) -> u64 {
        self.discards_by_topic
            .get(topic)
            .map(|entry| *entry)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_counts_accumulate_per_topic() {
        let tracker = AnomalyTracker::default();
        tracker.track_discard_ack("a", 3);
        tracker.track_discard_ack("a", 2);
        tracker.track_discard_ack("b", 1);
        assert_eq!(tracker.discard_ack_count(), 6);
        assert_eq!(tracker.discards_for_topic("a"), 5);
        assert_eq!(tracker.discards_for_topic("b"), 1);
        assert_eq!(tracker.discards_for_topic("c"), 0);
    }
}
