use std::sync::atomic::{AtomicI64, Ordering};

use crate::message::{Msg, MsgState};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MsgStateCounts {
    pub batching: i64,
    pub ack_wait: i64,
    pub processed: i64,
    pub lost: i64,
}

/// Shared gauge of how many messages currently sit in each pipeline state.
/// Connectors never touch a message's state bit directly; every transition
/// goes through here so the gauges stay consistent with the messages.
#[derive(Debug, Default)]
pub struct MsgStateTracker {
    batching: AtomicI64,
    ack_wait: AtomicI64,
    processed: AtomicI64,
    lost: AtomicI64,
}

impl MsgStateTracker {
    pub fn msg_enter_batching(&self, msgs: &mut [Msg]) {
        self.transition(msgs, MsgState::Batching);
    }

    pub fn msg_enter_ack_wait(&self, msgs: &mut [Msg]) {
        self.transition(msgs, MsgState::AckWait);
    }

    pub fn msg_enter_processed(&self, msgs: &mut [Msg]) {
        self.transition(msgs, MsgState::Processed);
    }

    pub fn msg_enter_lost(&self, msgs: &mut [Msg]) {
        self.transition(msgs, MsgState::Lost);
    }

    pub fn counts(&self) -> MsgStateCounts {
        MsgStateCounts {
            batching: self.batching.load(Ordering::Relaxed),
            ack_wait: self.ack_wait.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }

    fn transition(&self, msgs: &mut [Msg], to: MsgState) {
        for msg in msgs {
            let from = msg.state();
            if from == to {
                continue;
            }
            if let Some(gauge) = self.gauge(from) {
                gauge.fetch_sub(1, Ordering::Relaxed);
            }
            msg.set_state(to);
            if let Some(gauge) = self.gauge(to) {
                gauge.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn gauge(&self, state: MsgState) -> Option<&AtomicI64> {
        match state {
            MsgState::New => None,
            MsgState::Batching => Some(&self.batching),
            MsgState::AckWait => Some(&self.ack_wait),
            MsgState::Processed => Some(&self.processed),
            MsgState::Lost => Some(&self.lost),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn msg() -> Msg {
        Msg::new("t", None, 0, Bytes::from_static(b"payload"), 1)
    }

    #[test]
    fn transitions_move_gauges() {
        let tracker = MsgStateTracker::default();
        let mut msgs = vec![msg(), msg()];

        tracker.msg_enter_batching(&mut msgs);
        assert_eq!(tracker.counts().batching, 2);

        tracker.msg_enter_ack_wait(&mut msgs);
        let counts = tracker.counts();
        assert_eq!(counts.batching, 0);
        assert_eq!(counts.ack_wait, 2);
        assert!(msgs.iter().all(|m| m.state() == MsgState::AckWait));

        tracker.msg_enter_processed(&mut msgs);
        let counts = tracker.counts();
        assert_eq!(counts.ack_wait, 0);
        assert_eq!(counts.processed, 2);
    }

    #[test]
    fn same_state_transition_is_a_noop() {
        let tracker = MsgStateTracker::default();
        let mut msgs = vec![msg()];
        tracker.msg_enter_batching(&mut msgs);
        tracker.msg_enter_batching(&mut msgs);
        assert_eq!(tracker.counts().batching, 1);
    }
}
