use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::{DispatchCounters, SignalButton};
use crate::message::{AnomalyTracker, MsgStateTracker};
use crate::protocol::Acks;
use crate::service::{AppResult, DispatcherConfig};

/// Process-wide values referenced by every connector: the configuration
/// snapshot, the pause and shutdown-wait signals, the shared trackers and
/// the event counters. Outlives all connectors and is passed by `Arc`.
#[derive(Debug)]
pub struct DispatcherSharedState {
    pub config: Arc<DispatcherConfig>,
    pub required_acks: Acks,
    pub pause_button: SignalButton,
    pub shutdown_wait: SignalButton,
    pub msg_state_tracker: MsgStateTracker,
    pub anomaly_tracker: AnomalyTracker,
    pub counters: DispatchCounters,
    ack_count: AtomicU64,
    live_connectors: AtomicUsize,
}

impl DispatcherSharedState {
    pub fn new(config: Arc<DispatcherConfig>) -> AppResult<DispatcherSharedState> {
        let required_acks = Acks::from_i16(config.general.required_acks)?;
        Ok(DispatcherSharedState {
            config,
            required_acks,
            pause_button: SignalButton::new(),
            shutdown_wait: SignalButton::new(),
            msg_state_tracker: MsgStateTracker::default(),
            anomaly_tracker: AnomalyTracker::default(),
            counters: DispatchCounters::default(),
            ack_count: AtomicU64::new(0),
            live_connectors: AtomicUsize::new(0),
        })
    }

    pub fn increment_ack_count(&self) {
        self.ack_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_ack_count(&self) -> u64 {
        self.ack_count.load(Ordering::Relaxed)
    }

    pub fn mark_connector_started(&self) {
        self.live_connectors.fetch_add(1, Ordering::Relaxed);
    }

    /// Called by each connector task on exit; raises the shutdown-wait
    /// signal so the dispatcher owner can react to the first finisher.
    pub fn mark_connector_finished(&self) {
        self.live_connectors.fetch_sub(1, Ordering::Relaxed);
        self.shutdown_wait.push();
    }

    pub fn live_connector_count(&self) -> usize {
        self.live_connectors.load(Ordering::Relaxed)
    }
}
