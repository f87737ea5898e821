use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Monotonic counters for every notable dispatcher event, shared by all
/// connectors.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    pub ack_not_required: Counter,
    pub ack_received: Counter,
    pub ack_error_immediate_resend: Counter,
    pub ack_error_pause_and_resend: Counter,
    pub ack_error_discard: Counter,
    pub bad_produce_response: Counter,
    pub bad_produce_response_size: Counter,
    pub bug_produce_request_empty: Counter,
    pub connector_check_input_queue: Counter,
    pub connector_cleanup_after_join: Counter,
    pub connector_connect_fail: Counter,
    pub connector_connect_success: Counter,
    pub connector_do_socket_read: Counter,
    pub connector_finish_run: Counter,
    pub connector_finish_wait_shutdown_ack: Counter,
    pub connector_socket_broker_close: Counter,
    pub connector_socket_error: Counter,
    pub connector_socket_read_success: Counter,
    pub connector_socket_timeout: Counter,
    pub connector_start_connect: Counter,
    pub connector_start_fast_shutdown: Counter,
    pub connector_start_run: Counter,
    pub connector_start_slow_shutdown: Counter,
    pub connector_start_wait_shutdown_ack: Counter,
    pub connector_truncate_long_timeout: Counter,
    pub send_produce_request_ok: Counter,
}
