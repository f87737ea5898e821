use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::dispatch::{
    DispatcherSharedState, InputQueue, ProduceRequest, ProduceResponseProcessor, RequestFactory,
    ResponseAction, SignalButton,
};
use crate::message::{BatchOfLists, MsgDebugLogger, MsgLogId};
use crate::metadata::Metadata;
use crate::network::{is_lost_connection, ReaderState, SendBuf, StreamMsgReader};
use crate::protocol::Acks;
use crate::service::{AppError, AppResult};

/// Timer waits beyond this are clamped; an absurd deadline usually means a
/// clock problem upstream.
const MAX_POLL_WAIT: Duration = Duration::from_millis(i32::MAX as u64);

#[derive(Debug, Clone, Copy)]
pub(crate) enum ShutdownCmd {
    Slow { start: Instant },
    Fast,
    Destroy,
}

#[derive(Debug, Clone, Copy)]
struct InProgressShutdown {
    deadline: Instant,
    fast: bool,
}

/// What the next multiplexed wait must cover, computed fresh each loop
/// iteration from the connector state.
#[derive(Debug, Clone, Copy)]
struct PollPlan {
    watch_write: bool,
    watch_read: bool,
    watch_input: bool,
    deadline: Option<Instant>,
}

impl PollPlan {
    fn watches_socket(&self) -> bool {
        self.watch_write || self.watch_read
    }

    fn interest(&self) -> Option<Interest> {
        match (self.watch_write, self.watch_read) {
            (true, true) => Some(Interest::WRITABLE | Interest::READABLE),
            (true, false) => Some(Interest::WRITABLE),
            (false, true) => Some(Interest::READABLE),
            (false, false) => None,
        }
    }
}

enum Wake {
    Shutdown(Option<ShutdownCmd>),
    Pause,
    Input,
    Sock(io::Result<Ready>),
    Timeout,
}

/// Dispatcher-side handle of one per-broker connector. The worker state
/// lives in [`ConnectorCore`], which the spawned task owns exclusively and
/// hands back when it finishes so leftovers survive the join.
#[derive(Debug)]
pub struct Connector {
    broker_index: usize,
    ds: Arc<DispatcherSharedState>,
    input_queue: Arc<InputQueue>,
    shutdown_tx: mpsc::Sender<ShutdownCmd>,
    /// One permit per acknowledged shutdown command.
    shutdown_ack: Arc<Notify>,
    finished: SignalButton,
    core: Option<ConnectorCore>,
    handle: Option<JoinHandle<ConnectorCore>>,
    finished_core: Option<ConnectorCore>,
    /// `Some(true)` once a fast shutdown was requested, `Some(false)` for slow.
    shutdown_cmd_sent: Option<bool>,
    ok_shutdown: bool,
    send_wait_after_shutdown: BatchOfLists,
    no_ack_after_shutdown: BatchOfLists,
}

impl Connector {
    pub(crate) fn new(
        broker_index: usize,
        ds: Arc<DispatcherSharedState>,
        metadata: Arc<Metadata>,
    ) -> Connector {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
        let input_queue = Arc::new(InputQueue::new(Duration::from_millis(
            ds.config.batch.batch_time_limit_ms(),
        )));
        let shutdown_ack = Arc::new(Notify::new());
        let finished = SignalButton::new();
        let debug_msgs = ds.config.dispatch.debug_log_messages;

        let mut request_factory = RequestFactory::new(&ds.config, ds.required_acks, broker_index);
        request_factory.init(ds.config.compression, metadata.clone());

        let core = ConnectorCore {
            broker_index,
            ds: ds.clone(),
            metadata,
            input_queue: input_queue.clone(),
            shutdown_rx,
            shutdown_ack: shutdown_ack.clone(),
            finished: finished.clone(),
            request_factory,
            stream_reader: StreamMsgReader::new(
                ds.config.network.max_response_size,
                ds.config.network.read_buffer_size,
            ),
            debug_logger_send: MsgDebugLogger::new(debug_msgs, MsgLogId::MsgSend),
            debug_logger_receive: MsgDebugLogger::new(debug_msgs, MsgLogId::MsgGotAck),
            sock: None,
            send_buf: SendBuf::default(),
            current_request: None,
            ack_wait_queue: VecDeque::new(),
            opt_in_progress_shutdown: None,
            pause_in_progress: false,
            opt_next_batch_expiry: None,
            got_ack_after_pause: BatchOfLists::new(),
            no_ack_after_pause: BatchOfLists::new(),
            ok_shutdown: false,
        };

        Connector {
            broker_index,
            ds,
            input_queue,
            shutdown_tx,
            shutdown_ack,
            finished,
            core: Some(core),
            handle: None,
            finished_core: None,
            shutdown_cmd_sent: None,
            ok_shutdown: false,
            send_wait_after_shutdown: BatchOfLists::new(),
            no_ack_after_shutdown: BatchOfLists::new(),
        }
    }

    pub fn broker_index(&self) -> usize {
        self.broker_index
    }

    pub fn input_queue(&self) -> &InputQueue {
        &self.input_queue
    }

    pub(crate) fn start(&mut self) -> AppResult<()> {
        let core = self
            .core
            .take()
            .ok_or(AppError::IllegalState("connector already started".into()))?;
        self.ds.mark_connector_started();
        self.handle = Some(tokio::spawn(core.run()));
        Ok(())
    }

    pub(crate) fn is_started(&self) -> bool {
        self.core.is_none()
    }

    pub(crate) fn start_slow_shutdown(&mut self, start: Instant) -> AppResult<()> {
        if !self.is_started() {
            return Err(AppError::IllegalState("connector is not started".into()));
        }
        if self.shutdown_cmd_sent.is_some() {
            return Err(AppError::IllegalState(
                "connector shutdown already requested".into(),
            ));
        }
        self.ds.counters.connector_start_slow_shutdown.inc();
        info!(
            connector = self.broker_index,
            "sending slow shutdown request to connector task"
        );
        self.shutdown_cmd_sent = Some(false);
        self.shutdown_tx
            .try_send(ShutdownCmd::Slow { start })
            .map_err(|e| AppError::ChannelSend(e.to_string()))
    }

    pub(crate) fn start_fast_shutdown(&mut self) -> AppResult<()> {
        if !self.is_started() {
            return Err(AppError::IllegalState("connector is not started".into()));
        }
        if self.shutdown_cmd_sent == Some(true) {
            return Err(AppError::IllegalState(
                "connector fast shutdown already requested".into(),
            ));
        }
        self.ds.counters.connector_start_fast_shutdown.inc();
        info!(
            connector = self.broker_index,
            "sending fast shutdown request to connector task"
        );
        self.shutdown_cmd_sent = Some(true);
        self.shutdown_tx
            .try_send(ShutdownCmd::Fast)
            .map_err(|e| AppError::ChannelSend(e.to_string()))
    }

    /// Waits for the task to acknowledge the shutdown command. The task may
    /// also have finished on its own right before the command was sent, so
    /// its finished signal ends the wait too.
    pub(crate) async fn wait_for_shutdown_ack(&self) {
        self.ds.counters.connector_start_wait_shutdown_ack.inc();
        let blurb = tokio::select! {
            _ = self.shutdown_ack.notified() => "shutdown ACK",
            _ = self.finished.pushed() => "shutdown finished notification",
        };
        info!(
            connector = self.broker_index,
            "got {} from connector task", blurb
        );
        self.ds.counters.connector_finish_wait_shutdown_ack.inc();
    }

    /// Waits for the worker to exit. A panicking data-plane worker is
    /// unrecoverable: it is logged and the process exits with failure.
    pub(crate) async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(core) => {
                    self.ok_shutdown = core.ok_shutdown;
                    self.finished_core = Some(core);
                }
                Err(e) => {
                    error!(
                        connector = self.broker_index,
                        "fatal error in connector task: {e}"
                    );
                    std::process::exit(1);
                }
            }
        }
    }

    /// Moves all residual messages into the two per-broker output queues,
    /// ordered to minimise reordering on reroute.
    pub(crate) fn cleanup_after_join(&mut self) {
        let Some(mut core) = self.finished_core.take() else {
            return;
        };
        self.ds.counters.connector_cleanup_after_join.inc();

        if let Some(request) = core.current_request.take() {
            request.empty_all_topics_into(&mut self.send_wait_after_shutdown);
        }
        self.send_wait_after_shutdown
            .append(&mut core.got_ack_after_pause);
        self.send_wait_after_shutdown
            .extend(core.request_factory.get_all());
        self.send_wait_after_shutdown
            .extend(self.input_queue.reset());

        self.no_ack_after_shutdown
            .append(&mut core.no_ack_after_pause);
        for request in core.ack_wait_queue.drain(..) {
            request.empty_all_topics_into(&mut self.no_ack_after_shutdown);
        }

        let possible_duplicates: usize =
            self.no_ack_after_shutdown.iter().map(|l| l.len()).sum();
        if possible_duplicates > 0 {
            self.ds
                .anomaly_tracker
                .track_possible_duplicates(possible_duplicates as u64);
        }
    }

    pub(crate) fn shutdown_was_ok(&self) -> bool {
        self.ok_shutdown
    }

    pub(crate) fn take_send_wait_queue_after_shutdown(&mut self) -> BatchOfLists {
        std::mem::take(&mut self.send_wait_after_shutdown)
    }

    pub(crate) fn take_no_ack_queue_after_shutdown(&mut self) -> BatchOfLists {
        std::mem::take(&mut self.no_ack_after_shutdown)
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        // Dropping a still-running connector tells the task to exit at its
        // next wakeup instead of leaking it.
        if self.handle.is_some() {
            let _ = self.shutdown_tx.try_send(ShutdownCmd::Destroy);
        }
    }
}

/// Task-side state of one connector: the socket, the send buffer, the
/// pipeline of unacknowledged requests and the shutdown state machine. All
/// of it is exclusively owned; cross-task communication happens only through
/// the input queue, the shutdown channel and the shared signals.
#[derive(Debug)]
pub(crate) struct ConnectorCore {
    broker_index: usize,
    ds: Arc<DispatcherSharedState>,
    metadata: Arc<Metadata>,
    input_queue: Arc<InputQueue>,
    shutdown_rx: mpsc::Receiver<ShutdownCmd>,
    shutdown_ack: Arc<Notify>,
    finished: SignalButton,
    request_factory: RequestFactory,
    stream_reader: StreamMsgReader,
    debug_logger_send: MsgDebugLogger,
    debug_logger_receive: MsgDebugLogger,
    sock: Option<TcpStream>,
    send_buf: SendBuf,
    current_request: Option<ProduceRequest>,
    ack_wait_queue: VecDeque<ProduceRequest>,
    opt_in_progress_shutdown: Option<InProgressShutdown>,
    pause_in_progress: bool,
    opt_next_batch_expiry: Option<Instant>,
    got_ack_after_pause: BatchOfLists,
    no_ack_after_pause: BatchOfLists,
    ok_shutdown: bool,
}

impl ConnectorCore {
    pub(crate) async fn run(mut self) -> ConnectorCore {
        self.ds.counters.connector_start_run.inc();
        let broker_id = self.broker_id();
        info!(
            connector = self.broker_index,
            broker = broker_id,
            "connector task started"
        );
        self.do_run().await;
        // close the TCP connection on every exit path
        self.sock = None;
        if self.ok_shutdown {
            info!(
                connector = self.broker_index,
                broker = broker_id,
                "connector task finished normally"
            );
        } else {
            warn!(
                connector = self.broker_index,
                broker = broker_id,
                "connector task finished on error"
            );
        }
        self.finished.push();
        self.ds.mark_connector_finished();
        self.ds.counters.connector_finish_run.inc();
        self
    }

    fn broker_id(&self) -> i32 {
        self.metadata
            .broker(self.broker_index)
            .map(|b| b.id)
            .unwrap_or(-1)
    }

    fn kafka_socket_timeout(&self) -> Duration {
        Duration::from_secs(self.ds.config.network.kafka_socket_timeout_secs)
    }

    async fn do_run(&mut self) {
        self.ok_shutdown = false;
        let broker_id = self.broker_id();

        if !self.connect_to_broker().await {
            return;
        }
        self.stream_reader.reset();

        loop {
            let start = Instant::now();
            let Some(plan) = self.prepare_for_poll(start) else {
                self.ok_shutdown = true;
                break;
            };

            let wake = self.wait_for_event(&plan).await;
            // defend against anything unexpected from the timer source
            let finish = start.max(Instant::now());

            match wake {
                Wake::Shutdown(None) | Wake::Shutdown(Some(ShutdownCmd::Destroy)) => {
                    // the dispatcher is going away; exit immediately
                    break;
                }
                Wake::Shutdown(Some(cmd)) => self.handle_shutdown_request(cmd),
                Wake::Pause => self.handle_pause_detected(),
                Wake::Input => self.check_input_queue(finish, true),
                Wake::Sock(Err(e)) => {
                    error!(
                        connector = self.broker_index,
                        broker = broker_id,
                        "starting pause and finishing due to socket error: {e}"
                    );
                    self.ds.counters.connector_socket_error.inc();
                    self.ds.pause_button.push();
                    break;
                }
                Wake::Sock(Ok(ready)) => {
                    if plan.watch_write && ready.is_writable() && !self.handle_sock_write_ready()
                    {
                        break;
                    }
                    if plan.watch_read && ready.is_readable() && !self.handle_sock_read_ready() {
                        break;
                    }
                }
                Wake::Timeout => {
                    if plan.watches_socket() && finish - start >= self.kafka_socket_timeout() {
                        error!(
                            connector = self.broker_index,
                            broker = broker_id,
                            "starting pause due to socket timeout in main loop"
                        );
                        self.ds.counters.connector_socket_timeout.inc();
                        self.ds.pause_button.push();
                        break;
                    }
                    if let Some(shutdown) = self.opt_in_progress_shutdown {
                        if finish >= shutdown.deadline {
                            self.ok_shutdown = true;
                            info!(
                                connector = self.broker_index,
                                broker = broker_id,
                                "finishing on shutdown time limit expiration"
                            );
                            break;
                        }
                    }
                    // batch time limit expiry
                    self.check_input_queue(finish, false);
                }
            }
        }
    }

    /// Computes the wait set and timeout for the next loop iteration.
    /// Returns `None` when nothing is left to do and the loop should exit
    /// cleanly.
    fn prepare_for_poll(&mut self, now: Instant) -> Option<PollPlan> {
        let send_in_progress = self.send_buf.has_unsent();
        debug_assert_eq!(self.current_request.is_some(), send_in_progress);
        // detecting a pause always activates fast shutdown, so a paused
        // connector can neither start a new send nor wait for batch expiry
        debug_assert!(
            !self.pause_in_progress
                || matches!(self.opt_in_progress_shutdown, Some(s) if s.fast)
        );

        let need_read = !self.ack_wait_queue.is_empty();
        let mut need_write = false;
        let mut need_shutdown_timeout = false;
        let mut need_batch_timeout = false;

        if send_in_progress {
            // a partially sent request is always finished, even past the
            // shutdown deadline; batched messages cannot go out before it
            need_write = true;
        } else if let Some(shutdown) = self.opt_in_progress_shutdown {
            // fast shutdown stops sending immediately; slow keeps sending
            // until the factory drains or the time limit expires
            need_write = !self.request_factory.is_empty() && !shutdown.fast;
            if !need_write && !need_read {
                return None;
            }
            need_shutdown_timeout = true;
            need_batch_timeout = self.opt_next_batch_expiry.is_some() && !shutdown.fast;
        } else {
            need_write = !self.request_factory.is_empty();
            need_batch_timeout = self.opt_next_batch_expiry.is_some();
        }

        let mut deadline: Option<Instant> = None;
        if need_write || need_read {
            deadline = Some(now + self.kafka_socket_timeout());
        }
        if need_shutdown_timeout {
            if let Some(shutdown) = self.opt_in_progress_shutdown {
                deadline = Some(match deadline {
                    Some(d) => d.min(shutdown.deadline),
                    None => shutdown.deadline,
                });
            }
        }
        if need_batch_timeout {
            if let Some(expiry) = self.opt_next_batch_expiry {
                deadline = Some(match deadline {
                    Some(d) => d.min(expiry),
                    None => expiry,
                });
            }
        }
        if let Some(d) = deadline {
            if d.saturating_duration_since(now) > MAX_POLL_WAIT {
                warn!(
                    connector = self.broker_index,
                    "truncating ridiculously long poll timeout"
                );
                self.ds.counters.connector_truncate_long_timeout.inc();
                deadline = Some(now + MAX_POLL_WAIT);
            }
        }

        Some(PollPlan {
            watch_write: need_write,
            watch_read: need_read,
            // stop accepting input once any shutdown is in progress; the
            // slow path has already drained the queue
            watch_input: self.opt_in_progress_shutdown.is_none(),
            deadline,
        })
    }

    /// One multiplexed wait covering the shutdown channel, the pause
    /// signal, the input queue, socket readiness and the computed deadline,
    /// with exactly that priority order.
    async fn wait_for_event(&mut self, plan: &PollPlan) -> Wake {
        let interest = plan.interest();
        let pause_in_progress = self.pause_in_progress;
        let watch_input = plan.watch_input;
        let deadline = plan.deadline;

        let Self {
            sock,
            shutdown_rx,
            input_queue,
            ds,
            ..
        } = self;
        let sock_io = async {
            match (interest, sock.as_ref()) {
                (Some(interest), Some(sock)) => sock.ready(interest).await,
                _ => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            cmd = shutdown_rx.recv() => Wake::Shutdown(cmd),
            _ = ds.pause_button.pushed(), if !pause_in_progress => Wake::Pause,
            _ = input_queue.notified(), if watch_input => Wake::Input,
            result = sock_io, if interest.is_some() => Wake::Sock(result),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Timeout,
        }
    }

    async fn connect_to_broker(&mut self) -> bool {
        self.ds.counters.connector_start_connect.inc();
        let Some(broker) = self.metadata.broker(self.broker_index) else {
            error!(
                connector = self.broker_index,
                "no broker at this index in metadata"
            );
            self.ds.counters.connector_connect_fail.inc();
            self.ds.pause_button.push();
            return false;
        };
        let (host, port, broker_id) = (broker.host.clone(), broker.port, broker.id);
        debug_assert!(broker.in_service);
        info!(
            connector = self.broker_index,
            broker = broker_id,
            host = host.as_str(),
            port,
            "connecting to broker"
        );

        let connect_timeout = Duration::from_millis(self.ds.config.network.connect_timeout_ms);
        match timeout(connect_timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(sock)) => {
                self.sock = Some(sock);
                self.ds.counters.connector_connect_success.inc();
                info!(
                    connector = self.broker_index,
                    broker = broker_id,
                    "connect successful"
                );
                true
            }
            Ok(Err(e)) => {
                error!(
                    connector = self.broker_index,
                    broker = broker_id,
                    host = host.as_str(),
                    port,
                    "starting pause on failure to connect to broker: {e}"
                );
                self.ds.counters.connector_connect_fail.inc();
                self.ds.pause_button.push();
                false
            }
            Err(_) => {
                error!(
                    connector = self.broker_index,
                    broker = broker_id,
                    host = host.as_str(),
                    port,
                    "starting pause on connect timeout"
                );
                self.ds.counters.connector_connect_fail.inc();
                self.ds.pause_button.push();
                false
            }
        }
    }

    fn set_fast_shutdown_state(&mut self) {
        let deadline = Instant::now()
            + Duration::from_millis(self.ds.config.dispatch.dispatcher_restart_max_delay_ms);
        match &mut self.opt_in_progress_shutdown {
            Some(shutdown) => {
                shutdown.deadline = shutdown.deadline.min(deadline);
                shutdown.fast = true;
            }
            None => {
                self.opt_in_progress_shutdown = Some(InProgressShutdown {
                    deadline,
                    fast: true,
                });
            }
        }
    }

    fn set_pause_in_progress(&mut self) {
        self.pause_in_progress = true;
        self.set_fast_shutdown_state();
    }

    fn handle_pause_detected(&mut self) {
        info!(
            connector = self.broker_index,
            broker = self.broker_id(),
            "detected pause: starting fast shutdown"
        );
        self.set_pause_in_progress();
    }

    fn handle_shutdown_request(&mut self, cmd: ShutdownCmd) {
        let is_fast = match cmd {
            ShutdownCmd::Fast => {
                self.set_fast_shutdown_state();
                true
            }
            ShutdownCmd::Slow { start } => {
                // the router flushed everything it had before requesting a
                // slow shutdown; collect it before we stop watching input
                let remaining = self.input_queue.get_all_on_shutdown();
                self.request_factory.put(remaining);

                let deadline = start
                    + Duration::from_millis(self.ds.config.dispatch.shutdown_max_delay_ms);
                match &mut self.opt_in_progress_shutdown {
                    Some(shutdown) => shutdown.deadline = shutdown.deadline.min(deadline),
                    None => {
                        self.opt_in_progress_shutdown = Some(InProgressShutdown {
                            deadline,
                            fast: false,
                        });
                    }
                }
                false
            }
            ShutdownCmd::Destroy => return,
        };
        info!(
            connector = self.broker_index,
            broker = self.broker_id(),
            "sending ACK for {} shutdown",
            if is_fast { "fast" } else { "slow" }
        );
        self.shutdown_ack.notify_one();
    }

    fn check_input_queue(&mut self, now: Instant, consume_wakeup: bool) {
        self.ds.counters.connector_check_input_queue.inc();
        let mut ready = BatchOfLists::new();
        let expiry = if consume_wakeup {
            self.input_queue.get(now, &mut ready)
        } else {
            self.input_queue.nonblocking_get(now, &mut ready)
        };
        self.opt_next_batch_expiry = expiry;
        self.request_factory.put(ready);
    }

    /// One non-blocking send. Returns false when the connection is gone and
    /// the loop must exit; partial writes are normal and the next writable
    /// wakeup continues them.
    fn try_send_produce_request(&mut self) -> bool {
        let Some(sock) = self.sock.as_ref() else {
            error!(
                connector = self.broker_index,
                "send attempted without a connection"
            );
            return false;
        };
        match sock.try_write(self.send_buf.unsent()) {
            Ok(n) => {
                self.send_buf.mark_consumed(n);
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) => {
                if !is_lost_connection(&e) {
                    // not a connection-level errno; still fatal for this
                    // connector, but called out separately in the log
                    error!(
                        connector = self.broker_index,
                        broker = self.broker_id(),
                        "unexpected error during send: {e}"
                    );
                }
                error!(
                    connector = self.broker_index,
                    broker = self.broker_id(),
                    "starting pause and finishing due to lost TCP connection during send: {e}"
                );
                self.ds.counters.connector_socket_error.inc();
                self.ds.pause_button.push();
                false
            }
        }
    }

    fn handle_sock_write_ready(&mut self) -> bool {
        debug_assert_eq!(self.current_request.is_some(), self.send_buf.has_unsent());

        if !self.send_buf.has_unsent() {
            // starting a new produce request rather than continuing one
            let mut buf = self.send_buf.take_storage();
            self.current_request = self.request_factory.build_request(&mut buf);
            if self.current_request.is_none() {
                // the loop only gets here when the factory reported pending
                // messages
                error!(
                    connector = self.broker_index,
                    "bug: produce request is empty"
                );
                self.ds.counters.bug_produce_request_empty.inc();
                return true;
            }
            self.send_buf.load(buf);
        }

        if !self.try_send_produce_request() {
            // socket error: pause has been initiated. CurrentRequest stays
            // in place so its messages are rerouted after the restart.
            return false;
        }

        if !self.send_buf.has_unsent() {
            self.finish_send();
        }
        true
    }

    fn finish_send(&mut self) {
        self.ds.counters.send_produce_request_ok.inc();
        let Some(mut request) = self.current_request.take() else {
            error!(
                connector = self.broker_index,
                "bug: send finished without a current request"
            );
            self.ds.counters.bug_produce_request_empty.inc();
            return;
        };
        debug!(
            connector = self.broker_index,
            correlation_id = request.correlation_id,
            msgs = request.msg_count(),
            "produce request fully sent"
        );

        let ack_expected = self.ds.required_acks != Acks::None;
        for group in request.topics.values_mut() {
            for set in group.values_mut() {
                if ack_expected {
                    self.ds
                        .msg_state_tracker
                        .msg_enter_ack_wait(&mut set.contents);
                } else {
                    self.ds.counters.ack_not_required.inc();
                    self.ds
                        .msg_state_tracker
                        .msg_enter_processed(&mut set.contents);
                }
                self.debug_logger_send.log_msg_list(&set.contents);
            }
        }
        if ack_expected {
            self.ack_wait_queue.push_back(request);
        }
    }

    /// Attempts one large read, then processes as many complete responses
    /// as the buffer holds. Returns false when the loop must exit.
    fn handle_sock_read_ready(&mut self) -> bool {
        debug_assert!(!self.ack_wait_queue.is_empty());
        self.ds.counters.connector_do_socket_read.inc();
        let broker_id = self.broker_id();

        let Some(sock) = self.sock.as_ref() else {
            error!(
                connector = self.broker_index,
                "read attempted without a connection"
            );
            return false;
        };
        let mut state = match self.stream_reader.read(sock) {
            Ok(state) => state,
            Err(e) => {
                if !is_lost_connection(&e) {
                    error!(
                        connector = self.broker_index,
                        broker = broker_id,
                        "unexpected error during read: {e}"
                    );
                }
                error!(
                    connector = self.broker_index,
                    broker = broker_id,
                    "starting pause due to lost TCP connection on attempted read: {e}"
                );
                self.ds.counters.connector_socket_error.inc();
                self.ds.pause_button.push();
                return false;
            }
        };
        self.ds.counters.connector_socket_read_success.inc();

        loop {
            match state {
                ReaderState::ReadNeeded => return true,
                ReaderState::MsgReady => {}
                ReaderState::DataInvalid => {
                    error!(
                        connector = self.broker_index,
                        broker = broker_id,
                        "starting pause due to invalid response size from broker"
                    );
                    self.ds.counters.bad_produce_response_size.inc();
                    self.ds.pause_button.push();
                    return false;
                }
                ReaderState::AtEnd => {
                    error!(
                        connector = self.broker_index,
                        broker = broker_id,
                        "starting pause because broker unexpectedly closed the connection \
                         while responses were outstanding"
                    );
                    self.ds.counters.connector_socket_broker_close.inc();
                    self.ds.pause_button.push();
                    return false;
                }
            }

            if !self.process_single_produce_response() {
                break;
            }
            state = self.stream_reader.consume_ready_msg();

            if self.ack_wait_queue.is_empty() && state == ReaderState::MsgReady {
                error!(
                    connector = self.broker_index,
                    broker = broker_id,
                    "starting pause due to unsolicited response data from broker"
                );
                self.ds.pause_button.push();
                break;
            }
        }
        false
    }

    fn process_single_produce_response(&mut self) -> bool {
        let Some(request) = self.ack_wait_queue.pop_front() else {
            error!(
                connector = self.broker_index,
                "bug: response arrived with an empty ack-wait queue"
            );
            return false;
        };
        let mut processor = ProduceResponseProcessor::new(
            self.ds.clone(),
            self.debug_logger_receive,
            self.broker_index,
            self.broker_id(),
        );

        let frame = self.stream_reader.ready_msg().unwrap_or(&[]);
        let result = processor.process_response(request, frame);

        let mut keep_running = true;
        let mut pause = false;
        match result {
            Ok(ResponseAction::KeepRunning) => {}
            Ok(ResponseAction::PauseAndDeferFinish) => {
                // keep collecting outstanding ACKs until the fast-shutdown
                // deadline
                self.set_pause_in_progress();
                pause = true;
            }
            Ok(ResponseAction::PauseAndFinishNow) => {
                keep_running = false;
                pause = true;
                self.no_ack_after_pause
                    .extend(processor.take_msgs_without_acks());
            }
            Err(e) => {
                error!(
                    connector = self.broker_index,
                    broker = self.broker_id(),
                    "starting pause due to unexpected response from broker: {e}"
                );
                self.ds.counters.bad_produce_response.inc();
                keep_running = false;
                pause = true;
            }
        }

        if pause {
            self.ds.pause_button.push();
            // messages whose error ACK requires rerouting with new metadata
            self.got_ack_after_pause
                .extend(processor.take_pause_and_resend_ack_msgs());
        }

        // error ACKs that allow retransmission without rerouting
        self.request_factory
            .put_front(processor.take_immediate_resend_ack_msgs());

        keep_running
    }
}
