use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::dispatch::{Connector, DispatcherSharedState, SignalButton};
use crate::message::{BatchOfLists, Msg};
use crate::metadata::Metadata;
use crate::service::{AppError, AppResult, DispatcherConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Started,
    ShuttingDown,
    Joined,
}

/// Owns one connector per broker, fans messages out by broker index and
/// aggregates the pause/shutdown signalling and the post-shutdown residual
/// queues.
#[derive(Debug)]
pub struct Dispatcher {
    ds: Arc<DispatcherSharedState>,
    state: AtomicCell<DispatcherState>,
    /// `Some(true)` once a fast shutdown was requested, `Some(false)` for slow.
    shutdown_requested: Option<bool>,
    ok_shutdown: bool,
    connectors: Vec<Connector>,
}

impl Dispatcher {
    pub fn new(config: Arc<DispatcherConfig>) -> AppResult<Dispatcher> {
        let ds = Arc::new(DispatcherSharedState::new(config)?);
        Ok(Dispatcher {
            ds,
            state: AtomicCell::new(DispatcherState::Created),
            shutdown_requested: None,
            ok_shutdown: false,
            connectors: Vec::new(),
        })
    }

    pub fn state(&self) -> DispatcherState {
        self.state.load()
    }

    pub fn broker_count(&self) -> usize {
        self.connectors.len()
    }

    pub fn shared_state(&self) -> &DispatcherSharedState {
        &self.ds
    }

    /// Builds one connector per broker in the metadata snapshot and spawns
    /// their worker tasks.
    pub fn start(&mut self, metadata: Arc<Metadata>) -> AppResult<()> {
        if self.state.load() != DispatcherState::Created {
            return Err(AppError::IllegalState("dispatcher already started".into()));
        }
        info!(
            brokers = metadata.brokers().len(),
            "starting dispatcher connectors"
        );
        for broker_index in 0..metadata.brokers().len() {
            let mut connector = Connector::new(broker_index, self.ds.clone(), metadata.clone());
            connector.start()?;
            self.connectors.push(connector);
        }
        self.state.store(DispatcherState::Started);
        Ok(())
    }

    /// Routes one message through the batching path of the target broker's
    /// input queue.
    pub fn dispatch(&self, mut msg: Msg, broker_index: usize) -> AppResult<()> {
        let connector = self.connector(broker_index)?;
        self.ds
            .msg_state_tracker
            .msg_enter_batching(std::slice::from_mut(&mut msg));
        connector.input_queue().put(vec![msg]);
        Ok(())
    }

    /// Routes one message bypassing the batch time limit. Unlike
    /// `dispatch`, this stays available while a slow shutdown drains, so
    /// the router can flush; anything enqueued too late surfaces in the
    /// send-wait residuals.
    pub fn dispatch_now(&self, mut msg: Msg, broker_index: usize) -> AppResult<()> {
        let connector = self.flush_connector(broker_index)?;
        self.ds
            .msg_state_tracker
            .msg_enter_batching(std::slice::from_mut(&mut msg));
        connector.input_queue().put_now(vec![msg]);
        Ok(())
    }

    /// Routes a whole batch bypassing the batch time limit.
    pub fn dispatch_batch_now(&self, mut batch: BatchOfLists, broker_index: usize) -> AppResult<()> {
        let connector = self.flush_connector(broker_index)?;
        for msgs in &mut batch {
            self.ds.msg_state_tracker.msg_enter_batching(msgs);
        }
        connector.input_queue().put_batch_now(batch);
        Ok(())
    }

    /// Fans a slow shutdown out to every connector and waits for each to
    /// acknowledge it. Rejected once any shutdown has been requested.
    pub async fn start_slow_shutdown(&mut self, start: Instant) -> AppResult<()> {
        if self.state.load() != DispatcherState::Started {
            return Err(AppError::IllegalState(
                "dispatcher is not running".into(),
            ));
        }
        if self.shutdown_requested.is_some() {
            return Err(AppError::IllegalState(
                "shutdown already requested".into(),
            ));
        }
        self.shutdown_requested = Some(false);
        self.state.store(DispatcherState::ShuttingDown);
        for connector in &mut self.connectors {
            connector.start_slow_shutdown(start)?;
        }
        for connector in &self.connectors {
            connector.wait_for_shutdown_ack().await;
        }
        Ok(())
    }

    /// Fans a fast shutdown out to every connector. Allowed on its own or
    /// as a promotion of an earlier slow shutdown; a second fast shutdown
    /// is rejected.
    pub async fn start_fast_shutdown(&mut self) -> AppResult<()> {
        if !matches!(
            self.state.load(),
            DispatcherState::Started | DispatcherState::ShuttingDown
        ) {
            return Err(AppError::IllegalState(
                "dispatcher is not running".into(),
            ));
        }
        if self.shutdown_requested == Some(true) {
            return Err(AppError::IllegalState(
                "fast shutdown already requested".into(),
            ));
        }
        self.shutdown_requested = Some(true);
        self.state.store(DispatcherState::ShuttingDown);
        for connector in &mut self.connectors {
            connector.start_fast_shutdown()?;
        }
        for connector in &self.connectors {
            connector.wait_for_shutdown_ack().await;
        }
        Ok(())
    }

    /// Waits for every worker to exit, then collects each connector's
    /// residual messages into the per-broker output queues.
    pub async fn join_all(&mut self) -> AppResult<()> {
        if self.state.load() == DispatcherState::Joined {
            return Ok(());
        }
        let mut all_ok = true;
        for connector in &mut self.connectors {
            connector.join().await;
            connector.cleanup_after_join();
            all_ok &= connector.shutdown_was_ok();
        }
        self.ok_shutdown = all_ok;
        self.state.store(DispatcherState::Joined);
        if all_ok {
            info!("all connector tasks joined, shutdown ok");
        } else {
            warn!("all connector tasks joined, at least one finished on error");
        }
        Ok(())
    }

    pub fn shutdown_was_ok(&self) -> bool {
        self.ok_shutdown
    }

    /// Readable as soon as any connector has asserted a pause.
    pub fn pause_button(&self) -> &SignalButton {
        &self.ds.pause_button
    }

    /// Readable as soon as any connector task has finished.
    pub fn shutdown_wait(&self) -> &SignalButton {
        &self.ds.shutdown_wait
    }

    /// Messages that were definitely not sent; safe to re-route.
    pub fn take_send_wait_queue_after_shutdown(
        &mut self,
        broker_index: usize,
    ) -> AppResult<BatchOfLists> {
        let connector = self.connector_mut(broker_index)?;
        Ok(connector.take_send_wait_queue_after_shutdown())
    }

    /// Messages that were sent but never acknowledged; possibly delivered,
    /// so rerouting may duplicate them.
    pub fn take_no_ack_queue_after_shutdown(
        &mut self,
        broker_index: usize,
    ) -> AppResult<BatchOfLists> {
        let connector = self.connector_mut(broker_index)?;
        Ok(connector.take_no_ack_queue_after_shutdown())
    }

    /// Total produce responses processed across all connectors.
    pub fn ack_count(&self) -> u64 {
        self.ds.get_ack_count()
    }

    fn connector(&self, broker_index: usize) -> AppResult<&Connector> {
        if self.state.load() != DispatcherState::Started {
            return Err(AppError::IllegalState("dispatcher is not running".into()));
        }
        self.connectors.get(broker_index).ok_or_else(|| {
            AppError::InvalidValue(format!("no connector for broker index {}", broker_index))
        })
    }

    /// Like `connector`, but also valid during a slow shutdown. A fast
    /// shutdown closes the flush window.
    fn flush_connector(&self, broker_index: usize) -> AppResult<&Connector> {
        let running = self.state.load() == DispatcherState::Started
            || (self.state.load() == DispatcherState::ShuttingDown
                && self.shutdown_requested == Some(false));
        if !running {
            return Err(AppError::IllegalState("dispatcher is not running".into()));
        }
        self.connectors.get(broker_index).ok_or_else(|| {
            AppError::InvalidValue(format!("no connector for broker index {}", broker_index))
        })
    }

    fn connector_mut(&mut self, broker_index: usize) -> AppResult<&mut Connector> {
        self.connectors.get_mut(broker_index).ok_or_else(|| {
            AppError::InvalidValue(format!("no connector for broker index {}", broker_index))
        })
    }
}
