use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::dispatch::{DispatcherSharedState, ProduceRequest};
use crate::message::{BatchOfLists, MsgDebugLogger};
use crate::protocol::{ErrorCode, ProduceResponse};
use crate::service::{AppError, AppResult};

/// What the connector should do after one response has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    KeepRunning,
    /// Fresh metadata is needed; keep collecting outstanding ACKs until the
    /// fast-shutdown deadline.
    PauseAndDeferFinish,
    /// Communication with this broker cannot continue.
    PauseAndFinishNow,
}

/// Classifies one decoded produce response against the request it answers
/// (FIFO correspondence with the ack-wait queue) and sorts the affected
/// messages into resend and loss buckets for the connector to dispose of.
pub struct ProduceResponseProcessor {
    ds: Arc<DispatcherSharedState>,
    debug_logger: MsgDebugLogger,
    broker_index: usize,
    broker_id: i32,
    immediate_resend: BatchOfLists,
    pause_and_resend: BatchOfLists,
    without_acks: BatchOfLists,
}

impl ProduceResponseProcessor {
    pub fn new(
        ds: Arc<DispatcherSharedState>,
        debug_logger: MsgDebugLogger,
        broker_index: usize,
        broker_id: i32,
    ) -> ProduceResponseProcessor {
        ProduceResponseProcessor {
            ds,
            debug_logger,
            broker_index,
            broker_id,
            immediate_resend: BatchOfLists::new(),
            pause_and_resend: BatchOfLists::new(),
            without_acks: BatchOfLists::new(),
        }
    }

    pub fn process_response(
        &mut self,
        request: ProduceRequest,
        frame: &[u8],
    ) -> AppResult<ResponseAction> {
        let response = match ProduceResponse::read_from(frame) {
            Ok(response) => response,
            Err(e) => {
                self.ds.anomaly_tracker.track_bad_response();
                return Err(e);
            }
        };
        if response.correlation_id != request.correlation_id {
            self.ds.anomaly_tracker.track_bad_response();
            return Err(AppError::BadProduceResponse(format!(
                "correlation id {} does not answer request {}",
                response.correlation_id, request.correlation_id
            )));
        }

        let mut topics = request.topics;
        let mut fatal = false;
        for topic_response in &response.topics {
            for partition_response in &topic_response.partitions {
                let set = topics
                    .get_mut(&topic_response.topic)
                    .and_then(|group| group.remove(&partition_response.partition));
                let Some(mut set) = set else {
                    self.ds.anomaly_tracker.track_bad_response();
                    return Err(AppError::BadProduceResponse(format!(
                        "ACK for {} partition {} which the request did not carry",
                        topic_response.topic, partition_response.partition
                    )));
                };
                match partition_response.error_code {
                    ErrorCode::None => {
                        debug!(
                            connector = self.broker_index,
                            broker = self.broker_id,
                            topic = topic_response.topic.as_str(),
                            partition = partition_response.partition,
                            base_offset = partition_response.base_offset,
                            msgs = set.contents.len(),
                            "ACK ok"
                        );
                        self.ds
                            .msg_state_tracker
                            .msg_enter_processed(&mut set.contents);
                        self.debug_logger.log_msg_list(&set.contents);
                    }
                    ErrorCode::CorruptMessage | ErrorCode::RequestTimedOut => {
                        warn!(
                            connector = self.broker_index,
                            broker = self.broker_id,
                            topic = topic_response.topic.as_str(),
                            partition = partition_response.partition,
                            code = partition_response.error_code.code(),
                            "ACK error, resending to the same broker"
                        );
                        self.ds.counters.ack_error_immediate_resend.inc();
                        self.ds
                            .msg_state_tracker
                            .msg_enter_batching(&mut set.contents);
                        self.immediate_resend.push(set.contents);
                    }
                    ErrorCode::UnknownTopicOrPartition
                    | ErrorCode::LeaderNotAvailable
                    | ErrorCode::NotLeaderForPartition => {
                        warn!(
                            connector = self.broker_index,
                            broker = self.broker_id,
                            topic = topic_response.topic.as_str(),
                            partition = partition_response.partition,
                            code = partition_response.error_code.code(),
                            "ACK error requiring fresh metadata"
                        );
                        self.ds.counters.ack_error_pause_and_resend.inc();
                        self.ds
                            .msg_state_tracker
                            .msg_enter_batching(&mut set.contents);
                        self.pause_and_resend.push(set.contents);
                    }
                    code => {
                        error!(
                            connector = self.broker_index,
                            broker = self.broker_id,
                            topic = topic_response.topic.as_str(),
                            partition = partition_response.partition,
                            code = code.code(),
                            msgs = set.contents.len(),
                            "fatal ACK error, messages may or may not be delivered"
                        );
                        self.ds.counters.ack_error_discard.inc();
                        self.ds.anomaly_tracker.track_discard_ack(
                            &topic_response.topic,
                            set.contents.len() as u64,
                        );
                        self.without_acks.push(set.contents);
                        fatal = true;
                    }
                }
            }
        }

        if topics.values().any(|group| !group.is_empty()) {
            self.ds.anomaly_tracker.track_bad_response();
            return Err(AppError::BadProduceResponse(
                "response did not acknowledge every partition of the request".to_string(),
            ));
        }

        self.ds.counters.ack_received.inc();
        self.ds.increment_ack_count();

        if fatal {
            Ok(ResponseAction::PauseAndFinishNow)
        } else if !self.pause_and_resend.is_empty() {
            Ok(ResponseAction::PauseAndDeferFinish)
        } else {
            Ok(ResponseAction::KeepRunning)
        }
    }

    pub fn take_immediate_resend_ack_msgs(&mut self) -> BatchOfLists {
        std::mem::take(&mut self.immediate_resend)
    }

    pub fn take_pause_and_resend_ack_msgs(&mut self) -> BatchOfLists {
        std::mem::take(&mut self.pause_and_resend)
    }

    pub fn take_msgs_without_acks(&mut self) -> BatchOfLists {
        std::mem::take(&mut self.without_acks)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::{Bytes, BytesMut};

    use crate::dispatch::{AllTopics, MsgSet};
    use crate::message::{Msg, MsgLogId, MsgState};
    use crate::protocol::{ProducePartitionResponse, ProduceTopicResponse};
    use crate::service::DispatcherConfig;

    use super::*;

    fn shared_state() -> Arc<DispatcherSharedState> {
        let config = Arc::new(DispatcherConfig::default());
        Arc::new(DispatcherSharedState::new(config).unwrap())
    }

    fn processor(ds: &Arc<DispatcherSharedState>) -> ProduceResponseProcessor {
        ProduceResponseProcessor::new(
            ds.clone(),
            MsgDebugLogger::new(false, MsgLogId::MsgGotAck),
            0,
            7,
        )
    }

    fn request_with(
        correlation_id: i32,
        parts: &[(&str, i32, &'static [u8])],
    ) -> ProduceRequest {
        let mut topics: AllTopics = BTreeMap::new();
        for (topic, partition, payload) in parts {
            let mut msg = Msg::new(*topic, None, *partition, Bytes::from_static(payload), 1);
            msg.set_state(MsgState::AckWait);
            let set = topics
                .entry(topic.to_string())
                .or_default()
                .entry(*partition)
                .or_insert_with(|| MsgSet {
                    contents: Vec::new(),
                    message_set_bytes: 0,
                });
            set.message_set_bytes += msg.encoded_size();
            set.contents.push(msg);
        }
        ProduceRequest {
            correlation_id,
            topics,
        }
    }

    fn response_frame(
        correlation_id: i32,
        parts: &[(&str, i32, ErrorCode)],
    ) -> Vec<u8> {
        let mut topics: Vec<ProduceTopicResponse> = Vec::new();
        for (topic, partition, error_code) in parts {
            let partition_response = ProducePartitionResponse {
                partition: *partition,
                error_code: *error_code,
                base_offset: 42,
                log_append_time: -1,
            };
            match topics.iter_mut().find(|t| t.topic == *topic) {
                Some(t) => t.partitions.push(partition_response),
                None => topics.push(ProduceTopicResponse {
                    topic: topic.to_string(),
                    partitions: vec![partition_response],
                }),
            }
        }
        let response = ProduceResponse {
            correlation_id,
            topics,
            throttle_time_ms: 0,
        };
        let mut buf = BytesMut::new();
        response.write(&mut buf);
        buf[4..].to_vec() // strip the size prefix, as the stream reader does
    }

    #[test]
    fn success_ack_marks_messages_processed() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a")]);
        let frame = response_frame(1, &[("t", 0, ErrorCode::None)]);

        let action = processor.process_response(request, &frame).unwrap();
        assert_eq!(action, ResponseAction::KeepRunning);
        assert_eq!(ds.msg_state_tracker.counts().processed, 1);
        assert_eq!(ds.get_ack_count(), 1);
        assert!(processor.take_immediate_resend_ack_msgs().is_empty());
    }

    #[test]
    fn retriable_ack_goes_to_immediate_resend() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a")]);
        let frame = response_frame(1, &[("t", 0, ErrorCode::RequestTimedOut)]);

        let action = processor.process_response(request, &frame).unwrap();
        assert_eq!(action, ResponseAction::KeepRunning);
        let resend = processor.take_immediate_resend_ack_msgs();
        assert_eq!(resend.len(), 1);
        assert_eq!(resend[0][0].state(), MsgState::Batching);
        assert_eq!(ds.counters.ack_error_immediate_resend.get(), 1);
    }

    #[test]
    fn metadata_class_ack_defers_finish() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a"), ("t", 1, b"b")]);
        let frame = response_frame(
            1,
            &[
                ("t", 0, ErrorCode::NotLeaderForPartition),
                ("t", 1, ErrorCode::None),
            ],
        );

        let action = processor.process_response(request, &frame).unwrap();
        assert_eq!(action, ResponseAction::PauseAndDeferFinish);
        assert_eq!(processor.take_pause_and_resend_ack_msgs().len(), 1);
        assert_eq!(ds.msg_state_tracker.counts().processed, 1);
    }

    #[test]
    fn fatal_ack_finishes_now_with_no_ack_bucket() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a")]);
        let frame = response_frame(1, &[("t", 0, ErrorCode::MessageTooLarge)]);

        let action = processor.process_response(request, &frame).unwrap();
        assert_eq!(action, ResponseAction::PauseAndFinishNow);
        let lost = processor.take_msgs_without_acks();
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0][0].state(), MsgState::AckWait);
        assert_eq!(ds.anomaly_tracker.discards_for_topic("t"), 1);
    }

    #[test]
    fn correlation_mismatch_is_a_bad_response() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a")]);
        let frame = response_frame(2, &[("t", 0, ErrorCode::None)]);

        assert!(processor.process_response(request, &frame).is_err());
        assert_eq!(ds.anomaly_tracker.bad_response_count(), 1);
    }

    #[test]
    fn ack_for_unsent_partition_is_a_bad_response() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a")]);
        let frame = response_frame(1, &[("t", 5, ErrorCode::None)]);

        assert!(processor.process_response(request, &frame).is_err());
    }

    #[test]
    fn partial_ack_coverage_is_a_bad_response() {
        let ds = shared_state();
        let mut processor = processor(&ds);
        let request = request_with(1, &[("t", 0, b"a"), ("t", 1, b"b")]);
        let frame = response_frame(1, &[("t", 0, ErrorCode::None)]);

        assert!(processor.process_response(request, &frame).is_err());
    }
}
