use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::message::{BatchOfLists, MsgList, RecordBatchBuilder};
use crate::metadata::Metadata;
use crate::protocol::{
    write_nullable_string, write_string, Acks, RequestHeader, API_KEY_PRODUCE,
    API_VERSION_PRODUCE,
};
use crate::service::{BatchConfig, CompressionConfig, DispatcherConfig};

/// One partition's pending message set within a produce request, with its
/// wire-size estimate cached so the request can be sized without rescanning.
#[derive(Debug)]
pub struct MsgSet {
    pub contents: MsgList,
    pub message_set_bytes: usize,
}

pub type MultiPartitionGroup = BTreeMap<i32, MsgSet>;

pub type AllTopics = BTreeMap<String, MultiPartitionGroup>;

/// The in-memory view of one encoded produce request: which messages it
/// carries, keyed the same way the wire encoding lays them out.
#[derive(Debug)]
pub struct ProduceRequest {
    pub correlation_id: i32,
    pub topics: AllTopics,
}

impl ProduceRequest {
    /// Moves every message list into `dest`, in the deterministic
    /// topic/partition order of the encoding.
    pub fn empty_all_topics_into(self, dest: &mut BatchOfLists) {
        for (_, group) in self.topics {
            for (_, set) in group {
                dest.push(set.contents);
            }
        }
    }

    pub fn msg_count(&self) -> usize {
        self.topics
            .values()
            .flat_map(|group| group.values())
            .map(|set| set.contents.len())
            .sum()
    }
}

/// Assembles batched message lists into serialised produce requests for one
/// broker. Within a partition, messages are emitted in enqueue order; across
/// partitions the BTreeMap ordering makes every encoding pass deterministic.
#[derive(Debug)]
pub struct RequestFactory {
    client_id: String,
    required_acks: Acks,
    request_timeout_ms: i32,
    batch: BatchConfig,
    compression: CompressionConfig,
    metadata: Option<Arc<Metadata>>,
    broker_index: usize,
    pending: VecDeque<MsgList>,
    next_correlation_id: i32,
}

impl RequestFactory {
    pub fn new(config: &DispatcherConfig, required_acks: Acks, broker_index: usize) -> Self {
        RequestFactory {
            client_id: config.general.client_id.clone(),
            required_acks,
            request_timeout_ms: config.general.produce_request_timeout_ms,
            batch: config.batch,
            compression: config.compression,
            metadata: None,
            broker_index,
            pending: VecDeque::new(),
            next_correlation_id: 1,
        }
    }

    /// Rebinds to the current topology. Called once before the connector
    /// starts; a dispatcher restart builds a fresh factory.
    pub fn init(&mut self, compression: CompressionConfig, metadata: Arc<Metadata>) {
        self.compression = compression;
        self.metadata = Some(metadata);
    }

    pub fn put(&mut self, batch: BatchOfLists) {
        for msgs in batch {
            if msgs.is_empty() {
                continue;
            }
            if let Some(metadata) = &self.metadata {
                if !metadata.has_topic(msgs[0].topic()) {
                    trace!(
                        connector = self.broker_index,
                        topic = msgs[0].topic(),
                        "queueing messages for a topic missing from metadata"
                    );
                }
            }
            self.pending.push_back(msgs);
        }
    }

    /// Push-to-head for retry without rerouting: the lists go out in the
    /// next request, ahead of everything already pending.
    pub fn put_front(&mut self, batch: BatchOfLists) {
        for msgs in batch.into_iter().rev() {
            if msgs.is_empty() {
                continue;
            }
            self.pending.push_front(msgs);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drains everything unsent, preserving order. Shutdown path.
    pub fn get_all(&mut self) -> BatchOfLists {
        self.pending.drain(..).collect()
    }

    /// Encodes a single produce request into `buf` (reusing its backing
    /// storage) and returns the tree of what was encoded, or `None` if no
    /// messages are pending. Honours the request data limit and the
    /// per-partition message-set cap, but always takes at least one list so
    /// the factory makes progress.
    pub fn build_request(&mut self, buf: &mut BytesMut) -> Option<ProduceRequest> {
        if self.pending.is_empty() {
            return None;
        }

        let mut topics: AllTopics = BTreeMap::new();
        let mut total_bytes = 0usize;
        while let Some(front) = self.pending.front() {
            let list_bytes: usize = front.iter().map(|m| m.encoded_size()).sum();
            if total_bytes > 0 {
                if total_bytes + list_bytes > self.batch.produce_request_data_limit() {
                    break;
                }
                let set_bytes = topics
                    .get(front[0].topic())
                    .and_then(|group| group.get(&front[0].partition()))
                    .map(|set| set.message_set_bytes)
                    .unwrap_or(0);
                if set_bytes + list_bytes > self.batch.message_max_bytes() {
                    break;
                }
            }
            let Some(mut msgs) = self.pending.pop_front() else {
                break;
            };
            total_bytes += list_bytes;
            let set = topics
                .entry(msgs[0].topic().to_string())
                .or_default()
                .entry(msgs[0].partition())
                .or_insert_with(|| MsgSet {
                    contents: MsgList::new(),
                    message_set_bytes: 0,
                });
            set.message_set_bytes += list_bytes;
            set.contents.append(&mut msgs);
        }

        let correlation_id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        let request = ProduceRequest {
            correlation_id,
            topics,
        };
        self.encode(&request, buf);
        trace!(
            connector = self.broker_index,
            correlation_id,
            msgs = request.msg_count(),
            bytes = buf.len(),
            "built produce request"
        );
        Some(request)
    }

    fn encode(&self, request: &ProduceRequest, buf: &mut BytesMut) {
        buf.clear();
        buf.put_i32(0); // size placeholder
        RequestHeader {
            api_key: API_KEY_PRODUCE,
            api_version: API_VERSION_PRODUCE,
            correlation_id: request.correlation_id,
            client_id: Some(self.client_id.clone()),
        }
        .write(buf);
        write_nullable_string(buf, None); // transactional id
        buf.put_i16(self.required_acks.as_i16());
        buf.put_i32(self.request_timeout_ms);
        buf.put_i32(request.topics.len() as i32);
        for (topic, group) in &request.topics {
            write_string(buf, topic);
            buf.put_i32(group.len() as i32);
            for (partition, set) in group {
                buf.put_i32(*partition);
                let codec = self.compression.codec_for(set.message_set_bytes);
                let mut builder = RecordBatchBuilder::with_attributes(codec.attributes());
                for msg in &set.contents {
                    builder.append_msg(msg);
                }
                let records = builder.build();
                buf.put_i32(records.len() as i32);
                buf.extend_from_slice(&records);
            }
        }
        let size = (buf.len() - 4) as i32;
        buf[0..4].copy_from_slice(&size.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::message::Msg;
    use crate::protocol::RequestHeader;

    use super::*;

    fn config() -> DispatcherConfig {
        DispatcherConfig::default()
    }

    fn msg(topic: &str, partition: i32, payload: &'static [u8]) -> Msg {
        Msg::new(topic, None, partition, Bytes::from_static(payload), 1)
    }

    fn factory(config: &DispatcherConfig) -> RequestFactory {
        RequestFactory::new(config, Acks::Leader, 0)
    }

    #[test]
    fn empty_factory_builds_nothing() {
        let config = config();
        let mut factory = factory(&config);
        let mut buf = BytesMut::new();
        assert!(factory.is_empty());
        assert!(factory.build_request(&mut buf).is_none());
    }

    #[test]
    fn pending_lists_merge_by_topic_and_partition() {
        let config = config();
        let mut factory = factory(&config);
        factory.put(vec![
            vec![msg("t", 0, b"a"), msg("t", 0, b"b")],
            vec![msg("t", 1, b"c")],
            vec![msg("u", 0, b"d")],
            vec![msg("t", 0, b"e")],
        ]);

        let mut buf = BytesMut::new();
        let request = factory.build_request(&mut buf).expect("request built");
        assert!(factory.is_empty());
        assert_eq!(request.msg_count(), 5);
        assert_eq!(request.topics.len(), 2);

        let t_group = &request.topics["t"];
        let payloads: Vec<&[u8]> = t_group[&0]
            .contents
            .iter()
            .map(|m| m.payload().as_ref())
            .collect();
        assert_eq!(payloads, vec![b"a".as_ref(), b"b".as_ref(), b"e".as_ref()]);

        // encoded frame starts with the size prefix and the request header
        let size = i32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        assert_eq!(size, buf.len() - 4);
        let mut slice = &buf[4..];
        let header = RequestHeader::read_from(&mut slice).unwrap();
        assert_eq!(header.api_key, API_KEY_PRODUCE);
        assert_eq!(header.correlation_id, request.correlation_id);
    }

    #[test]
    fn put_front_goes_out_before_pending_lists() {
        let config = config();
        let mut factory = factory(&config);
        factory.put(vec![vec![msg("t", 0, b"second")]]);
        factory.put_front(vec![
            vec![msg("t", 0, b"first")],
            vec![msg("t", 0, b"also first")],
        ]);

        let mut buf = BytesMut::new();
        let request = factory.build_request(&mut buf).expect("request built");
        let payloads: Vec<&[u8]> = request.topics["t"][&0]
            .contents
            .iter()
            .map(|m| m.payload().as_ref())
            .collect();
        assert_eq!(
            payloads,
            vec![b"first".as_ref(), b"also first".as_ref(), b"second".as_ref()]
        );
    }

    #[test]
    fn request_data_limit_splits_requests() {
        let mut config = config();
        config.batch = BatchConfig::new(200, 100, 1024 * 1024);
        let mut factory = factory(&config);
        factory.put(vec![
            vec![msg("t", 0, b"0123456789012345678901234567890123456789")],
            vec![msg("t", 0, b"0123456789012345678901234567890123456789")],
        ]);

        let mut buf = BytesMut::new();
        let first = factory.build_request(&mut buf).expect("first request");
        assert_eq!(first.msg_count(), 1);
        assert!(!factory.is_empty());
        let second = factory.build_request(&mut buf).expect("second request");
        assert_eq!(second.msg_count(), 1);
        assert!(factory.is_empty());
        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[test]
    fn oversized_single_list_still_goes_out_alone() {
        let mut config = config();
        config.batch = BatchConfig::new(200, 10, 10);
        let mut factory = factory(&config);
        factory.put(vec![vec![msg("t", 0, b"way bigger than every limit")]]);

        let mut buf = BytesMut::new();
        let request = factory.build_request(&mut buf).expect("request built");
        assert_eq!(request.msg_count(), 1);
        assert!(factory.is_empty());
    }

    #[test]
    fn get_all_drains_in_order() {
        let config = config();
        let mut factory = factory(&config);
        factory.put(vec![vec![msg("t", 0, b"a")], vec![msg("t", 1, b"b")]]);
        let all = factory.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0][0].payload().as_ref(), b"a");
        assert_eq!(all[1][0].payload().as_ref(), b"b");
        assert!(factory.is_empty());
    }
}
