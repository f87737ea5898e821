use bytes::Bytes;

/// Messages destined for the same topic partition, in enqueue order.
pub type MsgList = Vec<Msg>;

/// One unit of scheduling between the router and a connector.
pub type BatchOfLists = Vec<MsgList>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgState {
    New,
    Batching,
    AckWait,
    Processed,
    Lost,
}

/// The atomic unit of the pipeline. Ownership is exclusive: a message moves
/// from the router through the input queue, request factory and ack-wait
/// queue without its payload ever being copied.
#[derive(Debug)]
pub struct Msg {
    topic: String,
    key: Option<Bytes>,
    partition: i32,
    payload: Bytes,
    timestamp: i64,
    state: MsgState,
}

impl Msg {
    pub fn new(
        topic: impl Into<String>,
        key: Option<Bytes>,
        partition: i32,
        payload: Bytes,
        timestamp: i64,
    ) -> Msg {
        Msg {
            topic: topic.into(),
            key,
            partition,
            payload,
            timestamp,
            state: MsgState::New,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> Option<&Bytes> {
        self.key.as_ref()
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn state(&self) -> MsgState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: MsgState) {
        self.state = state;
    }

    /// Wire-size estimate used for request and message-set caps. The varint
    /// framing makes the exact record size depend on its neighbours, so this
    /// over-approximates with the worst-case per-record overhead.
    pub fn encoded_size(&self) -> usize {
        const PER_RECORD_OVERHEAD: usize = 28;
        PER_RECORD_OVERHEAD
            + self.key.as_ref().map(|k| k.len()).unwrap_or(0)
            + self.payload.len()
    }
}
