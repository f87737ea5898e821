use tracing::debug;

use crate::message::Msg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgLogId {
    MsgSend,
    MsgGotAck,
}

impl MsgLogId {
    fn as_str(&self) -> &'static str {
        match self {
            MsgLogId::MsgSend => "send",
            MsgLogId::MsgGotAck => "got_ack",
        }
    }
}

/// Per-direction message logger. Disabled it costs a branch per list; enabled
/// it writes one debug line per message so delivery problems can be traced
/// end to end.
#[derive(Debug, Clone, Copy)]
pub struct MsgDebugLogger {
    id: MsgLogId,
    enabled: bool,
}

impl MsgDebugLogger {
    pub fn new(enabled: bool, id: MsgLogId) -> MsgDebugLogger {
        MsgDebugLogger { id, enabled }
    }

    pub fn log_msg_list(&self, msgs: &[Msg]) {
        if !self.enabled {
            return;
        }
        for msg in msgs {
            debug!(
                target: "msg_debug",
                direction = self.id.as_str(),
                topic = msg.topic(),
                partition = msg.partition(),
                timestamp = msg.timestamp(),
                payload_len = msg.payload().len(),
                "message"
            );
        }
    }
}
