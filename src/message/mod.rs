mod anomaly_tracker;
mod constants;
mod debug_logger;
mod msg;
mod record_batch;
mod state_tracker;

pub use anomaly_tracker::AnomalyTracker;
pub use constants::*;
pub use debug_logger::{MsgDebugLogger, MsgLogId};
pub use msg::{BatchOfLists, Msg, MsgList, MsgState};
pub use record_batch::RecordBatchBuilder;
pub use state_tracker::{MsgStateCounts, MsgStateTracker};
