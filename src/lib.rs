pub mod dispatch;
pub mod message;
pub mod metadata;
pub mod network;
pub mod protocol;
pub mod service;

pub use service::{
    global_config, setup_local_tracing, AppError, AppResult, DispatcherConfig, GLOBAL_CONFIG,
};

pub use dispatch::{Dispatcher, DispatcherState};
pub use message::{BatchOfLists, Msg, MsgList, MsgState};
pub use metadata::Metadata;
