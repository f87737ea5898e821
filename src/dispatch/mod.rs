mod connector;
mod counters;
mod dispatcher;
mod input_queue;
mod request_factory;
mod response_processor;
mod shared_state;
mod signal;

pub use connector::Connector;
pub use counters::{Counter, DispatchCounters};
pub use dispatcher::{Dispatcher, DispatcherState};
pub use input_queue::InputQueue;
pub use request_factory::{AllTopics, MsgSet, MultiPartitionGroup, ProduceRequest, RequestFactory};
pub use response_processor::{ProduceResponseProcessor, ResponseAction};
pub use shared_state::DispatcherSharedState;
pub use signal::SignalButton;
