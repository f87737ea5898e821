mod app_error;
mod config;
mod tracing_config;

pub use app_error::{AppError, AppResult};
pub use config::{
    global_config, BatchConfig, BrokerEntry, CompressionConfig, CompressionType, DispatchConfig,
    DispatcherConfig, GeneralConfig, MetadataConfig, NetworkConfig, TopicEntry, GLOBAL_CONFIG,
};
pub use tracing_config::setup_local_tracing;
