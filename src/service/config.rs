extern crate config as rs_config;

use std::path::Path;

use getset::CopyGetters;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::service::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<DispatcherConfig> = OnceCell::new();

pub fn global_config() -> &'static DispatcherConfig {
    GLOBAL_CONFIG
        .get()
        .expect("global config is set before use")
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    pub client_id: String,
    /// 0 = fire and forget, 1 = leader ack, -1 = full ISR ack.
    pub required_acks: i16,
    /// Broker-side produce timeout, carried verbatim in every request.
    pub produce_request_timeout_ms: i32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            client_id: String::from("relaymq"),
            required_acks: 1,
            produce_request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub connect_timeout_ms: u64,
    /// Inactivity limit per poll cycle while any socket event is watched.
    pub kafka_socket_timeout_secs: u64,
    /// Hard ceiling on a declared produce response body.
    pub max_response_size: usize,
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            kafka_socket_timeout_secs: 60,
            max_response_size: 4 * 1024 * 1024,
            read_buffer_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Slow-shutdown grace measured from the shutdown start time.
    pub shutdown_max_delay_ms: u64,
    /// Fast-shutdown grace measured from command acceptance.
    pub dispatcher_restart_max_delay_ms: u64,
    pub debug_log_messages: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            shutdown_max_delay_ms: 30_000,
            dispatcher_restart_max_delay_ms: 5_000,
            debug_log_messages: false,
        }
    }
}

/*
 Batching knobs are read on every connector wakeup, so they travel as a
 copyable snapshot rather than through the global config.
*/
#[derive(Debug, Serialize, Deserialize, Clone, Copy, CopyGetters)]
#[get_copy = "pub"]
pub struct BatchConfig {
    /// How long a dispatched message may sit in the input queue before it
    /// must be flushed toward the broker.
    batch_time_limit_ms: u64,
    /// Upper bound on the combined message bytes of one produce request.
    produce_request_data_limit: usize,
    /// Upper bound on a single per-partition message set.
    message_max_bytes: usize,
}

impl BatchConfig {
    pub fn new(
        batch_time_limit_ms: u64,
        produce_request_data_limit: usize,
        message_max_bytes: usize,
    ) -> Self {
        Self {
            batch_time_limit_ms,
            produce_request_data_limit,
            message_max_bytes,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(200, 1024 * 1024, 1024 * 1024)
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
}

impl CompressionType {
    /// Attribute bits for the record batch header.
    pub fn attributes(&self) -> i16 {
        match self {
            CompressionType::None => 0,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy)]
pub struct CompressionConfig {
    pub codec: CompressionType,
    /// Message sets smaller than this are never compressed.
    pub min_size: usize,
}

impl CompressionConfig {
    pub fn codec_for(&self, message_set_bytes: usize) -> CompressionType {
        if message_set_bytes < self.min_size {
            CompressionType::None
        } else {
            self.codec
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct BrokerEntry {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct TopicEntry {
    pub name: String,
    pub partitions: i32,
}

/// Static topology used by the binary; a dispatcher restart rereads it.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct MetadataConfig {
    pub brokers: Vec<BrokerEntry>,
    pub topics: Vec<TopicEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct DispatcherConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
    pub dispatch: DispatchConfig,
    pub batch: BatchConfig,
    pub compression: CompressionConfig,
    pub metadata: MetadataConfig,
}

impl DispatcherConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<DispatcherConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| AppError::InvalidValue("config file path".to_string()))?;
        let config = rs_config::Config::builder()
            .add_source(rs_config::File::with_name(path_str))
            .build()?;
        let dispatcher_config: DispatcherConfig = config.try_deserialize()?;
        dispatcher_config.validate()?;
        Ok(dispatcher_config)
    }

    fn validate(&self) -> AppResult<()> {
        if !matches!(self.general.required_acks, -1 | 0 | 1) {
            return Err(AppError::InvalidValue(format!(
                "required_acks must be -1, 0 or 1, got {}",
                self.general.required_acks
            )));
        }
        if self.network.max_response_size == 0 {
            return Err(AppError::InvalidValue(
                "max_response_size must be positive".to_string(),
            ));
        }
        if self.metadata.brokers.is_empty() {
            return Err(AppError::InvalidValue(
                "at least one broker is required".to_string(),
            ));
        }
        Ok(())
    }
}
