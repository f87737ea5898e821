use std::borrow::Cow;
use std::io;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("illegal state: {0}")]
    IllegalState(Cow<'static, str>),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("malformed produce response: {0}")]
    BadProduceResponse(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("channel send error: {0}")]
    ChannelSend(String),

    #[error("tracing setup error: {0}")]
    TracingSetup(#[from] tracing::dispatcher::SetGlobalDefaultError),
}
