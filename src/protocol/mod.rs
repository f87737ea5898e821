mod produce;

pub use produce::{
    ProducePartitionResponse, ProduceResponse, ProduceTopicResponse, RequestHeader,
};

use bytes::{Buf, BufMut, BytesMut};

use crate::service::{AppError, AppResult};

pub const API_KEY_PRODUCE: i16 = 0;
pub const API_VERSION_PRODUCE: i16 = 3;

/// Number of acknowledgements the broker must collect before answering a
/// produce request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Acks {
    #[default]
    All = -1,
    Leader = 1,
    None = 0,
}

impl Acks {
    pub fn from_i16(value: i16) -> AppResult<Self> {
        match value {
            -1 => Ok(Acks::All),
            1 => Ok(Acks::Leader),
            0 => Ok(Acks::None),
            invalid => Err(AppError::InvalidValue(format!(
                "ack field {} is invalid",
                invalid
            ))),
        }
    }

    pub fn as_i16(&self) -> i16 {
        *self as i16
    }
}

/// Produce-relevant subset of the Kafka error code space. Codes outside the
/// subset are preserved for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    None,
    Unknown,
    CorruptMessage,
    UnknownTopicOrPartition,
    LeaderNotAvailable,
    NotLeaderForPartition,
    RequestTimedOut,
    MessageTooLarge,
    InvalidTopic,
    InvalidRequest,
    Other(i16),
}

impl ErrorCode {
    pub fn from_code(code: i16) -> ErrorCode {
        match code {
            0 => ErrorCode::None,
            -1 => ErrorCode::Unknown,
            2 => ErrorCode::CorruptMessage,
            3 => ErrorCode::UnknownTopicOrPartition,
            5 => ErrorCode::LeaderNotAvailable,
            6 => ErrorCode::NotLeaderForPartition,
            7 => ErrorCode::RequestTimedOut,
            10 => ErrorCode::MessageTooLarge,
            17 => ErrorCode::InvalidTopic,
            42 => ErrorCode::InvalidRequest,
            other => ErrorCode::Other(other),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::Unknown => -1,
            ErrorCode::CorruptMessage => 2,
            ErrorCode::UnknownTopicOrPartition => 3,
            ErrorCode::LeaderNotAvailable => 5,
            ErrorCode::NotLeaderForPartition => 6,
            ErrorCode::RequestTimedOut => 7,
            ErrorCode::MessageTooLarge => 10,
            ErrorCode::InvalidTopic => 17,
            ErrorCode::InvalidRequest => 42,
            ErrorCode::Other(code) => *code,
        }
    }
}

pub fn write_string(buf: &mut BytesMut, value: &str) {
    buf.put_i16(value.len() as i16);
    buf.put_slice(value.as_bytes());
}

pub fn write_nullable_string(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(value) => write_string(buf, value),
        None => buf.put_i16(-1),
    }
}

fn truncated(what: &str) -> AppError {
    AppError::BadProduceResponse(format!("truncated {}", what))
}

pub(crate) fn read_i16(buf: &mut &[u8], what: &str) -> AppResult<i16> {
    if buf.remaining() < 2 {
        return Err(truncated(what));
    }
    Ok(buf.get_i16())
}

pub(crate) fn read_i32(buf: &mut &[u8], what: &str) -> AppResult<i32> {
    if buf.remaining() < 4 {
        return Err(truncated(what));
    }
    Ok(buf.get_i32())
}

pub(crate) fn read_i64(buf: &mut &[u8], what: &str) -> AppResult<i64> {
    if buf.remaining() < 8 {
        return Err(truncated(what));
    }
    Ok(buf.get_i64())
}

pub(crate) fn read_string(buf: &mut &[u8], what: &str) -> AppResult<String> {
    let len = read_i16(buf, what)?;
    if len < 0 {
        return Err(AppError::BadProduceResponse(format!(
            "negative length for {}",
            what
        )));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(truncated(what));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::BadProduceResponse(format!("{} is not utf-8", what)))
}

pub(crate) fn read_nullable_string(buf: &mut &[u8], what: &str) -> AppResult<Option<String>> {
    let len = read_i16(buf, what)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(truncated(what));
    }
    let bytes = buf.copy_to_bytes(len);
    let value = String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::BadProduceResponse(format!("{} is not utf-8", what)))?;
    Ok(Some(value))
}
