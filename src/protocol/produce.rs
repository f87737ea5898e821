use bytes::{BufMut, BytesMut};

use crate::protocol::{
    read_i16, read_i32, read_i64, read_nullable_string, read_string, write_nullable_string,
    write_string, ErrorCode,
};
use crate::service::{AppError, AppResult};

/// Common request header preceding every request body.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_i16(self.api_key);
        buf.put_i16(self.api_version);
        buf.put_i32(self.correlation_id);
        write_nullable_string(buf, self.client_id.as_deref());
    }

    /// Reads a header from a request frame (size prefix already stripped).
    pub fn read_from(buf: &mut &[u8]) -> AppResult<RequestHeader> {
        Ok(RequestHeader {
            api_key: read_i16(buf, "api key")?,
            api_version: read_i16(buf, "api version")?,
            correlation_id: read_i32(buf, "correlation id")?,
            client_id: read_nullable_string(buf, "client id")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducePartitionResponse {
    pub partition: i32,
    pub error_code: ErrorCode,
    pub base_offset: i64,
    pub log_append_time: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceTopicResponse {
    pub topic: String,
    pub partitions: Vec<ProducePartitionResponse>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponse {
    pub correlation_id: i32,
    pub topics: Vec<ProduceTopicResponse>,
    pub throttle_time_ms: i32,
}

// A produce response names at most the partitions of the request it answers;
// anything bigger is rejected before allocation.
const MAX_RESPONSE_ENTRIES: i32 = 10_000;

impl ProduceResponse {
    /// Decodes a response frame (size prefix already stripped).
    pub fn read_from(frame: &[u8]) -> AppResult<ProduceResponse> {
        let mut slice = frame;
        let buf = &mut slice;
        let correlation_id = read_i32(buf, "correlation id")?;
        let topic_count = read_i32(buf, "topic count")?;
        if !(0..=MAX_RESPONSE_ENTRIES).contains(&topic_count) {
            return Err(AppError::BadProduceResponse(format!(
                "unreasonable topic count {}",
                topic_count
            )));
        }
        let mut topics = Vec::with_capacity(topic_count as usize);
        for _ in 0..topic_count {
            let topic = read_string(buf, "topic name")?;
            let partition_count = read_i32(buf, "partition count")?;
            if !(0..=MAX_RESPONSE_ENTRIES).contains(&partition_count) {
                return Err(AppError::BadProduceResponse(format!(
                    "unreasonable partition count {}",
                    partition_count
                )));
            }
            let mut partitions = Vec::with_capacity(partition_count as usize);
            for _ in 0..partition_count {
                partitions.push(ProducePartitionResponse {
                    partition: read_i32(buf, "partition")?,
                    error_code: ErrorCode::from_code(read_i16(buf, "error code")?),
                    base_offset: read_i64(buf, "base offset")?,
                    log_append_time: read_i64(buf, "log append time")?,
                });
            }
            topics.push(ProduceTopicResponse { topic, partitions });
        }
        let throttle_time_ms = read_i32(buf, "throttle time")?;
        Ok(ProduceResponse {
            correlation_id,
            topics,
            throttle_time_ms,
        })
    }

    /// Encodes the response including its size prefix. The broker side of
    /// the codec; exercised by the test harness mock broker.
    pub fn write(&self, buf: &mut BytesMut) {
        let size_at = buf.len();
        buf.put_i32(0); // size placeholder
        buf.put_i32(self.correlation_id);
        buf.put_i32(self.topics.len() as i32);
        for topic in &self.topics {
            write_string(buf, &topic.topic);
            buf.put_i32(topic.partitions.len() as i32);
            for partition in &topic.partitions {
                buf.put_i32(partition.partition);
                buf.put_i16(partition.error_code.code());
                buf.put_i64(partition.base_offset);
                buf.put_i64(partition.log_append_time);
            }
        }
        buf.put_i32(self.throttle_time_ms);
        let size = (buf.len() - size_at - 4) as i32;
        buf[size_at..size_at + 4].copy_from_slice(&size.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_round_trips_through_the_codec() {
        let response = ProduceResponse {
            correlation_id: 7,
            topics: vec![ProduceTopicResponse {
                topic: "t".to_string(),
                partitions: vec![ProducePartitionResponse {
                    partition: 0,
                    error_code: ErrorCode::None,
                    base_offset: 42,
                    log_append_time: -1,
                }],
            }],
            throttle_time_ms: 0,
        };
        let mut buf = BytesMut::new();
        response.write(&mut buf);

        let size = i32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        assert_eq!(size, buf.len() - 4);
        let decoded = ProduceResponse::read_from(&buf[4..]).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn truncated_response_is_rejected() {
        let response = ProduceResponse {
            correlation_id: 1,
            topics: vec![ProduceTopicResponse {
                topic: "t".to_string(),
                partitions: vec![ProducePartitionResponse {
                    partition: 0,
                    error_code: ErrorCode::None,
                    base_offset: 0,
                    log_append_time: -1,
                }],
            }],
            throttle_time_ms: 0,
        };
        let mut buf = BytesMut::new();
        response.write(&mut buf);
        let body = &buf[4..buf.len() - 6];
        assert!(ProduceResponse::read_from(body).is_err());
    }

    #[test]
    fn request_header_round_trips() {
        let header = RequestHeader {
            api_key: 0,
            api_version: 3,
            correlation_id: 99,
            client_id: Some("relaymq".to_string()),
        };
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        let mut slice = &buf[..];
        assert_eq!(RequestHeader::read_from(&mut slice).unwrap(), header);
        assert!(slice.is_empty());
    }
}
