use bytes::{BufMut, BytesMut};
use integer_encoding::VarInt;

use crate::message::constants::*;
use crate::message::Msg;

/// Builds one Kafka record batch (magic 2) for a single partition message
/// set. The fixed header is laid down first with placeholders; `build`
/// patches the length, offsets, timestamps and CRC once all records are in.
pub struct RecordBatchBuilder {
    buffer: BytesMut,
    attributes: i16,
    base_timestamp: i64,
    max_timestamp: i64,
    record_count: i32,
}

impl RecordBatchBuilder {
    pub fn with_attributes(attributes: i16) -> Self {
        let mut builder = RecordBatchBuilder {
            buffer: BytesMut::with_capacity(RECORD_BATCH_OVERHEAD as usize),
            attributes,
            base_timestamp: 0,
            max_timestamp: 0,
            record_count: 0,
        };
        builder.initialize_buffer();
        builder
    }

    fn initialize_buffer(&mut self) {
        self.buffer.put_i64(0); // base offset
        self.buffer.put_i32(0); // length
        self.buffer.put_i32(NO_PARTITION_LEADER_EPOCH);
        self.buffer.put_i8(MAGIC);
        self.buffer.put_i32(-1); // crc
        self.buffer.put_i16(self.attributes);
        self.buffer.put_i32(-1); // last offset delta
        self.buffer.put_i64(-1); // first timestamp
        self.buffer.put_i64(-1); // max timestamp
        self.buffer.put_i64(NO_PRODUCER_ID);
        self.buffer.put_i16(NO_PRODUCER_EPOCH);
        self.buffer.put_i32(NO_SEQUENCE);
        self.buffer.put_i32(0); // record count
    }

    pub fn record_count(&self) -> i32 {
        self.record_count
    }

    pub fn append_msg(&mut self, msg: &Msg) {
        let timestamp = msg.timestamp();
        if self.record_count == 0 {
            self.base_timestamp = timestamp;
        }
        let timestamp_delta = timestamp.saturating_sub(self.base_timestamp);
        if timestamp > self.max_timestamp {
            self.max_timestamp = timestamp;
        }
        let offset_delta = i64::from(self.record_count);

        let key = msg.key().map(|k| k.as_ref());
        let value = msg.payload().as_ref();

        let record_size = 1 // attributes
            + timestamp_delta.required_space()
            + offset_delta.required_space()
            + Self::data_size(key)
            + Self::data_size(Some(value))
            + 0i32.required_space(); // headers count

        self.buffer
            .put_slice((record_size as i32).encode_var_vec().as_ref());
        self.buffer.put_i8(0); // record attributes
        self.buffer
            .put_slice(timestamp_delta.encode_var_vec().as_ref());
        self.buffer
            .put_slice(offset_delta.encode_var_vec().as_ref());
        Self::append_data(&mut self.buffer, key);
        Self::append_data(&mut self.buffer, Some(value));
        self.buffer.put_slice(0i32.encode_var_vec().as_ref());

        self.record_count += 1;
    }

    pub fn build(mut self) -> BytesMut {
        let length = self.buffer.len() as i32 - LENGTH_OFFSET - LENGTH_LENGTH;
        Self::patch(&mut self.buffer, LENGTH_OFFSET, &length.to_be_bytes());
        Self::patch(
            &mut self.buffer,
            LAST_OFFSET_DELTA_OFFSET,
            &(self.record_count - 1).to_be_bytes(),
        );
        Self::patch(
            &mut self.buffer,
            FIRST_TIMESTAMP_OFFSET,
            &self.base_timestamp.to_be_bytes(),
        );
        Self::patch(
            &mut self.buffer,
            MAX_TIMESTAMP_OFFSET,
            &self.max_timestamp.to_be_bytes(),
        );
        Self::patch(
            &mut self.buffer,
            RECORDS_COUNT_OFFSET,
            &self.record_count.to_be_bytes(),
        );
        let crc = crc32c::crc32c(&self.buffer[ATTRIBUTES_OFFSET as usize..]);
        Self::patch(&mut self.buffer, CRC_OFFSET, &crc.to_be_bytes());
        self.buffer
    }

    fn patch(buffer: &mut BytesMut, offset: i32, bytes: &[u8]) {
        let offset = offset as usize;
        buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn data_size(data: Option<&[u8]>) -> usize {
        match data {
            // null is encoded as a -1 length
            None => (-1i32).required_space(),
            Some(data) => (data.len() as i32).required_space() + data.len(),
        }
    }

    fn append_data(buffer: &mut BytesMut, data: Option<&[u8]>) {
        match data {
            None => buffer.put_slice((-1i32).encode_var_vec().as_ref()),
            Some(data) => {
                buffer.put_slice((data.len() as i32).encode_var_vec().as_ref());
                buffer.put_slice(data);
            }
        }
    }
}
