use bytes::{Buf, BytesMut};

/// Monotonically consumed byte buffer holding the serialised in-flight
/// produce request. Partial writes advance a consumed prefix; the backing
/// storage is handed back out for reuse once the buffer drains.
#[derive(Debug, Default)]
pub struct SendBuf {
    buf: BytesMut,
}

impl SendBuf {
    pub fn has_unsent(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn unsent(&self) -> &[u8] {
        &self.buf
    }

    pub fn mark_consumed(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Takes the backing storage for the next request encode. Only valid
    /// once the previous request has fully drained.
    pub fn take_storage(&mut self) -> BytesMut {
        let mut storage = std::mem::take(&mut self.buf);
        storage.clear();
        storage
    }

    pub fn load(&mut self, buf: BytesMut) {
        self.buf = buf;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_consumption_advances_the_cursor() {
        let mut send_buf = SendBuf::default();
        let mut storage = send_buf.take_storage();
        storage.extend_from_slice(b"0123456789");
        send_buf.load(storage);

        assert!(send_buf.has_unsent());
        send_buf.mark_consumed(4);
        assert_eq!(send_buf.unsent(), b"456789");
        send_buf.mark_consumed(6);
        assert!(!send_buf.has_unsent());
    }

    #[test]
    fn take_storage_clears_leftover_bytes() {
        let mut send_buf = SendBuf::default();
        let mut storage = send_buf.take_storage();
        storage.extend_from_slice(b"abc");
        send_buf.load(storage);
        send_buf.mark_consumed(3);

        let storage = send_buf.take_storage();
        assert!(storage.is_empty());
        assert!(!send_buf.has_unsent());
    }
}
