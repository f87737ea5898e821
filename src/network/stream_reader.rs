use std::io;

use bytes::{Buf, BytesMut};
use tokio::net::TcpStream;

pub const SIZE_FIELD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// More bytes are needed before a frame is complete.
    ReadNeeded,
    /// A complete frame is buffered and exposed by `ready_msg`.
    MsgReady,
    /// The declared frame size is negative or exceeds the ceiling.
    DataInvalid,
    /// The peer closed the connection with an incomplete frame buffered.
    AtEnd,
}

/// Length-prefixed framer over a non-blocking socket. Accumulates bytes
/// across partial reads and exposes one frame at a time; the 4-byte
/// big-endian size prefix counts the bytes that follow it and is not part
/// of the exposed body.
#[derive(Debug)]
pub struct StreamMsgReader {
    buf: BytesMut,
    state: ReaderState,
    max_msg_size: usize,
    read_chunk_size: usize,
    eof: bool,
}

impl StreamMsgReader {
    pub fn new(max_msg_size: usize, initial_buf_size: usize) -> StreamMsgReader {
        StreamMsgReader {
            buf: BytesMut::with_capacity(initial_buf_size),
            state: ReaderState::ReadNeeded,
            max_msg_size,
            read_chunk_size: initial_buf_size.max(SIZE_FIELD_LEN),
            eof: false,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Performs one non-blocking read and advances the state. `WouldBlock`
    /// leaves the state untouched; other errors propagate to the caller.
    pub fn read(&mut self, sock: &TcpStream) -> io::Result<ReaderState> {
        self.buf.reserve(self.read_chunk_size);
        match sock.try_read_buf(&mut self.buf) {
            Ok(0) => self.eof = true,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(self.state),
            Err(e) => return Err(e),
        }
        self.evaluate();
        Ok(self.state)
    }

    pub fn ready_msg(&self) -> Option<&[u8]> {
        match self.ready_msg_size() {
            Some(size) => Some(&self.buf[SIZE_FIELD_LEN..SIZE_FIELD_LEN + size]),
            None => None,
        }
    }

    pub fn ready_msg_size(&self) -> Option<usize> {
        if self.state != ReaderState::MsgReady {
            return None;
        }
        Some(self.declared_size())
    }

    /// Drops the current frame and returns the new state, which may be
    /// `MsgReady` again if another complete frame is already buffered.
    pub fn consume_ready_msg(&mut self) -> ReaderState {
        if self.state == ReaderState::MsgReady {
            let size = self.declared_size();
            self.buf.advance(SIZE_FIELD_LEN + size);
            self.evaluate();
        }
        self.state
    }

    /// Clears all buffered data and restarts framing, for use against a
    /// fresh connection.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.eof = false;
        self.state = ReaderState::ReadNeeded;
    }

    fn declared_size(&self) -> usize {
        i32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize
    }

    fn evaluate(&mut self) {
        if self.buf.len() >= SIZE_FIELD_LEN {
            let declared =
                i32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
            if declared < 0 || declared as usize > self.max_msg_size {
                self.state = ReaderState::DataInvalid;
                return;
            }
            let frame_len = SIZE_FIELD_LEN + declared as usize;
            if self.buf.len() >= frame_len {
                self.state = ReaderState::MsgReady;
                return;
            }
            self.buf.reserve(frame_len - self.buf.len());
        }
        self.state = if self.eof {
            ReaderState::AtEnd
        } else {
            ReaderState::ReadNeeded
        };
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    async fn read_until<F: Fn(ReaderState) -> bool>(
        reader: &mut StreamMsgReader,
        sock: &TcpStream,
        done: F,
    ) -> ReaderState {
        loop {
            sock.readable().await.unwrap();
            let state = reader.read(sock).unwrap();
            if done(state) {
                return state;
            }
        }
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut framed = (body.len() as i32).to_be_bytes().to_vec();
        framed.extend_from_slice(body);
        framed
    }

    #[tokio::test]
    async fn frame_split_across_reads_is_reassembled() {
        let (reader_sock, mut writer) = socket_pair().await;
        let mut reader = StreamMsgReader::new(1024, 64);

        let framed = frame(b"hello broker");
        let (first, second) = framed.split_at(7);
        writer.write_all(first).await.unwrap();
        writer.flush().await.unwrap();

        reader_sock.readable().await.unwrap();
        let state = reader.read(&reader_sock).unwrap();
        assert_eq!(state, ReaderState::ReadNeeded);

        writer.write_all(second).await.unwrap();
        writer.flush().await.unwrap();
        let state = read_until(&mut reader, &reader_sock, |s| s == ReaderState::MsgReady).await;
        assert_eq!(state, ReaderState::MsgReady);
        assert_eq!(reader.ready_msg().unwrap(), b"hello broker");
        assert_eq!(reader.ready_msg_size(), Some(12));

        assert_eq!(reader.consume_ready_msg(), ReaderState::ReadNeeded);
        assert_eq!(reader.ready_msg(), None);
    }

    #[tokio::test]
    async fn two_frames_in_one_read_are_served_in_order() {
        let (reader_sock, mut writer) = socket_pair().await;
        let mut reader = StreamMsgReader::new(1024, 64);

        let mut data = frame(b"first");
        data.extend_from_slice(&frame(b"second"));
        writer.write_all(&data).await.unwrap();
        writer.flush().await.unwrap();

        let state = read_until(&mut reader, &reader_sock, |s| s == ReaderState::MsgReady).await;
        assert_eq!(state, ReaderState::MsgReady);
        assert_eq!(reader.ready_msg().unwrap(), b"first");
        assert_eq!(reader.consume_ready_msg(), ReaderState::MsgReady);
        assert_eq!(reader.ready_msg().unwrap(), b"second");
        assert_eq!(reader.consume_ready_msg(), ReaderState::ReadNeeded);
    }

    #[tokio::test]
    async fn declared_size_above_ceiling_is_invalid() {
        let (reader_sock, mut writer) = socket_pair().await;
        let mut reader = StreamMsgReader::new(1024, 64);

        writer
            .write_all(&(100 * 1024 * 1024i32).to_be_bytes())
            .await
            .unwrap();
        writer.flush().await.unwrap();

        let state =
            read_until(&mut reader, &reader_sock, |s| s != ReaderState::ReadNeeded).await;
        assert_eq!(state, ReaderState::DataInvalid);
    }

    #[tokio::test]
    async fn peer_close_mid_frame_is_at_end() {
        let (reader_sock, mut writer) = socket_pair().await;
        let mut reader = StreamMsgReader::new(1024, 64);

        let framed = frame(b"incomplete");
        writer.write_all(&framed[..6]).await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        let state = read_until(&mut reader, &reader_sock, |s| s == ReaderState::AtEnd).await;
        assert_eq!(state, ReaderState::AtEnd);
    }

    #[tokio::test]
    async fn reset_discards_buffered_bytes() {
        let (reader_sock, mut writer) = socket_pair().await;
        let mut reader = StreamMsgReader::new(1024, 64);

        writer.write_all(&frame(b"stale")).await.unwrap();
        writer.flush().await.unwrap();
        let state = read_until(&mut reader, &reader_sock, |s| s == ReaderState::MsgReady).await;
        assert_eq!(state, ReaderState::MsgReady);

        reader.reset();
        assert_eq!(reader.state(), ReaderState::ReadNeeded);
        assert_eq!(reader.ready_msg(), None);
    }
}
