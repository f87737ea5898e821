mod send_buf;
mod stream_reader;

pub use send_buf::SendBuf;
pub use stream_reader::{ReaderState, StreamMsgReader};

use std::io;

/// Whether an I/O error means the TCP connection to the broker is gone.
/// Lost connections pause the dispatcher instead of killing the process.
pub fn is_lost_connection(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}
