// ABOUTME: Provides TCP connection management for SMPP v3.4 protocol communication
// ABOUTME: Implements frame-based I/O with buffering over a single socket

use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::trace;

use crate::smpp::error::{SmppError, SmppResult};
use crate::smpp::pdu::{CodecError, Frame};

/// Framed wrapper around a bound TCP stream.
///
/// Reads accumulate into an internal buffer until a complete PDU is
/// available; writes are buffered and flushed per frame.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read a single frame from the underlying stream.
    ///
    /// Returns `None` when the peer closes the connection cleanly between
    /// frames. A close mid-frame is an error.
    pub async fn read_frame(&mut self) -> SmppResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(SmppError::ConnectionClosed);
            }
        }
    }

    /// Try to parse a frame from the buffered bytes, consuming them on
    /// success.
    fn parse_frame(&mut self) -> SmppResult<Option<Frame>> {
        let mut cursor = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut cursor) {
            Ok(len) => {
                cursor.set_position(0);
                let frame = Frame::parse(&mut cursor)?;
                self.buffer.advance(len);
                trace!(frame = frame.name(), "received frame");
                Ok(Some(frame))
            }
            Err(CodecError::Incomplete) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Encode and write a frame, flushing the stream.
    pub async fn write_frame(&mut self, frame: &Frame) -> SmppResult<()> {
        let bytes = frame.to_bytes();
        trace!(frame = frame.name(), len = bytes.len(), "sending frame");
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
