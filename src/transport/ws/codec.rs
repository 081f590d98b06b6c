//! Buffered frame reader and writer over split stream halves.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::transport::ws::frame::{Frame, OpCode};

/// Which side of the connection this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Masks outbound frames, rejects masked inbound frames.
    Client,
    /// Never masks, requires masked inbound frames.
    Server,
}

impl Role {
    /// Check if this role must mask outgoing frames.
    #[must_use]
    pub const fn must_mask(self) -> bool {
        matches!(self, Role::Client)
    }
}

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Bytes),
    /// Ping with its payload.
    Ping(Bytes),
    /// Pong.
    Pong,
    /// Close with optional status code and reason.
    Close(Option<(u16, String)>),
}

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0x2545_F491)
    }
}

/// Writes frames to the outbound half of a stream.
pub struct FrameWriter<W> {
    io: W,
    role: Role,
    buf: BytesMut,
    mask_state: u32,
}

impl<W> FrameWriter<W> {
    /// Create a writer for `role`.
    #[must_use]
    pub fn new(io: W, role: Role) -> Self {
        Self {
            io,
            role,
            buf: BytesMut::with_capacity(4096),
            // xorshift never leaves zero
            mask_state: random_mask_seed() | 1,
        }
    }

    fn next_mask(&mut self) -> [u8; 4] {
        // xorshift32
        let mut x = self.mask_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.mask_state = x;
        x.to_le_bytes()
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Write and flush one frame.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying stream.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = if self.role.must_mask() {
            Some(self.next_mask())
        } else {
            None
        };
        self.buf.clear();
        frame.write(&mut self.buf, mask);
        self.io.write_all(&self.buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Write a text message as a single frame.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying stream.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.write_frame(&Frame::text(text)).await
    }

    /// Write a close frame.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying stream.
    pub async fn send_close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.write_frame(&Frame::close(Some(code), reason)).await
    }

    /// Shut down the outbound direction.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

/// Reads frames from the inbound half of a stream and reassembles messages.
pub struct FrameReader<R> {
    io: R,
    role: Role,
    buf: BytesMut,
    max_size: usize,
    partial: Option<(OpCode, BytesMut)>,
}

impl<R> FrameReader<R> {
    /// Create a reader for `role`, starting with bytes already read past the handshake.
    #[must_use]
    pub fn new(io: R, role: Role, leftover: BytesMut, max_size: usize) -> Self {
        Self {
            io,
            role,
            buf: leftover,
            max_size,
            partial: None,
        }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` on end of stream
    /// - `Error::ProtocolViolation` if masking does not match the role
    /// - frame parsing errors and I/O errors
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some((frame, consumed)) = Frame::parse(&self.buf, self.max_size)? {
                self.buf.advance(consumed);
                if frame.masked == self.role.must_mask() {
                    return Err(Error::ProtocolViolation(match self.role {
                        Role::Client => "server frame must not be masked".into(),
                        Role::Server => "client frame must be masked".into(),
                    }));
                }
                return Ok(frame);
            }

            self.buf.reserve(4096);
            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Read the next complete message, reassembling fragments.
    ///
    /// # Errors
    ///
    /// - `Error::Receive` for invalid UTF-8 in a text message
    /// - `Error::ProtocolViolation` for out-of-order continuation frames
    /// - `Error::FrameTooLarge` if a reassembled message exceeds the limit
    /// - everything [`read_frame`](Self::read_frame) returns
    pub async fn next_message(&mut self) -> Result<Incoming> {
        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OpCode::Ping => return Ok(Incoming::Ping(frame.payload)),
                OpCode::Pong => return Ok(Incoming::Pong),
                OpCode::Close => return Ok(Incoming::Close(frame.close_reason())),
                OpCode::Text | OpCode::Binary => {
                    if self.partial.is_some() {
                        return Err(Error::ProtocolViolation(
                            "new data frame while a fragmented message is open".into(),
                        ));
                    }
                    if frame.fin {
                        return finish(frame.opcode, frame.payload);
                    }
                    self.partial = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
                }
                OpCode::Continuation => {
                    let Some((opcode, mut data)) = self.partial.take() else {
                        return Err(Error::ProtocolViolation(
                            "continuation frame without a message to continue".into(),
                        ));
                    };
                    let size = data.len() + frame.payload.len();
                    if size > self.max_size {
                        return Err(Error::FrameTooLarge {
                            size,
                            max: self.max_size,
                        });
                    }
                    data.extend_from_slice(&frame.payload);
                    if frame.fin {
                        return finish(opcode, data.freeze());
                    }
                    self.partial = Some((opcode, data));
                }
            }
        }
    }
}

fn finish(opcode: OpCode, payload: Bytes) -> Result<Incoming> {
    if opcode == OpCode::Text {
        String::from_utf8(payload.to_vec())
            .map(Incoming::Text)
            .map_err(|_| Error::Receive("invalid UTF-8 in text message".into()))
    } else {
        Ok(Incoming::Binary(payload))
    }
}
