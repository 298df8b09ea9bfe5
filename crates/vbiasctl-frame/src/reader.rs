use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 1024;

/// Terminator of relay requests.
pub const REQUEST_TERMINATOR: u8 = b'\n';

/// Terminator of relay responses.
pub const RESPONSE_TERMINATOR: u8 = b'\0';

/// Configuration for relay text framing.
#[derive(Debug, Clone)]
pub struct TextConfig {
    /// Byte that ends each message.
    pub terminator: u8,
    /// Maximum message size in bytes, terminator excluded.
    pub max_message_size: usize,
}

impl TextConfig {
    /// Newline-terminated requests of at most 999 bytes.
    pub fn requests() -> Self {
        Self {
            terminator: REQUEST_TERMINATOR,
            max_message_size: 999,
        }
    }

    /// NUL-terminated responses, which may span many lines.
    pub fn responses() -> Self {
        Self {
            terminator: RESPONSE_TERMINATOR,
            max_message_size: 64 * 1024,
        }
    }
}

/// Reads terminator-delimited text messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get whole messages with
/// the terminator removed.
pub struct TextReader<T> {
    inner: T,
    buf: BytesMut,
    config: TextConfig,
}

impl<T: Read> TextReader<T> {
    pub fn new(inner: T, config: TextConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached between
    /// messages and `Err(FrameError::Unterminated)` when it cuts one short.
    pub fn read_message(&mut self) -> Result<String> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..]
                .iter()
                .position(|&b| b == self.config.terminator)
            {
                let end = scanned + pos;
                let message = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                self.buf.advance(end + 1);
                return Ok(message);
            }
            scanned = self.buf.len();
            if scanned > self.config.max_message_size {
                return Err(FrameError::MessageTooLarge {
                    max: self.config.max_message_size,
                });
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(FrameError::ConnectionClosed);
                }
                return Err(FrameError::Unterminated {
                    pending: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &TextConfig {
        &self.config
    }
}
