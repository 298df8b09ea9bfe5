use std::io::Write;

use crate::error::{FrameError, Result};
use crate::reader::{REQUEST_TERMINATOR, RESPONSE_TERMINATOR};

/// Writes terminator-delimited text messages to any `Write` stream.
pub struct TextWriter<T> {
    inner: T,
    terminator: u8,
}

impl<T: Write> TextWriter<T> {
    pub fn new(inner: T, terminator: u8) -> Self {
        Self { inner, terminator }
    }

    /// A writer for newline-terminated relay requests.
    pub fn requests(inner: T) -> Self {
        Self::new(inner, REQUEST_TERMINATOR)
    }

    /// A writer for NUL-terminated relay responses.
    pub fn responses(inner: T) -> Self {
        Self::new(inner, RESPONSE_TERMINATOR)
    }

    /// Write one message followed by the terminator, then flush.
    ///
    /// A message may not contain the terminator itself.
    pub fn send(&mut self, message: &str) -> Result<()> {
        if message.as_bytes().contains(&self.terminator) {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "message contains its own terminator",
            )));
        }
        self.inner.write_all(message.as_bytes())?;
        self.inner.write_all(&[self.terminator])?;
        self.inner.flush()?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{TextConfig, TextReader};

    #[test]
    fn response_gets_nul() {
        let mut writer = TextWriter::responses(Vec::new());
        writer.send("ok\n").unwrap();
        assert_eq!(writer.into_inner(), b"ok\n\0");
    }

    #[test]
    fn request_rejects_embedded_newline() {
        let mut writer = TextWriter::requests(Vec::new());
        assert!(writer.send("probe\nreset").is_err());
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = TextWriter::requests(left);
        let mut reader = TextReader::new(right, TextConfig::requests());

        writer.send("select 0x9f eth0").unwrap();
        writer.send("get_Tchip").unwrap();
        assert_eq!(reader.read_message().unwrap(), "select 0x9f eth0");
        assert_eq!(reader.read_message().unwrap(), "get_Tchip");
    }
}
