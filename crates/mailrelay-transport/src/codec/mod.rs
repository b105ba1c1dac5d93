//! Framed I/O for the relay protocol.
//!
//! Commands and replies are CRLF-terminated ASCII lines. The payload
//! is binary: a 16-byte IV followed by ciphertext, closed by the
//! literal `CRLF "." CRLF`. Payload bytes are only read in the
//! payload state; the ciphertext region is never line-split or
//! dot-unstuffed.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::crypto::{BLOCK_SIZE, IV_SIZE};
use crate::error::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum command/reply line length.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Maximum encrypted payload size (IV + ciphertext).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// End-of-payload marker, appended after encryption.
const TERMINATOR: &[u8] = b"\r\n.\r\n";

/// Framed connection for the relay protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one CRLF-terminated line, without the terminator.
    ///
    /// # Errors
    ///
    /// Fails with a framing error if the line exceeds
    /// [`MAX_LINE_LENGTH`], contains a bare CR or LF, is not valid
    /// UTF-8, or the stream closes mid-line.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // Split on LF so a CRLF straddling two reads still parses.
            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..pos]);
                self.reader.consume(pos + 1);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Framing("line too long".to_string()));
            }
        }

        if line.pop() != Some(b'\r') {
            return Err(Error::Framing("malformed line terminator".to_string()));
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Framing("line too long".to_string()));
        }
        if line.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(Error::Framing("bare CR or LF in line".to_string()));
        }

        String::from_utf8(line).map_err(|_| Error::Framing("line is not valid UTF-8".to_string()))
    }

    /// Reads the encrypted payload up to (excluding) the terminator.
    ///
    /// Only meaningful in the payload state. A terminator match is
    /// accepted only when the preceding bytes form a full IV plus a
    /// block-aligned ciphertext, so a coincidental `CRLF . CRLF`
    /// pattern inside the ciphertext is rejected instead of silently
    /// truncating the message.
    ///
    /// # Errors
    ///
    /// Fails with a framing error on oversized payloads, misaligned
    /// payloads, or a stream closed before the terminator.
    pub async fn read_payload(&mut self) -> Result<Vec<u8>> {
        let mut payload: Vec<u8> = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Framing(
                    "connection closed before payload terminator".to_string(),
                ));
            }

            // The terminator may straddle the previous chunk boundary.
            let tail_start = payload.len().saturating_sub(TERMINATOR.len() - 1);
            let tail_len = payload.len() - tail_start;
            let mut window = Vec::with_capacity(tail_len + buf.len());
            window.extend_from_slice(&payload[tail_start..]);
            window.extend_from_slice(buf);

            if let Some(pos) = find_terminator(&window) {
                let end = tail_start + pos;
                let consume = pos + TERMINATOR.len() - tail_len;
                payload.extend_from_slice(&buf[..consume]);
                payload.truncate(end);
                self.reader.consume(consume);
                return validate_payload_shape(payload);
            }

            let len = buf.len();
            payload.extend_from_slice(buf);
            self.reader.consume(len);

            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(Error::Framing("payload too large".to_string()));
            }
        }
    }

    /// Writes a command or reply line (already CRLF-terminated).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_line(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Writes IV, ciphertext, and the payload terminator.
    ///
    /// The terminator goes on the wire after the ciphertext; it is
    /// never part of the encrypted region.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_payload(&mut self, iv: &[u8], ciphertext: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(iv);
        self.write_buffer.extend_from_slice(ciphertext);
        self.write_buffer.extend_from_slice(TERMINATOR);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }
}

/// Finds the position of the payload terminator in a buffer.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

/// Checks that a terminated payload is IV plus whole cipher blocks.
fn validate_payload_shape(payload: Vec<u8>) -> Result<Vec<u8>> {
    if payload.len() < IV_SIZE + BLOCK_SIZE {
        return Err(Error::Framing("payload shorter than IV + one block".to_string()));
    }
    if (payload.len() - IV_SIZE) % BLOCK_SIZE != 0 {
        return Err(Error::Framing("payload not block-aligned".to_string()));
    }
    Ok(payload)
}
