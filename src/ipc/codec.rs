//! Newline-delimited JSON framing for envelopes.
//!
//! One envelope per line. Readers go through [`LineReader`], writers through
//! [`write_line`] so every envelope is flushed as soon as it is ready.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::ipc::envelope::{EnvelopeError, RequestEnvelope, ResponseEnvelope};

/// Serialize a message as a single `\n`-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, EnvelopeError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parse and validate a request envelope received by a worker.
pub fn decode_request(line: &str) -> Result<RequestEnvelope, EnvelopeError> {
    let envelope: RequestEnvelope = serde_json::from_str(line.trim())?;
    envelope.validate()?;
    Ok(envelope)
}

/// Parse a response envelope received by the front process.
pub fn decode_response(line: &str) -> Result<ResponseEnvelope, EnvelopeError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Encode `message`, write it and flush.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), EnvelopeError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(message)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Line reader that never fails on bad bytes.
///
/// Invalid UTF-8 is replaced rather than returned as an error, so one corrupt
/// line is discarded by the envelope decoder instead of ending the read loop.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at EOF.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
