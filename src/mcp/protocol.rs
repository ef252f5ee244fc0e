use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::utils::error::{McpError, McpResult};

/// Default upper bound for a single protocol line, newline included.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Newline-delimited JSON framing shared by the tool host and the tool caller.
///
/// Every message is one compact JSON object terminated by `\n`. serde_json
/// escapes newlines inside strings, so an encoded payload never contains a raw
/// line break. Readers accept a trailing `\r` and reject lines longer than
/// `max_line_bytes`.
#[derive(Debug, Clone)]
pub struct McpProtocol {
    max_line_bytes: usize,
}

impl Default for McpProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl McpProtocol {
    /// Creates a codec with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    /// Creates a codec with a custom line limit.
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// The largest line this codec accepts.
    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Encodes a message as one newline-terminated line.
    pub fn encode<T: Serialize>(&self, message: &T) -> McpResult<BytesMut> {
        let json = serde_json::to_vec(message)
            .map_err(|e| McpError::Serialization(format!("Failed to encode message: {}", e)))?;
        let mut buffer = BytesMut::with_capacity(json.len() + 1);
        buffer.put_slice(&json);
        buffer.put_u8(b'\n');
        Ok(buffer)
    }

    /// Writes a message to a stream asynchronously and flushes it.
    pub async fn write_message_async<W, T>(&self, stream: &mut W, message: &T) -> McpResult<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let buffer = self.encode(message)?;
        stream.write_all(&buffer).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Reads the next line from a stream.
    ///
    /// `pending` holds bytes of a line that is not complete yet. Keeping it
    /// outside the future means a read cancelled by a timeout loses nothing:
    /// the next call continues where the previous one stopped.
    ///
    /// Returns `Ok(None)` at end of input. A final line without a trailing
    /// newline is still returned. An over-long line is discarded up to its
    /// newline and reported as [`McpError::InvalidMessage`]; invalid UTF-8 is
    /// reported as [`McpError::Utf8`]. In both cases the stream stays usable.
    pub async fn read_line_async<R>(
        &self,
        stream: &mut R,
        pending: &mut Vec<u8>,
    ) -> McpResult<Option<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        let budget = (self.max_line_bytes + 1).saturating_sub(pending.len()) as u64;
        let read = {
            let mut limited = (&mut *stream).take(budget);
            limited.read_until(b'\n', pending).await?
        };

        let complete = pending.last() == Some(&b'\n');
        let content_length = pending.len() - usize::from(complete);
        if content_length > self.max_line_bytes {
            let length = pending.len();
            pending.clear();
            if !complete {
                self.discard_line(stream).await?;
            }
            return Err(McpError::InvalidMessage(format!(
                "line exceeds {} bytes (read {} so far)",
                self.max_line_bytes, length
            )));
        }
        if read == 0 && pending.is_empty() {
            return Ok(None);
        }

        let line = std::mem::take(pending);
        let text = std::str::from_utf8(&line)?;
        Ok(Some(text.trim_end_matches('\n').trim_end_matches('\r').to_string()))
    }

    /// Skips input up to and including the next newline.
    async fn discard_line<R>(&self, stream: &mut R) -> McpResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let available = stream.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(position) => {
                    stream.consume(position + 1);
                    return Ok(());
                }
                None => {
                    let length = available.len();
                    stream.consume(length);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[test]
    fn encoded_line_has_single_trailing_newline() {
        let protocol = McpProtocol::new();
        let encoded = protocol
            .encode(&json!({"text": "two\nlines"}))
            .unwrap();
        let newlines = encoded.iter().filter(|b| **b == b'\n').count();
        assert_eq!(newlines, 1);
        assert_eq!(encoded.last(), Some(&b'\n'));
    }

    #[tokio::test]
    async fn reads_lines_and_trims_carriage_returns() {
        let protocol = McpProtocol::new();
        let mut reader = BufReader::new(&b"{\"a\":1}\r\n{\"b\":2}\nlast"[..]);
        let mut pending = Vec::new();

        let first = protocol.read_line_async(&mut reader, &mut pending).await.unwrap();
        assert_eq!(first.as_deref(), Some("{\"a\":1}"));
        let second = protocol.read_line_async(&mut reader, &mut pending).await.unwrap();
        assert_eq!(second.as_deref(), Some("{\"b\":2}"));
        let third = protocol.read_line_async(&mut reader, &mut pending).await.unwrap();
        assert_eq!(third.as_deref(), Some("last"));
        let end = protocol.read_line_async(&mut reader, &mut pending).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn overlong_line_is_skipped() {
        let protocol = McpProtocol::with_max_line_bytes(8);
        let mut reader = BufReader::with_capacity(4, &b"0123456789abcdef\nok\n"[..]);
        let mut pending = Vec::new();

        let err = protocol.read_line_async(&mut reader, &mut pending).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidMessage(_)));
        let next = protocol.read_line_async(&mut reader, &mut pending).await.unwrap();
        assert_eq!(next.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn invalid_utf8_is_reported_and_skipped() {
        let protocol = McpProtocol::new();
        let mut reader = BufReader::new(&b"\xff\xfe\n{}\n"[..]);
        let mut pending = Vec::new();

        let err = protocol.read_line_async(&mut reader, &mut pending).await.unwrap_err();
        assert!(matches!(err, McpError::Utf8(_)));
        let next = protocol.read_line_async(&mut reader, &mut pending).await.unwrap();
        assert_eq!(next.as_deref(), Some("{}"));
    }
}
