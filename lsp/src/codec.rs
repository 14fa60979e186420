//! JSON-RPC framing codec for LSP communication.
//!
//! LSP uses `Content-Length: N\r\n\r\n{json}` framing over stdin/stdout.
//! [`encode_frame`] and [`FrameWriter`] produce frames; [`FrameDecoder`]
//! consumes bytes as they arrive and yields complete frames without ever
//! waiting on the stream itself, so the caller owns the blocking policy.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{FramingError, LspError, Result};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Maximum size of a header block before the blank separator line.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Serialize `msg` and prepend its `Content-Length` header.
///
/// The length is the UTF-8 byte count of the body, not its character count.
pub fn encode_frame(msg: &serde_json::Value) -> Result<Vec<u8>, FramingError> {
    let body = serde_json::to_vec(msg).map_err(FramingError::Serialize)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());

    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Bytes are pushed with [`extend`](Self::extend) as they are read; each
/// [`decode`](Self::decode) call returns at most one complete frame and leaves
/// any trailing bytes buffered for the next call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

/// Parsed header block: where the body starts and how long it is.
struct Header {
    body_start: usize,
    content_length: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether bytes of an incomplete frame are buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` when more data is needed. Malformed headers,
    /// oversized frames, and bodies that are not JSON are errors.
    pub fn decode(&mut self) -> Result<Option<serde_json::Value>, FramingError> {
        let Some(header) = self.parse_header()? else {
            return Ok(None);
        };

        let body_end = header.body_start + header.content_length;
        if self.buf.len() < body_end {
            return Ok(None);
        }

        let parsed = serde_json::from_slice(&self.buf[header.body_start..body_end]);
        // Consume the frame even if the body is bad so the stream can resync.
        self.buf.drain(..body_end);
        parsed.map(Some).map_err(FramingError::InvalidJson)
    }

    /// Parse header lines until the empty separator line.
    ///
    /// Returns `None` if the header block is not complete yet.
    fn parse_header(&self) -> Result<Option<Header>, FramingError> {
        let mut content_length: Option<usize> = None;
        let mut pos = 0;

        loop {
            let Some(nl) = self.buf[pos..].iter().position(|&b| b == b'\n') else {
                if self.buf.len() > MAX_HEADER_BYTES {
                    return Err(FramingError::MalformedHeader(format!(
                        "no header terminator within {MAX_HEADER_BYTES} bytes"
                    )));
                }
                return Ok(None);
            };

            let raw = &self.buf[pos..pos + nl];
            pos += nl + 1;

            let line = std::str::from_utf8(raw)
                .map_err(|_| FramingError::MalformedHeader("header is not UTF-8".to_string()))?;
            let line = line.strip_suffix('\r').unwrap_or(line);

            if line.trim().is_empty() {
                break;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(FramingError::MalformedHeader(line.to_string()));
            };

            // Header names are case-insensitive.
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                let len: usize = value
                    .parse()
                    .map_err(|_| FramingError::InvalidContentLength(value.to_string()))?;
                content_length = Some(len);
            }
            // Ignore other headers (e.g. Content-Type)
        }

        let content_length = content_length.ok_or(FramingError::MissingContentLength)?;
        if content_length > MAX_FRAME_BYTES {
            return Err(FramingError::FrameTooLarge {
                len: content_length,
                max: MAX_FRAME_BYTES,
            });
        }

        Ok(Some(Header {
            body_start: pos,
            content_length,
        }))
    }
}

/// Writes JSON-RPC frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<()> {
        let frame = encode_frame(msg)?;

        self.writer
            .write_all(&frame)
            .await
            .map_err(|e| LspError::io("writing frame", e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| LspError::io("flushing frame", e))?;

        Ok(())
    }

    /// Shut down the underlying writer, closing the server's stdin.
    pub async fn close(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| LspError::io("closing writer", e))
    }
}
