//! RPC channel: request/notification writes and bounded polling reads over
//! one framed byte stream pair.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::Instant;

use crate::codec::{FrameDecoder, FrameWriter};
use crate::error::{FramingError, LspError, Result};
use crate::protocol::{self, Notification, Request, ResponseError};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// A decoded message from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Reply to one of our requests.
    Response {
        id: u64,
        result: Option<serde_json::Value>,
        error: Option<ResponseError>,
    },
    /// Server-initiated request; it expects a reply carrying `id`.
    ServerRequest {
        id: serde_json::Value,
        method: String,
        params: Option<serde_json::Value>,
    },
    /// Server-initiated notification; no reply.
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

/// Classify a decoded frame by which of `id`, `method`, `result`/`error`
/// it carries. Returns `None` for shapes that are none of the three.
fn parse_incoming(mut frame: serde_json::Value) -> Option<IncomingMessage> {
    let obj = frame.as_object_mut()?;
    let id = obj.remove("id");
    let method = obj
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let params = obj.remove("params");
    let result = obj.remove("result");
    let error = obj.remove("error");

    match (id, method) {
        (Some(id), None) if result.is_some() || error.is_some() => {
            Some(IncomingMessage::Response {
                id: id.as_u64()?,
                result,
                error: error.map(|raw| {
                    serde_json::from_value(raw.clone()).unwrap_or_else(|_| ResponseError {
                        code: 0,
                        message: raw.to_string(),
                    })
                }),
            })
        }
        (Some(id), Some(method)) => Some(IncomingMessage::ServerRequest { id, method, params }),
        (None, Some(method)) => Some(IncomingMessage::Notification { method, params }),
        _ => None,
    }
}

/// Framed JSON-RPC channel over a reader/writer pair.
///
/// The channel is the only owner of both halves; nothing else reads or
/// writes the underlying streams.
pub struct RpcChannel<R, W> {
    reader: R,
    writer: FrameWriter<W>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    next_id: u64,
}

impl<R, W> RpcChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: FrameWriter::new(writer),
            decoder: FrameDecoder::new(),
            read_buf: vec![0; READ_CHUNK_BYTES],
            next_id: 1,
        }
    }

    /// Send a request and return its id for correlation.
    ///
    /// Ids start at 1 and increase by one per request on this channel.
    pub async fn send_request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request).map_err(FramingError::Serialize)?;
        self.writer.write_frame(&frame).await?;
        tracing::trace!(id, method, "sent request");
        Ok(id)
    }

    pub async fn send_notification(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification).map_err(FramingError::Serialize)?;
        self.writer.write_frame(&frame).await?;
        tracing::trace!(method, "sent notification");
        Ok(())
    }

    /// Write a pre-built message as-is.
    pub async fn send_raw(&mut self, msg: &serde_json::Value) -> Result<()> {
        self.writer.write_frame(msg).await
    }

    /// Answer a server request we do not implement.
    ///
    /// Servers send `client/registerCapability`, `workspace/configuration`,
    /// etc. and may stall until they get a reply.
    pub async fn reply_method_not_found(
        &mut self,
        id: &serde_json::Value,
        method: &str,
    ) -> Result<()> {
        tracing::debug!(method, "server sent request; replying method not found");
        self.send_raw(&protocol::method_not_found(id, method)).await
    }

    /// Wait up to `timeout` for one complete message.
    ///
    /// Returns `Ok(None)` when the timeout elapses first. Bytes of a
    /// partially received frame stay buffered for the next call. End of
    /// stream is [`LspError::ServerClosed`], or a truncation error when it
    /// cuts a frame short.
    pub async fn poll(&mut self, timeout: Duration) -> Result<Option<IncomingMessage>> {
        let deadline = Instant::now() + timeout;

        loop {
            while let Some(frame) = self.decoder.decode()? {
                match parse_incoming(frame) {
                    Some(msg) => return Ok(Some(msg)),
                    None => tracing::trace!("ignoring JSON-RPC frame with unknown shape"),
                }
            }

            // `read` is cancel-safe: on timeout no bytes have been consumed.
            let read = tokio::time::timeout_at(deadline, self.reader.read(&mut self.read_buf));
            match read.await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    if self.decoder.has_partial() {
                        return Err(FramingError::Truncated {
                            buffered: self.decoder.buffered(),
                        }
                        .into());
                    }
                    return Err(LspError::ServerClosed);
                }
                Ok(Ok(n)) => self.decoder.extend(&self.read_buf[..n]),
                Ok(Err(e)) => return Err(LspError::io("reading from server", e)),
            }
        }
    }

    /// Close the write half so the peer sees end of input.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }
}
