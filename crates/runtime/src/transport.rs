//! Pipe transport between the shell and the engine process.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes of
//! UTF-8 JSON:
//!
//! ```text
//! ┌──────────────┬───────────────────────────┐
//! │ len: u32 LE  │ JSON message (len bytes)  │
//! └──────────────┴───────────────────────────┘
//! ```
//!
//! The reader half parses frames and forwards them on an unbounded channel;
//! the writer half is driven by the connection's writer task.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Frames larger than this are rejected as corrupt.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Writing half of a transport.
pub trait Transport: Send {
    fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Reading half of a transport. `run` reads until EOF or error.
pub trait TransportReceiver: Send {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Both halves of a transport plus the channel the reader feeds.
pub struct TransportParts {
    pub sender: Box<dyn Transport>,
    pub receiver: Box<dyn TransportReceiver>,
    pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Length-prefixed JSON over a pair of byte streams.
pub struct PipeTransport<W, R> {
    writer: W,
    reader: R,
    message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Creates a transport writing to `writer` and reading from `reader`.
    ///
    /// Returns the transport and the receiver of parsed inbound messages.
    pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        (
            Self {
                writer,
                reader,
                message_tx,
            },
            message_rx,
        )
    }

    /// Writes one frame.
    pub async fn send(&mut self, message: Value) -> Result<()> {
        write_frame(&mut self.writer, &message).await
    }

    /// Reads frames until EOF, forwarding each parsed message.
    ///
    /// Returns `Ok(())` when the message receiver is dropped.
    pub async fn run(&mut self) -> Result<()> {
        read_loop(&mut self.reader, &self.message_tx).await
    }

    /// Splits into independently owned halves.
    pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
        (
            PipeTransportSender {
                writer: self.writer,
            },
            PipeTransportReceiver {
                reader: self.reader,
                message_tx: self.message_tx,
            },
        )
    }

    /// Splits into boxed halves for [`Connection::new`](crate::Connection::new).
    pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
        let (sender, receiver) = self.into_parts();
        TransportParts {
            sender: Box::new(sender),
            receiver: Box::new(receiver),
            message_rx,
        }
    }
}

/// Writing half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> PipeTransportSender<W> {
    pub async fn send(&mut self, message: Value) -> Result<()> {
        write_frame(&mut self.writer, &message).await
    }
}

impl<W: AsyncWrite + Unpin + Send> Transport for PipeTransportSender<W> {
    fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { write_frame(&mut self.writer, &message).await })
    }
}

/// Reading half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
    reader: R,
    message_tx: mpsc::UnboundedSender<Value>,
}

impl<R: AsyncRead + Unpin + Send> PipeTransportReceiver<R> {
    pub async fn run(&mut self) -> Result<()> {
        read_loop(&mut self.reader, &self.message_tx).await
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportReceiver for PipeTransportReceiver<R> {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move { read_loop(&mut self.reader, &self.message_tx).await })
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> Result<()> {
    let bytes = serde_json::to_vec(message)?;
    let length = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            Error::TransportError(format!("Message too large: {} bytes", bytes.len()))
        })?;

    writer
        .write_all(&length.to_le_bytes())
        .await
        .map_err(|e| Error::TransportError(format!("Failed to write length prefix: {e}")))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| Error::TransportError(format!("Failed to write message: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::TransportError(format!("Failed to flush: {e}")))?;
    Ok(())
}

async fn read_loop<R: AsyncRead + Unpin>(
    reader: &mut R,
    message_tx: &mpsc::UnboundedSender<Value>,
) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        reader
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;

        let length = u32::from_le_bytes(len_buf) as usize;
        if length > MAX_FRAME_LEN {
            return Err(Error::ProtocolError(format!(
                "Frame length {length} exceeds limit of {MAX_FRAME_LEN} bytes"
            )));
        }

        let mut buf = vec![0u8; length];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::TransportError(format!("Failed to read message body: {e}")))?;

        match serde_json::from_slice::<Value>(&buf) {
            Ok(message) => {
                if message_tx.send(message).is_err() {
                    tracing::debug!("Message receiver dropped, stopping transport reader");
                    return Ok(());
                }
            }
            Err(e) => {
                tracing::error!("Discarding unparseable frame ({} bytes): {}", length, e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
