//! Connection over any async byte sink (socket, tty, character device)

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::Connection;
use crate::error::TransportError;

/// Connection backed by an `AsyncWrite`
///
/// The writer is dropped on `disconnect`, which releases the OS handle.
pub struct StreamConnection<W> {
    label: String,
    writer: Option<W>,
    stream_open: bool,
}

impl<W> StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(label: impl Into<String>, writer: W) -> Self {
        Self {
            label: label.into(),
            writer: Some(writer),
            stream_open: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl<W> Connection for StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let writer = match self.writer.as_mut() {
            Some(w) if self.stream_open => w,
            _ => return Err(TransportError::io(format!("{}: stream closed", self.label))),
        };

        writer
            .write_all(data)
            .await
            .map_err(|e| TransportError::io(format!("{}: write failed: {}", self.label, e)))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::io(format!("{}: flush failed: {}", self.label, e)))?;

        debug!(target_device = %self.label, bytes = data.len(), "Wrote bytes");
        Ok(())
    }

    async fn close_stream(&mut self) -> Result<(), TransportError> {
        if !self.stream_open {
            return Ok(());
        }
        self.stream_open = false;

        if let Some(writer) = self.writer.as_mut() {
            writer
                .shutdown()
                .await
                .map_err(|e| TransportError::io(format!("{}: shutdown failed: {}", self.label, e)))?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stream_open = false;
        if self.writer.take().is_some() {
            debug!(target_device = %self.label, "Disconnected");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream_open && self.writer.is_some()
    }
}
