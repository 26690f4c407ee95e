//! Time-sliced frame transport over any byte endpoint.
//!
//! `FrameTransport` owns the endpoint and its accumulation buffer. Reads are
//! bounded by a slice so the caller regains control regularly even when the
//! guest is silent.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use crate::error::{Result, TransportError};
use crate::frame::{Frame, FrameBuffer, DELIMITER};

pub const DEFAULT_READ_CHUNK: usize = 256;
pub const DEFAULT_POLL_SLICE: Duration = Duration::from_secs(1);

pub struct FrameTransport<E> {
    endpoint: E,
    buffer: FrameBuffer,
    scratch: Vec<u8>,
}

impl<E> FrameTransport<E>
where
    E: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            buffer: FrameBuffer::new(),
            scratch: vec![0; DEFAULT_READ_CHUNK],
        }
    }

    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.scratch = vec![0; chunk.max(1)];
        self
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.buffer = FrameBuffer::with_max_frame(max_frame);
        self
    }

    /// Wait at most `slice` for input and buffer whatever arrives (up to one
    /// chunk). Returns `false` when the slice elapsed without data.
    ///
    /// Cancel safe: dropping the future before it completes loses no bytes.
    pub async fn poll(&mut self, slice: Duration) -> Result<bool> {
        let read = tokio::time::timeout(slice, self.endpoint.read(&mut self.scratch)).await;
        match read {
            Err(_) => Ok(false),
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(n)) => {
                let dropped = self.buffer.push(&self.scratch[..n]);
                trace!(bytes = n, state = ?self.buffer.state(), "serial bytes received");
                if dropped > 0 {
                    warn!(dropped, "Discarding oversized line without delimiter");
                }
                Ok(true)
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    pub fn extract_frame(&mut self) -> Option<Frame> {
        self.buffer.extract()
    }

    /// Write `text` followed by one delimiter and flush.
    pub async fn write(&mut self, text: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(DELIMITER);
        self.endpoint.write_all(&bytes).await?;
        self.endpoint.flush().await?;
        Ok(())
    }

    /// Shut the endpoint down and release it.
    pub async fn close(mut self) -> Result<()> {
        self.endpoint.shutdown().await?;
        Ok(())
    }
}
