//! Typed messages over a transport.
//!
//! [`Connection`] owns its transport for the lifetime of one exchange and
//! speaks the message kinds the protocol uses: tags, digests, big buffers and
//! strings. Dropping it closes the connection on every exit path.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use revsync_core::{codec, Digest, DIGEST_LEN};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::transport::Transport;
use crate::wire::{limits::MAX_FRAME_LEN, Tag};

/// One request/reply connection to a peer.
pub struct Connection<T> {
    transport: T,
    timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    chunk_size: usize,
    max_buffer_len: u64,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, config: &SyncConfig) -> Self {
        Self {
            transport,
            timeout: config.message_timeout,
            idle_timeout: config.idle_timeout,
            chunk_size: config.chunk_size.clamp(1, MAX_FRAME_LEN),
            max_buffer_len: config.max_buffer_len,
        }
    }

    async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        let timeout = self.timeout;
        let send = self.transport.send(frame);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| SyncError::Timeout(format!("sending after {:?}", limit)))?,
            None => send.await,
        }
    }

    async fn recv_frame(&mut self) -> Result<Bytes> {
        let timeout = self.timeout;
        let recv = self.transport.recv();
        let frame = match timeout {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| SyncError::Timeout(format!("waiting for peer after {:?}", limit)))??,
            None => recv.await?,
        };
        frame.ok_or(SyncError::Closed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tags
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn send_tag(&mut self, tag: Tag) -> Result<()> {
        self.send_frame(Bytes::copy_from_slice(&[tag.as_u8()])).await
    }

    pub async fn recv_tag(&mut self) -> Result<Tag> {
        let frame = self.recv_frame().await?;
        parse_tag(&frame)
    }

    /// Wait for the next tag, bounded by the idle timeout rather than the
    /// message timeout. `None` if the peer closed the connection.
    pub async fn try_recv_tag(&mut self) -> Result<Option<Tag>> {
        let idle = self.idle_timeout;
        let recv = self.transport.recv();
        let frame = match idle {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| SyncError::Timeout(format!("peer idle for {:?}", limit)))??,
            None => recv.await?,
        };
        match frame {
            Some(frame) => parse_tag(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Receive a tag and fail unless it is `expected`.
    pub async fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let tag = self.recv_tag().await?;
        if tag != expected {
            return Err(unexpected(tag, &[expected]));
        }
        Ok(())
    }

    /// Receive `Ok` or `NotOk`.
    pub async fn recv_status(&mut self) -> Result<bool> {
        match self.recv_tag().await? {
            Tag::Ok => Ok(true),
            Tag::NotOk => Ok(false),
            other => Err(unexpected(other, &[Tag::Ok, Tag::NotOk])),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Digests
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn send_digest(&mut self, digest: &Digest) -> Result<()> {
        self.send_frame(Bytes::copy_from_slice(digest.as_bytes())).await
    }

    pub async fn recv_digest(&mut self) -> Result<Digest> {
        let frame = self.recv_frame().await?;
        Digest::try_from(frame.as_ref()).map_err(|_| {
            SyncError::Protocol(format!("digest frame of {} bytes, expected {}", frame.len(), DIGEST_LEN))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Big buffers
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a buffer as a `u64` length header followed by fixed-size chunks.
    pub async fn send_buffer(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(Bytes::copy_from_slice(&(data.len() as u64).to_le_bytes()))
            .await?;
        let mut chunks = 0usize;
        for chunk in data.chunks(self.chunk_size) {
            self.send_frame(Bytes::copy_from_slice(chunk)).await?;
            chunks += 1;
        }
        tracing::debug!(len = data.len(), chunks, "sent buffer");
        Ok(())
    }

    /// Receive a buffer sent by [`Connection::send_buffer`].
    pub async fn recv_buffer(&mut self) -> Result<Bytes> {
        let header = self.recv_frame().await?;
        let len: [u8; 8] = header.as_ref().try_into().map_err(|_| {
            SyncError::Protocol(format!("buffer header of {} bytes, expected 8", header.len()))
        })?;
        let len = u64::from_le_bytes(len);
        if len > self.max_buffer_len {
            return Err(SyncError::Protocol(format!(
                "peer announced a {} byte buffer, limit {}",
                len, self.max_buffer_len
            )));
        }

        let len = len as usize;
        // capped; the buffer grows as chunks arrive
        let mut buf = BytesMut::with_capacity(len.min(MAX_FRAME_LEN));
        while buf.len() < len {
            let chunk = self.recv_frame().await?;
            if chunk.is_empty() {
                return Err(SyncError::Protocol("empty buffer chunk".into()));
            }
            if buf.len() + chunk.len() > len {
                return Err(SyncError::Protocol(format!(
                    "buffer chunk overruns declared length {}",
                    len
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Strings
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn send_string(&mut self, s: &str) -> Result<()> {
        let mut buf = BytesMut::new();
        codec::put_string(&mut buf, s);
        self.send_buffer(&buf).await
    }

    pub async fn recv_string(&mut self) -> Result<String> {
        let buf = self.recv_buffer().await?;
        let mut slice = buf.as_ref();
        let s = codec::get_string(&mut slice)?;
        if !slice.is_empty() {
            return Err(SyncError::Protocol("trailing bytes after string".into()));
        }
        Ok(s)
    }
}

fn parse_tag(frame: &[u8]) -> Result<Tag> {
    match frame {
        [code] => Tag::try_from(*code),
        _ => Err(SyncError::Protocol(format!(
            "tag frame of {} bytes, expected 1",
            frame.len()
        ))),
    }
}

/// Protocol error for a tag arriving where others were expected.
pub(crate) fn unexpected(got: Tag, expected: &[Tag]) -> SyncError {
    SyncError::Protocol(format!("expected {:?}, got {}", expected, got))
}
