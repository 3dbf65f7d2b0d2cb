//! Framed TCP connection halves
//!
//! A tagged frame travels behind a 4-byte big-endian length header. The
//! header belongs to the transport only; the tagged frame itself carries no
//! length prefix.

use crate::error::{Result, TransportError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Length header size in bytes
pub const FRAME_HEADER_SIZE: usize = 4;

/// Read side of a peer connection with a reusable buffer
pub(crate) struct FrameReader {
    half: OwnedReadHalf,
    peer_addr: SocketAddr,
    max_frame_size: usize,
    read_buffer: BytesMut,
}

/// Write side of a peer connection with a reusable buffer
pub(crate) struct FrameWriter {
    half: OwnedWriteHalf,
    peer_addr: SocketAddr,
    max_frame_size: usize,
    write_buffer: BytesMut,
}

/// Split a connected stream into framed halves
pub(crate) fn split(stream: TcpStream, peer_addr: SocketAddr, max_frame_size: usize) -> (FrameReader, FrameWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        FrameReader {
            half: read_half,
            peer_addr,
            max_frame_size,
            read_buffer: BytesMut::with_capacity(64 * 1024),
        },
        FrameWriter {
            half: write_half,
            peer_addr,
            max_frame_size,
            write_buffer: BytesMut::with_capacity(64 * 1024),
        },
    )
}

impl FrameReader {
    /// Read one frame. `Ok(None)` means the peer closed the connection cleanly.
    pub(crate) async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        let mut len_bytes = [0u8; FRAME_HEADER_SIZE];
        match self.half.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(TransportError::connection_with_source(
                    "Failed to read frame length",
                    Some(self.peer_addr),
                    e,
                ))
            }
        }

        let frame_len = (&len_bytes[..]).get_u32() as usize;
        if frame_len > self.max_frame_size {
            return Err(TransportError::protocol(format!(
                "Frame size {} from {} exceeds maximum {}",
                frame_len, self.peer_addr, self.max_frame_size
            )));
        }

        // Reuse the existing allocation when it is large enough
        self.read_buffer.clear();
        self.read_buffer.resize(frame_len, 0);

        self.half.read_exact(&mut self.read_buffer).await.map_err(|e| {
            TransportError::connection_with_source(
                "Failed to read frame body",
                Some(self.peer_addr),
                e,
            )
        })?;

        trace!(peer = %self.peer_addr, bytes = frame_len, "Received frame");

        Ok(Some(self.read_buffer.split_to(frame_len).freeze()))
    }
}

impl FrameWriter {
    /// Write one frame behind its length header with a single write call.
    /// A frame over the size limit is rejected before anything is written.
    pub(crate) async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        codec::check_len(frame.len(), self.max_frame_size)?;

        self.write_buffer.clear();
        self.write_buffer.put_u32(frame.len() as u32);
        self.write_buffer.extend_from_slice(frame);

        self.half.write_all(&self.write_buffer).await.map_err(|e| {
            TransportError::connection_with_source("Failed to write frame", Some(self.peer_addr), e)
        })?;

        trace!(peer = %self.peer_addr, bytes = frame.len(), "Sent frame");
        Ok(())
    }

    /// Half-close so the peer reads a clean end of stream
    pub(crate) async fn shutdown(&mut self) {
        let _ = self.half.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frames_survive_tcp_segmentation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let (mut reader, _writer) = split(stream, peer, 1024 * 1024);
            let mut frames = Vec::new();
            while let Some(frame) = reader.read_frame().await.unwrap() {
                frames.push(frame);
            }
            frames
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (_reader, mut writer) = split(stream, addr, 1024 * 1024);
        let sizes = [0usize, 1, 100, 65536, 300_000];
        for size in sizes {
            writer.write_frame(&vec![0xAB; size]).await.unwrap();
        }
        writer.shutdown().await;
        drop(writer);
        drop(_reader);

        let frames = server.await.unwrap();
        assert_eq!(frames.len(), sizes.len());
        for (frame, size) in frames.iter().zip(sizes) {
            assert_eq!(frame.len(), size);
            assert!(frame.iter().all(|b| *b == 0xAB));
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let (mut reader, _writer) = split(stream, peer, 16);
            reader.read_frame().await
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (_reader, mut writer) = split(stream, addr, 1024);
        writer.write_frame(&[0u8; 17]).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(TransportError::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_oversized_write_is_rejected_before_sending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let (mut reader, _writer) = split(stream, peer, 1024);
            let mut frames = Vec::new();
            while let Some(frame) = reader.read_frame().await.unwrap() {
                frames.push(frame);
            }
            frames
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (_reader, mut writer) = split(stream, addr, 16);
        let err = writer.write_frame(&[0u8; 17]).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
        assert!(err.to_string().contains("exceeds maximum 16"));

        // The connection is still usable and nothing partial went out
        writer.write_frame(&[7u8; 16]).await.unwrap();
        writer.shutdown().await;

        let frames = server.await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[7u8; 16]);
    }
}
