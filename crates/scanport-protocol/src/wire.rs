//! Length-prefixed frame layer
//!
//! Carries one serialized message per frame:
//! `[len: u32 BE][format: u8][payload]`, where `len` counts the format byte
//! plus the payload. See the crate docs for the full layout.

use crate::{ProtocolError, Result, WireFormat};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame encoder/decoder bound to a maximum payload size and an encoding tag.
///
/// The codec is symmetric: both sides of a connection use the same `send`
/// and `receive` over their half of the stream.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
    format: WireFormat,
}

impl FrameCodec {
    pub fn new(max_payload: usize, format: WireFormat) -> Self {
        Self {
            max_payload,
            format,
        }
    }

    /// Maximum payload size accepted in either direction.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Serialize `msg` and write it as one frame.
    pub async fn send<W, M>(&self, io: &mut W, msg: &M) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
        M: Serialize,
    {
        // Serialize directly into the output buffer behind the 5-byte header
        // instead of double-allocating.
        let mut buf = Vec::with_capacity(HEADER_SIZE + 128);
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(self.format.as_byte());
        let mut buf = postcard::to_extend(msg, buf)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

        let payload_len = buf.len() - HEADER_SIZE;
        if payload_len > self.max_payload {
            return Err(ProtocolError::FrameTooLarge(payload_len, self.max_payload));
        }
        let frame_len = (payload_len + 1) as u32;
        buf[..4].copy_from_slice(&frame_len.to_be_bytes());

        io.write_all(&buf).await?;
        io.flush().await?;
        Ok(())
    }

    /// Read one frame and deserialize its payload.
    pub async fn receive<R, M>(&self, io: &mut R) -> Result<M>
    where
        R: AsyncRead + Unpin + ?Sized,
        M: DeserializeOwned,
    {
        let mut len_buf = [0u8; 4];
        io.read_exact(&mut len_buf).await?;
        let frame_len = u32::from_be_bytes(len_buf) as usize;

        if frame_len == 0 {
            return Err(ProtocolError::InvalidFormat(
                "zero-length frame".to_string(),
            ));
        }
        // Validate before allocating so a misbehaving peer cannot make us
        // buffer an arbitrarily large frame.
        let payload_len = frame_len - 1;
        if payload_len > self.max_payload {
            return Err(ProtocolError::FrameTooLarge(payload_len, self.max_payload));
        }

        let mut frame = vec![0u8; frame_len];
        io.read_exact(&mut frame).await?;

        let format = WireFormat::from_byte(frame[0]).ok_or_else(|| {
            ProtocolError::InvalidFormat(format!("unknown wire format: 0x{:02x}", frame[0]))
        })?;
        match format {
            WireFormat::Postcard => postcard::from_bytes(&frame[1..])
                .map_err(|e| ProtocolError::Deserialization(e.to_string())),
        }
    }
}

const HEADER_SIZE: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};
    use bytes::Bytes;
    use tokio::io::AsyncWriteExt;

    fn codec(max_payload: usize) -> FrameCodec {
        FrameCodec::new(max_payload, WireFormat::Postcard)
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let codec = codec(1024);

        let req = Request::ScanAll {
            index: "idx".to_string(),
            bucket: "default".to_string(),
            page_size: 50,
            limit: 100,
        };
        codec.send(&mut client, &req).await.unwrap();
        let decoded: Request = codec.receive(&mut server).await.unwrap();
        assert_eq!(req, decoded);

        codec.send(&mut server, &Response::StreamEnd).await.unwrap();
        let decoded: Response = codec.receive(&mut client).await.unwrap();
        assert!(decoded.is_stream_end());
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_payload() {
        let (mut client, _server) = tokio::io::duplex(4096);
        let codec = codec(16);

        let req = Request::Statistics {
            index: "an-index-name-well-past-sixteen-bytes".to_string(),
            bucket: "default".to_string(),
            span: crate::Span::default(),
        };
        let err = codec.send(&mut client, &req).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_, 16)));
    }

    #[tokio::test]
    async fn test_receive_rejects_oversized_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let codec = codec(8);

        // Hand-craft a header announcing a frame beyond the payload cap.
        client.write_all(&64u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0u8]).await.unwrap();
        let err = codec.receive::<_, Response>(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(63, 8)));
    }

    #[tokio::test]
    async fn test_receive_rejects_unknown_format() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let codec = codec(1024);

        client.write_all(&2u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0x7f, 0x00]).await.unwrap();
        let err = codec.receive::<_, Response>(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_receive_rejects_zero_length_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let codec = codec(1024);

        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        let err = codec.receive::<_, Response>(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_receive_reports_eof() {
        let (client, mut server) = tokio::io::duplex(4096);
        let codec = codec(1024);

        drop(client);
        let err = codec.receive::<_, Response>(&mut server).await.unwrap_err();
        match err {
            ProtocolError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_large_entries_fit_within_cap() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let codec = codec(32 * 1024);

        let entries: Vec<_> = (0..100)
            .map(|i| crate::IndexEntry {
                secondary_key: Bytes::from(format!("secondary-key-{i:05}")),
                primary_key: Bytes::from(format!("primary-{i:05}")),
            })
            .collect();
        let resp = Response::Stream {
            entries,
            error: None,
        };
        codec.send(&mut client, &resp).await.unwrap();
        let decoded: Response = codec.receive(&mut server).await.unwrap();
        assert_eq!(resp, decoded);
    }
}
