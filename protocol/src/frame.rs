use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use utilities::result::{DfsError, Result};

/// Upper bound on a single frame body. Envelopes are tiny and chunk data is
/// streamed outside of frames, so anything larger is a corrupt stream.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Every message on the wire is one frame: a `u32` little-endian body length
/// followed by the body bytes. Envelope frames carry JSON, data frames carry
/// raw bytes.
pub async fn write_frame(stream: &mut (impl AsyncWrite + Unpin), body: &[u8]) -> Result<()> {
    stream.write_u32_le(body.len() as u32).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame(stream: &mut (impl AsyncRead + Unpin)) -> Result<Vec<u8>> {
    let body_len = stream.read_u32_le().await?;
    if body_len > MAX_FRAME_LEN {
        return Err(DfsError::Internal(format!(
            "frame length {body_len} exceeds limit"
        )));
    }
    let mut body = vec![0u8; body_len as usize];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn send_json<T: Serialize>(
    stream: &mut (impl AsyncWrite + Unpin),
    value: &T,
) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    write_frame(stream, &body).await
}

pub async fn recv_json<T: DeserializeOwned>(stream: &mut (impl AsyncRead + Unpin)) -> Result<T> {
    let body = read_frame(stream).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello frames").await.unwrap();
        write_frame(&mut buf, b"").await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"hello frames");
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
