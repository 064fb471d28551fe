use anyhow::{Result, anyhow};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::MAX_TEXT_FRAME;

const KIND_TEXT: u8 = 0x01;
const KIND_BINARY: u8 = 0x02;

/// One message on a channel. The protocol is framed by message type:
/// the file name travels as text, the payload as a single binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn text(s: impl Into<String>) -> Self {
        Frame::Text(s.into())
    }
}

/// Write a frame as `[kind u8][len u32 BE][body]`
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (kind, body) = match frame {
        Frame::Text(s) => (KIND_TEXT, s.as_bytes()),
        Frame::Binary(b) => (KIND_BINARY, b.as_ref()),
    };
    let len: u32 = body
        .len()
        .try_into()
        .map_err(|_| anyhow!("Message too large: {} bytes", body.len()))?;

    writer.write_u8(kind).await?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next frame. `Ok(None)` means the peer finished the stream on a frame boundary.
///
/// Binary frames larger than `max_binary` and text frames larger than
/// [`MAX_TEXT_FRAME`] are refused before the body is read.
pub async fn read_frame<R>(reader: &mut R, max_binary: usize) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut kind = [0u8; 1];
    if reader.read(&mut kind).await? == 0 {
        return Ok(None);
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let limit = match kind[0] {
        KIND_TEXT => MAX_TEXT_FRAME,
        KIND_BINARY => max_binary,
        other => return Err(anyhow!("Unknown frame kind: {:#04x}", other)),
    };
    if len > limit {
        return Err(anyhow!("Message too large: {} bytes (max {})", len, limit));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    let frame = if kind[0] == KIND_TEXT {
        Frame::Text(String::from_utf8_lossy(&buf).into_owned())
    } else {
        Frame::Binary(Bytes::from(buf))
    };
    Ok(Some(frame))
}
