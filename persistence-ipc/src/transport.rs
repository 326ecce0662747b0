// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Length-prefixed `bincode` framing over an async byte stream, used for both directions of the
//! supervisor socket.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::SupervisorMessage;

/// Cap on a single frame's encoded size, guarding against a misbehaving peer claiming an
/// unreasonable length prefix.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Serializes `message` and writes it as a 4-byte big-endian length prefix followed by the
/// `bincode` payload.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &SupervisorMessage) -> anyhow::Result<()> {
    let payload = bincode::serialize(message)?;
    let len = u32::try_from(payload.len())?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame and deserializes it as a [`SupervisorMessage`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> anyhow::Result<SupervisorMessage> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte cap");

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}
