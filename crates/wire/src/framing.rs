// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing for the control socket: a 4-byte
//! big-endian length prefix followed by that many bytes of JSON. Shared by
//! `jqmd`'s listener and `jqmctl`'s client so both sides speak the same
//! wire format without either depending on the other's crate.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest single message this crate will read off the wire. A
/// `DownloadDeliverable` response can legitimately be large, but nothing
/// justifies reading gigabytes into memory for one control-socket round
/// trip.
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for response")]
    Timeout,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), ProtocolError> {
    let len: u32 = bytes
        .len()
        .try_into()
        .map_err(|_| ProtocolError::MessageTooLarge { size: u32::MAX, max: MAX_MESSAGE_SIZE })?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_value<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), ProtocolError> {
    write_message(writer, &encode(value)?).await
}

pub async fn read_value<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
) -> Result<T, ProtocolError> {
    decode(&read_message(reader).await?)
}

pub async fn write_value_timeout<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    tokio::time::timeout(timeout, write_value(writer, value)).await.map_err(|_| ProtocolError::Timeout)?
}

pub async fn read_value_timeout<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
    timeout: Duration,
) -> Result<T, ProtocolError> {
    tokio::time::timeout(timeout, read_value(reader)).await.map_err(|_| ProtocolError::Timeout)?
}
