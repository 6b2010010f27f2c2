//! RCON wire framing
//!
//! `length:i32le | request_id:i32le | type:i32le | body | 0x00 0x00`, where
//! `length` counts every byte after itself.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::rcon::MAX_PAYLOAD_BYTES;

pub const PACKET_RESPONSE: i32 = 0;
pub const PACKET_COMMAND: i32 = 2;
pub const PACKET_AUTH_RESPONSE: i32 = 2;
pub const PACKET_LOGIN: i32 = 3;

/// Request id the server uses to signal a rejected login
pub const AUTH_FAILED_ID: i32 = -1;

/// id + type + two terminating nulls
const HEADER_AND_PADDING: usize = 4 + 4 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(request_id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = (HEADER_AND_PADDING + body.len()) as i32;
        let mut buf = Vec::with_capacity(4 + length as usize);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&self.request_id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        if self.body.len() > MAX_PAYLOAD_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("command body of {} bytes exceeds limit", self.body.len()),
            ));
        }
        writer.write_all(&self.encode()).await?;
        writer.flush().await
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Packet> {
        let length = reader.read_i32_le().await?;
        if length < HEADER_AND_PADDING as i32
            || length as usize > HEADER_AND_PADDING + MAX_PAYLOAD_BYTES
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid packet length {}", length),
            ));
        }

        let mut rest = vec![0u8; length as usize];
        reader.read_exact(&mut rest).await?;

        let request_id = i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let kind = i32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let body_bytes = &rest[8..rest.len() - 2];
        let body = String::from_utf8_lossy(body_bytes)
            .trim_end_matches('\0')
            .to_string();

        Ok(Packet {
            request_id,
            kind,
            body,
        })
    }
}
