//! Wire codec
//!
//! Frame layout:
//! ```text
//! [len: u32 LE][crc32: u32 LE][payload: JSON, len bytes]
//! ```
//! The checksum covers the payload only. Operation frames, submissions and
//! initial loads all use this framing. Every routed frame carries the
//! replicable id first so the registry can dispatch without knowing the
//! operation type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use super::errors::CodecError;
use super::listener::ReplicatedOperation;

/// Frame header size in bytes
pub const FRAME_HEADER_LEN: usize = 8;

/// Upper bound on one frame's payload
pub const MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// Operation fanned out by a master, addressed to a replicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFrame<O> {
    pub replicable_id: String,
    pub operation: ReplicatedOperation<O>,
}

#[derive(Deserialize)]
struct RoutingHeader {
    replicable_id: String,
}

/// Write one framed value.
pub fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    let len = payload.len() as u64;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    let checksum = crc32fast::hash(&payload);

    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&checksum.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read one framed value, verifying its checksum.
pub fn read_frame<R, T>(reader: &mut R) -> Result<T, CodecError>
where
    R: Read + ?Sized,
    T: DeserializeOwned,
{
    let payload = read_payload(reader)?;
    Ok(serde_json::from_slice(&payload)?)
}

fn read_payload<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, CodecError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header)?;

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
    let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;

    let actual = crc32fast::hash(&payload);
    if actual != expected {
        return Err(CodecError::ChecksumMismatch { expected, actual });
    }
    Ok(payload)
}

/// Encode one value into a standalone frame.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    write_frame(&mut bytes, value)?;
    Ok(bytes)
}

/// Decode a standalone frame; trailing bytes are rejected.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut reader = bytes;
    let value = read_frame(&mut reader)?;
    if !reader.is_empty() {
        return Err(CodecError::Unexpected(format!(
            "{} trailing bytes after frame",
            reader.len()
        )));
    }
    Ok(value)
}

/// Replicable id a routed frame is addressed to.
pub fn routing_key(bytes: &[u8]) -> Result<String, CodecError> {
    let header: RoutingHeader = decode(bytes)?;
    Ok(header.replicable_id)
}
