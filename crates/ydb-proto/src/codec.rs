//! Frame codec.
//!
//! Messages travel as `[4-byte length as u32 big-endian] + [JSON data]`.
//! This module owns the JSON half; the transport writes and reads the
//! prefix. Both directions enforce [`MAX_MESSAGE_SIZE`].

use crate::rpc::{RequestFrame, ResponseFrame};
use thiserror::Error;

/// Upper bound on a single message, to prevent unbounded allocation from a
/// corrupt or hostile peer.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("message too large: {len} bytes (max {MAX_MESSAGE_SIZE} bytes)")]
    TooLarge { len: usize },
}

pub fn encode_request(frame: &RequestFrame) -> Result<Vec<u8>, CodecError> {
    let data = serde_json::to_vec(frame)?;
    check_len(data.len())?;
    Ok(data)
}

pub fn decode_request(data: &[u8]) -> Result<RequestFrame, CodecError> {
    check_len(data.len())?;
    Ok(serde_json::from_slice(data)?)
}

pub fn encode_response(frame: &ResponseFrame) -> Result<Vec<u8>, CodecError> {
    let data = serde_json::to_vec(frame)?;
    check_len(data.len())?;
    Ok(data)
}

pub fn decode_response(data: &[u8]) -> Result<ResponseFrame, CodecError> {
    check_len(data.len())?;
    Ok(serde_json::from_slice(data)?)
}

fn check_len(len: usize) -> Result<(), CodecError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge { len });
    }
    Ok(())
}
