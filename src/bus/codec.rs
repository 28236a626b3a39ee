//! Wire codec for bus payloads.
//!
//! Every message is a sequence of frames: a big-endian `u32` length followed
//! by that many body bytes. Bodies are produced by an [`EventSerializer`];
//! JSON and Bincode are built in and selected through [`WireFormat`].

use super::balance::BalanceUpdate;
use super::sync::SyncEvent;
use crate::orderbook::Order;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

/// Bytes taken by the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Errors raised while encoding or decoding bus payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("deserialization failed: {0}")]
    Deserialize(String),

    /// The buffer ends inside a frame.
    #[error("truncated frame: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    /// Body longer than a `u32` length can describe.
    #[error("frame of {0} bytes is too large")]
    FrameTooLarge(usize),
}

/// Converts bus messages to and from frame bodies.
pub trait EventSerializer: Send + Sync + std::fmt::Debug {
    fn serialize_sync(&self, event: &SyncEvent) -> Result<Vec<u8>, CodecError>;

    fn deserialize_sync(&self, data: &[u8]) -> Result<SyncEvent, CodecError>;

    fn serialize_order(&self, order: &Order) -> Result<Vec<u8>, CodecError>;

    fn deserialize_order(&self, data: &[u8]) -> Result<Order, CodecError>;

    fn serialize_balance(&self, update: &BalanceUpdate) -> Result<Vec<u8>, CodecError>;

    fn deserialize_balance(&self, data: &[u8]) -> Result<BalanceUpdate, CodecError>;

    /// MIME-like identifier of the body format.
    #[must_use]
    fn content_type(&self) -> &'static str;
}

/// Body format selected in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Json,
    Bincode,
}

impl WireFormat {
    #[must_use]
    pub fn serializer(self) -> Arc<dyn EventSerializer> {
        match self {
            WireFormat::Json => Arc::new(JsonEventSerializer),
            WireFormat::Bincode => Arc::new(BincodeEventSerializer),
        }
    }
}

/// `serde_json` bodies. Content type `application/json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventSerializer;

impl JsonEventSerializer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

impl EventSerializer for JsonEventSerializer {
    fn serialize_sync(&self, event: &SyncEvent) -> Result<Vec<u8>, CodecError> {
        Self::encode(event)
    }

    fn deserialize_sync(&self, data: &[u8]) -> Result<SyncEvent, CodecError> {
        Self::decode(data)
    }

    fn serialize_order(&self, order: &Order) -> Result<Vec<u8>, CodecError> {
        Self::encode(order)
    }

    fn deserialize_order(&self, data: &[u8]) -> Result<Order, CodecError> {
        Self::decode(data)
    }

    fn serialize_balance(&self, update: &BalanceUpdate) -> Result<Vec<u8>, CodecError> {
        Self::encode(update)
    }

    fn deserialize_balance(&self, data: &[u8]) -> Result<BalanceUpdate, CodecError> {
        Self::decode(data)
    }

    #[inline]
    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Compact binary bodies through bincode's serde bridge.
/// Content type `application/x-bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEventSerializer;

impl BincodeEventSerializer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
        bincode::serde::decode_from_slice(data, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

impl EventSerializer for BincodeEventSerializer {
    fn serialize_sync(&self, event: &SyncEvent) -> Result<Vec<u8>, CodecError> {
        Self::encode(event)
    }

    fn deserialize_sync(&self, data: &[u8]) -> Result<SyncEvent, CodecError> {
        Self::decode(data)
    }

    fn serialize_order(&self, order: &Order) -> Result<Vec<u8>, CodecError> {
        Self::encode(order)
    }

    fn deserialize_order(&self, data: &[u8]) -> Result<Order, CodecError> {
        Self::decode(data)
    }

    fn serialize_balance(&self, update: &BalanceUpdate) -> Result<Vec<u8>, CodecError> {
        Self::encode(update)
    }

    fn deserialize_balance(&self, data: &[u8]) -> Result<BalanceUpdate, CodecError> {
        Self::decode(data)
    }

    #[inline]
    fn content_type(&self) -> &'static str {
        "application/x-bincode"
    }
}

/// Appends one length-prefixed frame to `buf`.
pub fn put_frame(buf: &mut BytesMut, body: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge(body.len()))?;
    buf.reserve(FRAME_HEADER_LEN + body.len());
    buf.put_u32(len);
    buf.put_slice(body);
    Ok(())
}

/// One message holding a single frame.
pub fn encode_frame(body: &[u8]) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    put_frame(&mut buf, body)?;
    Ok(buf.freeze())
}

/// One message holding every body as consecutive frames.
pub fn encode_batch<I, B>(bodies: I) -> Result<Bytes, CodecError>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut buf = BytesMut::new();
    for body in bodies {
        put_frame(&mut buf, body.as_ref())?;
    }
    Ok(buf.freeze())
}

/// Splits a message into frame bodies without copying.
pub fn split_frames(message: &Bytes) -> Result<Vec<Bytes>, CodecError> {
    let mut cursor = message.clone();
    let mut frames = Vec::new();
    while cursor.has_remaining() {
        if cursor.remaining() < FRAME_HEADER_LEN {
            return Err(CodecError::Truncated {
                expected: FRAME_HEADER_LEN,
                available: cursor.remaining(),
            });
        }
        let len = cursor.get_u32() as usize;
        if cursor.remaining() < len {
            return Err(CodecError::Truncated {
                expected: len,
                available: cursor.remaining(),
            });
        }
        frames.push(cursor.split_to(len));
    }
    Ok(frames)
}
