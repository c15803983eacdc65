//! Canonical signing payload.
//!
//! The payload is a CBOR array with a fixed field order, so the same message
//! always yields identical bytes regardless of how the envelope was framed on
//! the wire. Signature fields are excluded.

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::message::StreamMessage;

/// Version tag prepended to every payload.
const SIGNING_DOMAIN: &str = "datastream-sig-v0";

#[derive(Serialize)]
struct SigningFields<'a>(
    &'a str,
    &'a str,
    u32,
    i64,
    u64,
    &'a str,
    &'a str,
    Option<(i64, u64)>,
    u8,
    &'a str,
);

/// Encode the fields a publisher signature covers.
pub fn signing_payload(message: &StreamMessage) -> Result<Vec<u8>> {
    let id = &message.message_id;
    let fields = SigningFields(
        SIGNING_DOMAIN,
        &id.stream_id,
        id.partition,
        id.timestamp,
        id.sequence_number,
        &id.publisher_id,
        &id.msg_chain_id,
        message
            .prev_msg_ref
            .map(|r| (r.timestamp, r.sequence_number)),
        message.encryption_type.to_u8(),
        &message.serialized_content,
    );

    let mut buf = Vec::new();
    ciborium::into_writer(&fields, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}
