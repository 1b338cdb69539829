//! CBOR encoding of entity records for local adapters.

use crate::entity::EntityRecord;
use crate::error::{CoreError, CoreResult};

/// Encodes a record to CBOR bytes.
pub fn encode_record(record: &EntityRecord) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes).map_err(|e| CoreError::Codec(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a record from CBOR bytes.
pub fn decode_record(bytes: &[u8]) -> CoreResult<EntityRecord> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::Codec(e.to_string()))
}
