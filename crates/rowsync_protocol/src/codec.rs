//! Per-session wire encoding.

use crate::error::{CodecError, CodecResult};
use rowsync_schema::SerializationFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a message in the given format.
pub fn encode<T: Serialize>(format: SerializationFormat, value: &T) -> CodecResult<Vec<u8>> {
    match format {
        SerializationFormat::Json => {
            serde_json::to_vec(value).map_err(|e| CodecError::encoding_failed(format, e))
        }
        SerializationFormat::Binary => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)
                .map_err(|e| CodecError::encoding_failed(format, e))?;
            Ok(buf)
        }
    }
}

/// Decodes a message in the given format.
pub fn decode<T: DeserializeOwned>(format: SerializationFormat, bytes: &[u8]) -> CodecResult<T> {
    match format {
        SerializationFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(format, e))
        }
        SerializationFormat::Binary => {
            ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(format, e))
        }
    }
}
