//! Tagged encoding for on-device records
//!
//! Values written to a key-value store are wrapped in an envelope naming
//! their kind, so decoding rebuilds typed shapes (timestamps, the ordered
//! index) and rejects a value stored under the wrong key as corruption.
//!
//! ```text
//! {"version":1,"kind":"record","value":{"sessionId":"s1",...}}
//! ```

use crate::error::{Error, Result};
use crate::model::PersistedState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current envelope version
pub const CODEC_VERSION: u32 = 1;

/// Kind tag of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A [`PersistedState`]
    Record,
    /// Ordered list of session ids
    Index,
    /// Active session pointer
    Pointer,
    /// Health probe value
    Probe,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    kind: ValueKind,
    value: serde_json::Value,
}

/// Wrap a value in a tagged envelope
pub fn encode<T: Serialize>(kind: ValueKind, value: &T) -> Result<String> {
    let envelope = Envelope {
        version: CODEC_VERSION,
        kind,
        value: serde_json::to_value(value)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Unwrap a tagged envelope, checking version and kind
pub fn decode<T: DeserializeOwned>(expected: ValueKind, raw: &str) -> Result<T> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| Error::Corruption(format!("unreadable envelope: {}", e)))?;

    if envelope.version > CODEC_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    if envelope.kind != expected {
        return Err(Error::Corruption(format!(
            "expected {:?}, found {:?}",
            expected, envelope.kind
        )));
    }

    serde_json::from_value(envelope.value)
        .map_err(|e| Error::Corruption(format!("malformed {:?}: {}", expected, e)))
}

/// Encode a session record
pub fn encode_record(record: &PersistedState) -> Result<String> {
    encode(ValueKind::Record, record)
}

/// Decode a session record
pub fn decode_record(raw: &str) -> Result<PersistedState> {
    decode(ValueKind::Record, raw)
}

/// Encode the session index
pub fn encode_index(ids: &[String]) -> Result<String> {
    encode(ValueKind::Index, &ids)
}

/// Decode the session index
pub fn decode_index(raw: &str) -> Result<Vec<String>> {
    decode(ValueKind::Index, raw)
}

/// Encode the active session pointer
pub fn encode_pointer(session_id: &str) -> Result<String> {
    encode(ValueKind::Pointer, &session_id)
}

/// Decode the active session pointer
pub fn decode_pointer(raw: &str) -> Result<String> {
    decode(ValueKind::Pointer, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SaveKind, SaveRequest, StorageOrigin};
    use serde_json::json;

    #[test]
    fn test_record_keeps_typed_timestamps() {
        let request = SaveRequest::new("s1", json!({"rows": [1, 2]}), "data", SaveKind::Data);
        let record = PersistedState::from_request(&request, None, StorageOrigin::Local);

        let raw = encode_record(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["kind"], "record");
        assert_eq!(value["version"], CODEC_VERSION);

        let decoded = decode_record(&raw).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.updated_at, request.stamped_at);
    }

    #[test]
    fn test_kind_mismatch_is_corruption() {
        let raw = encode_index(&["a".to_string()]).unwrap();
        let err = decode_record(&raw).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_garbage_is_corruption() {
        assert!(matches!(
            decode_index("not json").unwrap_err(),
            Error::Corruption(_)
        ));
        assert!(matches!(
            decode_pointer(r#"{"version":1,"kind":"pointer","value":7}"#).unwrap_err(),
            Error::Corruption(_)
        ));
    }

    #[test]
    fn test_future_version_rejected() {
        let raw = r#"{"version":99,"kind":"index","value":[]}"#;
        assert!(matches!(decode_index(raw).unwrap_err(), Error::Corruption(_)));
    }

    #[test]
    fn test_index_order_preserved() {
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(decode_index(&encode_index(&ids).unwrap()).unwrap(), ids);
    }
}
