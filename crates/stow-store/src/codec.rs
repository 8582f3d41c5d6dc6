//! Payload codecs and the envelope every entity is stored in.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stow_types::{Identity, IndexKey, StorageKey};

use crate::error::{StoreError, StoreResult};

/// Envelope layout version written by this crate.
const ENVELOPE_VERSION: u8 = 1;

/// How an entity's payload is encoded inside its envelope.
///
/// `Bincode` is compact but cannot decode self-describing types such as
/// `serde_json::Value` or untagged enums; use `Json` for those.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Bincode,
    Json,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, String> {
        match self {
            Self::Bincode => bincode::serialize(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
        match self {
            Self::Bincode => bincode::deserialize(bytes).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bincode => write!(f, "bincode"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// The stored form of an entity.
///
/// The envelope records the codec its payload was written with, so data
/// stays readable after a store is reconfigured, and the index keys it was
/// written under, so re-persisting or deleting can unlink old entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u8,
    pub kind: String,
    pub codec: Codec,
    pub indexes: Vec<IndexKey>,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: &str, codec: Codec, indexes: Vec<IndexKey>, payload: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            kind: kind.to_string(),
            codec,
            indexes,
            payload,
        }
    }

    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode the envelope stored for `id`.
    pub fn from_bytes(id: &Identity, bytes: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: StorageKey::object(id),
            reason,
        };
        let envelope: Self =
            bincode::deserialize(bytes).map_err(|e| corrupt(format!("bad envelope: {e}")))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(corrupt(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }

    /// Decode the payload with the codec it was written with.
    pub fn decode<T: DeserializeOwned>(&self, id: &Identity) -> StoreResult<T> {
        self.codec
            .decode(&self.payload)
            .map_err(|reason| StoreError::Corrupt {
                key: StorageKey::object(id),
                reason: format!("{} payload: {reason}", self.codec),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        tags: Vec<String>,
    }

    fn sample() -> Sample {
        Sample {
            name: "x".into(),
            tags: vec!["a".into(), "b".into()],
        }
    }

    fn id() -> Identity {
        Identity::new("A1").unwrap()
    }

    #[test]
    fn envelope_records_codec_for_reads() {
        for codec in [Codec::Bincode, Codec::Json] {
            let payload = codec.encode(&sample()).unwrap();
            let envelope = Envelope::new("sample", codec, vec![], payload);
            let bytes = envelope.to_bytes().unwrap();

            let back = Envelope::from_bytes(&id(), &bytes).unwrap();
            assert_eq!(back.codec, codec);
            assert_eq!(back.decode::<Sample>(&id()).unwrap(), sample());
        }
    }

    #[test]
    fn json_payload_is_readable_text() {
        let payload = Codec::Json.encode(&sample()).unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.contains("\"name\":\"x\""));
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = Envelope::from_bytes(&id(), b"\xff\xff").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn unknown_version_is_corrupt() {
        let mut envelope = Envelope::new("sample", Codec::Json, vec![], b"{}".to_vec());
        envelope.version = 99;
        let bytes = bincode::serialize(&envelope).unwrap();
        let err = Envelope::from_bytes(&id(), &bytes).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn undecodable_payload_is_corrupt() {
        let envelope = Envelope::new("sample", Codec::Json, vec![], b"not json".to_vec());
        let err = envelope.decode::<Sample>(&id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
