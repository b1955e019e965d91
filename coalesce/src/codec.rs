//! Value serialization at the cache boundary.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Maps between an application value type and the byte payloads kept in
/// the store. Implementations must round-trip every value the actor is
/// asked to cache.
pub trait Codec<T>: Send + Sync {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn unmarshal(&self, data: &[u8]) -> Result<T, CodecError>;
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn marshal(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// MessagePack payloads via `rmp-serde`. Struct fields are encoded by
/// name, so payloads survive field reordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgpackCodec;

impl<T> Codec<T> for MsgpackCodec
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn marshal(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: u64,
        tags: Vec<String>,
        ratio: f64,
    }

    fn payload() -> Payload {
        Payload {
            id: 31,
            tags: vec!["edit".to_string(), "view".to_string()],
            ratio: 0.5,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let codec = JsonCodec;
        let data = Codec::<Payload>::marshal(&codec, &payload()).unwrap();
        let back: Payload = codec.unmarshal(&data).unwrap();
        assert_eq!(back, payload());
    }

    #[test]
    fn test_msgpack_round_trip() {
        let codec = MsgpackCodec;
        let data = Codec::<Payload>::marshal(&codec, &payload()).unwrap();
        let back: Payload = codec.unmarshal(&data).unwrap();
        assert_eq!(back, payload());
    }

    #[test]
    fn test_garbage_bytes_fail_decode() {
        let json: Result<Payload, _> = JsonCodec.unmarshal(b"{not json");
        assert!(matches!(json, Err(CodecError::Decode(_))));

        let msgpack: Result<Payload, _> = MsgpackCodec.unmarshal(&[0xc1]);
        assert!(matches!(msgpack, Err(CodecError::Decode(_))));
    }
}
