//! MsgPack codec using `rmp-serde`.
//!
//! Always `to_vec_named`: structs go on the wire as maps with field names,
//! so both ends stay compatible when fields are added.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// MessagePack codec for wire payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value as a struct-as-map MsgPack document.
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PmpError;
    use crate::facade::RegistrationResult;

    #[test]
    fn test_structs_encode_as_maps() {
        let encoded = MsgPackCodec::encode(&RegistrationResult::failure("quota")).unwrap();
        // fixmap with two entries
        assert_eq!(encoded[0], 0x82);
        let decoded: RegistrationResult = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.message.as_deref(), Some("quota"));
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<RegistrationResult> = MsgPackCodec::decode(&[0xc1]);
        assert!(matches!(result, Err(PmpError::MsgPackDecode(_))));
    }
}
