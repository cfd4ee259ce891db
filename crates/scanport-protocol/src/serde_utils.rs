//! Serde utilities for bytes serialization
//!
//! Provides efficient serialization/deserialization for `bytes::Bytes` types.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serializer};

/// Serde module for `Bytes` fields
pub mod bytes_serde {
    use super::*;

    pub fn serialize<S>(val: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::serialize(&val[..], serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Ok(Bytes::from(v))
    }
}

/// Serde module for `Vec<Bytes>` fields
pub mod vec_bytes_serde {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(val: &[Bytes], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(val.len()))?;
        for item in val {
            seq.serialize_element(&serde_bytes::Bytes::new(&item[..]))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<serde_bytes::ByteBuf> = Deserialize::deserialize(deserializer)?;
        Ok(v.into_iter().map(|b| Bytes::from(b.into_vec())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestMessage {
        #[serde(with = "bytes_serde")]
        data: Bytes,
        #[serde(with = "vec_bytes_serde")]
        keys: Vec<Bytes>,
    }

    #[test]
    fn test_bytes_serde_roundtrip() {
        let msg = TestMessage {
            data: Bytes::from("hello"),
            keys: vec![Bytes::from("a"), Bytes::from("bc")],
        };

        let encoded = postcard::to_allocvec(&msg).unwrap();
        let decoded: TestMessage = postcard::from_bytes(&encoded).unwrap();

        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_bytes_serde_empty() {
        let msg = TestMessage {
            data: Bytes::new(),
            keys: Vec::new(),
        };

        let encoded = postcard::to_allocvec(&msg).unwrap();
        let decoded: TestMessage = postcard::from_bytes(&encoded).unwrap();

        assert_eq!(msg, decoded);
    }
}
