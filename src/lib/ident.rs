use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Opaque identifier assigned to a question when it is first created.
///
/// The raw bytes are never interpreted; external surfaces see the lowercase
/// hex rendering.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuestionId(Vec<u8>);

impl QuestionId {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QuestionId").field(&self.to_string()).finish()
    }
}

impl FromStr for QuestionId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(QuestionId)
    }
}

impl Serialize for QuestionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QuestionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse::<QuestionId>()
            .map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

/// Produces a fresh identifier for every call. Implementations must be safe
/// to share across request-serving threads; uniqueness is expected but not
/// cryptographically guaranteed.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> QuestionId;
}

/// Production generator backed by random UUIDs.
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> QuestionId {
        QuestionId::from_bytes(Uuid::new_v4().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_parses_hex() {
        let id = QuestionId::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(id.to_string(), "deadbeef");
        assert_eq!("deadbeef".parse::<QuestionId>().unwrap(), id);
    }

    #[test]
    fn uuid_generator_produces_distinct_ids() {
        let generator = UuidGenerator;
        assert_ne!(generator.next_id(), generator.next_id());
    }
}
