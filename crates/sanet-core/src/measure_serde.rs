//! Serde adapter writing big unsigned measures as decimal strings.
//!
//! Deserialization also accepts plain integers, so hand-written configs can
//! use `c_threshold = 3`.

use num::BigUint;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Int(value) => Ok(BigUint::from(value)),
        Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}
