//! Wire encoding for optional ids.
//!
//! Downstream consumers expect absent ids as `-1`, so `None` is written as
//! `-1` and any negative number (or `null`) reads back as `None`.

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_i64(value.unwrap_or(-1))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| *v >= 0))
}

/// Render an optional id the way it appears on the wire.
pub fn display(value: Option<i64>) -> i64 {
    value.unwrap_or(-1)
}
