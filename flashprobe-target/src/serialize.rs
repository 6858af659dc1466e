use serde::ser::SerializeStruct;
use serde::{Deserialize, Serializer};
use std::ops::Range;

pub(crate) fn hex_range<S>(memory_range: &Range<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    // Hex strings for human-readable formats such as YAML, plain integers otherwise.
    let human_readable = serializer.is_human_readable();
    let mut state = serializer.serialize_struct("Range", 2)?;
    if human_readable {
        state.serialize_field("start", format!("{:#x}", memory_range.start).as_str())?;
        state.serialize_field("end", format!("{:#x}", memory_range.end).as_str())?;
    } else {
        state.serialize_field("start", &memory_range.start)?;
        state.serialize_field("end", &memory_range.end)?;
    }
    state.end()
}

pub(crate) fn hex_u64<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(format!("{value:#x}").as_str())
    } else {
        serializer.serialize_u64(*value)
    }
}

pub(crate) fn hex_u32<S>(value: &u32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(format!("{value:#x}").as_str())
    } else {
        serializer.serialize_u32(*value)
    }
}

fn parse_int(s: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

/// Accepts either a plain integer or a `0x`-prefixed hex string.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum IntOrHex {
    Int(u64),
    Str(String),
}

impl IntOrHex {
    fn value<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            IntOrHex::Int(value) => Ok(value),
            IntOrHex::Str(s) => parse_int(&s).map_err(serde::de::Error::custom),
        }
    }
}

pub(crate) fn hex_u64_de<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    IntOrHex::deserialize(deserializer)?.value()
}

pub(crate) fn hex_u32_de<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = IntOrHex::deserialize(deserializer)?.value::<D::Error>()?;
    u32::try_from(value).map_err(serde::de::Error::custom)
}

pub(crate) fn hex_range_de<'de, D>(deserializer: D) -> Result<Range<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    struct RangeDe {
        #[serde(deserialize_with = "hex_u64_de")]
        start: u64,
        #[serde(deserialize_with = "hex_u64_de")]
        end: u64,
    }

    let range = RangeDe::deserialize(deserializer)?;
    Ok(range.start..range.end)
}

/// Instruction blobs are stored as base64 of their little-endian byte stream.
pub(crate) fn base64_words<S>(words: &[u32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::Engine;

    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub(crate) fn base64_words_de<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use base64::Engine;

    struct Base64Visitor;

    impl serde::de::Visitor<'_> for Base64Visitor {
        type Value = Vec<u32>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "base64 ASCII text")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(v)
                .map_err(serde::de::Error::custom)?;
            if bytes.len() % 4 != 0 {
                return Err(serde::de::Error::custom(
                    "instruction blob length is not a multiple of 4",
                ));
            }
            Ok(bytes
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect())
        }
    }

    deserializer.deserialize_str(Base64Visitor)
}
