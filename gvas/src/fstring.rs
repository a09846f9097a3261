//! Length-prefixed engine strings.
//!
//! On the wire a string is an `i32` length followed by the characters and a terminator. Zero
//! means null, a positive length counts single-byte characters and a negative length counts
//! UTF-16 code units. The length always includes the terminator.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::instrument;

use crate::{Error, Result};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FStringEncoding {
    /// One byte per character (Latin-1)
    #[default]
    SingleByte,
    /// UTF-16 code units
    Utf16,
}

impl FStringEncoding {
    /// Picks single-byte storage for ASCII text and UTF-16 for everything else.
    pub fn detect(value: &str) -> Self {
        if value.is_ascii() {
            FStringEncoding::SingleByte
        } else {
            FStringEncoding::Utf16
        }
    }
    fn unit_size(self) -> usize {
        match self {
            FStringEncoding::SingleByte => 1,
            FStringEncoding::Utf16 => 2,
        }
    }
}

/// An engine string: text plus the width it is stored with.
///
/// Equality is case-sensitive and also compares the encoding. [`FString::eq_ignore_case`] offers
/// the engine's case-insensitive comparison, and [`Hash`] uses the case-insensitive FNV-64 hash
/// so it stays consistent with both.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FString {
    value: String,
    encoding: FStringEncoding,
}

impl FString {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let encoding = FStringEncoding::detect(&value);
        Self { value, encoding }
    }
    pub fn with_encoding(value: impl Into<String>, encoding: FStringEncoding) -> Self {
        Self {
            value: value.into(),
            encoding,
        }
    }
    pub fn as_str(&self) -> &str {
        &self.value
    }
    pub fn into_string(self) -> String {
        self.value
    }
    pub fn encoding(&self) -> FStringEncoding {
        self.encoding
    }
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
    /// Number of stored characters, not counting the terminator.
    pub fn len(&self) -> usize {
        match self.encoding {
            FStringEncoding::SingleByte => self.value.chars().count(),
            FStringEncoding::Utf16 => self.value.encode_utf16().count(),
        }
    }
    /// Bytes taken by the characters and terminator, excluding the length prefix.
    pub fn size_in_bytes(&self) -> usize {
        (self.len() + 1) * self.encoding.unit_size()
    }
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.value.to_lowercase() == other.to_lowercase()
    }
    pub fn full_hash(&self) -> u64 {
        self.hash_with_seed(0)
    }
    /// FNV-64 over the lowercased UTF-16 units, low byte first.
    pub fn hash_with_seed(&self, seed: u64) -> u64 {
        let mut hash = FNV_OFFSET.wrapping_add(seed);
        for unit in self.value.to_lowercase().encode_utf16() {
            hash ^= u64::from(unit & 0xff);
            hash = hash.wrapping_mul(FNV_PRIME);
            hash ^= u64::from(unit >> 8);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

impl std::hash::Hash for FString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.full_hash());
    }
}

impl std::fmt::Display for FString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

impl AsRef<str> for FString {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl From<&str> for FString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl From<String> for FString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for FString {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}
impl PartialEq<&str> for FString {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FStringRepr {
    Plain(String),
    Explicit {
        value: String,
        encoding: FStringEncoding,
    },
}

impl Serialize for FString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if FStringEncoding::detect(&self.value) == self.encoding {
            serializer.serialize_str(&self.value)
        } else {
            FStringRepr::Explicit {
                value: self.value.clone(),
                encoding: self.encoding,
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for FString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match FStringRepr::deserialize(deserializer)? {
            FStringRepr::Plain(value) => FString::new(value),
            FStringRepr::Explicit { value, encoding } => FString::with_encoding(value, encoding),
        })
    }
}

/// Reads a string, returning `None` for the null (zero length) form.
///
/// UTF-16 text must be well formed: a lone surrogate cannot be held by a [`String`] and is
/// rejected as [`Error::MalformedString`] rather than replaced, which would change the bytes on
/// write.
#[instrument(skip_all)]
pub fn read_fstring<R: Read + ?Sized>(reader: &mut R, max_len: usize) -> Result<Option<FString>> {
    let len = reader.read_i32::<LE>()?;
    if len == 0 {
        return Ok(None);
    }
    let units = len.unsigned_abs() as usize;
    if units > max_len {
        return Err(Error::MalformedString(format!(
            "length {len} exceeds the limit of {max_len}"
        )));
    }
    if len < 0 {
        let mut chars = vec![0; units];
        reader.read_u16_into::<LE>(&mut chars)?;
        if chars.pop() != Some(0) {
            return Err(Error::MalformedString(
                "missing UTF-16 null terminator".into(),
            ));
        }
        let value =
            String::from_utf16(&chars).map_err(|e| Error::MalformedString(e.to_string()))?;
        Ok(Some(FString::with_encoding(value, FStringEncoding::Utf16)))
    } else {
        let mut chars = vec![0; units];
        reader.read_exact(&mut chars)?;
        if chars.pop() != Some(0) {
            return Err(Error::MalformedString("missing null terminator".into()));
        }
        let value = chars.into_iter().map(char::from).collect::<String>();
        Ok(Some(FString::with_encoding(
            value,
            FStringEncoding::SingleByte,
        )))
    }
}

/// Writes a string using its stored encoding; `None` writes the null form.
#[instrument(skip_all)]
pub fn write_fstring<W: Write + ?Sized>(writer: &mut W, value: Option<&FString>) -> Result<()> {
    let Some(value) = value else {
        writer.write_i32::<LE>(0)?;
        return Ok(());
    };
    match value.encoding {
        FStringEncoding::SingleByte => {
            let bytes = value
                .value
                .chars()
                .map(u8::try_from)
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| {
                    Error::MalformedString(format!(
                        "{:?} cannot be stored as single-byte text",
                        value.value
                    ))
                })?;
            writer.write_i32::<LE>(length_prefix(bytes.len() + 1)?)?;
            writer.write_all(&bytes)?;
            writer.write_u8(0)?;
        }
        FStringEncoding::Utf16 => {
            let chars: Vec<u16> = value.value.encode_utf16().collect();
            writer.write_i32::<LE>(-length_prefix(chars.len() + 1)?)?;
            for c in chars {
                writer.write_u16::<LE>(c)?;
            }
            writer.write_u16::<LE>(0)?;
        }
    }
    Ok(())
}

fn length_prefix(units: usize) -> Result<i32> {
    i32::try_from(units).map_err(|_| Error::MalformedString(format!("{units} units is too long")))
}
