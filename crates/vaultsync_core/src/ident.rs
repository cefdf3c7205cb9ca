//! Source and destination identifiers.
//!
//! A source id is any non-empty string of printable, non-whitespace
//! characters. Destination ids are derived with an injective escape:
//!
//! - `[A-Za-z0-9.-]` are kept as-is
//! - `:` becomes `_`, so `ns:uuid` is stored as `ns_uuid`
//! - every other character is written as `~XX` for each of its UTF-8 bytes
//!
//! Because `_` and `~` are never passed through, every destination id has at
//! most one source id, recovered by [`source_id_from_destination`].

use crate::error::IdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a record in the source repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

impl SourceId {
    /// Validates and wraps a source identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if let Some(ch) = id.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdError::IllegalChar { id, ch });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the derived destination id.
    pub fn to_destination(&self) -> DestinationId {
        derive_destination_id(self)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

/// Identifier of an object in the destination store.
///
/// Keys listed from a store are taken verbatim; they need not be the
/// image of any source id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(String);

impl DestinationId {
    /// Wraps a raw store key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the source id this key was derived from.
    pub fn to_source(&self) -> Result<SourceId, IdError> {
        source_id_from_destination(&self.0)
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_passthrough(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-'
}

/// Derives the destination id for a source id.
pub fn derive_destination_id(id: &SourceId) -> DestinationId {
    let mut out = String::with_capacity(id.0.len());
    for byte in id.0.bytes() {
        if is_passthrough(byte) {
            out.push(byte as char);
        } else if byte == b':' {
            out.push('_');
        } else {
            out.push('~');
            out.push_str(&format!("{:02X}", byte));
        }
    }
    DestinationId(out)
}

/// Inverse of [`derive_destination_id`].
pub fn source_id_from_destination(key: &str) -> Result<SourceId, IdError> {
    let malformed = || IdError::MalformedDestination(key.to_string());
    let bytes = key.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => decoded.push(b':'),
            b'~' => {
                let hex = key.get(i + 1..i + 3).ok_or_else(malformed)?;
                // Only the canonical upper-case form is produced by the encoder.
                if hex.bytes().any(|b| b.is_ascii_lowercase()) {
                    return Err(malformed());
                }
                let value = u8::from_str_radix(hex, 16).map_err(|_| malformed())?;
                if is_passthrough(value) || value == b':' {
                    return Err(malformed());
                }
                decoded.push(value);
                i += 2;
            }
            b if is_passthrough(b) => decoded.push(b),
            _ => return Err(malformed()),
        }
        i += 1;
    }

    let text = String::from_utf8(decoded).map_err(|_| malformed())?;
    SourceId::new(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sid(s: &str) -> SourceId {
        SourceId::new(s).unwrap()
    }

    #[test]
    fn namespace_colon_becomes_underscore() {
        let id = sid("cwrc:c1583789-0dad-41d3-8a42-94d7a8e6d451");
        assert_eq!(
            id.to_destination().as_str(),
            "cwrc_c1583789-0dad-41d3-8a42-94d7a8e6d451"
        );
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(sid("a_b").to_destination().as_str(), "a~5Fb");
        assert_eq!(sid("a/b").to_destination().as_str(), "a~2Fb");
        assert_eq!(sid("~").to_destination().as_str(), "~7E");
        assert_eq!(sid("é").to_destination().as_str(), "~C3~A9");
    }

    #[test]
    fn underscore_and_colon_do_not_collide() {
        assert_ne!(sid("a:b").to_destination(), sid("a_b").to_destination());
    }

    #[test]
    fn inverse_recovers_source() {
        for raw in ["cwrc:1234", "a_b", "x/y~z", "dots.and-dashes", "ünï:cödé"] {
            let id = sid(raw);
            assert_eq!(id.to_destination().to_source().unwrap(), id);
        }
    }

    #[test]
    fn rejects_invalid_source_ids() {
        assert_eq!(SourceId::new(""), Err(IdError::Empty));
        assert!(matches!(
            SourceId::new("has space"),
            Err(IdError::IllegalChar { ch: ' ', .. })
        ));
        assert!(SourceId::new("tab\there").is_err());
    }

    #[test]
    fn rejects_non_canonical_destination_ids() {
        assert!(source_id_from_destination("a~5fb").is_err());
        assert!(source_id_from_destination("a~41").is_err());
        assert!(source_id_from_destination("trailing~4").is_err());
        assert!(source_id_from_destination("slash/key").is_err());
        assert!(source_id_from_destination("~20").is_err());
    }

    #[test]
    fn serde_validates_source_ids() {
        let id: SourceId = serde_json::from_str("\"cwrc:1\"").unwrap();
        assert_eq!(id.as_str(), "cwrc:1");
        assert!(serde_json::from_str::<SourceId>("\"\"").is_err());
    }

    proptest! {
        #[test]
        fn transform_round_trips(raw in "[^\\s\\p{Cc}]{1,40}") {
            let id = SourceId::new(raw).unwrap();
            prop_assert_eq!(id.to_destination().to_source().unwrap(), id);
        }

        #[test]
        fn transform_is_injective(a in "[^\\s\\p{Cc}]{1,12}", b in "[^\\s\\p{Cc}]{1,12}") {
            let (a, b) = (SourceId::new(a).unwrap(), SourceId::new(b).unwrap());
            prop_assert_eq!(a == b, a.to_destination() == b.to_destination());
        }
    }
}
