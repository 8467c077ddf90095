//! Session identifiers.

use base64::Engine;
use std::fmt;

/// A unique identifier for an engine.io session.
///
/// Generated with 15 random bytes, base64-url encoded without padding,
/// giving the same shape as the upstream JS implementation's `base64id` sids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid([u8; 20]);

impl Sid {
    /// Generates a new random session id.
    pub fn new() -> Self {
        let mut raw = [0u8; 15];
        rand::Rng::fill(&mut rand::thread_rng(), &mut raw);
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);
        let mut buf = [0u8; 20];
        let bytes = encoded.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        Self(buf)
    }

    /// Returns the sid as a `&str`.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default().trim_end_matches('\0')
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Sid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Sid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a sid back from its 20-character base64-url textual form, as seen
/// in the `sid` query parameter of polling requests.
impl std::str::FromStr for Sid {
    type Err = InvalidSid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 20 || !bytes.is_ascii() {
            return Err(InvalidSid);
        }
        let mut buf = [0u8; 20];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session id")]
pub struct InvalidSid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sids_are_unique() {
        let a = Sid::new();
        let b = Sid::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_roundtrips_through_str() {
        let sid = Sid::new();
        assert_eq!(sid.to_string(), sid.as_str());
    }

    #[test]
    fn parses_back_from_its_own_text_form() {
        let sid = Sid::new();
        let parsed: Sid = sid.to_string().parse().unwrap();
        assert_eq!(sid, parsed);
    }

    #[test]
    fn deserializes_from_its_own_serialized_json() {
        let sid = Sid::new();
        let json = serde_json::to_string(&sid).unwrap();
        let parsed: Sid = serde_json::from_str(&json).unwrap();
        assert_eq!(sid, parsed);
    }
}
