//! Caller-held pagination state.
//!
//! The engine is stateless across calls; the cursor is the only thing a
//! caller threads back to continue a session. On the HTTP surface it
//! travels as an opaque base64 string. Malformed cursors decode to the
//! zero cursor (start of session) rather than failing the request.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// `skip` pages through the fresh tier; the two fallback offsets advance
/// only when their tier actually returns rows. All fields are
/// monotonically non-decreasing across a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub skip: u64,
    /// Consumed by the resurfacing tier.
    pub fallback1_offset: u64,
    /// Consumed by the global fallback tier.
    pub fallback2_offset: u64,
}

impl PageCursor {
    /// Encode as an opaque `skip:fallback1:fallback2` token.
    pub fn encode(&self) -> String {
        general_purpose::STANDARD.encode(format!(
            "{}:{}:{}",
            self.skip, self.fallback1_offset, self.fallback2_offset
        ))
    }

    /// Decode a caller-supplied cursor. Absent, empty or malformed input
    /// yields the zero cursor; individual malformed fields default to 0.
    pub fn decode(raw: Option<&str>) -> Self {
        let raw = match raw {
            Some(r) if !r.is_empty() => r,
            _ => return Self::default(),
        };
        let decoded = match general_purpose::STANDARD.decode(raw) {
            Ok(bytes) => bytes,
            Err(_) => return Self::default(),
        };
        let text = match String::from_utf8(decoded) {
            Ok(t) => t,
            Err(_) => return Self::default(),
        };

        let mut parts = text.split(':');
        let mut next_field = || {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .unwrap_or(0)
        };
        Self {
            skip: next_field(),
            fallback1_offset: next_field(),
            fallback2_offset: next_field(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cursor = PageCursor {
            skip: 42,
            fallback1_offset: 7,
            fallback2_offset: 13,
        };
        assert_eq!(PageCursor::decode(Some(&cursor.encode())), cursor);
    }

    #[test]
    fn absent_and_empty_default_to_zero() {
        assert_eq!(PageCursor::decode(None), PageCursor::default());
        assert_eq!(PageCursor::decode(Some("")), PageCursor::default());
    }

    #[test]
    fn malformed_input_defaults_to_zero() {
        assert_eq!(PageCursor::decode(Some("not base64!!")), PageCursor::default());

        let garbage = general_purpose::STANDARD.encode("a:b:c");
        assert_eq!(PageCursor::decode(Some(&garbage)), PageCursor::default());

        // Negative offsets are malformed and clamp to 0.
        let negative = general_purpose::STANDARD.encode("-5:3:2");
        let cursor = PageCursor::decode(Some(&negative));
        assert_eq!(cursor.skip, 0);
        assert_eq!(cursor.fallback1_offset, 3);
        assert_eq!(cursor.fallback2_offset, 2);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let partial = general_purpose::STANDARD.encode("9");
        let cursor = PageCursor::decode(Some(&partial));
        assert_eq!(cursor.skip, 9);
        assert_eq!(cursor.fallback1_offset, 0);
        assert_eq!(cursor.fallback2_offset, 0);
    }
}
