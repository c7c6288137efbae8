//! Time-ordered 128-bit request identifiers
//!
//! A [`RequestId`] correlates one unit of work across every system that
//! touches it. The layout is bit-compatible with RFC 9562 UUIDv7, so the
//! canonical text form can be handed to anything that understands UUIDs.
//!
//! # Layout
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           timestamp           |  fmt  |     entropy_high      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |var|                     entropy_low                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         entropy_low                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! - `timestamp`: 48 bits, Unix epoch milliseconds.
//! - `fmt`: 4 bits, always [`FORMAT_TAG`].
//! - `entropy_high`: 12 random bits.
//! - `var`: 2 bits, always [`VARIANT_TAG`].
//! - `entropy_low`: 62 random bits.
//!
//! Because the timestamp occupies the most significant bits, comparing two
//! identifiers (as integers, as big-endian bytes, or as canonical strings)
//! orders them by creation millisecond. Identifiers minted within the same
//! millisecond fall in an arbitrary order.

mod generator;

pub use generator::{new_request_id, IdGenerator, MonotonicGenerator};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Layout version carried in every identifier.
pub const FORMAT_TAG: u8 = 0b0111;

/// Variant bits separating this layout from other 128-bit schemes.
pub const VARIANT_TAG: u8 = 0b10;

/// Largest representable timestamp (48 bits).
pub const TIMESTAMP_MAX: u64 = (1 << 48) - 1;

/// Largest `entropy_high` value (12 bits).
pub const ENTROPY_HIGH_MAX: u16 = (1 << 12) - 1;

/// Largest `entropy_low` value (62 bits).
pub const ENTROPY_LOW_MAX: u64 = (1 << 62) - 1;

/// Length of the canonical text form.
pub const CANONICAL_LEN: usize = 36;

const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Errors produced while decoding or parsing an identifier.
///
/// Every variant is a `MalformedIdentifier` at the collaborator boundary:
/// the input violates the layout contract and retrying will not help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Binary input was not exactly 16 bytes
    #[error("malformed identifier: expected 16 bytes, got {0}")]
    InvalidByteLength(usize),

    /// Text input was not exactly 36 characters
    #[error("malformed identifier: expected 36 characters, got {0}")]
    InvalidTextLength(usize),

    /// Text input had an unexpected character
    #[error("malformed identifier: unexpected character {found:?} at position {position}")]
    InvalidCharacter { position: usize, found: char },

    /// The format tag did not match [`FORMAT_TAG`]
    #[error("malformed identifier: format tag {0:#06b} is not supported")]
    FormatTag(u8),

    /// The variant tag did not match [`VARIANT_TAG`]
    #[error("malformed identifier: variant tag {0:#04b} is not supported")]
    VariantTag(u8),

    /// A field value does not fit its bit width
    #[error("malformed identifier: {field} value {value} exceeds {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u32,
    },
}

/// Result type for identifier operations
pub type IdResult<T> = Result<T, IdError>;

/// The variable fields of an identifier.
///
/// The constant tags are implied. Construct with [`IdFields::new`], which
/// rejects values wider than their slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdFields {
    timestamp: u64,
    entropy_high: u16,
    entropy_low: u64,
}

impl IdFields {
    /// Validate and assemble a field tuple.
    pub fn new(timestamp: u64, entropy_high: u16, entropy_low: u64) -> IdResult<Self> {
        if timestamp > TIMESTAMP_MAX {
            return Err(IdError::FieldOverflow {
                field: "timestamp",
                value: timestamp,
                bits: 48,
            });
        }
        if entropy_high > ENTROPY_HIGH_MAX {
            return Err(IdError::FieldOverflow {
                field: "entropy_high",
                value: u64::from(entropy_high),
                bits: 12,
            });
        }
        if entropy_low > ENTROPY_LOW_MAX {
            return Err(IdError::FieldOverflow {
                field: "entropy_low",
                value: entropy_low,
                bits: 62,
            });
        }
        Ok(Self::masked(timestamp, entropy_high, entropy_low))
    }

    /// Assemble fields, discarding any bits beyond each slot's width.
    pub(crate) const fn masked(timestamp: u64, entropy_high: u16, entropy_low: u64) -> Self {
        Self {
            timestamp: timestamp & TIMESTAMP_MAX,
            entropy_high: entropy_high & ENTROPY_HIGH_MAX,
            entropy_low: entropy_low & ENTROPY_LOW_MAX,
        }
    }

    /// Milliseconds since the Unix epoch.
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub const fn entropy_high(&self) -> u16 {
        self.entropy_high
    }

    pub const fn entropy_low(&self) -> u64 {
        self.entropy_low
    }
}

/// A 128-bit, time-prefixed identifier for one unit of work.
///
/// Holding a `RequestId` guarantees the tags are valid; every constructor
/// either builds the value from [`IdFields`] or checks the tags.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u128);

impl RequestId {
    /// Mint a fresh identifier from the system clock and thread-local entropy.
    pub fn generate() -> Self {
        new_request_id()
    }

    /// Pack a field tuple into an identifier.
    pub const fn encode(fields: IdFields) -> Self {
        Self(
            (fields.timestamp as u128) << 80
                | (FORMAT_TAG as u128) << 76
                | (fields.entropy_high as u128) << 64
                | (VARIANT_TAG as u128) << 62
                | fields.entropy_low as u128,
        )
    }

    /// Unpack a raw 128-bit value, checking both tags.
    pub fn decode(value: u128) -> IdResult<IdFields> {
        Self::from_u128(value).map(|id| id.fields())
    }

    /// Wrap a raw 128-bit value, checking both tags.
    pub fn from_u128(value: u128) -> IdResult<Self> {
        let format = ((value >> 76) & 0xF) as u8;
        if format != FORMAT_TAG {
            return Err(IdError::FormatTag(format));
        }
        let variant = ((value >> 62) & 0b11) as u8;
        if variant != VARIANT_TAG {
            return Err(IdError::VariantTag(variant));
        }
        Ok(Self(value))
    }

    /// Decode from big-endian bytes. Fails unless exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> IdResult<Self> {
        let array: [u8; 16] = bytes
            .try_into()
            .map_err(|_| IdError::InvalidByteLength(bytes.len()))?;
        Self::from_u128(u128::from_be_bytes(array))
    }

    /// Parse the canonical `8-4-4-4-12` text form (either hex case).
    pub fn parse(input: &str) -> IdResult<Self> {
        let chars = input.chars().count();
        if chars != CANONICAL_LEN || input.len() != CANONICAL_LEN {
            return Err(IdError::InvalidTextLength(chars));
        }

        match uuid::Uuid::try_parse(input) {
            Ok(uuid) => Self::from_u128(uuid.as_u128()),
            Err(_) => Err(first_invalid_character(input)),
        }
    }

    /// The smallest identifier that can carry the given millisecond.
    ///
    /// Useful as an inclusive lower bound for "everything since time T" scans.
    pub fn lower_bound(timestamp_ms: u64) -> IdResult<Self> {
        IdFields::new(timestamp_ms, 0, 0).map(Self::encode)
    }

    pub fn fields(&self) -> IdFields {
        IdFields::masked(
            (self.0 >> 80) as u64,
            (self.0 >> 64) as u16,
            self.0 as u64,
        )
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> u64 {
        (self.0 >> 80) as u64
    }

    /// The creation time encoded in the identifier.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.timestamp_millis()).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Big-endian bytes; byte order matches identifier order.
    pub const fn to_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

/// Locate the character that made a 36-byte input unparseable.
fn first_invalid_character(input: &str) -> IdError {
    input
        .chars()
        .enumerate()
        .find(|&(position, c)| {
            if HYPHEN_POSITIONS.contains(&position) {
                c != '-'
            } else {
                !c.is_ascii_hexdigit()
            }
        })
        .map(|(position, found)| IdError::InvalidCharacter { position, found })
        .unwrap_or(IdError::InvalidTextLength(CANONICAL_LEN))
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&uuid::Uuid::from_u128(self.0).hyphenated(), f)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self)
    }
}

impl FromStr for RequestId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<RequestId> for u128 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl TryFrom<u128> for RequestId {
    type Error = IdError;

    fn try_from(value: u128) -> Result<Self, Self::Error> {
        Self::from_u128(value)
    }
}

impl From<RequestId> for uuid::Uuid {
    fn from(id: RequestId) -> Self {
        uuid::Uuid::from_u128(id.0)
    }
}

impl TryFrom<uuid::Uuid> for RequestId {
    type Error = IdError;

    fn try_from(value: uuid::Uuid) -> Result<Self, Self::Error> {
        Self::from_u128(value.as_u128())
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> RequestId {
        RequestId::encode(IdFields::new(0x0189_2f3a_4b5c, 0xabc, 0x0123_4567_89ab_cdef).unwrap())
    }

    #[test]
    fn test_encode_places_tags() {
        let id = sample();
        let uuid: uuid::Uuid = id.into();
        assert_eq!(uuid.get_version_num(), 7);
        assert_eq!(uuid.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_canonical_text_form() {
        let text = sample().to_string();
        assert_eq!(text, "01892f3a-4b5c-7abc-8123-456789abcdef");
        assert_eq!(text.len(), CANONICAL_LEN);
        assert_eq!(text, uuid::Uuid::from(sample()).to_string());
    }

    #[test]
    fn test_parse_accepts_uppercase() {
        let id = RequestId::parse("01892F3A-4B5C-7ABC-8123-456789ABCDEF").unwrap();
        assert_eq!(id, sample());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(
            RequestId::parse("01892f3a-4b5c-7abc-8123"),
            Err(IdError::InvalidTextLength(23))
        );
        assert!(matches!(
            RequestId::parse("01892f3a4b5c7abc8123456789abcdef"),
            Err(IdError::InvalidTextLength(32))
        ));
    }

    #[test]
    fn test_parse_rejects_misplaced_hyphen() {
        let err = RequestId::parse("01892f3a4-b5c-7abc-8123-456789abcdef").unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidCharacter {
                position: 8,
                found: '4'
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let err = RequestId::parse("01892f3a-4b5c-7abc-8123-456789abcdeg").unwrap_err();
        assert!(matches!(err, IdError::InvalidCharacter { position: 35, .. }));
    }

    #[test]
    fn test_parse_rejects_multibyte_input() {
        let input = "01892f3a-4b5c-7abc-8123-456789abcdé";
        assert!(matches!(
            RequestId::parse(input),
            Err(IdError::InvalidTextLength(_))
        ));
    }

    #[test]
    fn test_decode_rejects_foreign_tags() {
        let v4 = uuid::Uuid::new_v4();
        assert_eq!(RequestId::try_from(v4), Err(IdError::FormatTag(4)));

        let bad_variant = sample().as_u128() & !(0b11 << 62);
        assert_eq!(RequestId::decode(bad_variant), Err(IdError::VariantTag(0)));
    }

    #[test]
    fn test_from_slice_requires_16_bytes() {
        let bytes = sample().to_bytes();
        assert_eq!(RequestId::from_slice(&bytes).unwrap(), sample());
        assert_eq!(
            RequestId::from_slice(&bytes[..15]),
            Err(IdError::InvalidByteLength(15))
        );
    }

    #[test]
    fn test_field_overflow() {
        assert!(matches!(
            IdFields::new(TIMESTAMP_MAX + 1, 0, 0),
            Err(IdError::FieldOverflow { field: "timestamp", .. })
        ));
        assert!(IdFields::new(0, ENTROPY_HIGH_MAX + 1, 0).is_err());
        assert!(IdFields::new(0, 0, ENTROPY_LOW_MAX + 1).is_err());
    }

    #[test]
    fn test_created_at() {
        let id = RequestId::encode(IdFields::new(1_700_000_000_123, 0, 0).unwrap());
        let at = id.created_at().unwrap();
        assert_eq!(at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_lower_bound_sorts_first_in_its_millisecond() {
        let bound = RequestId::lower_bound(1_000).unwrap();
        let same_ms = RequestId::encode(IdFields::new(1_000, 1, 0).unwrap());
        let earlier = RequestId::encode(
            IdFields::new(999, ENTROPY_HIGH_MAX, ENTROPY_LOW_MAX).unwrap(),
        );
        assert!(bound < same_ms);
        assert!(earlier < bound);
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, "\"01892f3a-4b5c-7abc-8123-456789abcdef\"");
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
        assert!(serde_json::from_str::<RequestId>("\"not-an-id\"").is_err());
    }

    fn fields() -> impl Strategy<Value = IdFields> {
        (0..=TIMESTAMP_MAX, 0..=ENTROPY_HIGH_MAX, 0..=ENTROPY_LOW_MAX)
            .prop_map(|(ts, hi, lo)| IdFields::new(ts, hi, lo).unwrap())
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(f in fields()) {
            let id = RequestId::encode(f);
            prop_assert_eq!(RequestId::decode(id.as_u128()).unwrap(), f);
        }

        #[test]
        fn parse_inverts_display(f in fields()) {
            let id = RequestId::encode(f);
            prop_assert_eq!(id.to_string().parse::<RequestId>().unwrap(), id);
        }

        #[test]
        fn text_order_follows_timestamp(a in fields(), b in fields()) {
            prop_assume!(a.timestamp() != b.timestamp());
            let (ia, ib) = (RequestId::encode(a), RequestId::encode(b));
            let text_order = ia.to_string().cmp(&ib.to_string());
            prop_assert_eq!(text_order, a.timestamp().cmp(&b.timestamp()));
            prop_assert_eq!(ia.cmp(&ib), a.timestamp().cmp(&b.timestamp()));
            prop_assert_eq!(ia.to_bytes().cmp(&ib.to_bytes()), a.timestamp().cmp(&b.timestamp()));
        }
    }
}
