//! The core data model: a timestamped, possibly-tombstoned record.

use chrono::{DateTime, SecondsFormat, Utc};

/// A single key's value, with the wall-clock instant it was last written.
///
/// `value: None` marks a tombstone: a first-class record of a deletion, not the absence
/// of a record. Absence is represented by `StoreError::NotFound`/`ReplyKind::Absent`,
/// never by this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn present(value: Vec<u8>, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            timestamp,
        }
    }

    pub fn tombstone(timestamp: DateTime<Utc>) -> Self {
        Self {
            value: None,
            timestamp,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Encode as `[timestamp_millis: i64 BE][tag: u8][value bytes]`.
    ///
    /// This fuses the conceptual "values map" and "timestamps map" from the spec into a
    /// single on-disk row, as the spec explicitly permits, while keeping tombstones and
    /// missing keys distinguishable.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + self.value.as_ref().map_or(0, Vec::len));
        out.extend_from_slice(&self.timestamp.timestamp_millis().to_be_bytes());
        match &self.value {
            Some(v) => {
                out.push(1);
                out.extend_from_slice(v);
            }
            None => out.push(0),
        }
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 9 {
            return None;
        }
        let millis = i64::from_be_bytes(bytes[0..8].try_into().ok()?);
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)?;
        let tag = bytes[8];
        let value = match tag {
            0 => None,
            _ => Some(bytes[9..].to_vec()),
        };
        Some(Self { value, timestamp })
    }
}

/// Format a timestamp the way it's carried on the wire in `x-last-modified`: ISO-8601,
/// UTC, millisecond resolution.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an `x-last-modified` header value. Accepts anything `chrono` can parse as
/// RFC 3339; this is intentionally permissive since peers and clients may emit slightly
/// different (but still ISO-8601) formats.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
