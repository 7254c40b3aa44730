use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

/// Positional layout of a comma-separated QR code.
const FIELD_ORDER: [&str; 5] = ["regno", "name", "designation", "department", "year"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub regno: String,
    pub name: String,
    pub designation: String,
    pub department: String,
    pub year: String,
}

impl AttendanceRecord {
    fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut parts = parts.into_iter().map(str::to_string);
        let mut next = || parts.next().unwrap_or_default();

        AttendanceRecord {
            regno: next(),
            name: next(),
            designation: next(),
            department: next(),
            year: next(),
        }
    }
}

impl Display for AttendanceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.regno)
    }
}

/// What a scanned code decodes to, in the shape it is sent to `/mark_attendance`.
///
/// Serialized untagged: the server sees the decoded JSON value, the five-field
/// record, or `{"raw": ...}`, never a mix of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanPayload {
    Decoded(Value),
    Structured(AttendanceRecord),
    RawFallback { raw: String },
}

impl ScanPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ScanPayload::Decoded(_) => "decoded",
            ScanPayload::Structured(_) => "structured",
            ScanPayload::RawFallback { .. } => "raw",
        }
    }
}

/// Turns the text of a scanned code into a payload. Never fails.
pub fn normalize(raw: &str) -> ScanPayload {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return ScanPayload::Decoded(value);
    }

    let parts = raw.split(',').map(str::trim).collect::<Vec<_>>();
    if parts.len() < 2 {
        return ScanPayload::RawFallback {
            raw: raw.to_string(),
        };
    }

    ScanPayload::Structured(AttendanceRecord::from_parts(
        parts.into_iter().take(FIELD_ORDER.len()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_all_five_fields() {
        let payload = normalize("A1,B,C,D,E");
        let value = serde_json::to_value(&payload).unwrap();
        let keys = value.as_object().unwrap().keys().cloned().collect::<Vec<_>>();

        let mut expected = FIELD_ORDER.map(str::to_string).to_vec();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn raw_fallback_serializes_as_single_field() {
        let payload = normalize("hello");
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({ "raw": "hello" }));
        assert_eq!(payload.kind(), "raw");
    }

    #[test]
    fn extra_positions_are_ignored() {
        let ScanPayload::Structured(record) = normalize("1,2,3,4,5,6,7") else {
            panic!("expected a structured record");
        };
        assert_eq!(record.year, "5");
    }
}
