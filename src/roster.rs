use chrono::NaiveDate;
use serde_json::Value;
use std::fmt::Display;

pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub day: String,
    pub count: usize,
}

impl AttendanceSummary {
    /// Rebuilds the summary from the whole `/check_attendance` payload.
    pub fn from_payload(payload: &Value, day: &str) -> Self {
        AttendanceSummary {
            day: day.to_string(),
            count: count_for_day(payload, day),
        }
    }
}

impl Display for AttendanceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} present", self.day, self.count)
    }
}

/// Number of entries the server holds for `day`.
///
/// A day maps either to a list of entries or to a grouping object whose
/// values are lists; groups are flattened one level.
pub fn count_for_day(payload: &Value, day: &str) -> usize {
    match payload.get(day) {
        Some(Value::Array(entries)) => entries.len(),
        Some(Value::Object(groups)) => groups.values().map(flat_len).sum(),
        Some(other) => flat_len(other),
        None => 0,
    }
}

fn flat_len(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: Option<String>,
    pub regno: Option<String>,
    pub time: Option<String>,
}

impl RosterEntry {
    /// Entries come as objects or as positional `[name, regno, time]` arrays.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(fields) => RosterEntry {
                name: fields.get("name").and_then(text),
                regno: fields.get("regno").and_then(text),
                time: fields.get("time").and_then(text),
            },
            Value::Array(items) => RosterEntry {
                name: items.first().and_then(text),
                regno: items.get(1).and_then(text),
                time: items.get(2).and_then(text),
            },
            other => RosterEntry {
                name: text(other),
                ..Default::default()
            },
        }
    }
}

impl Display for RosterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("<unnamed>"))?;
        if let Some(regno) = &self.regno {
            write!(f, " ({})", regno)?;
        }
        if let Some(time) = &self.time {
            write!(f, " at {}", time)?;
        }
        Ok(())
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The entries listed for `day`, flattened the same way as [`count_for_day`].
pub fn entries_for_day(payload: &Value, day: &str) -> Vec<RosterEntry> {
    let flatten = |value: &Value| match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(RosterEntry::from_value).collect(),
        other => vec![RosterEntry::from_value(other)],
    };

    match payload.get(day) {
        Some(Value::Object(groups)) => groups.values().flat_map(flatten).collect(),
        Some(other) => flatten(other),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn day_key_is_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(day_key(date), "2024-01-05");
    }

    #[test]
    fn entries_match_count() {
        let payload = json!({
            "2024-01-01": { "morning": [{ "name": "A" }, ["B", "R2", "09:00"]], "late": [] }
        });
        let entries = entries_for_day(&payload, "2024-01-01");
        assert_eq!(entries.len(), count_for_day(&payload, "2024-01-01"));
        assert_eq!(entries[1].to_string(), "B (R2) at 09:00");
    }
}
