use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FALLBACK_MESSAGE: &str = "Received response";

/// Outcome of one call to the attendance server, as shown to the user.
///
/// `status` and `body` come from the HTTP exchange. The envelope fields are set
/// when no exchange happened (transport failure) or by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl ScanResponse {
    pub fn from_exchange(status: u16, body: Option<Value>) -> Self {
        ScanResponse {
            status: Some(status),
            body,
            ..Default::default()
        }
    }

    /// A response for a request that never got an answer.
    pub fn transport_failure(message: &str, error: impl ToString) -> Self {
        ScanResponse {
            message: Some(message.to_string()),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }

    fn body_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.body.as_ref().and_then(Value::as_object)
    }

    fn body_field(&self, key: &str) -> Option<&Value> {
        self.body_object()
            .and_then(|body| body.get(key))
            .filter(|value| !value.is_null())
    }

    /// The acknowledgement the server sent back when it recognised a person.
    pub fn acknowledgement(&self) -> Option<Acknowledgement> {
        let name = self.body_field("name").filter(|name| is_truthy(name))?;

        let time = ["time", "attendance_time"]
            .into_iter()
            .filter_map(|key| self.body_field(key).map(display_value))
            .chain(self.time.clone())
            .find(|time| !time.is_empty());

        Some(Acknowledgement {
            name: display_value(name),
            is_new: self.body_field("is_new").map_or(true, coerce_is_new),
            time,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub name: String,
    pub is_new: bool,
    pub time: Option<String>,
}

/// `is_new` arrives either as a boolean or as its string spelling.
/// Anything unrecognised keeps the "newly marked" default.
pub fn coerce_is_new(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().eq_ignore_ascii_case("false"),
        _ => true,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One step of [`summarize`]: `applies` decides, `render` formats.
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&ScanResponse) -> bool,
    pub render: fn(&ScanResponse) -> String,
}

/// Evaluated top to bottom, first match wins.
pub const RULES: &[Rule] = &[
    Rule {
        name: "acknowledgement",
        applies: has_acknowledgement,
        render: acknowledgement_line,
    },
    Rule {
        name: "body_message",
        applies: has_body_message,
        render: body_message,
    },
    Rule {
        name: "status",
        applies: has_status,
        render: status_line,
    },
    Rule {
        name: "envelope_message",
        applies: has_envelope_message,
        render: envelope_message,
    },
];

fn has_acknowledgement(r: &ScanResponse) -> bool {
    r.acknowledgement().is_some()
}

fn acknowledgement_line(r: &ScanResponse) -> String {
    r.acknowledgement()
        .map(render_acknowledgement)
        .unwrap_or_default()
}

fn has_body_message(r: &ScanResponse) -> bool {
    r.body_field("message").map_or(false, is_truthy)
}

fn body_message(r: &ScanResponse) -> String {
    r.body_field("message").map(display_value).unwrap_or_default()
}

fn has_status(r: &ScanResponse) -> bool {
    r.status.is_some()
}

fn status_line(r: &ScanResponse) -> String {
    format!("Server returned status {}", r.status.unwrap_or_default())
}

fn has_envelope_message(r: &ScanResponse) -> bool {
    r.message.as_deref().map_or(false, |m| !m.is_empty())
}

fn envelope_message(r: &ScanResponse) -> String {
    r.message.clone().unwrap_or_default()
}

fn render_acknowledgement(ack: Acknowledgement) -> String {
    let verb = if ack.is_new { "marked" } else { "already marked" };
    match ack.time {
        Some(time) => format!("Attendance {} for {} at {}", verb, ack.name, time),
        None => format!("Attendance {} for {}", verb, ack.name),
    }
}

/// Name of the rule that produces the summary, `None` for the fallback.
pub fn matching_rule(response: &ScanResponse) -> Option<&'static str> {
    RULES
        .iter()
        .find(|rule| (rule.applies)(response))
        .map(|rule| rule.name)
}

/// Renders a response as the single line shown after a scan. Never fails.
pub fn summarize(response: &ScanResponse) -> String {
    RULES
        .iter()
        .find(|rule| (rule.applies)(response))
        .map(|rule| (rule.render)(response))
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_new_accepts_string_spellings() {
        assert!(!coerce_is_new(&json!(false)));
        assert!(!coerce_is_new(&json!(" False ")));
        assert!(coerce_is_new(&json!("true")));
        assert!(coerce_is_new(&json!(0)));
    }

    #[test]
    fn falsy_name_is_not_an_acknowledgement() {
        for name in [json!(""), json!(0), json!(false), json!(null)] {
            let response = ScanResponse::from_exchange(200, Some(json!({ "name": name })));
            assert_eq!(response.acknowledgement(), None);
        }
    }

    #[test]
    fn numeric_name_is_rendered_as_text() {
        let response = ScanResponse::from_exchange(200, Some(json!({ "name": 42 })));
        assert_eq!(summarize(&response), "Attendance marked for 42");
    }

    #[test]
    fn empty_body_time_falls_through_to_attendance_time() {
        let response = ScanResponse::from_exchange(
            200,
            Some(json!({ "name": "Jane", "time": "", "attendance_time": "10:15" })),
        );
        assert_eq!(summarize(&response), "Attendance marked for Jane at 10:15");
    }

    #[test]
    fn falsy_body_message_falls_through_to_status() {
        for message in [json!(""), json!(false), json!(0)] {
            let response = ScanResponse::from_exchange(200, Some(json!({ "message": message })));
            assert_eq!(summarize(&response), "Server returned status 200");
            assert_eq!(matching_rule(&response), Some("status"));
        }
    }

    #[test]
    fn empty_envelope_message_falls_back() {
        let response = ScanResponse {
            message: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(summarize(&response), FALLBACK_MESSAGE);
        assert_eq!(matching_rule(&response), None);
    }

    #[test]
    fn rule_names_are_unique() {
        let mut names = RULES.iter().map(|r| r.name).collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }
}
