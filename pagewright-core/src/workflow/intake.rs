//! Incoming task submissions and shared-secret authentication

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::{Attachment, TaskEvent};
use crate::{Error, Result};

const DEFAULT_BRIEF: &str = "No brief provided.";

/// Raw request body accepted by the intake endpoint
///
/// Built from any JSON value without failing: fields that are missing, null,
/// or of the wrong type fall back to their defaults so the secret can always
/// be checked first. A body that is not an object carries no secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct TaskSubmission {
    pub secret: String,
    pub task: String,
    /// `None` when a round was given but is not a number
    pub round: Option<u32>,
    pub brief: String,
    pub attachments: Vec<Attachment>,
    pub checks: Vec<String>,
    pub evaluation_url: String,
    pub email: String,
    pub nonce: String,
}

impl Default for TaskSubmission {
    fn default() -> Self {
        Self::from(Value::Null)
    }
}

/// Immediate reply to an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub status: &'static str,
    pub task: String,
    pub round: u32,
}

impl Acknowledgement {
    pub fn received(event: &TaskEvent) -> Self {
        Self {
            status: "received",
            task: event.task.clone(),
            round: event.round,
        }
    }
}

impl From<Value> for TaskSubmission {
    fn from(value: Value) -> Self {
        let empty = Map::new();
        let fields = value.as_object().unwrap_or(&empty);

        Self {
            secret: string_field(fields, "secret"),
            task: identity_field(fields.get("task")),
            round: round_field(fields.get("round")),
            brief: fields
                .get("brief")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_BRIEF)
                .to_string(),
            attachments: attachments_field(fields.get("attachments")),
            checks: checks_field(fields.get("checks")),
            evaluation_url: string_field(fields, "evaluation_url"),
            email: string_field(fields, "email"),
            nonce: string_field(fields, "nonce"),
        }
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Task identities may arrive as numbers
fn identity_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Missing or null means round 1; numbers and numeric strings are accepted
fn round_field(value: Option<&Value>) -> Option<u32> {
    let round = match value {
        None | Some(Value::Null) => 1,
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok())?,
        Some(Value::String(s)) => s.trim().parse().ok()?,
        Some(_) => return None,
    };
    Some(round.max(1))
}

/// Objects with `name`/`url`, or bare URL strings
///
/// Entries without a location are dropped; a missing name is taken from the
/// last URL path segment, or numbered.
fn attachments_field(value: Option<&Value>) -> Vec<Attachment> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let (name, url) = match item {
                Value::String(url) => (None, url.as_str()),
                Value::Object(fields) => (
                    fields.get("name").and_then(Value::as_str),
                    fields.get("url").and_then(Value::as_str)?,
                ),
                _ => return None,
            };
            if url.trim().is_empty() {
                return None;
            }

            let name = name
                .filter(|n| !n.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| attachment_name(url, i));
            Some(Attachment {
                name,
                url: url.to_string(),
            })
        })
        .collect()
}

fn attachment_name(url: &str, index: usize) -> String {
    if !url.starts_with("data:") {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        if let Some(segment) = path.rsplit('/').next() {
            if !segment.is_empty() && !segment.contains(':') {
                return segment.to_string();
            }
        }
    }
    format!("attachment-{}", index + 1)
}

/// A list of strings; a single string counts as one check
fn checks_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl TaskSubmission {
    /// Check the shared secret and turn the submission into a task event
    ///
    /// The secret is checked before anything else about the body.
    pub fn authenticate(self, expected: &str) -> Result<TaskEvent> {
        if !secrets_match(&self.secret, expected) {
            return Err(Error::Auth);
        }

        let task = self.task.trim().to_string();
        if task.is_empty() {
            return Err(Error::Other("Missing task identity".to_string()));
        }

        let round = self
            .round
            .ok_or_else(|| Error::Other("Round must be a positive number".to_string()))?;

        Ok(TaskEvent {
            task,
            round,
            brief: self.brief,
            attachments: self.attachments,
            checks: self.checks,
            evaluation_url: self.evaluation_url,
            email: self.email,
            nonce: self.nonce,
        })
    }
}

/// Compare without short-circuiting on the first differing byte
fn secrets_match(given: &str, expected: &str) -> bool {
    if expected.is_empty() || given.len() != expected.len() {
        return false;
    }

    given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(json: &str) -> TaskSubmission {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let s = submission(r#"{"secret": "s3cret", "task": "T1"}"#);
        assert_eq!(s.round, Some(1));
        assert_eq!(s.brief, "No brief provided.");
        assert!(s.attachments.is_empty());
        assert!(s.checks.is_empty());
        assert_eq!(s.evaluation_url, "");
    }

    #[test]
    fn test_null_and_mistyped_fields_fall_back() {
        let s = submission(
            r#"{"secret": "s3cret", "task": 42, "round": null, "brief": null,
                "attachments": {"name": "x"}, "checks": "has title", "email": 7}"#,
        );
        assert_eq!(s.task, "42");
        assert_eq!(s.round, Some(1));
        assert_eq!(s.brief, "No brief provided.");
        assert!(s.attachments.is_empty());
        assert_eq!(s.checks, vec!["has title"]);
        assert_eq!(s.email, "");
    }

    #[test]
    fn test_round_as_string_or_zero() {
        assert_eq!(submission(r#"{"task": "T", "round": "2"}"#).round, Some(2));
        assert_eq!(submission(r#"{"task": "T", "round": 0}"#).round, Some(1));
        assert_eq!(submission(r#"{"round": "two"}"#).round, None);
        assert_eq!(submission(r#"{"round": -3}"#).round, None);
    }

    #[test]
    fn test_attachment_shapes() {
        let s = submission(
            r#"{"attachments": [
                "https://cdn.example.com/img/logo.png?v=2",
                {"url": "data:text/csv;base64,YQ=="},
                {"name": "notes.md", "url": "https://x.example.com/n"},
                {"name": "orphan"},
                3
            ]}"#,
        );

        let names: Vec<_> = s.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["logo.png", "attachment-2", "notes.md"]);
        assert_eq!(s.attachments[1].url, "data:text/csv;base64,YQ==");
    }

    #[test]
    fn test_non_object_body_has_no_secret() {
        let s = submission(r#"["s3cret", "T1"]"#);
        assert_eq!(s, TaskSubmission::default());
        assert!(matches!(s.authenticate("s3cret"), Err(Error::Auth)));
    }

    #[test]
    fn test_authenticate_builds_event() {
        let s = submission(
            r#"{
                "secret": "s3cret",
                "task": "T1",
                "round": 2,
                "brief": "add a reset button",
                "attachments": [{"name": "a.csv", "url": "data:text/csv;base64,YQ=="}],
                "checks": ["has button"],
                "evaluation_url": "https://eval.example.com/notify",
                "email": "student@example.com",
                "nonce": "n-2"
            }"#,
        );

        let event = s.authenticate("s3cret").unwrap();
        assert_eq!(event.task, "T1");
        assert_eq!(event.round, 2);
        assert_eq!(event.attachments[0].name, "a.csv");
        assert_eq!(event.nonce, "n-2");

        let ack = Acknowledgement::received(&event);
        assert_eq!(
            serde_json::to_value(ack).unwrap(),
            serde_json::json!({"status": "received", "task": "T1", "round": 2})
        );
    }

    #[test]
    fn test_wrong_secret_is_auth_error() {
        let s = submission(r#"{"secret": "nope", "task": "T1"}"#);
        assert!(matches!(s.authenticate("s3cret"), Err(Error::Auth)));

        // secret is checked before the task identity
        let s = submission(r#"{"secret": "nope"}"#);
        assert!(matches!(s.authenticate("s3cret"), Err(Error::Auth)));

        // and before the round
        let s = submission(r#"{"secret": "nope", "task": "T1", "round": "two"}"#);
        assert!(matches!(s.authenticate("s3cret"), Err(Error::Auth)));
    }

    #[test]
    fn test_empty_expected_secret_never_matches() {
        let s = submission(r#"{"secret": "", "task": "T1"}"#);
        assert!(matches!(s.authenticate(""), Err(Error::Auth)));
    }

    #[test]
    fn test_missing_task_after_valid_secret() {
        let s = submission(r#"{"secret": "s3cret"}"#);
        assert!(matches!(s.authenticate("s3cret"), Err(Error::Other(_))));
    }

    #[test]
    fn test_unparsable_round_after_valid_secret() {
        let s = submission(r#"{"secret": "s3cret", "task": "T1", "round": "two"}"#);
        assert!(matches!(s.authenticate("s3cret"), Err(Error::Other(_))));
    }
}
