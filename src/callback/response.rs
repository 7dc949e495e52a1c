use serde_json::Value;

use crate::model::{DockerAction, UserInstanceStatus};

/// The `status` field of a container response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Err,
    /// An explicit instance status name such as `running`.
    Named(String),
    Missing,
}

/// Read-only accessors over a parsed response file:
///
/// ```json
/// {"status": "ok", "request_id": "...", "response": {"result": {...}, "log": "..."}}
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ContainerResponse<'a> {
    raw: &'a Value,
}

impl<'a> ContainerResponse<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a Value {
        self.raw
    }

    pub fn status(&self) -> ResponseStatus {
        match self.raw.get("status").and_then(Value::as_str) {
            None => ResponseStatus::Missing,
            Some(s) => match s.trim().to_ascii_lowercase().as_str() {
                "ok" => ResponseStatus::Ok,
                "err" | "error" => ResponseStatus::Err,
                other => ResponseStatus::Named(other.to_string()),
            },
        }
    }

    pub fn request_id(&self) -> Option<&'a str> {
        self.raw.get("request_id").and_then(Value::as_str)
    }

    /// `response.result`, falling back to a top-level `result`.
    pub fn result(&self) -> Option<&'a Value> {
        self.raw
            .get("response")
            .and_then(|r| r.get("result"))
            .or_else(|| self.raw.get("result"))
    }

    pub fn result_str(&self, key: &str) -> Option<&'a str> {
        self.result()?.get(key)?.as_str()
    }

    pub fn error_message(&self) -> Option<String> {
        self.result_str("error")
            .or_else(|| self.raw.get("error_message").and_then(Value::as_str))
            .or_else(|| {
                self.raw
                    .get("response")
                    .and_then(|r| r.get("error"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
    }

    /// Instance status the response stands for, with an error message for
    /// failures.
    pub fn instance_status(&self, action: DockerAction) -> (UserInstanceStatus, Option<String>) {
        match self.status() {
            ResponseStatus::Ok => (UserInstanceStatus::on_success(action), None),
            ResponseStatus::Err => (
                UserInstanceStatus::Failed,
                Some(
                    self.error_message()
                        .unwrap_or_else(|| format!("Action {action} failed")),
                ),
            ),
            ResponseStatus::Named(name) => match name.parse::<UserInstanceStatus>() {
                Ok(UserInstanceStatus::Failed) => {
                    (UserInstanceStatus::Failed, self.error_message())
                }
                Ok(status) => (status, None),
                Err(e) => (UserInstanceStatus::Failed, Some(e)),
            },
            ResponseStatus::Missing => (
                UserInstanceStatus::Failed,
                Some("Response file has no status field".to_string()),
            ),
        }
    }
}
