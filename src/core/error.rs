use crate::core::progress::JobKind;
use std::collections::BTreeMap;
use std::fmt;

/// Longest response body kept in a log record.
const MAX_LOGGED_BODY: usize = 500;

/// How a backend call failed. All three take the same path in the session;
/// only the log record tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Api,
    JsonParse,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Network => "network_error",
            FailureKind::Api => "api_error",
            FailureKind::JsonParse => "json_parse_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of a failed mail backend call, logged under `api_errors`.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation: String,
    pub timestamp: String,
    pub failure: FailureKind,
    pub message: String,
    /// The fetch or search job the call belongs to, if any.
    pub job: Option<JobKind>,
    pub request_url: Option<String>,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: &str, failure: FailureKind, message: &str) -> Self {
        Self {
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            failure,
            message: message.to_string(),
            job: None,
            request_url: None,
            status_code: None,
            response_body: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn for_job(mut self, job: Option<JobKind>) -> Self {
        self.job = job;
        self
    }

    pub fn with_request(mut self, url: &str, status_code: Option<u16>) -> Self {
        self.request_url = Some(url.to_string());
        self.status_code = status_code;
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        let body = match body.char_indices().nth(MAX_LOGGED_BODY) {
            Some((cut, _)) => format!("{}…", &body[..cut]),
            None => body.to_string(),
        };
        self.response_body = Some(body);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// One line, `key=value` pairs after the summary. Absent fields are left out.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} failed [{}] at {}: {}",
            self.operation, self.failure, self.timestamp, self.message
        );
        if let Some(job) = self.job {
            line.push_str(&format!(" job={job}"));
        }
        if let Some(url) = &self.request_url {
            line.push_str(&format!(" url={url}"));
        }
        if let Some(status) = self.status_code {
            line.push_str(&format!(" status={status}"));
        }
        if let Some(body) = &self.response_body {
            line.push_str(&format!(" body={body:?}"));
        }
        for (key, value) in &self.metadata {
            line.push_str(&format!(" {key}={value}"));
        }
        line
    }

    pub fn log_error(&self) {
        log::error!(target: "api_errors", "{}", self.summary());
    }
}
