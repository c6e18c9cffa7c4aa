//! Progress records for backend jobs and the per-job state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of asynchronous backend job the client observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Fetch,
    Search,
}

impl JobKind {
    /// Status the backend reports while a job of this kind is running.
    pub fn active_status(self) -> JobStatus {
        match self {
            JobKind::Fetch => JobStatus::Fetching,
            JobKind::Search => JobStatus::Searching,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JobKind::Fetch => "fetch",
            JobKind::Search => "search",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Fetching,
    Searching,
    Completed,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Idle => "idle",
            JobStatus::Fetching => "fetching",
            JobStatus::Searching => "searching",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Job progress as reported by `/api/fetch/progress` and `/api/search/progress`.
///
/// Only `status` is required; every other field defaults when the backend omits it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_account_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_accounts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_email_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_emails: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_emails: Option<u32>,
}

impl JobProgress {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Local record set the moment a job is triggered, before any poll.
    pub fn started(kind: JobKind, message: &str) -> Self {
        Self {
            status: kind.active_status(),
            percentage: 0.0,
            message: message.to_string(),
            ..Self::default()
        }
    }

    /// Percentage clamped to `0.0..=1.0` for gauges.
    pub fn ratio(&self) -> f64 {
        if self.percentage.is_finite() {
            (self.percentage / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn current_account(&self) -> Option<&str> {
        self.current_account
            .as_deref()
            .filter(|account| !account.trim().is_empty())
    }

    /// Human readable progress lines: account counter, email counter, message.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(total) = self.total_accounts.filter(|total| *total > 1) {
            let index = self.current_account_index.unwrap_or(0);
            match self.current_account() {
                Some(account) => lines.push(format!(
                    "Accounts: {index}/{total} | Current account: {account}"
                )),
                None => lines.push(format!("Accounts: {index}/{total}")),
            }
        } else if let Some(account) = self.current_account() {
            lines.push(format!("Account: {account}"));
        }

        if let Some(total) = self.total_emails.filter(|total| *total > 0) {
            let index = self
                .current_email_index
                .or(self.processed_emails)
                .unwrap_or(0);
            lines.push(format!("Emails: {index}/{total}"));
        }

        if !self.message.is_empty() {
            lines.push(self.message.clone());
        }

        lines
    }
}

/// Outcome of feeding a poll response into a [`JobTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still active, fields updated.
    Progressed,
    Completed,
    Failed,
    /// Left the active state without reaching a terminal state (e.g. `idle`).
    Stopped,
    /// Not active, so the response was dropped.
    Ignored,
}

/// One job slot. Fetch and search each own one; they never coordinate.
#[derive(Debug, Clone)]
pub struct JobTracker {
    kind: JobKind,
    progress: JobProgress,
}

impl JobTracker {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            progress: JobProgress::idle(),
        }
    }

    pub fn progress(&self) -> &JobProgress {
        &self.progress
    }

    pub fn status(&self) -> JobStatus {
        self.progress.status
    }

    pub fn is_active(&self) -> bool {
        self.progress.status == self.kind.active_status()
    }

    /// Enter the active state. Returns `false` without touching anything if a
    /// job of this kind is already active.
    pub fn begin(&mut self, message: &str) -> bool {
        if self.is_active() {
            return false;
        }
        self.progress = JobProgress::started(self.kind, message);
        true
    }

    /// Adopt a job that was already running on the backend before we looked.
    pub fn resume(&mut self, progress: JobProgress) -> bool {
        if self.is_active() || progress.status != self.kind.active_status() {
            return false;
        }
        self.progress = progress;
        true
    }

    /// Move to `error` keeping the current percentage.
    pub fn fail(&mut self, message: &str) {
        self.progress.status = JobStatus::Error;
        self.progress.message = message.to_string();
    }

    /// Replace the record with a poll response, verbatim.
    pub fn apply(&mut self, update: JobProgress) -> Transition {
        if !self.is_active() {
            return Transition::Ignored;
        }

        let status = update.status;
        self.progress = update;

        if status == self.kind.active_status() {
            Transition::Progressed
        } else {
            match status {
                JobStatus::Completed => Transition::Completed,
                JobStatus::Error => Transition::Failed,
                _ => Transition::Stopped,
            }
        }
    }

    /// `error -> idle`. Any other state is left alone.
    pub fn reset(&mut self) -> bool {
        if self.progress.status != JobStatus::Error {
            return false;
        }
        self.progress = JobProgress::idle();
        true
    }
}
