use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DataPath {
    pub root: PathBuf,
}

impl DataPath {
    pub fn new(data_path: Option<PathBuf>) -> io::Result<Self> {
        let root = match data_path {
            Some(path) => path,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        "Home directory not found. Please specify --data-path.",
                    )
                })?
                .join(".mailview"),
        };

        Ok(Self { root })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("mailview.log")
    }
}

/// Account list as returned by `GET /api/accounts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountList {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub emails: Vec<Account>,
}

impl AccountList {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.emails.iter().map(|a| a.user.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user: String,
    #[serde(default)]
    pub email_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub path: String,
}

/// A stored message. List endpoints and the detail endpoint share this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Email {
    pub fn display_subject(&self) -> &str {
        if self.subject.trim().is_empty() {
            "(no subject)"
        } else {
            &self.subject
        }
    }

    pub fn display_sender(&self) -> &str {
        if self.from.trim().is_empty() {
            "(unknown sender)"
        } else {
            &self.from
        }
    }

    /// Body as terminal text wrapped at `width` columns. `content` is HTML
    /// from the backend; if it cannot be rendered it is shown as is.
    pub fn plain_text(&self, width: usize) -> String {
        html2text::from_read(self.content.as_bytes(), width.max(1))
            .map(|text| text.trim_end().to_string())
            .unwrap_or_else(|_| self.content.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Info,
}

impl NotificationKind {
    pub fn icon(&self) -> &str {
        match self {
            NotificationKind::Error => "❌",
            NotificationKind::Warning => "⚠️",
            NotificationKind::Info => "ℹ️",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub message: String,
}

/// Number of `error` notifications, shown as the notification badge.
pub fn error_badge_count(notifications: &[Notification]) -> usize {
    notifications
        .iter()
        .filter(|n| n.kind == NotificationKind::Error)
        .count()
}

/// What a fetch job should collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Account(String),
    All,
}

impl FetchTarget {
    pub fn describe(&self) -> String {
        match self {
            FetchTarget::Account(account) => account.clone(),
            FetchTarget::All => "all accounts".to_string(),
        }
    }
}
