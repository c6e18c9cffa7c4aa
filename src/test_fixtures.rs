use crate::core::api::{ConnectionStatus, MailApi};
use crate::core::models::{
    Account, AccountList, Attachment, Email, FetchTarget, Notification, NotificationKind,
};
use crate::core::progress::{JobProgress, JobStatus};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;

pub fn report(status: JobStatus, percentage: f64) -> JobProgress {
    JobProgress {
        status,
        percentage,
        ..JobProgress::default()
    }
}

pub fn sample_email(id: &str, account: &str, subject: &str) -> Email {
    Email {
        id: id.to_string(),
        account: account.to_string(),
        subject: subject.to_string(),
        from: "Carol <carol@example.com>".to_string(),
        date: "2024-01-15 10:30:00".to_string(),
        content: format!("<p>{subject}</p>"),
        attachments: Vec::new(),
    }
}

pub fn sample_accounts() -> AccountList {
    AccountList {
        server: "imap.example.com".to_string(),
        emails: vec![
            Account {
                user: "alice@example.com".to_string(),
                email_count: 2,
            },
            Account {
                user: "bob@example.com".to_string(),
                email_count: 1,
            },
        ],
    }
}

pub fn sample_notifications() -> Vec<Notification> {
    vec![
        Notification {
            kind: NotificationKind::Error,
            time: "2024-01-15 10:00:00".to_string(),
            message: "Account bob@example.com: login failed".to_string(),
        },
        Notification {
            kind: NotificationKind::Warning,
            time: "2024-01-15 10:01:00".to_string(),
            message: "Server responded slowly".to_string(),
        },
        Notification {
            kind: NotificationKind::Info,
            time: "2024-01-15 10:02:00".to_string(),
            message: "Fetched 3 new emails".to_string(),
        },
    ]
}

type Scripted = Result<JobProgress, String>;

/// In-memory backend that records every call as `"METHOD /path"`.
///
/// Progress scripts are consumed front to back; the last entry repeats.
#[derive(Default)]
pub struct MockMailApi {
    calls: Mutex<Vec<String>>,
    accounts: Mutex<AccountList>,
    account_emails: Mutex<HashMap<String, Vec<Email>>>,
    search_results: Mutex<Vec<Email>>,
    notifications: Mutex<Vec<Notification>>,
    fetch_script: Mutex<VecDeque<Scripted>>,
    search_script: Mutex<VecDeque<Scripted>>,
    fail_start_fetch: Mutex<bool>,
    fail_start_search: Mutex<bool>,
    fail_clear: Mutex<bool>,
}

impl MockMailApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two accounts with two and one emails, plus three notifications.
    pub fn with_sample_data() -> Self {
        let api = Self::new();
        *api.accounts.lock().unwrap() = sample_accounts();
        {
            let mut emails = api.account_emails.lock().unwrap();
            let mut report_email = sample_email("a1", "alice@example.com", "Quarterly report");
            report_email.attachments.push(Attachment {
                filename: "report.pdf".to_string(),
                path: "/api/attachments/a1/report.pdf".to_string(),
            });
            emails.insert(
                "alice@example.com".to_string(),
                vec![
                    report_email,
                    sample_email("a2", "alice@example.com", "Lunch on Friday"),
                ],
            );
            emails.insert(
                "bob@example.com".to_string(),
                vec![sample_email("b1", "bob@example.com", "Build failed")],
            );
        }
        *api.notifications.lock().unwrap() = sample_notifications();
        api
    }

    pub fn set_search_results(&self, results: Vec<Email>) {
        *self.search_results.lock().unwrap() = results;
    }

    pub fn script_fetch(&self, reports: Vec<JobProgress>) {
        *self.fetch_script.lock().unwrap() = reports.into_iter().map(Ok).collect();
    }

    pub fn script_search(&self, reports: Vec<JobProgress>) {
        *self.search_script.lock().unwrap() = reports.into_iter().map(Ok).collect();
    }

    pub fn script_search_failure(&self) {
        *self.search_script.lock().unwrap() =
            VecDeque::from([Err("connection refused".to_string())]);
    }

    pub fn fail_start_fetch(&self) {
        *self.fail_start_fetch.lock().unwrap() = true;
    }

    pub fn fail_start_search(&self) {
        *self.fail_start_search.lock().unwrap() = true;
    }

    pub fn fail_clear(&self) {
        *self.fail_clear.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn forget_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_report(script: &Mutex<VecDeque<Scripted>>) -> io::Result<JobProgress> {
        let mut script = script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(progress)) => Ok(progress),
            Some(Err(message)) => Err(io::Error::other(message)),
            None => Ok(JobProgress::idle()),
        }
    }

    fn all_emails(&self) -> Vec<Email> {
        let emails = self.account_emails.lock().unwrap();
        let mut all: Vec<Email> = emails.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl MailApi for MockMailApi {
    async fn list_accounts(&self) -> io::Result<AccountList> {
        self.record("GET /api/accounts".to_string());
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn list_account_emails(&self, account: &str) -> io::Result<Vec<Email>> {
        self.record(format!("GET /api/emails/{account}"));
        Ok(self
            .account_emails
            .lock()
            .unwrap()
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_all_emails(&self) -> io::Result<Vec<Email>> {
        self.record("GET /api/emails".to_string());
        Ok(self.all_emails())
    }

    async fn get_email(&self, id: &str) -> io::Result<Email> {
        self.record(format!("GET /api/email/{id}"));
        self.all_emails()
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| io::Error::other("Backend returned 404 Not Found"))
    }

    async fn start_fetch(&self, target: &FetchTarget) -> io::Result<()> {
        match target {
            FetchTarget::Account(account) => self.record(format!("POST /api/fetch/{account}")),
            FetchTarget::All => self.record("POST /api/fetch/all".to_string()),
        }
        if *self.fail_start_fetch.lock().unwrap() {
            return Err(io::Error::other("connection refused"));
        }
        Ok(())
    }

    async fn fetch_progress(&self) -> io::Result<JobProgress> {
        self.record("GET /api/fetch/progress".to_string());
        Self::next_report(&self.fetch_script)
    }

    async fn start_search(&self, query: &str) -> io::Result<()> {
        self.record(format!("GET /api/search?q={query}"));
        if *self.fail_start_search.lock().unwrap() {
            return Err(io::Error::other("connection refused"));
        }
        Ok(())
    }

    async fn search_progress(&self) -> io::Result<JobProgress> {
        self.record("GET /api/search/progress".to_string());
        Self::next_report(&self.search_script)
    }

    async fn search_results(&self, query: &str) -> io::Result<Vec<Email>> {
        self.record(format!("GET /api/search/results?q={query}"));
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn list_notifications(&self) -> io::Result<Vec<Notification>> {
        self.record("GET /api/notifications".to_string());
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn clear_notifications(&self) -> io::Result<()> {
        self.record("POST /api/notifications/clear".to_string());
        if *self.fail_clear.lock().unwrap() {
            return Err(io::Error::other("Backend returned 500 Internal Server Error"));
        }
        self.notifications.lock().unwrap().clear();
        Ok(())
    }

    async fn test_connection(&self) -> io::Result<ConnectionStatus> {
        self.record("GET /health".to_string());
        Ok(ConnectionStatus::Connected)
    }

    fn attachment_url(&self, email_id: &str, attachment: &Attachment) -> String {
        format!(
            "http://mock.invalid/api/attachments/{email_id}/{}",
            attachment.filename
        )
    }
}
