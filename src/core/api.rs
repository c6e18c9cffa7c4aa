use crate::core::config::ClientConfig;
use crate::core::error::{ErrorContext, FailureKind};
use crate::core::models::{AccountList, Attachment, Email, FetchTarget, Notification};
use crate::core::progress::{JobKind, JobProgress};
use async_trait::async_trait;
use log::info;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::io;
use url::Url;

/// The REST surface of the mail collector backend.
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn list_accounts(&self) -> io::Result<AccountList>;
    async fn list_account_emails(&self, account: &str) -> io::Result<Vec<Email>>;
    async fn list_all_emails(&self) -> io::Result<Vec<Email>>;
    async fn get_email(&self, id: &str) -> io::Result<Email>;

    /// Trigger a fetch job. Progress is only observable via [`MailApi::fetch_progress`].
    async fn start_fetch(&self, target: &FetchTarget) -> io::Result<()>;
    async fn fetch_progress(&self) -> io::Result<JobProgress>;

    /// Trigger a search job. Progress is only observable via [`MailApi::search_progress`].
    async fn start_search(&self, query: &str) -> io::Result<()>;
    async fn search_progress(&self) -> io::Result<JobProgress>;
    async fn search_results(&self, query: &str) -> io::Result<Vec<Email>>;

    async fn list_notifications(&self) -> io::Result<Vec<Notification>>;
    async fn clear_notifications(&self) -> io::Result<()>;

    async fn test_connection(&self) -> io::Result<ConnectionStatus>;

    /// Download location of an attachment. Built locally, never fetched.
    fn attachment_url(&self, email_id: &str, attachment: &Attachment) -> String;
}

/// Connection status for backend health checks
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Warning(String),
    Error(String),
}

impl ConnectionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn status_icon(&self) -> &str {
        match self {
            ConnectionStatus::Connected => "✅",
            ConnectionStatus::Warning(_) => "⚠️",
            ConnectionStatus::Error(_) => "❌",
        }
    }
}

/// HTTP implementation of [`MailApi`] on top of reqwest.
pub struct HttpMailApi {
    client: Client,
    base_url: Url,
    access_key: Option<String>,
}

impl HttpMailApi {
    pub fn new(config: &ClientConfig) -> io::Result<Self> {
        let client = Client::builder()
            .timeout(config.polling.request_timeout())
            .user_agent(concat!("mailview/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| io::Error::other(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(config.api_url.trim()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid API URL '{}': {e}", config.api_url),
            )
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "API URL must start with http:// or https://",
            ));
        }

        info!("Created mail API client for {base_url}");

        Ok(Self {
            client,
            base_url,
            access_key: config.access_key().map(str::to_string),
        })
    }

    /// Base URL with `segments` appended, each one percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Only cannot-be-a-base URLs fail here and `new` rejects those.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let builder = self.client.request(method, url.clone());
        match &self.access_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a request and turn transport failures and non-2xx statuses into errors.
    async fn send(
        &self,
        operation: &str,
        url: &Url,
        request: RequestBuilder,
    ) -> io::Result<Response> {
        let response = request.send().await.map_err(|e| {
            ErrorContext::new(operation, FailureKind::Network, &e.to_string())
                .for_job(job_of(operation))
                .with_request(url.as_str(), None)
                .log_error();
            io::Error::other(format!("Request to {url} failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            ErrorContext::new(operation, FailureKind::Api, &format!("HTTP {status}"))
                .for_job(job_of(operation))
                .with_request(url.as_str(), Some(status.as_u16()))
                .with_body(&error_text)
                .log_error();

            return Err(io::Error::other(format!(
                "Backend returned {status}: {error_text}"
            )));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
        query: &[(&str, &str)],
    ) -> io::Result<T> {
        let request = self.request(Method::GET, &url).query(query);
        let response = self.send(operation, &url, request).await?;

        response.json::<T>().await.map_err(|e| {
            ErrorContext::new(operation, FailureKind::JsonParse, &e.to_string())
                .for_job(job_of(operation))
                .with_request(url.as_str(), None)
                .with_metadata("expected_type", std::any::type_name::<T>())
                .log_error();
            io::Error::new(io::ErrorKind::InvalidData, format!("Invalid JSON: {e}"))
        })
    }

    /// Fire a job or command endpoint; the `{"success": true}` body carries nothing we need.
    async fn trigger(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
    ) -> io::Result<()> {
        let request = self.request(method, &url).query(query);
        self.send(operation, &url, request).await?;
        Ok(())
    }
}

/// The job an API operation belongs to, for error records.
fn job_of(operation: &str) -> Option<JobKind> {
    match operation {
        "start_fetch" | "fetch_progress" => Some(JobKind::Fetch),
        "start_search" | "search_progress" | "search_results" => Some(JobKind::Search),
        _ => None,
    }
}

#[async_trait]
impl MailApi for HttpMailApi {
    async fn list_accounts(&self) -> io::Result<AccountList> {
        self.get_json("list_accounts", self.endpoint(&["api", "accounts"]), &[])
            .await
    }

    async fn list_account_emails(&self, account: &str) -> io::Result<Vec<Email>> {
        self.get_json(
            "list_account_emails",
            self.endpoint(&["api", "emails", account]),
            &[],
        )
        .await
    }

    async fn list_all_emails(&self) -> io::Result<Vec<Email>> {
        self.get_json("list_all_emails", self.endpoint(&["api", "emails"]), &[])
            .await
    }

    async fn get_email(&self, id: &str) -> io::Result<Email> {
        self.get_json("get_email", self.endpoint(&["api", "email", id]), &[])
            .await
    }

    async fn start_fetch(&self, target: &FetchTarget) -> io::Result<()> {
        let url = match target {
            FetchTarget::Account(account) => self.endpoint(&["api", "fetch", account]),
            FetchTarget::All => self.endpoint(&["api", "fetch", "all"]),
        };
        info!("Starting fetch job for {}", target.describe());
        self.trigger("start_fetch", Method::POST, url, &[]).await
    }

    async fn fetch_progress(&self) -> io::Result<JobProgress> {
        self.get_json(
            "fetch_progress",
            self.endpoint(&["api", "fetch", "progress"]),
            &[],
        )
        .await
    }

    async fn start_search(&self, query: &str) -> io::Result<()> {
        info!("Starting search job for '{query}'");
        self.trigger(
            "start_search",
            Method::GET,
            self.endpoint(&["api", "search"]),
            &[("q", query)],
        )
        .await
    }

    async fn search_progress(&self) -> io::Result<JobProgress> {
        self.get_json(
            "search_progress",
            self.endpoint(&["api", "search", "progress"]),
            &[],
        )
        .await
    }

    async fn search_results(&self, query: &str) -> io::Result<Vec<Email>> {
        self.get_json(
            "search_results",
            self.endpoint(&["api", "search", "results"]),
            &[("q", query)],
        )
        .await
    }

    async fn list_notifications(&self) -> io::Result<Vec<Notification>> {
        self.get_json(
            "list_notifications",
            self.endpoint(&["api", "notifications"]),
            &[],
        )
        .await
    }

    async fn clear_notifications(&self) -> io::Result<()> {
        self.trigger(
            "clear_notifications",
            Method::POST,
            self.endpoint(&["api", "notifications", "clear"]),
            &[],
        )
        .await
    }

    async fn test_connection(&self) -> io::Result<ConnectionStatus> {
        info!("Testing backend connection to: {}", self.base_url);

        let health_url = self.endpoint(&["health"]);
        let response = match self.client.get(health_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                ErrorContext::new("test_connection", FailureKind::Network, &e.to_string())
                    .with_request(health_url.as_str(), None)
                    .log_error();
                return Ok(ConnectionStatus::Error(format!(
                    "Backend unreachable: {e}"
                )));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            return Ok(ConnectionStatus::Error(format!(
                "Health check returned {status}"
            )));
        }

        let health: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(e) => {
                return Ok(ConnectionStatus::Error(format!(
                    "Invalid health check response: {e}"
                )));
            }
        };
        if health.get("status").and_then(|s| s.as_str()) != Some("ok") {
            return Ok(ConnectionStatus::Warning(format!(
                "Unexpected health status: {health}"
            )));
        }

        // /health is unauthenticated, so probe an API route to validate the access key.
        let accounts_url = self.endpoint(&["api", "accounts"]);
        match self.request(Method::GET, &accounts_url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::UNAUTHORIZED => Ok(
                ConnectionStatus::Error("Access key rejected by backend".to_string()),
            ),
            Ok(response) if !response.status().is_success() => Ok(ConnectionStatus::Warning(
                format!("Backend is up but /api/accounts returned {}", response.status()),
            )),
            Ok(_) => {
                info!("Backend connection successful to {}", self.base_url);
                Ok(ConnectionStatus::Connected)
            }
            Err(e) => Ok(ConnectionStatus::Warning(format!(
                "Backend is up but /api/accounts failed: {e}"
            ))),
        }
    }

    fn attachment_url(&self, email_id: &str, attachment: &Attachment) -> String {
        self.endpoint(&["api", "attachments", email_id, &attachment.filename])
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_for(url: &str) -> HttpMailApi {
        let config = ClientConfig {
            api_url: url.to_string(),
            ..ClientConfig::default()
        };
        HttpMailApi::new(&config).expect("Should build client")
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        for url in ["ftp://example.com", "mailto:someone@example.com", "not a url"] {
            let config = ClientConfig {
                api_url: url.to_string(),
                ..ClientConfig::default()
            };
            assert!(HttpMailApi::new(&config).is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let api = api_for("http://localhost:5000");
        assert_eq!(
            api.endpoint(&["api", "emails", "alice@example.com"]).as_str(),
            "http://localhost:5000/api/emails/alice@example.com"
        );
        assert_eq!(
            api.endpoint(&["api", "email", "a/b c"]).as_str(),
            "http://localhost:5000/api/email/a%2Fb%20c"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = api_for("https://example.com/mail/");
        assert_eq!(
            api.endpoint(&["api", "accounts"]).as_str(),
            "https://example.com/mail/api/accounts"
        );
    }

    #[test]
    fn test_attachment_url_uses_configured_base() {
        let api = api_for("http://10.0.0.5:8080");
        let attachment = Attachment {
            filename: "report 2024.pdf".to_string(),
            path: "/api/attachments/abc/report 2024.pdf".to_string(),
        };
        assert_eq!(
            api.attachment_url("abc", &attachment),
            "http://10.0.0.5:8080/api/attachments/abc/report%202024.pdf"
        );
    }

    #[test]
    fn test_job_of_operation() {
        assert_eq!(job_of("fetch_progress"), Some(JobKind::Fetch));
        assert_eq!(job_of("search_results"), Some(JobKind::Search));
        assert_eq!(job_of("list_accounts"), None);
    }

    #[test]
    fn test_connection_status_helpers() {
        assert!(ConnectionStatus::Connected.is_ok());
        assert!(!ConnectionStatus::Warning("slow".to_string()).is_ok());
        assert_eq!(ConnectionStatus::Error("down".to_string()).status_icon(), "❌");
    }
}
