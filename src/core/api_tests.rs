use crate::core::api::{ConnectionStatus, HttpMailApi, MailApi};
use crate::core::config::{ClientConfig, PollingConfig};
use crate::core::models::{FetchTarget, NotificationKind};
use crate::core::poller::PollSettings;
use crate::core::progress::{JobKind, JobStatus};
use crate::core::session::{MailSession, SessionOptions};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, access_key: Option<&str>) -> HttpMailApi {
    let config = ClientConfig {
        api_url: server.uri(),
        access_key: access_key.map(str::to_string),
        ..ClientConfig::default()
    };
    HttpMailApi::new(&config).expect("Should build client")
}

fn fast_settings() -> PollSettings {
    PollSettings::from(&PollingConfig {
        interval_ms: 20,
        error_reset_ms: 100,
        max_polls: 50,
        notification_interval_ms: 60_000,
        request_timeout_secs: 5,
    })
}

#[tokio::test]
async fn test_list_accounts_sends_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server": "imap.example.com",
            "emails": [
                {"user": "alice@example.com", "password": "x", "email_count": 12},
                {"user": "bob@example.com", "password": "y", "email_count": 0}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, Some("s3cret"));
    let accounts = api.list_accounts().await.unwrap();

    assert_eq!(accounts.server, "imap.example.com");
    assert_eq!(
        accounts.users().collect::<Vec<_>>(),
        vec!["alice@example.com", "bob@example.com"]
    );
    assert_eq!(accounts.emails[0].email_count, 12);
}

#[tokio::test]
async fn test_no_authorization_header_without_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    assert!(api.list_all_emails().await.unwrap().is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_account_emails_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/emails/alice@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "m1",
                "account": "alice@example.com",
                "subject": "Hello",
                "from": "Bob <bob@example.com>",
                "date": "2024-01-15 10:30:00",
                "content": "<p>Hi</p>",
                "attachments": [{"filename": "a.txt", "path": "/api/attachments/m1/a.txt"}]
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/email/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "account": "alice@example.com",
            "subject": "",
            "from": "",
            "date": "2024-01-15 10:30:00",
            "content": "<p>Hi</p>"
        })))
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    let emails = api.list_account_emails("alice@example.com").await.unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].attachments[0].filename, "a.txt");

    let email = api.get_email("m1").await.unwrap();
    assert_eq!(email.display_subject(), "(no subject)");
    assert_eq!(email.display_sender(), "(unknown sender)");
    assert!(email.attachments.is_empty());
}

#[tokio::test]
async fn test_start_fetch_rejected_by_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/fetch/all"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "Fetch already in progress"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    let err = api.start_fetch(&FetchTarget::All).await.unwrap_err();

    assert!(err.to_string().contains("400"));
    assert!(err.to_string().contains("Fetch already in progress"));
}

#[tokio::test]
async fn test_fetch_progress_full_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/fetch/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "fetching",
            "current_account": "alice@example.com",
            "total_accounts": 2,
            "current_account_index": 1,
            "current_email_index": 4,
            "total_emails": 10,
            "message": "Fetching emails for alice@example.com",
            "percentage": 20
        })))
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    let progress = api.fetch_progress().await.unwrap();

    assert_eq!(progress.status, JobStatus::Fetching);
    assert_eq!(progress.percentage, 20.0);
    assert_eq!(
        progress.summary_lines(),
        vec![
            "Accounts: 1/2 | Current account: alice@example.com".to_string(),
            "Emails: 4/10".to_string(),
            "Fetching emails for alice@example.com".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unknown_status_is_invalid_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "paused"})))
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    let err = api.search_progress().await.unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn test_search_sends_query_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("q", "quarterly report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/search/results"))
        .and(query_param("q", "quarterly report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m7", "account": "bob@example.com", "subject": "Quarterly report"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    api.start_search("quarterly report").await.unwrap();
    let results = api.search_results("quarterly report").await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "m7");
}

#[tokio::test]
async fn test_notifications_list_and_clear() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message": "Login failed", "type": "error", "time": "2024-01-15 10:00:00"},
            {"message": "Done", "type": "info", "time": "2024-01-15 10:05:00"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/clear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, None);
    let notifications = api.list_notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].kind, NotificationKind::Error);

    api.clear_notifications().await.unwrap();
}

#[tokio::test]
async fn test_connection_checks_health_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"server": "", "emails": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let good = client_for(&server, Some("good"));
    assert_eq!(good.test_connection().await.unwrap(), ConnectionStatus::Connected);

    let bad = client_for(&server, Some("bad"));
    assert_eq!(
        bad.test_connection().await.unwrap(),
        ConnectionStatus::Error("Access key rejected by backend".to_string())
    );
}

#[tokio::test]
async fn test_connection_to_unreachable_backend() {
    let config = ClientConfig {
        api_url: "http://127.0.0.1:9".to_string(),
        ..ClientConfig::default()
    };
    let api = HttpMailApi::new(&config).unwrap();

    let status = api.test_connection().await.unwrap();
    assert!(matches!(status, ConnectionStatus::Error(_)));
}

#[tokio::test]
async fn test_session_fetch_against_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/fetch/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/fetch/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "fetching",
            "percentage": 50,
            "message": "Halfway"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/fetch/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "percentage": 100,
            "message": "Done"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "account": "alice@example.com", "subject": "New"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server": "imap.example.com",
            "emails": [{"user": "alice@example.com", "email_count": 1}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api: Arc<dyn MailApi> = Arc::new(client_for(&server, None));
    let mut session = MailSession::new(
        api,
        fast_settings(),
        SessionOptions {
            notifications: false,
        },
    );

    assert!(session.start_fetch(FetchTarget::All).await);
    let progress =
        tokio::time::timeout(Duration::from_secs(5), session.wait_for_job(JobKind::Fetch))
            .await
            .expect("fetch should finish")
            .clone();

    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.message, "Done");
    assert_eq!(session.emails().len(), 1);
    assert_eq!(session.accounts().emails.len(), 1);
}

#[tokio::test]
async fn test_session_search_error_resets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/search/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "percentage": 10,
            "message": "Search index unavailable"
        })))
        .mount(&server)
        .await;

    let api: Arc<dyn MailApi> = Arc::new(client_for(&server, None));
    let mut session = MailSession::new(
        api,
        fast_settings(),
        SessionOptions {
            notifications: false,
        },
    );

    assert!(session.start_search("invoice").await);
    tokio::time::timeout(Duration::from_secs(5), session.wait_for_job(JobKind::Search))
        .await
        .expect("search should fail");
    assert_eq!(session.error_banner(), Some("Search index unavailable"));

    tokio::time::timeout(Duration::from_secs(5), session.step())
        .await
        .expect("reset timer should fire");
    assert_eq!(session.search_progress().status, JobStatus::Idle);
    assert!(session.error_banner().is_none());

    let results_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/search/results")
        .count();
    assert_eq!(results_requests, 0);
}
