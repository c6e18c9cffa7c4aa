use crate::core::{
    api::{ConnectionStatus, MailApi},
    config::{ClientConfig, ConfigKey, ConfigService},
    models::{DataPath, Email, FetchTarget},
    progress::{JobKind, JobProgress, JobStatus},
    session::MailSession,
};
use crate::terminal::Terminal;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io;
use std::path::PathBuf;

/// Column width of email bodies printed by `show`.
const BODY_WIDTH: usize = 80;

#[derive(Parser)]
#[command(name = "mailview")]
#[command(about = "A client for the mail collector backend.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets a custom data path
    #[arg(long, value_name = "DIR")]
    pub data_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured mail accounts
    Accounts,
    /// List stored emails (all accounts if none is given)
    Emails {
        /// The account to list
        account: Option<String>,
    },
    /// Show a single email
    Show {
        /// The email id
        id: String,
    },
    /// Fetch new mail and follow the job until it finishes
    Fetch {
        /// Only fetch this account (default: all accounts)
        #[arg(long)]
        account: Option<String>,
    },
    /// Search stored mail and print the results
    Search {
        /// The search query
        query: String,
    },
    /// Show backend notifications
    Notifications {
        /// Clear all notifications after listing them
        #[arg(long)]
        clear: bool,
    },
    /// Check the backend connection and running jobs
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Open the interactive mail browser
    Browse,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// The key to get
        key: String,
    },
    /// Set a configuration value
    Set {
        /// The key to set
        key: String,
        /// The value to set
        value: String,
    },
}

pub async fn handle_accounts_command(
    api: &dyn MailApi,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    let accounts = api.list_accounts().await?;

    if accounts.is_empty() {
        terminal.write_line("No accounts configured on the backend.")?;
        return Ok(());
    }

    terminal.write_line(&format!(
        "Accounts on {} ({}):",
        accounts.server,
        accounts.emails.len()
    ))?;
    terminal.write_line(&"=".repeat(20))?;
    for account in &accounts.emails {
        terminal.write_line(&format!("• {} - {} emails", account.user, account.email_count))?;
    }
    Ok(())
}

pub async fn handle_emails_command(
    api: &dyn MailApi,
    account: Option<&str>,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    let emails = match account {
        Some(account) => api.list_account_emails(account).await?,
        None => api.list_all_emails().await?,
    };
    print_email_list(&emails, terminal)
}

pub async fn handle_show_command(
    api: &dyn MailApi,
    id: &str,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    let email = api.get_email(id).await?;

    terminal.write_line(&format!("Subject: {}", email.display_subject()))?;
    terminal.write_line(&format!("From:    {}", email.display_sender()))?;
    terminal.write_line(&format!("Date:    {}", email.date))?;
    terminal.write_line(&format!("Account: {}", email.account))?;
    terminal.write_line("")?;
    terminal.write_line(&email.plain_text(BODY_WIDTH))?;

    if !email.attachments.is_empty() {
        terminal.write_line("")?;
        terminal.write_line(&format!("Attachments ({}):", email.attachments.len()))?;
        for attachment in &email.attachments {
            terminal.write_line(&format!(
                "• {} <{}>",
                attachment.filename,
                api.attachment_url(&email.id, attachment)
            ))?;
        }
    }
    Ok(())
}

pub async fn handle_fetch_command(
    session: &mut MailSession,
    account: Option<&str>,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    let target = match account {
        Some(account) => {
            session.select_account(account).await;
            FetchTarget::Account(account.to_string())
        }
        None => FetchTarget::All,
    };

    terminal.write_line(&format!("Fetching mail for {}...", target.describe()))?;
    if !session.start_fetch(target).await {
        return Err(job_error(session, JobKind::Fetch));
    }

    let progress = follow_job(session, JobKind::Fetch, terminal).await?;
    info!("Fetch finished: {}", progress.message);
    terminal.write_line(&format!("✅ {}", completion_message(&progress, "Fetch completed")))?;
    terminal.write_line(&format!("{} emails available", session.emails().len()))?;
    Ok(())
}

pub async fn handle_search_command(
    session: &mut MailSession,
    query: &str,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    if query.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Search query must not be empty",
        ));
    }

    terminal.write_line(&format!("Searching for '{}'...", query.trim()))?;
    if !session.start_search(query).await {
        return Err(job_error(session, JobKind::Search));
    }

    let progress = follow_job(session, JobKind::Search, terminal).await?;
    terminal.write_line(&format!("✅ {}", completion_message(&progress, "Search completed")))?;
    print_email_list(session.emails(), terminal)
}

pub async fn handle_notifications_command(
    session: &mut MailSession,
    clear: bool,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    session.refresh_notifications().await;
    let notifications = session.notifications();

    if notifications.is_empty() {
        terminal.write_line("No notifications.")?;
        return Ok(());
    }

    terminal.write_line(&format!(
        "Notifications ({}, {} errors):",
        notifications.len(),
        session.notification_badge()
    ))?;
    for notification in notifications {
        terminal.write_line(&format!(
            "{} [{}] {}",
            notification.kind.icon(),
            notification.time,
            notification.message
        ))?;
    }

    if clear {
        if !terminal.confirm("Clear all notifications?")? {
            terminal.write_line("Nothing cleared.")?;
            return Ok(());
        }
        if !session.clear_notifications().await {
            return Err(io::Error::other("Failed to clear notifications"));
        }
        terminal.write_line("Notifications cleared.")?;
    }
    Ok(())
}

pub async fn handle_status_command(
    api: &dyn MailApi,
    config: &ClientConfig,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    terminal.write_line(&format!("Backend: {}", config.api_url))?;
    let status = api.test_connection().await?;
    match &status {
        ConnectionStatus::Connected => {
            terminal.write_line(&format!("{} Connected", status.status_icon()))?
        }
        ConnectionStatus::Warning(message)
        | ConnectionStatus::Error(message) => {
            terminal.write_line(&format!("{} {message}", status.status_icon()))?
        }
    }
    if !status.is_ok() {
        return Ok(());
    }

    for kind in [JobKind::Fetch, JobKind::Search] {
        let result = match kind {
            JobKind::Fetch => api.fetch_progress().await,
            JobKind::Search => api.search_progress().await,
        };
        match result {
            Ok(progress) => terminal.write_line(&format!(
                "{} job: {} ({:.0}%) {}",
                capitalize(kind.label()),
                progress.status,
                progress.percentage,
                progress.message
            ))?,
            Err(e) => {
                error!("Failed to read {kind} progress: {e}");
                terminal.write_line(&format!("{} job: unknown", capitalize(kind.label())))?
            }
        }
    }
    Ok(())
}

pub fn handle_config_command(
    data_path: &DataPath,
    command: &Option<ConfigCommands>,
    terminal: &mut dyn Terminal,
) -> io::Result<()> {
    match command {
        Some(ConfigCommands::Get { key }) => {
            let key: ConfigKey = key.parse()?;
            let config = ConfigService::load_config(data_path)?;
            terminal.write_line(&format!(
                "{}: {}",
                key.name(),
                ConfigService::get_value(&config, key)
            ))?;
        }
        Some(ConfigCommands::Set { key, value }) => {
            let key: ConfigKey = key.parse()?;
            let mut config = ConfigService::load_config(data_path)?;
            if let Err(e) = ConfigService::set_value(&mut config, key, value) {
                error!("Invalid value for {}: {e}", key.name());
                return Err(e);
            }
            ConfigService::save_config(&config, data_path)?;
            info!("Updated {} configuration", key.name());

            let shown = match key {
                ConfigKey::AccessKey => mask_secret(config.access_key()),
                _ => ConfigService::get_value(&config, key),
            };
            terminal.write_line(&format!("{} set to: {shown}", key.name()))?;
            terminal.write_line(&format!(
                "Config file: {}",
                data_path.config_path().display()
            ))?;
        }
        None => {
            let config = ConfigService::load_config(data_path)?;
            terminal.write_line("Current Configuration:")?;
            terminal.write_line("======================")?;
            terminal.write_line(&format!("api_url: {}", config.api_url))?;
            terminal.write_line(&format!(
                "access_key: {}",
                mask_secret(config.access_key())
            ))?;
            terminal.write_line(&format!(
                "theme: {}",
                ConfigService::get_value(&config, ConfigKey::Theme)
            ))?;
            terminal.write_line(&format!(
                "polling: every {}ms, reset errors after {}ms, at most {} polls",
                config.polling.interval_ms, config.polling.error_reset_ms, config.polling.max_polls
            ))?;
            terminal.write_line(&format!(
                "notifications: {}",
                if config.ui.notifications { "on" } else { "off" }
            ))?;
            terminal.write_line("")?;
            terminal.write_line(&format!(
                "Config file: {}",
                data_path.config_path().display()
            ))?;
        }
    }
    Ok(())
}

/// Drive the session until `kind` leaves the active state, printing each new
/// progress line. Anything but `completed` is an error.
async fn follow_job(
    session: &mut MailSession,
    kind: JobKind,
    terminal: &mut dyn Terminal,
) -> io::Result<JobProgress> {
    let mut last_line = String::new();
    while session.job(kind).is_active() {
        session.step().await;
        let progress = session.job(kind).progress();
        if progress.status == kind.active_status() {
            let line = format_progress_line(progress);
            if line != last_line {
                terminal.write_line(&line)?;
                last_line = line;
            }
        }
    }

    let progress = session.job(kind).progress().clone();
    match progress.status {
        JobStatus::Completed => Ok(progress),
        JobStatus::Error => Err(job_error(session, kind)),
        status => Err(io::Error::other(format!(
            "The {kind} job stopped with status {status}"
        ))),
    }
}

fn job_error(session: &MailSession, kind: JobKind) -> io::Error {
    let progress = session.job(kind).progress();
    if progress.status == JobStatus::Error {
        io::Error::other(progress.message.clone())
    } else {
        io::Error::other(format!("A {kind} job is already running"))
    }
}

pub fn format_progress_line(progress: &JobProgress) -> String {
    let mut line = format!("[{:>3.0}%]", progress.percentage.clamp(0.0, 100.0));
    let details = progress.summary_lines();
    if !details.is_empty() {
        line.push(' ');
        line.push_str(&details.join(" | "));
    }
    line
}

fn completion_message(progress: &JobProgress, fallback: &str) -> String {
    if progress.message.trim().is_empty() {
        fallback.to_string()
    } else {
        progress.message.clone()
    }
}

fn print_email_list(emails: &[Email], terminal: &mut dyn Terminal) -> io::Result<()> {
    if emails.is_empty() {
        terminal.write_line("No emails found.")?;
        return Ok(());
    }

    terminal.write_line(&format!("Emails ({}):", emails.len()))?;
    for email in emails {
        terminal.write_line(&format!(
            "{}  {}  {} - {}",
            email.id,
            email.date,
            email.display_sender(),
            email.display_subject()
        ))?;
    }
    Ok(())
}

pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(secret) if secret.chars().count() <= 4 => "****".to_string(),
        Some(secret) => {
            let tail: String = secret
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{tail}")
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
