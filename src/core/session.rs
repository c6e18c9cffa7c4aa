//! The mail session: everything a view renders, plus the jobs it observes.
//!
//! A session owns one job slot per [`JobKind`], the poll tasks feeding them and
//! the timers that reset failed jobs. Tasks report through a channel; callers
//! drive the session with [`MailSession::step`] or [`MailSession::process_pending`].

use crate::core::api::MailApi;
use crate::core::models::{AccountList, Email, FetchTarget, Notification, error_badge_count};
use crate::core::poller::{
    EventReceiver, EventSender, PollSettings, SessionEvent, TaskHandle, create_event_channel,
    spawn_job_poller, spawn_ticker, spawn_timer,
};
use crate::core::progress::{JobKind, JobProgress, JobStatus, JobTracker, Transition};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Periodically refresh notifications and show the notifications panel.
    pub notifications: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}

pub struct MailSession {
    api: Arc<dyn MailApi>,
    settings: PollSettings,
    options: SessionOptions,
    events_tx: EventSender,
    events_rx: EventReceiver,

    accounts: AccountList,
    selected_account: Option<String>,
    emails: Vec<Email>,
    selected_email: Option<Email>,
    is_searching: bool,
    search_query: String,
    notifications: Vec<Notification>,

    fetch: JobTracker,
    search: JobTracker,
    pollers: HashMap<JobKind, TaskHandle>,
    reset_timers: HashMap<JobKind, TaskHandle>,
    /// Bumped whenever a job starts or fails; a reset only applies to the
    /// failure that scheduled it.
    reset_generations: HashMap<JobKind, u64>,
    notification_ticker: Option<TaskHandle>,
}

impl MailSession {
    pub fn new(api: Arc<dyn MailApi>, settings: PollSettings, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = create_event_channel();
        Self {
            api,
            settings,
            options,
            events_tx,
            events_rx,
            accounts: AccountList::default(),
            selected_account: None,
            emails: Vec::new(),
            selected_email: None,
            is_searching: false,
            search_query: String::new(),
            notifications: Vec::new(),
            fetch: JobTracker::new(JobKind::Fetch),
            search: JobTracker::new(JobKind::Search),
            pollers: HashMap::new(),
            reset_timers: HashMap::new(),
            reset_generations: HashMap::new(),
            notification_ticker: None,
        }
    }

    pub fn api(&self) -> &Arc<dyn MailApi> {
        &self.api
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn accounts(&self) -> &AccountList {
        &self.accounts
    }

    pub fn selected_account(&self) -> Option<&str> {
        self.selected_account.as_deref()
    }

    pub fn emails(&self) -> &[Email] {
        &self.emails
    }

    pub fn selected_email(&self) -> Option<&Email> {
        self.selected_email.as_ref()
    }

    pub fn is_searching(&self) -> bool {
        self.is_searching
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn notification_badge(&self) -> usize {
        error_badge_count(&self.notifications)
    }

    pub fn job(&self, kind: JobKind) -> &JobTracker {
        match kind {
            JobKind::Fetch => &self.fetch,
            JobKind::Search => &self.search,
        }
    }

    fn job_mut(&mut self, kind: JobKind) -> &mut JobTracker {
        match kind {
            JobKind::Fetch => &mut self.fetch,
            JobKind::Search => &mut self.search,
        }
    }

    #[cfg(test)]
    pub fn fetch_progress(&self) -> &JobProgress {
        self.fetch.progress()
    }

    #[cfg(test)]
    pub fn search_progress(&self) -> &JobProgress {
        self.search.progress()
    }

    /// Progress shown in the progress bar. Fetch wins when both jobs are active.
    pub fn displayed_progress(&self) -> Option<&JobProgress> {
        if self.fetch.is_active() {
            Some(self.fetch.progress())
        } else if self.search.is_active() {
            Some(self.search.progress())
        } else {
            None
        }
    }

    /// Message of a failed job, shown until the job resets to idle.
    pub fn error_banner(&self) -> Option<&str> {
        [&self.fetch, &self.search]
            .into_iter()
            .find(|job| job.status() == JobStatus::Error)
            .map(|job| job.progress().message.as_str())
    }

    #[cfg(test)]
    pub fn is_polling(&self, kind: JobKind) -> bool {
        self.pollers
            .get(&kind)
            .is_some_and(|poller| !poller.is_finished())
    }

    /// Initial load: accounts (selecting the first one), jobs already running on
    /// the backend, and notifications when enabled.
    pub async fn load(&mut self) {
        self.refresh_accounts(true).await;
        self.resume_job(JobKind::Fetch).await;
        self.resume_job(JobKind::Search).await;

        if self.options.notifications {
            self.refresh_notifications().await;
            self.notification_ticker = Some(spawn_ticker(
                self.settings.notification_interval,
                self.events_tx.clone(),
            ));
        }
    }

    async fn resume_job(&mut self, kind: JobKind) {
        let result = match kind {
            JobKind::Fetch => self.api.fetch_progress().await,
            JobKind::Search => self.api.search_progress().await,
        };
        match result {
            Ok(progress) => {
                if self.job_mut(kind).resume(progress) {
                    info!("Resuming {kind} job already running on the backend");
                    self.spawn_poller(kind);
                }
            }
            Err(e) => warn!("Failed to check {kind} progress: {e}"),
        }
    }

    /// Reload the account list. With `select_first`, pick the first account
    /// when nothing is selected and load its emails.
    pub async fn refresh_accounts(&mut self, select_first: bool) {
        match self.api.list_accounts().await {
            Ok(accounts) => {
                self.accounts = accounts;
                if select_first && self.selected_account.is_none() && !self.is_searching {
                    let first = self.accounts.users().next().map(str::to_string);
                    if let Some(first) = first {
                        self.select_account(&first).await;
                    }
                }
            }
            Err(e) => error!("Failed to load account list: {e}"),
        }
    }

    pub async fn select_account(&mut self, account: &str) {
        self.selected_account = Some(account.to_string());
        self.load_account_emails(account).await;
    }

    pub async fn load_account_emails(&mut self, account: &str) {
        match self.api.list_account_emails(account).await {
            Ok(emails) => {
                self.emails = emails;
                self.is_searching = false;
            }
            Err(e) => error!("Failed to load emails for {account}: {e}"),
        }
    }

    /// Leave the account and search views and list every stored email.
    pub async fn load_all_emails(&mut self) {
        match self.api.list_all_emails().await {
            Ok(emails) => {
                self.emails = emails;
                self.selected_account = None;
                self.is_searching = false;
            }
            Err(e) => error!("Failed to load all emails: {e}"),
        }
    }

    pub async fn open_email(&mut self, id: &str) -> bool {
        match self.api.get_email(id).await {
            Ok(email) => {
                self.selected_email = Some(email);
                true
            }
            Err(e) => {
                error!("Failed to load email {id}: {e}");
                false
            }
        }
    }

    pub fn close_email(&mut self) {
        self.selected_email = None;
    }

    /// Start a fetch job. Returns `true` if the backend accepted it.
    ///
    /// Does nothing while a fetch job is already active.
    pub async fn start_fetch(&mut self, target: FetchTarget) -> bool {
        let (message, failure) = match &target {
            FetchTarget::Account(account) => (
                format!("Fetching emails for {account}..."),
                "Failed to fetch emails",
            ),
            FetchTarget::All => (
                "Fetching all emails...".to_string(),
                "Failed to fetch all emails",
            ),
        };

        if !self.fetch.begin(&message) {
            info!(
                "Fetch job already running; ignoring request for {}",
                target.describe()
            );
            return false;
        }
        self.cancel_reset(JobKind::Fetch);

        match self.api.start_fetch(&target).await {
            Ok(()) => {
                self.spawn_poller(JobKind::Fetch);
                true
            }
            Err(e) => {
                error!("Failed to start fetch for {}: {e}", target.describe());
                self.fail_job(JobKind::Fetch, failure);
                false
            }
        }
    }

    /// Fetch the selected account; `false` when no account is selected.
    pub async fn fetch_current_account(&mut self) -> bool {
        match self.selected_account.clone() {
            Some(account) => self.start_fetch(FetchTarget::Account(account)).await,
            None => false,
        }
    }

    /// Start a search job. Blank queries and searches while one is active are ignored.
    pub async fn start_search(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        if !self.search.begin("Searching emails...") {
            info!("Search already running; ignoring '{query}'");
            return false;
        }
        self.cancel_reset(JobKind::Search);
        self.search_query = query.to_string();
        self.is_searching = true;
        self.selected_account = None;

        match self.api.start_search(query).await {
            Ok(()) => {
                self.spawn_poller(JobKind::Search);
                true
            }
            Err(e) => {
                error!("Failed to start search for '{query}': {e}");
                self.fail_job(JobKind::Search, "Failed to search emails");
                false
            }
        }
    }

    pub async fn refresh_notifications(&mut self) {
        match self.api.list_notifications().await {
            Ok(notifications) => self.notifications = notifications,
            Err(e) => error!("Failed to load notifications: {e}"),
        }
    }

    /// Clear notifications on the backend, then locally. On failure the list is kept.
    pub async fn clear_notifications(&mut self) -> bool {
        match self.api.clear_notifications().await {
            Ok(()) => {
                self.notifications.clear();
                true
            }
            Err(e) => {
                error!("Failed to clear notifications: {e}");
                false
            }
        }
    }

    /// Wait for the next event and apply it.
    pub async fn step(&mut self) {
        // The session holds a sender, so the channel never closes.
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Apply every event that is already queued. Returns how many were applied.
    pub async fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
            applied += 1;
        }
        applied
    }

    /// Drive the session until the job leaves the active state.
    #[cfg(test)]
    pub async fn wait_for_job(&mut self, kind: JobKind) -> &JobProgress {
        while self.job(kind).is_active() {
            self.step().await;
        }
        self.job(kind).progress()
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Progress { kind, progress } => {
                let transition = self.job_mut(kind).apply(progress);
                self.on_transition(kind, transition).await;
            }
            SessionEvent::PollBudgetExhausted { kind, polls } => {
                if self.job(kind).is_active() {
                    let message = format!("No final {kind} status after {polls} progress checks");
                    self.fail_job(kind, &message);
                    self.pollers.remove(&kind);
                }
            }
            SessionEvent::ErrorResetDue { kind, generation } => {
                if self.reset_generations.get(&kind) != Some(&generation) {
                    debug!("Ignoring stale {kind} reset");
                    return;
                }
                self.reset_timers.remove(&kind);
                if self.job_mut(kind).reset() {
                    info!("{kind} job reset to idle");
                }
            }
            SessionEvent::NotificationsDue => {
                if self.options.notifications {
                    self.refresh_notifications().await;
                }
            }
        }
    }

    async fn on_transition(&mut self, kind: JobKind, transition: Transition) {
        match transition {
            Transition::Progressed | Transition::Ignored => {}
            Transition::Completed => {
                self.pollers.remove(&kind);
                info!("{kind} job completed");
                match kind {
                    JobKind::Fetch => self.after_fetch_completed().await,
                    JobKind::Search => self.after_search_completed().await,
                }
            }
            Transition::Failed => {
                self.pollers.remove(&kind);
                if self.job(kind).progress().message.trim().is_empty() {
                    let message = format!("The {kind} job failed");
                    self.job_mut(kind).fail(&message);
                }
                warn!("{kind} job failed: {}", self.job(kind).progress().message);
                self.schedule_reset(kind);
            }
            Transition::Stopped => {
                self.pollers.remove(&kind);
                info!(
                    "{kind} job left the active state with status {}",
                    self.job(kind).status()
                );
            }
        }
    }

    async fn after_fetch_completed(&mut self) {
        let api = Arc::clone(&self.api);
        let emails = async {
            match &self.selected_account {
                Some(account) => api.list_account_emails(account).await,
                None => api.list_all_emails().await,
            }
        };
        let (emails, accounts) = futures::join!(emails, api.list_accounts());

        match emails {
            Ok(emails) => {
                if self.selected_account.is_some() {
                    self.is_searching = false;
                }
                self.emails = emails;
            }
            Err(e) => error!("Failed to reload emails after fetch: {e}"),
        }
        match accounts {
            Ok(accounts) => self.accounts = accounts,
            Err(e) => error!("Failed to reload accounts after fetch: {e}"),
        }

        if self.options.notifications {
            self.refresh_notifications().await;
        }
    }

    async fn after_search_completed(&mut self) {
        match self.api.search_results(&self.search_query).await {
            Ok(results) => self.emails = results,
            Err(e) => error!("Failed to load search results: {e}"),
        }
    }

    fn fail_job(&mut self, kind: JobKind, message: &str) {
        self.job_mut(kind).fail(message);
        self.schedule_reset(kind);
    }

    fn spawn_poller(&mut self, kind: JobKind) {
        let poller = spawn_job_poller(
            Arc::clone(&self.api),
            kind,
            self.settings,
            self.events_tx.clone(),
        );
        // Replacing an old handle aborts its task.
        self.pollers.insert(kind, poller);
    }

    fn next_generation(&mut self, kind: JobKind) -> u64 {
        let generation = self.reset_generations.entry(kind).or_default();
        *generation += 1;
        *generation
    }

    /// Drop a pending reset. A reset already queued in the channel is
    /// invalidated by the new generation.
    fn cancel_reset(&mut self, kind: JobKind) {
        self.reset_timers.remove(&kind);
        self.next_generation(kind);
    }

    fn schedule_reset(&mut self, kind: JobKind) {
        let generation = self.next_generation(kind);
        let timer = spawn_timer(
            self.settings.error_reset,
            SessionEvent::ErrorResetDue { kind, generation },
            self.events_tx.clone(),
        );
        self.reset_timers.insert(kind, timer);
    }
}
