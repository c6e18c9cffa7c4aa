//! Background tasks that observe backend jobs.
//!
//! Tasks never touch session state. They report through a bounded channel and
//! the session applies events one at a time.

use crate::core::api::MailApi;
use crate::core::config::PollingConfig;
use crate::core::progress::{JobKind, JobProgress};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Progress { kind: JobKind, progress: JobProgress },
    PollBudgetExhausted { kind: JobKind, polls: u32 },
    /// `generation` identifies the failure that scheduled the reset.
    ErrorResetDue { kind: JobKind, generation: u64 },
    NotificationsDue,
}

pub type EventSender = mpsc::Sender<SessionEvent>;
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(100)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub error_reset: Duration,
    pub max_polls: u32,
    pub notification_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            error_reset: Duration::from_millis(config.error_reset_ms),
            max_polls: config.max_polls.max(1),
            notification_interval: Duration::from_millis(config.notification_interval_ms.max(1)),
        }
    }
}

/// Owns a spawned task and aborts it when dropped.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll the job's progress endpoint once per interval until it leaves the
/// active state, the poll budget runs out, or the receiver goes away.
///
/// The first request goes out one interval after the call. Requests are
/// sequential: a tick that comes due while a request is in flight waits for it.
pub fn spawn_job_poller(
    api: Arc<dyn MailApi>,
    kind: JobKind,
    settings: PollSettings,
    events: EventSender,
) -> TaskHandle {
    let handle = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u32 = 0;

        loop {
            ticker.tick().await;

            if polls >= settings.max_polls {
                warn!("{kind} job still active after {polls} polls; giving up");
                let _ = events
                    .send(SessionEvent::PollBudgetExhausted { kind, polls })
                    .await;
                break;
            }
            polls += 1;

            let result = match kind {
                JobKind::Fetch => api.fetch_progress().await,
                JobKind::Search => api.search_progress().await,
            };

            match result {
                Ok(progress) => {
                    let still_active = progress.status == kind.active_status();
                    if events
                        .send(SessionEvent::Progress { kind, progress })
                        .await
                        .is_err()
                    {
                        break;
                    }
                    if !still_active {
                        break;
                    }
                }
                // Displayed progress stays as it was.
                Err(e) => warn!("Failed to poll {kind} progress: {e}"),
            }
        }

        debug!("{kind} poller stopped after {polls} polls");
    });

    TaskHandle { handle }
}

/// Deliver `event` once after `delay`.
pub fn spawn_timer(delay: Duration, event: SessionEvent, events: EventSender) -> TaskHandle {
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = events.send(event).await;
    });
    TaskHandle { handle }
}

/// Deliver [`SessionEvent::NotificationsDue`] every `interval`, first one after `interval`.
pub fn spawn_ticker(interval: Duration, events: EventSender) -> TaskHandle {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if events.send(SessionEvent::NotificationsDue).await.is_err() {
                break;
            }
        }
    });
    TaskHandle { handle }
}
