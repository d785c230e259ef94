//! Session list polling.
//!
//! The backend has no push channel for session changes, so the list is polled
//! on a fixed interval and published through a `watch` channel. A failed poll
//! keeps the previous list.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use wabulk_common::types::{Session, SessionState};

use crate::client::BackendClient;

/// Default session poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Periodically refreshes the session list.
pub struct SessionWatcher {
    client: Arc<BackendClient>,
    user_id: Option<String>,
    interval: Duration,
}

impl SessionWatcher {
    pub fn new(client: Arc<BackendClient>, user_id: Option<String>) -> Self {
        Self {
            client,
            user_id,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start polling in a background task.
    ///
    /// The receiver starts with an empty list and is updated after every
    /// successful poll. Polling stops when `cancel` fires.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (watch::Receiver<Vec<Session>>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    /// Poll until cancelled.
    pub async fn run(self, tx: watch::Sender<Vec<Session>>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Session watcher started"
        );

        // The first successful poll only seeds the list.
        let mut primed = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => break,
            }

            match self.client.list_sessions(self.user_id.as_deref()).await {
                Ok(sessions) => {
                    let fresh = {
                        let prev = tx.borrow();
                        newly_connected(primed.then_some(prev.as_slice()), &sessions)
                    };
                    for session in fresh {
                        tracing::info!(
                            session_id = %session.session_id,
                            phone = session.phone_number.as_deref().unwrap_or("-"),
                            "Session connected"
                        );
                    }
                    primed = true;
                    tx.send_replace(sessions);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to refresh sessions");
                }
            }
        }

        tracing::info!("Session watcher stopped");
    }
}

/// Sessions connected in `next` that were not connected in `prev`.
///
/// `prev` is `None` before the first poll; nothing counts as new then.
pub fn newly_connected<'a>(prev: Option<&[Session]>, next: &'a [Session]) -> Vec<&'a Session> {
    let Some(prev) = prev else {
        return Vec::new();
    };
    let before: HashSet<&str> = prev
        .iter()
        .filter(|s| s.state() == SessionState::Connected)
        .map(|s| s.session_id.as_str())
        .collect();

    next.iter()
        .filter(|s| s.state() == SessionState::Connected)
        .filter(|s| !before.contains(s.session_id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, phone: Option<&str>) -> Session {
        Session {
            session_id: id.to_string(),
            phone_number: phone.map(String::from),
            pushname: None,
            status: None,
        }
    }

    #[test]
    fn test_newly_connected_detects_transition() {
        let prev = vec![session("a", None), session("b", Some("917302667115"))];
        let next = vec![
            session("a", Some("919999999999")),
            session("b", Some("917302667115")),
        ];

        let fresh = newly_connected(Some(prev.as_slice()), &next);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].session_id, "a");
    }

    #[test]
    fn test_newly_connected_ignores_disconnected() {
        let next = vec![session("c", None)];
        assert!(newly_connected(Some(&[][..]), &next).is_empty());
    }

    #[test]
    fn test_newly_connected_new_session() {
        let next = vec![session("d", Some("911111111111"))];
        assert_eq!(newly_connected(Some(&[][..]), &next).len(), 1);
    }

    #[test]
    fn test_first_poll_announces_nothing() {
        let next = vec![
            session("a", Some("919999999999")),
            session("b", Some("917302667115")),
        ];
        assert!(newly_connected(None, &next).is_empty());
    }
}
