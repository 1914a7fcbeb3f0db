//! Per-user dialogue state.
//!
//! A user with no entry in the store is `Idle`. An entry is either waiting
//! for the user to pick a conversion (holding the pending upload) or marks a
//! job in flight. Every transition is a single critical section on the
//! store's mutex, which is what makes "at most one job per user" hold even
//! when two button presses from the same user are handled concurrently.
//!
//! Time comes from [`tokio::time::Instant`] so tests can pause and advance
//! the clock instead of sleeping.

use crate::transport::{UploadDescriptor, UserId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Observable state of one user's dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    Idle,
    AwaitingChoice,
    Processing,
}

#[derive(Debug, Clone)]
struct Session {
    pending: UploadDescriptor,
    processing: bool,
    created_at: Instant,
    last_activity: Instant,
}

impl Session {
    fn state(&self) -> DialogueState {
        if self.processing {
            DialogueState::Processing
        } else {
            DialogueState::AwaitingChoice
        }
    }

    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        !self.processing && now.duration_since(self.created_at) > ttl
    }
}

/// Result of storing a new upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// Stored; any previous pending upload was replaced.
    Stored { replaced: bool },
    /// A job is running for this user; the upload was not stored.
    Busy,
}

/// Result of trying to start a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The user is now `Processing` the returned upload.
    Started(UploadDescriptor),
    /// Nothing pending (never uploaded, cancelled, or expired).
    NoPending,
    /// A job is already running for this user.
    Busy,
}

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancel {
    /// The pending upload was discarded.
    Discarded(UploadDescriptor),
    /// Nothing was pending.
    NothingPending,
    /// A job is running and cannot be cancelled.
    Busy,
}

/// In-memory session store keyed by user id.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    /// Create an empty store whose pending uploads expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Current state for `user`, expiring a stale pending upload first.
    pub async fn state(&self, user: UserId) -> DialogueState {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&user) {
            Some(s) if s.expired(now, self.ttl) => {
                sessions.remove(&user);
                debug!(user = %user, "Session expired");
                DialogueState::Idle
            }
            Some(s) => s.state(),
            None => DialogueState::Idle,
        }
    }

    /// The pending upload for `user`, if one is waiting for a choice.
    #[cfg(test)]
    pub(crate) async fn pending(&self, user: UserId) -> Option<UploadDescriptor> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&user) {
            Some(s) if s.expired(now, self.ttl) => {
                sessions.remove(&user);
                None
            }
            Some(s) if !s.processing => {
                s.last_activity = now;
                Some(s.pending.clone())
            }
            _ => None,
        }
    }

    /// Store `upload` as the user's pending file (`Idle`/`AwaitingChoice` →
    /// `AwaitingChoice`). A running job blocks the new upload.
    pub async fn offer(&self, user: UserId, upload: UploadDescriptor) -> Offer {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&user) {
            if existing.processing {
                return Offer::Busy;
            }
        }
        let replaced = sessions
            .insert(
                user,
                Session {
                    pending: upload,
                    processing: false,
                    created_at: now,
                    last_activity: now,
                },
            )
            .is_some();
        Offer::Stored { replaced }
    }

    /// Atomically move `AwaitingChoice` → `Processing`.
    pub async fn begin_job(&self, user: UserId) -> Claim {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&user) {
            None => Claim::NoPending,
            Some(s) if s.processing => Claim::Busy,
            Some(s) if s.expired(now, self.ttl) => {
                sessions.remove(&user);
                Claim::NoPending
            }
            Some(s) => {
                s.processing = true;
                s.last_activity = now;
                Claim::Started(s.pending.clone())
            }
        }
    }

    /// Put a claimed job back to `AwaitingChoice` without running it (the
    /// choice was refused before any work started).
    pub async fn release_job(&self, user: UserId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(s) = sessions.get_mut(&user) {
            s.processing = false;
            s.last_activity = Instant::now();
        }
    }

    /// End a job (any outcome): the session is destroyed and the user is
    /// `Idle` again.
    pub async fn finish_job(&self, user: UserId) {
        self.sessions.lock().await.remove(&user);
    }

    /// Discard the pending upload (`AwaitingChoice` → `Idle`).
    pub async fn cancel(&self, user: UserId) -> Cancel {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&user) {
            None => Cancel::NothingPending,
            Some(s) if s.processing => Cancel::Busy,
            Some(_) => match sessions.remove(&user) {
                Some(s) => Cancel::Discarded(s.pending),
                None => Cancel::NothingPending,
            },
        }
    }

    /// Drop every expired pending upload. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|user, s| {
            let keep = !s.expired(now, self.ttl);
            if !keep {
                info!(
                    user = %user,
                    idle_secs = now.duration_since(s.last_activity).as_secs(),
                    "Removed expired session"
                );
            }
            keep
        });
        before - sessions.len()
    }

    /// Number of live sessions (expired ones included until purged).
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    fn upload(id: &str) -> UploadDescriptor {
        UploadDescriptor {
            file_id: id.to_string(),
            file_name: format!("{id}.pdf"),
            file_size: 1024,
            mime_type: Some("application/pdf".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upload_then_choice_then_finish() {
        let store = SessionStore::new(TTL);
        let user = UserId(1);
        assert_eq!(store.state(user).await, DialogueState::Idle);

        assert_eq!(
            store.offer(user, upload("a")).await,
            Offer::Stored { replaced: false }
        );
        assert_eq!(store.state(user).await, DialogueState::AwaitingChoice);

        assert_eq!(store.begin_job(user).await, Claim::Started(upload("a")));
        assert_eq!(store.state(user).await, DialogueState::Processing);

        store.finish_job(user).await;
        assert_eq!(store.state(user).await, DialogueState::Idle);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn second_claim_is_busy() {
        let store = SessionStore::new(TTL);
        let user = UserId(7);
        store.offer(user, upload("a")).await;
        assert!(matches!(store.begin_job(user).await, Claim::Started(_)));
        assert_eq!(store.begin_job(user).await, Claim::Busy);
        assert_eq!(store.offer(user, upload("b")).await, Offer::Busy);
        assert_eq!(store.cancel(user).await, Cancel::Busy);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_claims_start_exactly_one_job() {
        let store = std::sync::Arc::new(SessionStore::new(TTL));
        let user = UserId(3);
        store.offer(user, upload("a")).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.begin_job(user).await }));
        }
        let mut started = 0;
        for h in handles {
            if matches!(h.await.unwrap(), Claim::Started(_)) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_upload_replaces_pending() {
        let store = SessionStore::new(TTL);
        let user = UserId(2);
        store.offer(user, upload("a")).await;
        assert_eq!(
            store.offer(user, upload("b")).await,
            Offer::Stored { replaced: true }
        );
        assert_eq!(store.pending(user).await, Some(upload("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn release_returns_to_awaiting_choice() {
        let store = SessionStore::new(TTL);
        let user = UserId(4);
        store.offer(user, upload("a")).await;
        store.begin_job(user).await;
        store.release_job(user).await;
        assert_eq!(store.state(user).await, DialogueState::AwaitingChoice);
        assert_eq!(store.pending(user).await, Some(upload("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending() {
        let store = SessionStore::new(TTL);
        let user = UserId(5);
        assert_eq!(store.cancel(user).await, Cancel::NothingPending);
        store.offer(user, upload("a")).await;
        assert_eq!(store.cancel(user).await, Cancel::Discarded(upload("a")));
        assert_eq!(store.begin_job(user).await, Claim::NoPending);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_upload_expires_after_ttl() {
        let store = SessionStore::new(TTL);
        let user = UserId(6);
        store.offer(user, upload("a")).await;

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(store.state(user).await, DialogueState::AwaitingChoice);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.begin_job(user).await, Claim::NoPending);
        assert_eq!(store.state(user).await, DialogueState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_never_expires() {
        let store = SessionStore::new(TTL);
        let user = UserId(8);
        store.offer(user, upload("a")).await;
        store.begin_job(user).await;

        tokio::time::advance(TTL * 3).await;
        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.state(user).await, DialogueState::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_sessions() {
        let store = SessionStore::new(TTL);
        store.offer(UserId(1), upload("old")).await;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        store.offer(UserId(2), upload("new")).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.pending(UserId(2)).await, Some(upload("new")));
    }
}
