//! Status-transition detection and online-session accounting.
//!
//! One [`SessionTracker`] per monitored gamertag. Each successful poll feeds
//! the canonical snapshot through [`SessionTracker::observe`], which
//! reconciles it against the previous in-memory state and the on-disk
//! checkpoint, updates the session counters, and returns the transitions
//! that occurred. A failed poll never reaches `observe`, so tracker state
//! is untouched by transient errors.
//!
//! Status changes and title changes are evaluated as two independent
//! conditions per poll; the only cross-dependency is the fold guard that
//! prevents title time from being counted twice when a title stop and an
//! offline transition land in the same poll.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::store::{StatusRecord, StatusStore};
use crate::types::{
    PresenceSnapshot, PresenceStatus, SessionSummary, StatusChange, TransitionEvent,
};

pub struct SessionTracker {
    /// Offline gaps up to this long are bridged: the previous online
    /// session resumes instead of a fresh one starting.
    offline_interrupt_secs: i64,

    current_status: PresenceStatus,
    /// Comparison baseline for change detection; `None` until the first
    /// poll has bootstrapped the tracker.
    previous_status: Option<PresenceStatus>,
    status_since: DateTime<Utc>,

    /// `Some` exactly while the status is non-offline.
    online_session_started_at: Option<DateTime<Utc>>,
    /// Retained across an offline gap to support session resumption.
    previous_online_session_started_at: Option<DateTime<Utc>>,

    current_title: Option<String>,
    title_since: DateTime<Utc>,
    /// Accumulated foreground-title seconds in the current online session.
    /// Monotone within a session; reset only when a fresh session starts.
    session_play_secs: i64,
    /// Distinct titles started in the current online session.
    session_titles_count: u32,
}

impl SessionTracker {
    pub fn new(offline_interrupt_secs: i64) -> Self {
        SessionTracker {
            offline_interrupt_secs,
            current_status: PresenceStatus::Unknown,
            previous_status: None,
            status_since: DateTime::UNIX_EPOCH,
            online_session_started_at: None,
            previous_online_session_started_at: None,
            current_title: None,
            title_since: DateTime::UNIX_EPOCH,
            session_play_secs: 0,
            session_titles_count: 0,
        }
    }

    pub fn status(&self) -> PresenceStatus {
        self.current_status
    }

    pub fn status_since(&self) -> DateTime<Utc> {
        self.status_since
    }

    pub fn online_session_started_at(&self) -> Option<DateTime<Utc>> {
        self.online_session_started_at
    }

    pub fn session_play_secs(&self) -> i64 {
        self.session_play_secs
    }

    pub fn session_titles_count(&self) -> u32 {
        self.session_titles_count
    }

    /// Feeds one poll's snapshot through the tracker. Mutates the tracker
    /// and, on a status change, the persisted checkpoint. Checkpoint write
    /// failures are logged and swallowed; monitoring continues.
    pub fn observe(
        &mut self,
        snapshot: &PresenceSnapshot,
        now: DateTime<Utc>,
        store: &mut StatusStore,
    ) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        // Set when the offline handling below already folded the running
        // title's time into the session total this poll.
        let mut play_secs_folded = false;

        match self.previous_status {
            None => self.bootstrap(snapshot, now, store),
            Some(previous) if snapshot.status != previous => {
                let change = self.apply_status_change(previous, snapshot.status, now, store);
                play_secs_folded = change.went_offline() && self.current_title.is_some();
                events.push(TransitionEvent::StatusChanged(change));
            }
            Some(_) => {}
        }

        if snapshot.title != self.current_title {
            self.apply_title_change(snapshot, now, play_secs_folded, &mut events);
        }

        self.current_status = snapshot.status;
        self.previous_status = Some(snapshot.status);
        events
    }

    /// First-poll reconciliation against the persisted checkpoint.
    ///
    /// If the persisted status matches the live one, its timestamp is
    /// adopted as `status_since` so a restart does not report a spurious
    /// zero-duration status. When offline with a usable last-seen time, the
    /// more recent of last-seen and the persisted timestamp wins. The
    /// resolved record is persisted when none existed or the status moved
    /// while the monitor was down.
    fn bootstrap(&mut self, snapshot: &PresenceSnapshot, now: DateTime<Utc>, store: &mut StatusStore) {
        let persisted = store.record();

        let mut since = now;
        if let Some(record) = persisted {
            if record.status == snapshot.status {
                since = record.changed_at;
            }
        }
        if snapshot.status.is_offline() {
            let last_online = snapshot
                .last_online_at
                .filter(|ts| *ts > DateTime::UNIX_EPOCH);
            if let Some(last_online) = last_online {
                since = match persisted {
                    Some(record) => last_online.max(record.changed_at),
                    None => last_online,
                };
            }
        }

        self.status_since = since;
        if !snapshot.status.is_offline() {
            self.online_session_started_at = Some(since);
        }

        let needs_seed = persisted.map_or(true, |record| record.status != snapshot.status);
        if needs_seed {
            let record = StatusRecord {
                changed_at: since,
                status: snapshot.status,
            };
            if let Err(err) = store.save(record) {
                warn!(error = %err, "Failed to seed status checkpoint");
            }
        }
    }

    fn apply_status_change(
        &mut self,
        from: PresenceStatus,
        to: PresenceStatus,
        now: DateTime<Utc>,
        store: &mut StatusStore,
    ) -> StatusChange {
        let previous_status_since = self.status_since;
        let previous_status_secs = (now - self.status_since).num_seconds();
        let mut resumed = false;
        let mut session = None;

        if from.is_offline() && !to.is_offline() {
            // Entering an online session. A short enough offline gap with a
            // known prior session resumes it, counters intact.
            if previous_status_secs <= self.offline_interrupt_secs {
                if let Some(previous_start) = self.previous_online_session_started_at {
                    self.online_session_started_at = Some(previous_start);
                    resumed = true;
                }
            }
            if !resumed {
                self.online_session_started_at = Some(now);
                self.session_play_secs = 0;
                self.session_titles_count = 0;
            }
        } else if !from.is_offline() && to.is_offline() {
            // Leaving the online session. Fold the running title's time in
            // now; the title-change pass this same poll must not add it again.
            if self.current_title.is_some() {
                self.session_play_secs += (now - self.title_since).num_seconds();
            }
            if let Some(started_at) = self.online_session_started_at {
                session = Some(SessionSummary {
                    started_at,
                    duration_secs: (now - started_at).num_seconds(),
                    play_secs: self.session_play_secs,
                    titles_count: self.session_titles_count,
                });
            }
            self.previous_online_session_started_at = self.online_session_started_at;
            self.online_session_started_at = None;
        }

        let record = StatusRecord {
            changed_at: now,
            status: to,
        };
        if let Err(err) = store.save(record) {
            warn!(error = %err, "Failed to persist status checkpoint");
        }
        self.status_since = now;

        StatusChange {
            from,
            to,
            at: now,
            previous_status_since,
            previous_status_secs,
            session,
            resumed,
        }
    }

    fn apply_title_change(
        &mut self,
        snapshot: &PresenceSnapshot,
        now: DateTime<Utc>,
        play_secs_folded: bool,
        events: &mut Vec<TransitionEvent>,
    ) {
        let played_secs = (now - self.title_since).num_seconds();
        match (self.current_title.take(), snapshot.title.clone()) {
            (None, Some(new)) => {
                self.session_titles_count += 1;
                events.push(TransitionEvent::TitleStarted {
                    name: new.clone(),
                    at: now,
                });
                self.current_title = Some(new);
            }
            (Some(old), Some(new)) => {
                self.session_play_secs += played_secs;
                self.session_titles_count += 1;
                events.push(TransitionEvent::TitleChanged {
                    from: old,
                    to: new.clone(),
                    at: now,
                    played_secs,
                });
                self.current_title = Some(new);
            }
            (Some(old), None) => {
                if !play_secs_folded {
                    self.session_play_secs += played_secs;
                }
                events.push(TransitionEvent::TitleEnded {
                    name: old,
                    at: now,
                    played_secs,
                });
            }
            (None, None) => {}
        }
        self.title_since = now;
    }
}
