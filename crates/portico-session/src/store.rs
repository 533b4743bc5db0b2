//! Process-wide view of the signed-in session
//!
//! [`SessionStore::new`] hands out a read side ([`SessionStore`], cheap to
//! clone, for the rest of the application) and a single write side
//! ([`SessionWriter`], owned by the session controller).

use std::fmt;
use std::sync::Arc;

use portico_core::{ClaimSet, Identity};
use tokio::sync::watch;

/// Where the session lifecycle currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Unauthenticated,
    ProcessingCallback,
    Authenticated,
    Unauthorized,
    Renewing,
}

impl Phase {
    pub fn is_signed_in(self) -> bool {
        matches!(self, Phase::Authenticated | Phase::Renewing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Unauthenticated => "unauthenticated",
            Phase::ProcessingCallback => "processing-callback",
            Phase::Authenticated => "authenticated",
            Phase::Unauthorized => "unauthorized",
            Phase::Renewing => "renewing",
        })
    }
}

/// The signed-in user, if any, and what to tell them
///
/// `derived_id` is set if and only if `user` is. The only way to get a
/// session with a user is [`Session::signed_in`], which checks the claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<Arc<Identity>>,
    status: Option<String>,
    derived_id: Option<String>,
}

impl Session {
    pub fn signed_out(status: Option<String>) -> Self {
        Self {
            user: None,
            status,
            derived_id: None,
        }
    }

    /// Build a signed-in session, or `None` if `claims` do not authorize it
    pub fn signed_in(user: Arc<Identity>, claims: &ClaimSet) -> Option<Self> {
        if !claims.is_authorized() {
            return None;
        }
        Some(Self {
            user: Some(user),
            status: None,
            derived_id: Some(claims.subject.clone()),
        })
    }

    pub fn user(&self) -> Option<&Arc<Identity>> {
        self.user.as_ref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn derived_id(&self) -> Option<&str> {
        self.derived_id.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub session: Session,
    /// Bumped on every write
    pub revision: u64,
}

/// Read-only handle to the current session
#[derive(Debug, Clone)]
pub struct SessionStore {
    rx: watch::Receiver<SessionSnapshot>,
}

impl SessionStore {
    pub fn new() -> (SessionStore, SessionWriter) {
        let (tx, rx) = watch::channel(SessionSnapshot::default());
        (SessionStore { rx }, SessionWriter { tx })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.rx.borrow().clone()
    }

    pub fn session(&self) -> Session {
        self.rx.borrow().session.clone()
    }

    pub fn phase(&self) -> Phase {
        self.rx.borrow().phase
    }

    pub fn revision(&self) -> u64 {
        self.rx.borrow().revision
    }

    /// Get notified about every write
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.rx.clone()
    }

    /// Wait until the session satisfies `f`, returning the matching snapshot
    ///
    /// Returns `None` if the writer is gone before that happens.
    pub async fn wait_for(
        &self,
        mut f: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        let mut rx = self.rx.clone();
        rx.wait_for(|snapshot| f(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}

/// The single write side of a [`SessionStore`]
#[derive(Debug)]
pub struct SessionWriter {
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionWriter {
    /// Replace the published session in full
    pub(crate) fn publish(&self, phase: Phase, session: Session) {
        self.tx.send_modify(|snapshot| {
            snapshot.phase = phase;
            snapshot.session = session;
            snapshot.revision += 1;
        });
    }
}
