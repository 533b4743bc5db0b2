//! Session lifecycle transitions
//!
//! [`SessionMachine::handle`] consumes one [`Message`] and returns the
//! [`Effect`]s to execute, in order. It performs no I/O; executing effects
//! and feeding their outcomes back as messages is the job of
//! [`crate::SessionController`].
//!
//! Every asynchronous effect carries the [`Epoch`] it was issued in. Logout
//! starts a new epoch, so outcomes of work started before it are dropped.

use std::sync::Arc;
use std::time::Duration;

use portico_core::{IdToken, Identity};
use tracing::{debug, info, warn};
use url::Url;

use crate::LOG_TARGET;
use crate::redirect;
use crate::store::{Phase, Session};

pub const STATUS_NOT_AUTHORISED: &str = "account not authorised";
pub const STATUS_SIGN_IN_FAILED: &str = "sign-in could not be completed";
pub const STATUS_SESSION_EXPIRED: &str = "session expired";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long an unauthorized account sees the status before the signout
    /// redirect starts
    pub signout_delay: Duration,
    /// Where a fresh sign-in lands
    pub landing_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signout_delay: Duration::from_secs(3),
            landing_path: "/".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PageLoaded { url: Url },
    CallbackCompleted { epoch: Epoch, identity: Identity },
    CallbackFailed { epoch: Epoch },
    UserResolved { epoch: Epoch, identity: Option<Identity> },
    UserLoaded(Identity),
    TokenExpiring,
    TokenExpired,
    RenewalSucceeded { epoch: Epoch, identity: Identity },
    RenewalFailed { epoch: Epoch },
    SignoutDue { epoch: Epoch, ticket: u64 },
    Logout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the provider to finish the redirect callback
    CompleteCallback { epoch: Epoch },
    /// Ask the provider for the user it currently holds
    ResolveCurrentUser { epoch: Epoch },
    PersistToken(IdToken),
    /// Remove both the identity token and the backend token records
    ClearPersisted,
    Publish { phase: Phase, session: Session },
    /// Best-effort, skipped if a backend token is already cached
    ExchangeBackendSession { epoch: Epoch, derived_id: String },
    NavigateToLanding { location: String },
    /// Replace the location with `location`, without a history entry
    StripCallbackQuery { location: String },
    /// `ticket` identifies this particular timer within the epoch
    ScheduleSignout {
        epoch: Epoch,
        ticket: u64,
        delay: Duration,
    },
    RenewSilently { epoch: Epoch },
    BeginLogout,
}

#[derive(Debug)]
struct PendingCallback {
    location: String,
}

#[derive(Debug)]
struct Renewal {
    /// A `tokenExpired` arrived while the renewal was in flight
    expired: bool,
}

#[derive(Debug, Default)]
pub struct SessionMachine {
    config: SessionConfig,
    phase: Phase,
    session: Session,
    epoch: Epoch,
    /// Token of the last identity that went through claim validation
    current_token: Option<IdToken>,
    callback: Option<PendingCallback>,
    /// Most recent identity that arrived while the callback was in flight
    held_back: Option<Arc<Identity>>,
    renewal: Option<Renewal>,
    /// Ticket of the signout timer that is still allowed to fire
    pending_signout: Option<u64>,
    last_signout_ticket: u64,
}

impl SessionMachine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_processing_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn is_renewing(&self) -> bool {
        self.renewal.is_some()
    }

    pub fn handle(&mut self, msg: Message) -> Vec<Effect> {
        match msg {
            Message::PageLoaded { url } => self.on_page_loaded(&url),
            Message::CallbackCompleted { epoch, identity } => {
                if self.is_stale(epoch, "callback") {
                    return vec![];
                }
                self.on_callback_settled(Some(identity))
            }
            Message::CallbackFailed { epoch } => {
                if self.is_stale(epoch, "callback") {
                    return vec![];
                }
                self.on_callback_settled(None)
            }
            Message::UserResolved { epoch, identity } => {
                if self.is_stale(epoch, "current user") {
                    return vec![];
                }
                match identity {
                    Some(identity) => self.on_identity(Arc::new(identity)),
                    None => self.on_no_current_user(),
                }
            }
            Message::UserLoaded(identity) => self.on_identity(Arc::new(identity)),
            Message::TokenExpiring => self.on_token_expiry(false),
            Message::TokenExpired => self.on_token_expiry(true),
            Message::RenewalSucceeded { epoch, identity } => {
                if self.is_stale(epoch, "renewal") || self.renewal.take().is_none() {
                    return vec![];
                }
                let restored = self.leave_renewing();
                let mut effects = self.on_identity(Arc::new(identity));
                if restored {
                    self.ensure_published(&mut effects);
                }
                effects
            }
            Message::RenewalFailed { epoch } => {
                if self.is_stale(epoch, "renewal") {
                    return vec![];
                }
                let Some(renewal) = self.renewal.take() else {
                    return vec![];
                };
                if renewal.expired {
                    info!(target: LOG_TARGET, "Token expired and could not be renewed, signing out");
                    return self.logout(Some(STATUS_SESSION_EXPIRED.to_owned()));
                }
                debug!(target: LOG_TARGET, "Opportunistic renewal failed, keeping the session");
                let mut effects = vec![];
                if self.leave_renewing() {
                    self.ensure_published(&mut effects);
                }
                effects
            }
            Message::SignoutDue { epoch, ticket } => {
                if self.is_stale(epoch, "signout") {
                    return vec![];
                }
                if self.pending_signout != Some(ticket) {
                    debug!(target: LOG_TARGET, ticket, "Signout timer was superseded");
                    return vec![];
                }
                self.pending_signout = None;
                if self.phase != Phase::Unauthorized {
                    debug!(target: LOG_TARGET, phase = %self.phase, "Scheduled signout no longer applies");
                    return vec![];
                }
                vec![Effect::BeginLogout]
            }
            Message::Logout => self.logout(None),
        }
    }

    fn is_stale(&self, epoch: Epoch, what: &'static str) -> bool {
        let stale = epoch != self.epoch;
        if stale {
            debug!(
                target: LOG_TARGET,
                what,
                ?epoch,
                current = ?self.epoch,
                "Discarding result from a previous session"
            );
        }
        stale
    }

    fn on_page_loaded(&mut self, url: &Url) -> Vec<Effect> {
        if !redirect::is_redirect_callback(url) {
            return vec![Effect::ResolveCurrentUser { epoch: self.epoch }];
        }

        if self.callback.is_some() {
            debug!(target: LOG_TARGET, "Redirect callback already in flight, ignoring");
            return vec![];
        }

        let location = redirect::location_without_query(url);
        if self.phase != Phase::Unauthenticated {
            // Only a signed-out session can complete a sign-in; the params
            // belong to something else
            debug!(target: LOG_TARGET, phase = %self.phase, "Not expecting a redirect callback, dropping its params");
            return vec![
                Effect::StripCallbackQuery { location },
                Effect::ResolveCurrentUser { epoch: self.epoch },
            ];
        }

        self.callback = Some(PendingCallback { location });
        self.phase = Phase::ProcessingCallback;
        vec![
            self.publish(),
            Effect::CompleteCallback { epoch: self.epoch },
        ]
    }

    fn on_callback_settled(&mut self, identity: Option<Identity>) -> Vec<Effect> {
        let Some(callback) = self.callback.take() else {
            return vec![];
        };
        self.phase = Phase::Unauthenticated;

        let mut effects = match identity.filter(Identity::has_usable_token) {
            Some(identity) => self.validate(Arc::new(identity)),
            None => {
                warn!(target: LOG_TARGET, "Redirect callback did not yield a usable identity");
                self.session = Session::signed_out(Some(STATUS_SIGN_IN_FAILED.to_owned()));
                vec![self.publish()]
            }
        };
        self.ensure_published(&mut effects);
        effects.push(Effect::StripCallbackQuery {
            location: callback.location,
        });

        match self.held_back.take() {
            Some(identity) => {
                debug!(target: LOG_TARGET, "Replaying identity held back during callback");
                effects.extend(self.on_identity(identity));
            }
            None if !self.session.is_signed_in() && self.phase != Phase::Unauthorized => {
                effects.push(Effect::ResolveCurrentUser { epoch: self.epoch });
            }
            None => {}
        }
        effects
    }

    fn on_identity(&mut self, identity: Arc<Identity>) -> Vec<Effect> {
        if self.callback.is_some() {
            debug!(target: LOG_TARGET, token = %identity.id_token(), "Holding back identity until the callback settles");
            self.held_back = Some(identity);
            return vec![];
        }
        if !identity.has_usable_token() {
            debug!(target: LOG_TARGET, "Ignoring identity without a token");
            return vec![];
        }
        self.validate(identity)
    }

    fn on_no_current_user(&mut self) -> Vec<Effect> {
        if self.callback.is_some()
            || self.session.is_signed_in()
            || self.phase == Phase::Unauthorized
        {
            return vec![];
        }
        debug!(target: LOG_TARGET, "No current user");
        vec![Effect::ClearPersisted]
    }

    /// Claim validation
    fn validate(&mut self, identity: Arc<Identity>) -> Vec<Effect> {
        if self
            .current_token
            .as_ref()
            .is_some_and(|current| identity.is_same_token(current))
        {
            debug!(target: LOG_TARGET, token = %identity.id_token(), "Identity unchanged");
            return vec![];
        }
        let token = identity.id_token().clone();
        self.current_token = Some(token.clone());

        let claims = token.claims();
        let was_signed_in = self.session.is_signed_in();

        match Session::signed_in(identity, &claims) {
            Some(session) => {
                info!(
                    target: LOG_TARGET,
                    %token,
                    derived_id = %claims.subject,
                    fresh = !was_signed_in,
                    "Signed in"
                );
                self.phase = Phase::Authenticated;
                self.session = session;
                if self.pending_signout.take().is_some() {
                    debug!(target: LOG_TARGET, "Dropping scheduled signout");
                }

                let mut effects = vec![
                    Effect::PersistToken(token),
                    self.publish(),
                    Effect::ExchangeBackendSession {
                        epoch: self.epoch,
                        derived_id: claims.subject,
                    },
                ];
                if !was_signed_in {
                    effects.push(Effect::NavigateToLanding {
                        location: self.config.landing_path.clone(),
                    });
                }
                effects
            }
            None => {
                warn!(
                    target: LOG_TARGET,
                    %token,
                    has_nickname = !claims.nickname_slug.is_empty(),
                    has_sponsor = !claims.sponsor_id.is_empty(),
                    "Identity claims do not authorize this account"
                );
                self.phase = Phase::Unauthorized;
                self.session = Session::signed_out(Some(STATUS_NOT_AUTHORISED.to_owned()));
                self.renewal = None;

                let mut effects = vec![Effect::ClearPersisted, self.publish()];
                if self.pending_signout.is_none() {
                    self.last_signout_ticket += 1;
                    self.pending_signout = Some(self.last_signout_ticket);
                    effects.push(Effect::ScheduleSignout {
                        epoch: self.epoch,
                        ticket: self.last_signout_ticket,
                        delay: self.config.signout_delay,
                    });
                }
                effects
            }
        }
    }

    fn on_token_expiry(&mut self, expired: bool) -> Vec<Effect> {
        if let Some(renewal) = self.renewal.as_mut() {
            if expired {
                debug!(target: LOG_TARGET, "Token expired while renewal is in flight");
                renewal.expired = true;
            }
            return vec![];
        }
        if !self.phase.is_signed_in() {
            debug!(target: LOG_TARGET, phase = %self.phase, expired, "Ignoring token expiry");
            return vec![];
        }

        debug!(target: LOG_TARGET, expired, "Starting silent renewal");
        self.renewal = Some(Renewal { expired });
        self.phase = Phase::Renewing;
        vec![
            self.publish(),
            Effect::RenewSilently { epoch: self.epoch },
        ]
    }

    /// Returns `true` if the phase changed
    fn leave_renewing(&mut self) -> bool {
        if self.phase != Phase::Renewing {
            return false;
        }
        self.phase = Phase::Authenticated;
        true
    }

    fn logout(&mut self, status: Option<String>) -> Vec<Effect> {
        self.epoch = self.epoch.next();
        self.phase = Phase::Unauthenticated;
        self.session = Session::signed_out(status);
        self.current_token = None;
        self.callback = None;
        self.held_back = None;
        self.renewal = None;
        self.pending_signout = None;

        vec![Effect::ClearPersisted, self.publish(), Effect::BeginLogout]
    }

    fn publish(&self) -> Effect {
        Effect::Publish {
            phase: self.phase,
            session: self.session.clone(),
        }
    }

    fn ensure_published(&self, effects: &mut Vec<Effect>) {
        if !effects.iter().any(|e| matches!(e, Effect::Publish { .. })) {
            effects.push(self.publish());
        }
    }
}
