//! Effect-executing shell around [`SessionMachine`]
//!
//! The machine sits behind an async mutex. A transition, the store write it
//! produces, and the token storage writes it asks for all happen under that
//! lock, so they are applied in the order the transitions happened. Calls to
//! the identity provider and the backend run after the lock is released and
//! report back as new messages.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use portico_core::IdToken;
use portico_core::fmt::FmtCompact as _;
use snafu::ResultExt as _;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::LOG_TARGET;
use crate::error::{
    BackendExchangeSnafu, CallbackSnafu, ProviderRequestResult, RenewalSnafu, ResolveUserSnafu,
    SignInSnafu, SignOutSnafu,
};
use crate::machine::{Effect, Epoch, Message, SessionConfig, SessionMachine};
use crate::provider::{BackendExchange, IdentityProvider, Navigator, ProviderEvent};
use crate::storage::{MemoryTokenStorage, StorageKey, TokenStorage};
use crate::store::{SessionStore, SessionWriter};

/// Weak handle to [`SessionController`], for tasks that should not keep it
/// alive
#[derive(Debug, Clone)]
pub struct ControllerHandle(Weak<SessionController>);

impl ControllerHandle {
    pub fn upgrade(&self) -> Option<Arc<SessionController>> {
        self.0.upgrade()
    }
}

impl From<Weak<SessionController>> for ControllerHandle {
    fn from(value: Weak<SessionController>) -> Self {
        Self(value)
    }
}

/// The only writer of the [`SessionStore`] and of the token records
pub struct SessionController {
    handle: ControllerHandle,
    machine: Mutex<SessionMachine>,
    writer: SessionWriter,

    provider: Arc<dyn IdentityProvider>,
    backend: Arc<dyn BackendExchange>,
    storage: Arc<dyn TokenStorage>,
    navigator: Arc<dyn Navigator>,
}

#[bon::bon]
impl SessionController {
    #[builder(finish_fn(name = "build"))]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<dyn BackendExchange>,
        navigator: Arc<dyn Navigator>,
        #[builder(default = Arc::new(MemoryTokenStorage::default()) as Arc<dyn TokenStorage>)]
        storage: Arc<dyn TokenStorage>,
        #[builder(default)] config: SessionConfig,
    ) -> (Arc<Self>, SessionStore) {
        debug!(
            target: LOG_TARGET,
            signout_delay_secs = config.signout_delay.as_secs_f32(),
            landing_path = %config.landing_path,
            "Session controller"
        );
        let (store, writer) = SessionStore::new();

        let controller = Arc::new_cyclic(|controller| Self {
            handle: controller.clone().into(),
            machine: Mutex::new(SessionMachine::new(config)),
            writer,
            provider,
            backend,
            storage,
            navigator,
        });

        (controller, store)
    }
}

impl SessionController {
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Process the location the application was loaded at
    ///
    /// Completes a pending redirect callback, otherwise restores the session
    /// from the provider's current user. Returns once the resulting work
    /// settled.
    #[instrument(target = "portico::session", skip_all, fields(path = url.path()))]
    pub async fn on_page_load(&self, url: &Url) {
        self.dispatch(Message::PageLoaded { url: url.clone() })
            .await;
    }

    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        self.dispatch(Self::event_message(event)).await;
    }

    /// Sign out, no matter what phase the session is in
    pub async fn logout(&self) {
        info!(target: LOG_TARGET, "Logout requested");
        self.dispatch(Message::Logout).await;
    }

    /// Start the interactive sign-in redirect
    pub async fn sign_in(&self) -> ProviderRequestResult<()> {
        self.provider.begin_redirect().await.context(SignInSnafu)
    }

    /// Follow the provider's lifecycle events until it closes the channel
    /// or the controller is dropped
    pub fn spawn_event_listener(&self) -> JoinHandle<()> {
        let handle = self.handle();
        let mut events = self.provider.subscribe();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(target: LOG_TARGET, missed, "Provider event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(target: LOG_TARGET, "Provider event channel closed");
                        break;
                    }
                };
                let Some(controller) = handle.upgrade() else {
                    break;
                };

                // Transitions happen in event order, while the work they
                // start may run concurrently with later events
                let effects = controller.step(Self::event_message(event)).await;
                tokio::spawn(async move {
                    controller.run_effects(effects).await;
                });
            }
        })
    }

    fn event_message(event: ProviderEvent) -> Message {
        match event {
            ProviderEvent::UserLoaded(identity) => Message::UserLoaded(identity),
            ProviderEvent::TokenExpiring => Message::TokenExpiring,
            ProviderEvent::TokenExpired => Message::TokenExpired,
        }
    }

    async fn dispatch(&self, msg: Message) {
        let effects = self.step(msg).await;
        self.run_effects(effects).await;
    }

    async fn run_effects(&self, effects: Vec<Effect>) {
        let mut queue = VecDeque::new();
        for effect in effects {
            queue.extend(self.execute(effect).await);
        }
        while let Some(msg) = queue.pop_front() {
            for effect in self.step(msg).await {
                queue.extend(self.execute(effect).await);
            }
        }
    }

    /// Run one transition and apply its local effects
    ///
    /// Returns the effects that involve remote calls.
    async fn step(&self, msg: Message) -> Vec<Effect> {
        let mut machine = self.machine.lock().await;
        let effects = machine.handle(msg);

        let mut remote = vec![];
        for effect in effects {
            match effect {
                Effect::Publish { phase, session } => {
                    debug!(
                        target: LOG_TARGET,
                        %phase,
                        signed_in = session.is_signed_in(),
                        "Publishing session"
                    );
                    self.writer.publish(phase, session);
                }
                Effect::PersistToken(token) => self.persist_token(&token).await,
                Effect::ClearPersisted => self.clear_persisted().await,
                effect => remote.push(effect),
            }
        }
        remote
    }

    async fn execute(&self, effect: Effect) -> Option<Message> {
        match effect {
            Effect::CompleteCallback { epoch } => Some(
                match self
                    .provider
                    .complete_redirect_callback()
                    .await
                    .context(CallbackSnafu)
                {
                    Ok(identity) => Message::CallbackCompleted { epoch, identity },
                    Err(err) => {
                        warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Sign-in callback failed");
                        Message::CallbackFailed { epoch }
                    }
                },
            ),
            Effect::ResolveCurrentUser { epoch } => {
                let identity = match self.provider.current_user().await.context(ResolveUserSnafu)
                {
                    Ok(identity) => identity,
                    Err(err) => {
                        warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Treating as signed out");
                        None
                    }
                };
                Some(Message::UserResolved { epoch, identity })
            }
            Effect::RenewSilently { epoch } => Some(
                match self.provider.renew_silently().await.context(RenewalSnafu) {
                    Ok(identity) => Message::RenewalSucceeded { epoch, identity },
                    Err(err) => {
                        info!(target: LOG_TARGET, err = %err.fmt_compact(), "Silent renewal failed");
                        Message::RenewalFailed { epoch }
                    }
                },
            ),
            Effect::ExchangeBackendSession { epoch, derived_id } => {
                self.exchange_backend_session(epoch, &derived_id).await;
                None
            }
            Effect::NavigateToLanding { location } => {
                self.navigator.navigate(&location);
                None
            }
            Effect::StripCallbackQuery { location } => {
                self.navigator.replace_location(&location);
                None
            }
            Effect::ScheduleSignout {
                epoch,
                ticket,
                delay,
            } => {
                self.schedule_signout(epoch, ticket, delay);
                None
            }
            Effect::BeginLogout => {
                self.begin_logout().await;
                None
            }
            // Applied by `step`
            Effect::Publish { .. } | Effect::PersistToken(_) | Effect::ClearPersisted => None,
        }
    }

    async fn persist_token(&self, token: &IdToken) {
        if let Err(err) = self
            .storage
            .store(StorageKey::IdentityToken, token.as_str())
            .await
        {
            warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Could not persist identity token");
        }
    }

    async fn clear_persisted(&self) {
        for key in StorageKey::ALL {
            if let Err(err) = self.storage.remove(key).await {
                warn!(target: LOG_TARGET, %key, err = %err.fmt_compact(), "Could not clear token record");
            }
        }
    }

    /// Best-effort: a failure leaves the session as it is
    async fn exchange_backend_session(&self, epoch: Epoch, derived_id: &str) {
        match self.storage.load(StorageKey::BackendToken).await {
            Ok(Some(_)) => {
                debug!(target: LOG_TARGET, "Backend session already established");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Could not read backend token");
            }
        }

        let token = match self
            .backend
            .login_with_external_id(derived_id)
            .await
            .context(BackendExchangeSnafu)
        {
            Ok(token) => token,
            Err(err) => {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), derived_id, "Continuing without backend session");
                return;
            }
        };

        // Checked under the lock, so a logout can't slip in before the write
        let machine = self.machine.lock().await;
        if machine.epoch() != epoch || machine.session().derived_id() != Some(derived_id) {
            debug!(target: LOG_TARGET, derived_id, "Session changed during backend exchange, dropping token");
            return;
        }
        if let Err(err) = self
            .storage
            .store(StorageKey::BackendToken, token.as_str())
            .await
        {
            warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Could not persist backend token");
        }
    }

    fn schedule_signout(&self, epoch: Epoch, ticket: u64, delay: Duration) {
        debug!(target: LOG_TARGET, ticket, delay_secs = delay.as_secs_f32(), "Signout scheduled");
        let handle = self.handle();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = handle.upgrade() else {
                return;
            };
            let effects = controller.step(Message::SignoutDue { epoch, ticket }).await;
            if effects.contains(&Effect::BeginLogout) {
                controller.begin_logout().await;
            }
        });
    }

    async fn begin_logout(&self) {
        if let Err(err) = self.provider.begin_logout().await.context(SignOutSnafu) {
            warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Could not start signout redirect");
        }
    }
}
