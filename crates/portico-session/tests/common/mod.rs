#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use data_encoding::BASE64URL_NOPAD;
use portico_core::Identity;
use portico_core::fmt::BoxedErrorResult;
use portico_session::{
    BackendExchange, BackendToken, IdentityProvider, MemoryTokenStorage, Navigator, ProviderEvent,
    SessionConfig, SessionController, SessionStore, TokenStorage,
};
use tokio::sync::{Notify, broadcast};

pub fn token(payload: serde_json::Value) -> String {
    format!(
        "eyJhbGciOiJSUzI1NiJ9.{}.c2ln",
        BASE64URL_NOPAD.encode(payload.to_string().as_bytes())
    )
}

/// Identity whose claims authorize the account
pub fn member(subject: &str) -> Identity {
    Identity::new(token(serde_json::json!({
        "sub": subject,
        "nicknameSlug": format!("{subject}-nick"),
        "sponsorId": "sp-1",
    })))
}

/// Identity without a sponsor
pub fn outsider(subject: &str) -> Identity {
    Identity::new(token(serde_json::json!({
        "sub": subject,
        "nicknameSlug": "drifter",
    })))
}

/// Blocks a fake call until released, if armed
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    release: Notify,
}

impl Gate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    async fn pass(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
    }
}

/// Scripted identity provider
pub struct FakeProvider {
    events: broadcast::Sender<ProviderEvent>,

    /// `None` makes the callback fail
    pub callback_identity: Mutex<Option<Identity>>,
    pub current_user: Mutex<Option<Identity>>,
    /// `None` makes the renewal fail
    pub renewed_identity: Mutex<Option<Identity>>,

    pub callback_gate: Gate,
    pub renew_gate: Gate,

    pub redirect_calls: AtomicUsize,
    pub callback_calls: AtomicUsize,
    pub current_user_calls: AtomicUsize,
    pub renew_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            callback_identity: Mutex::default(),
            current_user: Mutex::default(),
            renewed_identity: Mutex::default(),
            callback_gate: Gate::default(),
            renew_gate: Gate::default(),
            redirect_calls: AtomicUsize::default(),
            callback_calls: AtomicUsize::default(),
            current_user_calls: AtomicUsize::default(),
            renew_calls: AtomicUsize::default(),
            logout_calls: AtomicUsize::default(),
        }
    }
}

impl FakeProvider {
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_current_user(&self, identity: Option<Identity>) {
        *self.current_user.lock().unwrap() = identity;
    }

    pub fn set_callback_identity(&self, identity: Option<Identity>) {
        *self.callback_identity.lock().unwrap() = identity;
    }

    pub fn set_renewed_identity(&self, identity: Option<Identity>) {
        *self.renewed_identity.lock().unwrap() = identity;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn begin_redirect(&self) -> BoxedErrorResult<()> {
        self.redirect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn complete_redirect_callback(&self) -> BoxedErrorResult<Identity> {
        self.callback_calls.fetch_add(1, Ordering::SeqCst);
        self.callback_gate.pass().await;
        self.callback_identity
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| "no matching state found in storage".into())
    }

    async fn current_user(&self) -> BoxedErrorResult<Option<Identity>> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current_user.lock().unwrap().clone())
    }

    async fn renew_silently(&self) -> BoxedErrorResult<Identity> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.renew_gate.pass().await;
        self.renewed_identity
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| "login_required".into())
    }

    async fn begin_logout(&self) -> BoxedErrorResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendExchange for FakeBackend {
    async fn login_with_external_id(&self, derived_id: &str) -> BoxedErrorResult<BackendToken> {
        self.calls.lock().unwrap().push(derived_id.to_owned());
        if self.fail.load(Ordering::SeqCst) {
            return Err("backend unavailable".into());
        }
        Ok(BackendToken::new(format!("backend-{derived_id}")))
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub navigated: Mutex<Vec<String>>,
    pub replaced: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn navigated(&self) -> Vec<String> {
        self.navigated.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<String> {
        self.replaced.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, location: &str) {
        self.navigated.lock().unwrap().push(location.to_owned());
    }

    fn replace_location(&self, location: &str) {
        self.replaced.lock().unwrap().push(location.to_owned());
    }
}

/// A controller wired to fakes
pub struct Harness {
    pub controller: Arc<SessionController>,
    pub store: SessionStore,
    pub provider: Arc<FakeProvider>,
    pub backend: Arc<FakeBackend>,
    pub navigator: Arc<RecordingNavigator>,
    pub storage: Arc<MemoryTokenStorage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryTokenStorage::default()))
    }

    pub fn with_storage(storage: Arc<MemoryTokenStorage>) -> Self {
        let provider = Arc::new(FakeProvider::default());
        let backend = Arc::new(FakeBackend::default());
        let navigator = Arc::new(RecordingNavigator::default());

        let (controller, store) = SessionController::builder()
            .provider(provider.clone())
            .backend(backend.clone())
            .navigator(navigator.clone())
            .storage(storage.clone() as Arc<dyn TokenStorage>)
            .config(SessionConfig::default())
            .build();

        Self {
            controller,
            store,
            provider,
            backend,
            navigator,
            storage,
        }
    }

    pub async fn sign_in(&self, identity: Identity) {
        self.provider.set_current_user(Some(identity));
        self.controller.on_page_load(&url("https://app.example/")).await;
    }
}

pub fn url(s: &str) -> url::Url {
    url::Url::parse(s).unwrap()
}
