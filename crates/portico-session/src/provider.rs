//! Collaborators the session controller drives but does not implement

use std::fmt;

use async_trait::async_trait;
use portico_core::Identity;
use portico_core::fmt::{BoxedErrorResult, FmtTokenHint};
use tokio::sync::broadcast;

/// Lifecycle notifications emitted by the identity provider client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    UserLoaded(Identity),
    TokenExpiring,
    TokenExpired,
}

/// Redirect-based identity provider client (OIDC or similar)
///
/// Implementations are expected to single-flight their own silent renewal,
/// the controller never asks for more than one at a time anyway.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start the interactive sign-in redirect
    async fn begin_redirect(&self) -> BoxedErrorResult<()>;

    /// Finish a sign-in redirect, using the callback parameters of the
    /// current location
    async fn complete_redirect_callback(&self) -> BoxedErrorResult<Identity>;

    /// The user the provider client currently has, if any
    async fn current_user(&self) -> BoxedErrorResult<Option<Identity>>;

    async fn renew_silently(&self) -> BoxedErrorResult<Identity>;

    /// Start the sign-out redirect
    async fn begin_logout(&self) -> BoxedErrorResult<()>;

    /// Subscribe to [`ProviderEvent`]s. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Session token issued by the backend in exchange for the derived id
#[derive(Clone, PartialEq, Eq)]
pub struct BackendToken(String);

impl BackendToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BackendToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendToken({})", FmtTokenHint(&self.0))
    }
}

#[async_trait]
pub trait BackendExchange: Send + Sync {
    /// Exchange the derived id for a backend session token
    ///
    /// Must be safe to call again for the same id.
    async fn login_with_external_id(&self, derived_id: &str) -> BoxedErrorResult<BackendToken>;
}

/// Page navigation
pub trait Navigator: Send + Sync {
    /// Go to `location`, adding a history entry
    fn navigate(&self, location: &str);

    /// Rewrite the current location without adding a history entry
    fn replace_location(&self, location: &str);
}
