//! Client-side session lifecycle
//!
//! [`SessionController`] drives the identity provider's redirect flow,
//! validates the claims of the identities it hands out, keeps the token
//! records and reacts to expiry. The rest of the application only ever reads
//! the session through a [`SessionStore`].

pub mod controller;
pub mod error;
pub mod machine;
pub mod provider;
pub mod redirect;
pub mod storage;
pub mod store;

pub use self::controller::{ControllerHandle, SessionController};
pub use self::machine::SessionConfig;
pub use self::provider::{BackendExchange, BackendToken, IdentityProvider, Navigator, ProviderEvent};
pub use self::storage::{MemoryTokenStorage, RedbTokenStorage, StorageKey, TokenStorage};
pub use self::store::{Phase, Session, SessionSnapshot, SessionStore};

pub(crate) const LOG_TARGET: &str = "portico::session";
