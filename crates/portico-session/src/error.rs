use portico_core::fmt::BoxedError;
use snafu::Snafu;

/// The identity provider could not complete the redirect callback
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(display("Redirect callback could not be completed"))]
pub struct CallbackError {
    source: BoxedError,
}

/// Silent renewal failed
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(display("Silent token renewal failed"))]
pub struct RenewalError {
    source: BoxedError,
}

/// The backend session exchange failed. Never fatal to the session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(display("Backend session exchange failed"))]
pub struct BackendExchangeError {
    source: BoxedError,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderRequestError {
    #[snafu(display("Could not resolve the current user"))]
    ResolveUser { source: BoxedError },
    #[snafu(display("Could not start the sign-in redirect"))]
    SignIn { source: BoxedError },
    #[snafu(display("Could not start the sign-out redirect"))]
    SignOut { source: BoxedError },
}

pub type ProviderRequestResult<T> = std::result::Result<T, ProviderRequestError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("Token database error"))]
    Database { source: redb::DatabaseError },
    #[snafu(display("Token database transaction error"))]
    Transaction {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
    },
    #[snafu(display("Token table error"))]
    Table { source: redb::TableError },
    #[snafu(display("Token storage error"))]
    Storage { source: redb::StorageError },
    #[snafu(display("Token database commit error"))]
    Commit { source: redb::CommitError },
    #[snafu(display("Token storage task failed"))]
    Join { source: tokio::task::JoinError },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
