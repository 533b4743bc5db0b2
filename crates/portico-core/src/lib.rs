//! Shared types of the dashboard's session layer
//!
//! * [`claims`] - projecting an identity token into the claims the session is
//!   keyed on
//! * [`identity`] - the credential bundle the identity provider hands out
//! * [`fmt`] - log formatting helpers

pub mod claims;
pub mod fmt;
pub mod identity;

pub use claims::ClaimSet;
pub use identity::{IdToken, Identity};
