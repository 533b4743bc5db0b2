//! Identity token claims
//!
//! An identity token is a dot-delimited string (`header.payload.signature`).
//! The payload segment is base64url-encoded JSON. [`parse`] projects it into a
//! [`ClaimSet`] without verifying the signature: verification is the identity
//! provider's job, we only need the claims the dashboard keys the session on.

use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Deserializer, Serialize};

/// Claims the dashboard cares about, plus everything else the token carried
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    #[serde(rename = "sub", default, deserialize_with = "string_or_number")]
    pub subject: String,
    #[serde(alias = "nicknameSlug", default, deserialize_with = "string_or_number")]
    pub nickname_slug: String,
    #[serde(
        alias = "sponsorId",
        default,
        deserialize_with = "string_or_number"
    )]
    pub sponsor_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClaimSet {
    pub fn is_empty(&self) -> bool {
        self.subject.is_empty()
            && self.nickname_slug.is_empty()
            && self.sponsor_id.is_empty()
            && self.extra.is_empty()
    }

    /// Does this claim set describe an account allowed into the dashboard
    ///
    /// Both the nickname slug and the sponsor id must be present. The subject
    /// must be present too, as it becomes the session's derived id.
    pub fn is_authorized(&self) -> bool {
        !self.subject.is_empty() && !self.nickname_slug.is_empty() && !self.sponsor_id.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// Decode the payload segment of `token` into a [`ClaimSet`]
///
/// Never fails: anything malformed yields an empty claim set, and it is up
/// to the caller to treat that as unauthorized.
pub fn parse(token: &str) -> ClaimSet {
    try_parse(token).unwrap_or_default()
}

fn try_parse(token: &str) -> Option<ClaimSet> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;

    // Some issuers keep the `=` padding, which the no-pad decoder rejects
    let payload = BASE64URL_NOPAD
        .decode(payload.trim_end_matches('=').as_bytes())
        .ok()?;

    match serde_json::from_slice::<serde_json::Value>(&payload).ok()? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
        Null,
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
        StringOrNumber::Null => String::new(),
    })
}

#[cfg(test)]
mod tests;
