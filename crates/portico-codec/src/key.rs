use std::fmt;
use std::str::FromStr;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use snafu::{ResultExt as _, Snafu, ensure};

pub const RESPONSE_KEY_LEN: usize = 32;

#[derive(Debug, Snafu)]
pub enum ResponseKeyError {
    #[snafu(display("Response key is not valid hex"))]
    KeyHex { source: data_encoding::DecodeError },
    #[snafu(display("Response key must be {RESPONSE_KEY_LEN} bytes, got {len}"))]
    KeyLength { len: usize },
}

pub type ResponseKeyResult<T> = Result<T, ResponseKeyError>;

/// Pre-shared AES-256 key the backend encrypts responses with
///
/// This key ships with the client, so it only buys tamper detection and
/// resistance to casual inspection. It is not a confidentiality boundary
/// against someone who controls the client.
#[derive(Clone, PartialEq, Eq)]
pub struct ResponseKey([u8; RESPONSE_KEY_LEN]);

impl ResponseKey {
    pub fn from_bytes(bytes: [u8; RESPONSE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> ResponseKeyResult<Self> {
        let bytes = HEXLOWER_PERMISSIVE
            .decode(s.trim().as_bytes())
            .context(KeyHexSnafu)?;
        ensure!(
            bytes.len() == RESPONSE_KEY_LEN,
            KeyLengthSnafu { len: bytes.len() }
        );
        let mut key = [0u8; RESPONSE_KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; RESPONSE_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }
}

impl FromStr for ResponseKey {
    type Err = ResponseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseKey(<redacted>)")
    }
}
