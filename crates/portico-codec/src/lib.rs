//! Encrypted API response codec
//!
//! The backend wraps every response body in an [`EncryptedEnvelope`]:
//! AES-256-GCM over the (optionally compressed) JSON body, with the
//! ciphertext, iv and tag hex-encoded. [`ResponseCodec::decode`] reverses
//! that, and refuses to hand out anything that did not authenticate.

mod compression;
mod envelope;
pub mod error;
mod key;

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{Aead as _, KeyInit as _, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
pub use compression::{Compression, UnknownCompression};
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
pub use envelope::{EncryptedEnvelope, is_encrypted_envelope};
use error::{
    BlockingSnafu, CodecResult, CompressSnafu, DecryptionSnafu, EncryptionSnafu, InvalidHexSnafu,
    InvalidNonceSnafu, ResponseFormatSnafu, SerializeSnafu,
};
pub use key::{RESPONSE_KEY_LEN, ResponseKey, ResponseKeyError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::{OptionExt as _, ResultExt as _, ensure};
use tracing::{debug, trace};

pub use crate::error::CodecError;

const LOG_TARGET: &str = "portico::codec";

/// Label bound into every envelope as AEAD associated data
pub const DEFAULT_ASSOCIATED_DATA: &[u8] = b"portico/response/v1";

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct ResponseCodec {
    cipher: Aes256Gcm,
    associated_data: Arc<[u8]>,
    compression: Compression,
}

impl fmt::Debug for ResponseCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCodec")
            .field(
                "associated_data",
                &String::from_utf8_lossy(&self.associated_data),
            )
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

impl ResponseCodec {
    pub fn new(key: &ResponseKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(&Key::<Aes256Gcm>::from(*key.as_bytes())),
            associated_data: DEFAULT_ASSOCIATED_DATA.into(),
            compression: Compression::default(),
        }
    }

    pub fn with_associated_data(mut self, associated_data: impl AsRef<[u8]>) -> Self {
        self.associated_data = associated_data.as_ref().into();
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Authenticate and decrypt `envelope`, inflating it if marked compressed
    ///
    /// Returns the raw body bytes. A tag that does not verify aborts with
    /// [`CodecError::Decryption`] and no plaintext is returned.
    pub fn open(&self, envelope: &EncryptedEnvelope) -> CodecResult<Vec<u8>> {
        let mut sealed = decode_hex("data", &envelope.data)?;
        let iv = decode_hex("iv", &envelope.iv)?;
        let tag = decode_hex("tag", &envelope.tag)?;

        ensure!(
            iv.len() == IV_LEN,
            InvalidNonceSnafu {
                expected: IV_LEN,
                len: iv.len(),
            }
        );
        // A truncated tag can never verify
        ensure!(tag.len() == TAG_LEN, DecryptionSnafu);

        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: &self.associated_data,
                },
            )
            .ok()
            .context(DecryptionSnafu)?;

        if !envelope.compressed {
            return Ok(plaintext);
        }

        match self.compression.decompress(&plaintext) {
            Ok(inflated) => Ok(inflated),
            Err(err) => {
                // Compression only saves bandwidth; the bytes are authentic either way
                debug!(
                    target: LOG_TARGET,
                    compression = %self.compression,
                    err = %err,
                    len = plaintext.len(),
                    "Failed to inflate response, treating it as uncompressed"
                );
                Ok(plaintext)
            }
        }
    }

    pub fn decode<T>(&self, envelope: &EncryptedEnvelope) -> CodecResult<T>
    where
        T: DeserializeOwned,
    {
        let body = self.open(envelope)?;
        trace!(target: LOG_TARGET, len = body.len(), "Decrypted response");
        serde_json::from_slice(&body).context(ResponseFormatSnafu)
    }

    /// Like [`Self::decode`], but does the work on the blocking thread pool
    pub async fn decode_offloaded<T>(&self, envelope: EncryptedEnvelope) -> CodecResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.decode(&envelope))
            .await
            .context(BlockingSnafu)?
    }

    /// Decode `response` if it is an envelope, pass it through unchanged
    /// otherwise
    pub fn decode_response(&self, response: serde_json::Value) -> CodecResult<serde_json::Value> {
        if !is_encrypted_envelope(&response) {
            return Ok(response);
        }
        let envelope: EncryptedEnvelope =
            serde_json::from_value(response).context(ResponseFormatSnafu)?;
        self.decode(&envelope)
    }

    /// Seal a client-originated payload
    ///
    /// Uses a fresh random iv for every call. Compressed payloads use this
    /// codec's [`Compression`], so they are only guaranteed to open with a
    /// codec configured the same way.
    pub fn encode<T>(&self, value: &T, compress: bool) -> CodecResult<EncryptedEnvelope>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(value).context(SerializeSnafu)?;
        let body = if compress {
            self.compression.compress(&body).context(CompressSnafu)?
        } else {
            body
        };

        let iv: [u8; IV_LEN] = rand::random();
        let mut sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &body,
                    aad: &self.associated_data,
                },
            )
            .ok()
            .context(EncryptionSnafu)?;

        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedEnvelope {
            data: HEXLOWER.encode(&sealed),
            iv: HEXLOWER.encode(&iv),
            tag: HEXLOWER.encode(&tag),
            compressed: compress,
        })
    }
}

fn decode_hex(field: &'static str, value: &str) -> CodecResult<Vec<u8>> {
    HEXLOWER_PERMISSIVE
        .decode(value.as_bytes())
        .context(InvalidHexSnafu { field })
}
