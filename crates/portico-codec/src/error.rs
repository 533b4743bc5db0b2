use std::io;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    #[snafu(display("Envelope field `{field}` is not valid hex"))]
    InvalidHex {
        field: &'static str,
        source: data_encoding::DecodeError,
    },
    #[snafu(display("Envelope iv must be {expected} bytes, got {len}"))]
    InvalidNonce { expected: usize, len: usize },
    /// Authentication tag did not verify: tampered payload or wrong key
    #[snafu(display("Response failed authentication"))]
    Decryption,
    #[snafu(display("Response is not valid structured data"))]
    ResponseFormat { source: serde_json::Error },
    #[snafu(display("Payload could not be serialized"))]
    Serialize { source: serde_json::Error },
    #[snafu(display("Payload could not be compressed"))]
    Compress { source: io::Error },
    #[snafu(display("Payload could not be encrypted"))]
    Encryption,
    #[snafu(display("Decode task failed"))]
    Blocking { source: tokio::task::JoinError },
}

impl CodecError {
    pub fn is_decryption(&self) -> bool {
        matches!(self, CodecError::Decryption)
    }

    pub fn is_response_format(&self) -> bool {
        matches!(self, CodecError::ResponseFormat { .. })
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
