mod cli;

use std::io::{self, Read as _};
use std::path::Path;

use clap::Parser;
use cli::{GlobalOpts, InputOpts, Opts, OptsCmd, StorageCmd};
use portico_codec::{
    CodecError, EncryptedEnvelope, ResponseCodec, ResponseKey, is_encrypted_envelope,
};
use portico_core::claims;
use portico_core::fmt::FmtTokenHint;
use portico_session::error::StorageError;
use portico_session::{RedbTokenStorage, StorageKey, TokenStorage as _};
use snafu::{FromString as _, OptionExt as _, ResultExt as _, Snafu, Whatever};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "portico::cli";

type WhateverResult<T> = std::result::Result<T, snafu::Whatever>;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("No response key, pass --key or set PORTICO_RESPONSE_KEY"))]
    MissingKey,
    #[snafu(display("Can't read input: {source}"))]
    Input { source: io::Error },
    #[snafu(display("Input is not valid JSON: {source}"))]
    InputJson { source: serde_json::Error },
    #[snafu(display("Codec error: {source}"))]
    Codec { source: CodecError },
    #[snafu(display("No storage path, pass --storage-path or set PORTICO_STORAGE_PATH"))]
    MissingStoragePath,
    #[snafu(display("Data dir error: {source:?}"))]
    DataDir { source: io::Error },
    #[snafu(display("Token storage error: {source}"))]
    Storage { source: StorageError },
    #[snafu(display("Miscellaneous error: {source}"))]
    Whatever { source: Whatever },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging().context(WhateverSnafu)?;

    let opts = Opts::parse();
    let v = handle_cmd(opts).await?;
    println!("{}", serde_json::to_string_pretty(&v).expect("Can't fail"));
    Ok(())
}

async fn handle_cmd(opts: Opts) -> CliResult<serde_json::Value> {
    Ok(match opts.cmd {
        OptsCmd::Claims { token } => {
            let claims = claims::parse(&token);
            if claims.is_empty() {
                info!(target: LOG_TARGET, "Token payload could not be decoded");
            }
            serde_json::json!({
                "authorized": claims.is_authorized(),
                "claims": claims,
            })
        }
        OptsCmd::Decode(ref input) => {
            let codec = make_codec(&opts.global)?;
            let response = read_json(input)?;

            if is_encrypted_envelope(&response) {
                let envelope: EncryptedEnvelope =
                    serde_json::from_value(response).context(InputJsonSnafu)?;
                debug!(target: LOG_TARGET, compressed = envelope.compressed, "Decoding envelope");
                codec
                    .decode_offloaded::<serde_json::Value>(envelope)
                    .await
                    .context(CodecSnafu)?
            } else {
                info!(target: LOG_TARGET, "Input is not an envelope, passing it through");
                response
            }
        }
        OptsCmd::Encode {
            ref input,
            compress,
        } => {
            let codec = make_codec(&opts.global)?;
            let value = read_json(input)?;
            let envelope = codec.encode(&value, compress).context(CodecSnafu)?;

            serde_json::to_value(envelope).expect("Can't fail")
        }
        OptsCmd::IsEnvelope(ref input) => {
            serde_json::Value::Bool(is_encrypted_envelope(&read_json(input)?))
        }
        OptsCmd::Storage(cmd) => {
            let path = opts.global.storage_path().context(MissingStoragePathSnafu)?;
            let storage = open_storage(&path).await?;

            match cmd {
                StorageCmd::Show { reveal } => {
                    let mut records = serde_json::Map::new();
                    for key in StorageKey::ALL {
                        let value = storage.load(key).await.context(StorageSnafu)?;
                        let record = value.map(|value| {
                            let mut record = serde_json::json!({
                                "value": if reveal {
                                    value.clone()
                                } else {
                                    FmtTokenHint(&value).to_string()
                                },
                            });
                            if key == StorageKey::IdentityToken {
                                record["claims"] =
                                    serde_json::to_value(claims::parse(&value)).expect("Can't fail");
                            }
                            record
                        });
                        records.insert(key.to_string(), record.into());
                    }
                    serde_json::Value::Object(records)
                }
                StorageCmd::Clear => {
                    for key in StorageKey::ALL {
                        storage.remove(key).await.context(StorageSnafu)?;
                    }
                    info!(target: LOG_TARGET, path = %path.display(), "Token records cleared");
                    serde_json::Value::Bool(true)
                }
            }
        }
        OptsCmd::GenKey => {
            serde_json::json!({
                "key": ResponseKey::generate().to_hex(),
            })
        }
    })
}

fn make_codec(opts: &GlobalOpts) -> CliResult<ResponseCodec> {
    let key = opts.key.as_ref().context(MissingKeySnafu)?;
    let codec = ResponseCodec::new(key).with_compression(opts.compression);

    Ok(match opts.associated_data.as_ref() {
        Some(label) => codec.with_associated_data(label),
        None => codec,
    })
}

fn read_json(opts: &InputOpts) -> CliResult<serde_json::Value> {
    let bytes = match opts.input.as_ref() {
        Some(path) => std::fs::read(path).context(InputSnafu)?,
        None => {
            let mut bytes = vec![];
            io::stdin().read_to_end(&mut bytes).context(InputSnafu)?;
            bytes
        }
    };
    serde_json::from_slice(&bytes).context(InputJsonSnafu)
}

async fn open_storage(path: &Path) -> CliResult<RedbTokenStorage> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(DataDirSnafu)?;
    }
    RedbTokenStorage::open(path).await.context(StorageSnafu)
}

pub fn init_logging() -> WhateverResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| Whatever::without_source("Failed to initialize logging".to_string()))?;

    Ok(())
}
