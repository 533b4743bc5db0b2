use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::{Args, Parser, Subcommand};
use portico_codec::{Compression, ResponseKey};

/// Inspect identity tokens, encrypted responses and stored session tokens
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub cmd: OptsCmd,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hex-encoded 32 byte response key
    #[arg(long, env = "PORTICO_RESPONSE_KEY", hide_env_values = true, global = true)]
    pub key: Option<ResponseKey>,

    /// Associated data label the envelopes are bound to
    #[arg(long, env = "PORTICO_ASSOCIATED_DATA", global = true)]
    pub associated_data: Option<String>,

    /// Compression used for envelopes marked as compressed
    #[arg(long, env = "PORTICO_COMPRESSION", default_value_t = Compression::Gzip, global = true)]
    pub compression: Compression,

    /// Token database location
    #[arg(long, env = "PORTICO_STORAGE_PATH", global = true)]
    pub storage_path: Option<PathBuf>,
}

static PROJECT_DIRS: LazyLock<Option<directories::ProjectDirs>> =
    LazyLock::new(|| directories::ProjectDirs::from("org", "Portico", "portico"));

impl GlobalOpts {
    /// `None` if no path was given and there is no usable home directory
    pub fn storage_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.storage_path.as_ref() {
            return Some(path.clone());
        }
        let dirs = PROJECT_DIRS.as_ref()?;
        let dir: &Path = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
        Some(dir.join("tokens.redb"))
    }
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Show the claims of an identity token
    Claims {
        token: String,
    },
    /// Decode an encrypted response (plain JSON passes through)
    Decode(InputOpts),
    /// Seal a JSON payload into an envelope
    Encode {
        #[command(flatten)]
        input: InputOpts,

        #[arg(long)]
        compress: bool,
    },
    /// Check whether the input has the shape of an envelope
    IsEnvelope(InputOpts),
    /// Inspect the durable token records
    #[command(subcommand)]
    Storage(StorageCmd),
    /// Generate a random response key
    GenKey,
}

#[derive(Debug, Args)]
pub struct InputOpts {
    /// Read from this file instead of stdin
    #[arg(long, short)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum StorageCmd {
    /// Show which records are present
    Show {
        /// Print full token values instead of hints
        #[arg(long)]
        reveal: bool,
    },
    /// Remove all records
    Clear,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test_log::test]
    fn cli_definition_is_consistent() {
        Opts::command().debug_assert();
    }

    #[test_log::test]
    fn global_options_go_after_subcommand() {
        let key = "00".repeat(32);
        let opts = Opts::try_parse_from([
            "portico",
            "encode",
            "--compress",
            "--key",
            key.as_str(),
            "--compression",
            "br",
            "-i",
            "body.json",
        ])
        .unwrap();

        assert_eq!(opts.global.compression, Compression::Brotli);
        assert_eq!(opts.global.key, Some(ResponseKey::from_bytes([0; 32])));
        assert!(matches!(
            opts.cmd,
            OptsCmd::Encode {
                compress: true,
                input: InputOpts { input: Some(ref path) },
            } if path == Path::new("body.json")
        ));
    }

    #[test_log::test]
    fn explicit_storage_path_wins() {
        let opts =
            Opts::try_parse_from(["portico", "storage", "--storage-path", "/tmp/t.redb", "show"])
                .unwrap();

        assert_eq!(opts.global.storage_path(), Some(PathBuf::from("/tmp/t.redb")));
        assert!(matches!(
            opts.cmd,
            OptsCmd::Storage(StorageCmd::Show { reveal: false })
        ));
    }
}
