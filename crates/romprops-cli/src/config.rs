//! Command-line configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use romprops_crypto::KeyStore;
use romprops_formats::{Language, ParseOptions};
use tracing::{debug, level_filters::LevelFilter};

#[derive(Parser, Debug)]
#[command(
    name = "romprops",
    about = "Print the properties of Xbox, Xbox 360 and PlayStation files",
    version,
    long_about = "Detects the format of a file (STFS package, XEX or XBE executable, XDBF \
                  resource, PlayStation save) and prints its fields and icon information."
)]
pub struct Cli {
    /// File to inspect
    pub file: PathBuf,

    /// Path to a keys.conf file with Xbox 360 keys
    #[arg(short, long, env = "ROMPROPS_KEYS")]
    pub keys: Option<PathBuf>,

    /// Preferred display language (two-letter code, e.g. "en", "ja")
    #[arg(short = 'L', long, env = "ROMPROPS_LANG")]
    pub lang: Option<Language>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Set the logging level; overrides RUST_LOG
    #[arg(short, long, value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl Cli {
    /// Parser options for the key file and language given on the command line
    pub fn parse_options(&self) -> anyhow::Result<ParseOptions> {
        let mut keys = KeyStore::new();
        if let Some(path) = &self.keys {
            let count = keys
                .load_from_path(path)
                .with_context(|| format!("failed to load keys from {}", path.display()))?;
            debug!("{count} key(s) loaded");
        }
        let options = ParseOptions::with_keys(keys);
        Ok(match self.lang {
            Some(lang) => options.language(lang),
            None => options,
        })
    }
}
