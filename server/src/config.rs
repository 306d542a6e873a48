use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde::{Deserialize, Serialize};
use stagelink::constants::DEFAULT_PORT;

use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server settings. Every field can be left out of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the websocket endpoint listens on.
    pub bind: String,
    /// Accepted `Origin` header values. Empty accepts any origin.
    pub origins: Vec<String>,
    /// Where the server secret key is written on startup.
    pub key_path: PathBuf,
    /// Send `eventError` back to connections whose frames are rejected.
    pub report_errors: bool,
    /// Close connections that stay silent for this long.
    pub idle_timeout_secs: Option<u64>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{DEFAULT_PORT}"),
            origins: Vec::new(),
            key_path: PathBuf::from("stagelink.key"),
            report_errors: true,
            idle_timeout_secs: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|err| Error::Config(err.to_string()))
    }

    /// Reads `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }

    /// Command line flags win over the file.
    #[must_use]
    pub fn with_args(mut self, args: &Args) -> Self {
        if let Some(bind) = &args.bind {
            self.bind.clone_from(bind);
        }
        if !args.origins.is_empty() {
            self.origins.clone_from(&args.origins);
        }
        if let Some(key_path) = &args.key_path {
            self.key_path.clone_from(key_path);
        }
        if args.idle_timeout.is_some() {
            self.idle_timeout_secs = args.idle_timeout;
        }
        if args.no_error_reports {
            self.report_errors = false;
        }
        if let Some(log_level) = &args.log_level {
            self.log_level.clone_from(log_level);
        }
        if args.log_json {
            self.log_format = LogFormat::Json;
        }

        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Default, Parser)]
#[command(name = "stagelink-server", version, about = "Relay for live stage sessions")]
pub struct Args {
    /// TOML file to read settings from
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<String>,
    /// Accepted Origin header, can be repeated
    #[arg(long = "origin")]
    pub origins: Vec<String>,
    /// Where to write the server secret key
    #[arg(long)]
    pub key_path: Option<PathBuf>,
    /// Close connections silent for this many seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,
    /// Don't send eventError back for rejected frames
    #[arg(long)]
    pub no_error_reports: bool,
    /// Log filter, RUST_LOG takes precedence
    #[arg(long)]
    pub log_level: Option<String>,
    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}
