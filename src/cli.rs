//! Command-line arguments for `ackget` and `ackget-server`.

use clap::{ArgAction, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::{ClientConfig, ServerConfig};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "ackget", version, about = "Fetch files from an ackget server")]
pub struct ClientArgs {
    /// Server host name or address
    pub address: String,

    /// Server port
    pub port: String,

    /// Directory received files are written to
    #[arg(short = 'd', long, env = "ACKGET_DOWNLOAD_DIR", default_value = ".")]
    pub download_dir: PathBuf,

    /// Increase log verbosity (-v, -vv, ...)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl ClientArgs {
    pub fn into_config(self) -> ClientConfig {
        ClientConfig::new(self.address, self.port).with_download_dir(self.download_dir)
    }
}

#[derive(Parser, Debug)]
#[command(name = "ackget-server", version, about = "Serve files over the ackget protocol")]
pub struct ServerArgs {
    /// Port to listen on
    pub port: u16,

    /// Number of workers (connections served at once)
    pub workers: usize,

    /// Address to bind
    #[arg(long, env = "ACKGET_BIND")]
    pub bind: Option<IpAddr>,

    /// Seconds a client may stay idle between commands
    #[arg(long, env = "ACKGET_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// TOML configuration file (defaults to the user config dir)
    #[arg(short, long, env = "ACKGET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, ...)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl ServerArgs {
    /// Merge the config file (if any) with the flags and validate.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match self.config.or_else(ServerConfig::default_path) {
            Some(path) => ServerConfig::load(&path)?,
            None => ServerConfig::default(),
        };

        config.port = self.port;
        config.workers = self.workers;
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}
