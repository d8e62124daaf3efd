use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const API_URL_VAR: &str = "MOVIENIGHT_API_URL";
pub const LISTEN_ADDR_VAR: &str = "MOVIENIGHT_LISTEN_ADDR";
pub const STATE_PATH_VAR: &str = "MOVIENIGHT_STATE_PATH";
pub const TIMEOUT_VAR: &str = "MOVIENIGHT_HTTP_TIMEOUT_SECS";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3147";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub listen_addr: SocketAddr,
    /// `None` means client state is kept in memory only.
    pub state_path: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup(API_URL_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .with_context(|| format!("{API_URL_VAR} not set"))?;

        let listen_addr: SocketAddr = lookup(LISTEN_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .with_context(|| format!("{LISTEN_ADDR_VAR} is not a socket address"))?;

        let state_path = match lookup(STATE_PATH_VAR) {
            Some(p) if p.eq_ignore_ascii_case("off") => None,
            Some(p) if !p.trim().is_empty() => Some(PathBuf::from(p)),
            _ => default_state_path(),
        };

        let request_timeout = match lookup(TIMEOUT_VAR) {
            Some(s) => Duration::from_secs(
                s.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{TIMEOUT_VAR} must be a whole number of seconds"))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_url,
            listen_addr,
            state_path,
            request_timeout,
        })
    }
}

fn default_state_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("movienight").join("state.json"))
}
