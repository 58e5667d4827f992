//! Application configuration
//!
//! Defaults are embedded from `config.toml` at build time (see `load`);
//! the deploy-time knobs (listen address, speech service URL, relay URL,
//! audio root) can be overridden from the environment. A `.env` file is
//! honored via dotenvy before the overrides are read.

use crate::error::AppError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    pub adapter: AdapterConfig,
    pub client: ClientConfig,
}

/// Relay/aggregation service settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to
    pub listen_addr: String,
    /// Directory holding per-user segment files
    pub audio_root: String,
}

/// External speech-to-text service settings
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Base URL of the speech service (quick_pass / revise_pass)
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Recording client settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL of the relay
    pub relay_url: String,
    /// User id declared to the relay
    pub uid: String,
    /// Window duration W in seconds
    pub window_secs: u32,
    /// Segments per window N; a slice lasts W/N seconds
    pub window_fanout: u32,
    /// Where finished transcripts are saved; empty means the default
    /// documents directory
    pub transcript_dir: String,
}

impl Config {
    /// Load the embedded defaults, then apply environment overrides
    pub fn load() -> Result<Self, AppError> {
        const CONFIG_TOML: &str = include_str!("../config.toml");
        let mut config: Config = toml::from_str(CONFIG_TOML)
            .map_err(|e| AppError::Config(format!("embedded config.toml: {}", e)))?;

        if let Ok(addr) = std::env::var("ECHONOTE_LISTEN_ADDR") {
            config.relay.listen_addr = addr;
        }
        if let Ok(root) = std::env::var("ECHONOTE_AUDIO_ROOT") {
            config.relay.audio_root = root;
        }
        if let Ok(url) = std::env::var("ECHONOTE_ADAPTER_URL") {
            config.adapter.base_url = url;
        }
        if let Ok(url) = std::env::var("ECHONOTE_RELAY_URL") {
            config.client.relay_url = url;
        }
        if let Ok(uid) = std::env::var("ECHONOTE_UID") {
            config.client.uid = uid;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.relay.listen_addr.is_empty() {
            return Err(AppError::Config("relay.listen_addr is empty".to_string()));
        }
        let adapter_url = url::Url::parse(&self.adapter.base_url)
            .map_err(|e| AppError::Config(format!("adapter.base_url: {}", e)))?;
        if !matches!(adapter_url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "adapter.base_url must be http(s), got '{}'",
                adapter_url.scheme()
            )));
        }
        let relay_url = url::Url::parse(&self.client.relay_url)
            .map_err(|e| AppError::Config(format!("client.relay_url: {}", e)))?;
        if !matches!(relay_url.scheme(), "ws" | "wss") {
            return Err(AppError::Config(format!(
                "client.relay_url must be ws(s), got '{}'",
                relay_url.scheme()
            )));
        }
        if self.client.window_secs == 0 {
            return Err(AppError::Config("client.window_secs must be > 0".to_string()));
        }
        if self.client.window_fanout == 0 {
            return Err(AppError::Config(
                "client.window_fanout must be > 0".to_string(),
            ));
        }
        if self.client.uid.trim().is_empty() {
            return Err(AppError::Config("client.uid is empty".to_string()));
        }
        Ok(())
    }
}
