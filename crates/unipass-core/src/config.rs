//! Provider configuration

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://unipass.vercel.app";
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// CKB network, selects the address prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "ckb",
            Network::Testnet => "ckt",
        }
    }
}

/// How the lock script args are derived from the public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgsHash {
    /// CKB blake2b-256 over the key bytes, first 20 bytes
    #[default]
    Blake160,
    /// SHA-256 over the key string as given, all 32 bytes
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Where the hosted wallet lives
    pub base_url: String,
    pub network: Network,
    pub args_hash: ArgsHash,
    /// `None` waits forever
    pub timeout_ms: Option<u64>,
    /// How often the popup's closed state is checked
    pub poll_interval_ms: u64,
    /// Only accept messages coming from the base url's origin
    pub check_origin: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            network: Network::default(),
            args_hash: ArgsHash::default(),
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            check_origin: true,
        }
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn args_hash(mut self, args_hash: ArgsHash) -> Self {
        self.args_hash = args_hash;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(saturating_millis);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = saturating_millis(interval);
        self
    }

    pub fn check_origin(mut self, check: bool) -> Self {
        self.check_origin = check;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("poll_interval_ms"));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ZeroInterval("timeout_ms"));
        }
        Ok(())
    }

    fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    /// Serialized origin (`scheme://host[:port]`) of the hosted wallet
    pub fn origin(&self) -> Result<String, ConfigError> {
        let url = self.parsed_base_url()?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "url has an opaque origin".to_string(),
            });
        }
        Ok(origin.ascii_serialization())
    }

    pub fn login_url(&self) -> String {
        format!("{}/#/login", self.base_url.trim_end_matches('/'))
    }

    pub fn sign_url(&self) -> String {
        format!("{}/#/sign", self.base_url.trim_end_matches('/'))
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
