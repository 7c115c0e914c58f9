use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Devnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" | "main" => Ok(Network::Mainnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            "testnet" | "test" => Ok(Network::Testnet),
            other => anyhow::bail!("Unknown network: {}", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub solana: SolanaConfig,
    pub networks: Networks,
    pub claim: ClaimConfig,
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SolanaConfig {
    pub network: Network,
    pub keypair_path: String,
    pub commitment: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NetworkConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub fallback_urls: Vec<String>,
}

impl NetworkConfig {
    fn canonical(url: &str) -> Self {
        Self {
            rpc_url: url.to_string(),
            fallback_urls: Vec::new(),
        }
    }

    /// Endpoint URLs in failover priority order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.rpc_url.as_str()).chain(self.fallback_urls.iter().map(String::as_str))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Networks {
    pub mainnet: NetworkConfig,
    pub devnet: NetworkConfig,
    pub testnet: NetworkConfig,
}

impl Networks {
    pub fn get(&self, network: Network) -> &NetworkConfig {
        match network {
            Network::Mainnet => &self.mainnet,
            Network::Devnet => &self.devnet,
            Network::Testnet => &self.testnet,
        }
    }
}

impl Default for Networks {
    fn default() -> Self {
        Self {
            mainnet: NetworkConfig {
                rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
                fallback_urls: vec![
                    "https://solana-api.projectserum.com".to_string(),
                    "https://solana-api.raydium.io".to_string(),
                ],
            },
            devnet: NetworkConfig::canonical("https://api.devnet.solana.com"),
            testnet: NetworkConfig::canonical("https://api.testnet.solana.com"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimStrategy {
    /// System transfer of the account's lamports to the owner.
    #[default]
    Transfer,
    /// SPL Token `CloseAccount` with the owner as destination.
    CloseAccount,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClaimConfig {
    pub strategy: ClaimStrategy,
    pub confirm_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub service_url: Option<String>,
}

impl ClaimConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            strategy: ClaimStrategy::Transfer,
            confirm_timeout_secs: 60,
            poll_interval_ms: 500,
            service_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub scan_interval_secs: u64,
    pub dry_run: bool,
    pub whitelist: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 300,
            dry_run: false,
            whitelist: Vec::new(),
        }
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            keypair_path: String::new(),
            commitment: "confirmed".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solana: SolanaConfig::default(),
            networks: Networks::default(),
            claim: ClaimConfig::default(),
            settings: Settings::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.whitelist()?;
        config.commitment()?;
        Ok(config)
    }

    /// The keypair file with a leading `~` resolved to the home directory.
    pub fn keypair_path(&self) -> PathBuf {
        expand_home(&self.solana.keypair_path)
    }

    pub fn commitment(&self) -> Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.solana.commitment)
            .map_err(|_| anyhow::anyhow!("Invalid commitment level: {}", self.solana.commitment))
    }

    pub fn whitelist(&self) -> Result<HashSet<Pubkey>> {
        self.settings
            .whitelist
            .iter()
            .map(|s| Pubkey::from_str(s).with_context(|| format!("Invalid whitelist entry: {}", s)))
            .collect()
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
