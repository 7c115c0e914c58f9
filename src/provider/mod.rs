//! Wallet provider adapters.
//!
//! A provider owns the signing key. The session only ever sees the
//! [`WalletProvider`] capability; which adapters exist on this host is answered
//! by [`ProviderRegistry::detect`].

pub mod keypair;

use crate::config::Network;
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

pub use keypair::KeypairProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Phantom,
    Solflare,
    Slope,
    Backpack,
    Glow,
    Exodus,
    Coinbase,
    Brave,
    DegenWallet,
    Clover,
    MathWallet,
    LocalKeypair,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Phantom => "phantom",
            ProviderKind::Solflare => "solflare",
            ProviderKind::Slope => "slope",
            ProviderKind::Backpack => "backpack",
            ProviderKind::Glow => "glow",
            ProviderKind::Exodus => "exodus",
            ProviderKind::Coinbase => "coinbase",
            ProviderKind::Brave => "brave",
            ProviderKind::DegenWallet => "degen",
            ProviderKind::Clover => "clover",
            ProviderKind::MathWallet => "math",
            ProviderKind::LocalKeypair => "keypair",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    NetworkChanged(Network),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("User rejected the request")]
    Rejected,

    #[error("{0} is not supported by this wallet")]
    Unsupported(&'static str),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Send failed: {0}")]
    Send(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether the backing wallet is present on this host.
    fn is_available(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<Pubkey, ProviderError>;

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, ProviderError>;

    async fn sign_and_send_transaction(&self, transaction: Transaction) -> Result<Signature, ProviderError>;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    adapters: Vec<Box<dyn WalletProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations of the same kind replace earlier ones.
    pub fn register(&mut self, adapter: Box<dyn WalletProvider>) {
        let kind = adapter.kind();
        self.adapters.retain(|a| a.kind() != kind);
        self.adapters.push(adapter);
    }

    pub fn detect(&self) -> Vec<ProviderKind> {
        self.adapters
            .iter()
            .filter(|a| a.is_available())
            .map(|a| a.kind())
            .collect()
    }

    /// Hand an available adapter over to a session.
    pub fn take(&mut self, kind: ProviderKind) -> Option<Box<dyn WalletProvider>> {
        let index = self
            .adapters
            .iter()
            .position(|a| a.kind() == kind && a.is_available())?;
        Some(self.adapters.remove(index))
    }
}
