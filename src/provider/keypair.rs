use super::{ProviderError, ProviderEvent, ProviderKind, WalletProvider};
use crate::config::Network;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::path::Path;
use tokio::sync::broadcast;
use zeroize::Zeroize;

/// Signs with a keypair file in the Solana CLI JSON format.
///
/// It has no connection of its own, so submission always goes through the
/// session's endpoints for the active network.
pub struct KeypairProvider {
    keypair: Keypair,
    events: broadcast::Sender<ProviderEvent>,
}

impl KeypairProvider {
    pub fn new(keypair: Keypair) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            keypair,
            events,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keypair {}", path.display()))?;
        let parsed: Result<Vec<u8>, _> = serde_json::from_str(&content);
        content.zeroize();

        let mut bytes = parsed.context("Keypair file is not a JSON byte array")?;
        let keypair = Keypair::from_bytes(&bytes);
        bytes.zeroize();

        Ok(Self::new(keypair.context("Invalid keypair bytes")?))
    }

    /// Announce a network change to subscribers.
    pub fn notify_network(&self, network: Network) {
        // No subscribers is fine.
        let _ = self.events.send(ProviderEvent::NetworkChanged(network));
    }

    fn sign(&self, mut transaction: Transaction) -> Result<Transaction, ProviderError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| ProviderError::Signing(e.to_string()))?;
        Ok(transaction)
    }
}

#[async_trait]
impl WalletProvider for KeypairProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalKeypair
    }

    async fn connect(&self) -> Result<Pubkey, ProviderError> {
        let pubkey = self.keypair.pubkey();
        info!("Using keypair {}", pubkey);
        Ok(pubkey)
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, ProviderError> {
        self.sign(transaction)
    }

    async fn sign_and_send_transaction(&self, _transaction: Transaction) -> Result<Signature, ProviderError> {
        Err(ProviderError::Unsupported("signAndSendTransaction"))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
