//! The connected wallet and everything scoped to it.

use crate::backend::{decode_transaction, ClaimRequest, ClaimService};
use crate::config::{Config, Network};
use crate::core::abandoned::AbandonedSet;
use crate::core::rate_limit::{Action, RateLimiter};
use crate::core::reclaimer::{submit_and_confirm, ClaimBuilder, ClaimContext, ClaimOutcome, ClaimPreview};
use crate::core::scanner::{Scanner, TokenAccountRecord};
use crate::error::{classify, ReclaimError};
use crate::provider::{ProviderEvent, ProviderKind, WalletProvider};
use crate::rpc::{EndpointPool, RpcConnector};
use crate::state::ReclaimStats;
use log::{info, warn};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub type SharedSession = Arc<WalletSession>;

#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub balance_lamports: u64,
    pub token_accounts: Vec<TokenAccountRecord>,
    pub abandoned: Vec<TokenAccountRecord>,
}

struct Connection {
    public_key: Option<Pubkey>,
    endpoints: Arc<EndpointPool>,
}

pub struct WalletSession {
    config: Config,
    provider: Box<dyn WalletProvider>,
    connector: Arc<dyn RpcConnector>,
    claim_service: Option<Arc<dyn ClaimService>>,
    connection: RwLock<Connection>,
    rate_limiter: RateLimiter,
    abandoned: AbandonedSet,
    claims: ClaimBuilder,
    stats: Mutex<ReclaimStats>,
}

impl WalletSession {
    pub fn new(
        config: Config,
        provider: Box<dyn WalletProvider>,
        connector: Arc<dyn RpcConnector>,
    ) -> anyhow::Result<Self> {
        let network = config.solana.network;
        let endpoints = EndpointPool::for_network(network, config.networks.get(network), connector.as_ref());
        let abandoned = AbandonedSet::new(network, config.whitelist()?);
        let claims = ClaimBuilder::new(&config.claim);

        Ok(Self {
            config,
            provider,
            connector,
            claim_service: None,
            connection: RwLock::new(Connection {
                public_key: None,
                endpoints: Arc::new(endpoints),
            }),
            rate_limiter: RateLimiter::new(),
            abandoned,
            claims,
            stats: Mutex::new(ReclaimStats::new()),
        })
    }

    pub fn with_claim_service(mut self, service: Arc<dyn ClaimService>) -> Self {
        self.claim_service = Some(service);
        self
    }

    fn connection(&self) -> std::sync::RwLockReadGuard<'_, Connection> {
        self.connection.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_mut(&self) -> MutexGuard<'_, ReclaimStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn public_key(&self) -> Option<Pubkey> {
        self.connection().public_key
    }

    pub fn network(&self) -> Network {
        self.connection().endpoints.network()
    }

    pub fn endpoints(&self) -> Arc<EndpointPool> {
        self.connection().endpoints.clone()
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn abandoned(&self) -> &AbandonedSet {
        &self.abandoned
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn stats(&self) -> ReclaimStats {
        self.stats_mut().clone()
    }

    /// Owner key and the endpoints of the active network, read together.
    fn connected(&self) -> Result<(Pubkey, Arc<EndpointPool>), ReclaimError> {
        let connection = self.connection();
        let owner = connection.public_key.ok_or(ReclaimError::WalletNotConnected)?;
        Ok((owner, connection.endpoints.clone()))
    }

    /// Connect the provider, then scan for abandoned accounts and summarize.
    pub async fn connect(&self) -> Result<AccountSummary, ReclaimError> {
        self.rate_limiter.check_and_mark(Action::Connect)?;
        let public_key = self
            .provider
            .connect()
            .await
            .map_err(|e| classify(&e.to_string()))?;

        self.connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .public_key = Some(public_key);
        info!(
            "Connected {} wallet {} on {}",
            self.provider.kind(),
            public_key,
            self.network()
        );

        self.scan_abandoned().await?;
        self.account_info().await
    }

    pub async fn account_info(&self) -> Result<AccountSummary, ReclaimError> {
        let (owner, pool) = self.connected()?;
        let account = pool
            .execute(|rpc| async move { rpc.get_account_info(&owner).await })
            .await?;
        let token_accounts = Scanner::token_accounts(&owner, &pool).await?;

        Ok(AccountSummary {
            balance_lamports: account.map(|a| a.lamports).unwrap_or(0),
            token_accounts,
            abandoned: self.abandoned.records(),
        })
    }

    /// Native balance through the failover pool.
    pub async fn check_balance(&self) -> Result<u64, ReclaimError> {
        let (owner, pool) = self.connected()?;
        pool.execute(|rpc| async move { rpc.get_balance(&owner).await })
            .await
    }

    pub async fn scan_abandoned(&self) -> Result<Vec<TokenAccountRecord>, ReclaimError> {
        let (owner, pool) = self.connected()?;
        let records = Scanner::scan(&owner, &pool).await?;
        let abandoned = self.abandoned.derive(pool.network(), &records).ok_or_else(|| {
            warn!("Network changed to {} while scanning {}", self.network(), pool.network());
            ReclaimError::ScanFailed(format!("network changed during scan of {}", pool.network()))
        })?;
        self.stats_mut().record_scan();
        if !abandoned.is_empty() {
            info!(
                "Found {} abandoned accounts holding {} lamports",
                abandoned.len(),
                abandoned.iter().map(|r| r.lamports).sum::<u64>()
            );
        }
        Ok(abandoned)
    }

    pub fn preview_claim(&self) -> Result<ClaimPreview, ReclaimError> {
        let (owner, pool) = self.connected()?;
        self.claims.preview(&ClaimContext {
            owner,
            pool: &pool,
            provider: self.provider.as_ref(),
            limiter: &self.rate_limiter,
            abandoned: &self.abandoned,
        })
    }

    pub async fn claim_abandoned(&self) -> Result<ClaimOutcome, ReclaimError> {
        let (owner, pool) = self.connected()?;
        let outcome = self
            .claims
            .claim(ClaimContext {
                owner,
                pool: &pool,
                provider: self.provider.as_ref(),
                limiter: &self.rate_limiter,
                abandoned: &self.abandoned,
            })
            .await?;
        self.stats_mut().record_claim(outcome.accounts, outcome.lamports);
        Ok(outcome)
    }

    /// Sign and submit a claim transaction prepared by the claim service.
    pub async fn claim_sol(&self, amount: u64) -> Result<Signature, ReclaimError> {
        let (owner, pool) = self.connected()?;
        let service = self
            .claim_service
            .as_ref()
            .ok_or_else(|| ReclaimError::ClaimRequestFailed("no claim service configured".to_string()))?;
        self.rate_limiter.check_and_mark(Action::Claim)?;

        let request = ClaimRequest {
            wallet: owner.to_string(),
            amount,
            network: pool.network(),
        };
        let transaction = decode_transaction(&service.request_claim(&request).await?)?;
        let signed = self
            .provider
            .sign_transaction(transaction)
            .await
            .map_err(|e| classify(&e.to_string()))?;

        let primary = pool.primary()?;
        submit_and_confirm(
            &*primary.client,
            &signed,
            self.config.claim.confirm_timeout(),
            self.config.claim.poll_interval(),
        )
        .await
    }

    /// Point the session at another network. Abandoned accounts never carry over.
    pub fn switch_network(&self, network: Network) {
        let endpoints = EndpointPool::for_network(
            network,
            self.config.networks.get(network),
            self.connector.as_ref(),
        );
        self.connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .endpoints = Arc::new(endpoints);
        self.abandoned.reset(network);
        info!("Switched to {}", network);
    }
}

/// Follow the provider's network changes for as long as it publishes them.
pub fn spawn_network_listener(session: SharedSession) -> JoinHandle<()> {
    let mut events = session.provider.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ProviderEvent::NetworkChanged(network)) => session.switch_network(network),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} provider events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
