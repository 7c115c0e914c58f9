use crate::config::Network;
use crate::core::scanner::TokenAccountRecord;
use log::{debug, warn};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records eligible for reclamation: zero token balance, not whitelisted.
pub fn reclaimable(records: &[TokenAccountRecord], whitelist: &HashSet<Pubkey>) -> Vec<TokenAccountRecord> {
    records
        .iter()
        .filter(|r| r.ui_amount == 0.0 && !whitelist.contains(&r.account))
        .cloned()
        .collect()
}

/// Immutable copy of the set taken when a claim starts.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub network: Network,
    pub generation: u64,
    pub records: Vec<TokenAccountRecord>,
}

impl Snapshot {
    pub fn total_lamports(&self) -> u64 {
        self.records.iter().map(|r| r.lamports).sum()
    }
}

#[derive(Debug)]
struct Inner {
    network: Network,
    generation: u64,
    records: Vec<TokenAccountRecord>,
}

/// The abandoned accounts of the active network.
#[derive(Debug)]
pub struct AbandonedSet {
    whitelist: HashSet<Pubkey>,
    inner: Mutex<Inner>,
}

impl AbandonedSet {
    pub fn new(network: Network, whitelist: HashSet<Pubkey>) -> Self {
        Self {
            whitelist,
            inner: Mutex::new(Inner {
                network,
                generation: 0,
                records: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the set with the reclaimable subset of a scan of `network`.
    ///
    /// A scan that finished after the network changed is dropped and yields `None`.
    pub fn derive(&self, network: Network, records: &[TokenAccountRecord]) -> Option<Vec<TokenAccountRecord>> {
        let mut inner = self.lock();
        if inner.network != network {
            warn!(
                "Discarding {} scan results, active network is now {}",
                network, inner.network
            );
            return None;
        }

        let abandoned = reclaimable(records, &self.whitelist);
        inner.records = abandoned.clone();
        inner.generation += 1;
        debug!("{} abandoned accounts on {}", abandoned.len(), network);
        Some(abandoned)
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            network: inner.network,
            generation: inner.generation,
            records: inner.records.clone(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.records.clear();
        inner.generation += 1;
    }

    /// Empty the set and scope it to `network`.
    pub fn reset(&self, network: Network) {
        let mut inner = self.lock();
        inner.network = network;
        inner.records.clear();
        inner.generation += 1;
    }

    /// Drop the accounts a confirmed claim closed.
    ///
    /// If nothing touched the set since the snapshot this is [`clear`](Self::clear);
    /// otherwise only the snapshot's accounts are removed.
    pub fn complete_claim(&self, snapshot: &Snapshot) {
        let mut inner = self.lock();
        if inner.network != snapshot.network {
            return;
        }
        if inner.generation == snapshot.generation {
            inner.records.clear();
        } else {
            let claimed: HashSet<Pubkey> = snapshot.records.iter().map(|r| r.account).collect();
            inner.records.retain(|r| !claimed.contains(&r.account));
        }
        inner.generation += 1;
    }

    pub fn network(&self) -> Network {
        self.lock().network
    }

    pub fn records(&self) -> Vec<TokenAccountRecord> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}
