//! Ordered RPC endpoints with failover for reads.
//!
//! Every [`EndpointPool::execute`] call walks the endpoints from the top.
//! Nothing about earlier failures is remembered, so a recovered primary is
//! used again on the very next call. Submissions never go through here; they
//! use [`EndpointPool::primary`] only.

use crate::config::{Network, NetworkConfig};
use crate::error::{classify_status, ReclaimError};
use crate::rpc::client::{LedgerRpc, RpcConnector, RpcFailure};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub struct Endpoint {
    pub url: String,
    pub client: Arc<dyn LedgerRpc>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, client: Arc<dyn LedgerRpc>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

pub struct EndpointPool {
    network: Network,
    endpoints: Vec<Endpoint>,
}

impl EndpointPool {
    pub fn new(network: Network, endpoints: Vec<Endpoint>) -> Self {
        Self { network, endpoints }
    }

    /// Canonical URL first, then the network's fallbacks.
    pub fn for_network(network: Network, config: &NetworkConfig, connector: &dyn RpcConnector) -> Self {
        let endpoints = config
            .urls()
            .map(|url| Endpoint::new(url, connector.connect(url)))
            .collect();
        Self::new(network, endpoints)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.url.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The network's configured connection, used for anything that must not be
    /// repeated against a second node.
    pub fn primary(&self) -> Result<&Endpoint, ReclaimError> {
        self.endpoints
            .first()
            .ok_or_else(|| ReclaimError::AllEndpointsUnavailable {
                attempts: 0,
                last_error: format!("no endpoints configured for {}", self.network),
            })
    }

    /// Run a read against each endpoint in order until one answers.
    ///
    /// Transport failures move on to the next endpoint. An application error is
    /// the ledger's answer and is returned as is.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, ReclaimError>
    where
        F: Fn(Arc<dyn LedgerRpc>) -> Fut,
        Fut: Future<Output = Result<T, RpcFailure>>,
    {
        let mut last_error = format!("no endpoints configured for {}", self.network);

        for (attempt, endpoint) in self.endpoints.iter().enumerate() {
            match op(endpoint.client.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Served by fallback endpoint {} after {} failures", endpoint.url, attempt);
                    }
                    return Ok(value);
                }
                Err(failure) if failure.is_transport() => {
                    warn!("Endpoint {} unavailable: {}", endpoint.url, failure);
                    last_error = failure.message;
                }
                Err(failure) => {
                    debug!("Endpoint {} returned an error: {}", endpoint.url, failure);
                    return Err(classify_status(failure.status, &failure.message));
                }
            }
        }

        Err(ReclaimError::AllEndpointsUnavailable {
            attempts: self.endpoints.len(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::client::MockLedgerRpc;
    use solana_sdk::pubkey::Pubkey;

    fn endpoint(url: &str, mock: MockLedgerRpc) -> Endpoint {
        Endpoint::new(url, Arc::new(mock))
    }

    fn failing(times: usize) -> MockLedgerRpc {
        let mut mock = MockLedgerRpc::new();
        mock.expect_get_balance()
            .times(times)
            .returning(|_| Err(RpcFailure::transport("connection refused")));
        mock
    }

    fn answering(lamports: u64) -> MockLedgerRpc {
        let mut mock = MockLedgerRpc::new();
        mock.expect_get_balance()
            .times(1)
            .returning(move |_| Ok(lamports));
        mock
    }

    async fn balance(pool: &EndpointPool) -> Result<u64, ReclaimError> {
        let owner = Pubkey::new_unique();
        pool.execute(|rpc| async move { rpc.get_balance(&owner).await })
            .await
    }

    #[tokio::test]
    async fn test_fails_over_to_next_endpoint() {
        let pool = EndpointPool::new(
            Network::Mainnet,
            vec![endpoint("http://a", failing(1)), endpoint("http://b", answering(42))],
        );
        assert_eq!(balance(&pool).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_all_endpoints_fail() {
        let pool = EndpointPool::new(
            Network::Mainnet,
            vec![endpoint("http://a", failing(1)), endpoint("http://b", failing(1))],
        );
        match balance(&pool).await {
            Err(ReclaimError::AllEndpointsUnavailable { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "connection refused");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_call_starts_from_primary() {
        let mut primary = MockLedgerRpc::new();
        let mut calls = 0;
        primary.expect_get_balance().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(RpcFailure::transport("timed out"))
            } else {
                Ok(7)
            }
        });
        let mut fallback = MockLedgerRpc::new();
        fallback.expect_get_balance().times(1).returning(|_| Ok(9));

        let pool = EndpointPool::new(
            Network::Devnet,
            vec![endpoint("http://a", primary), endpoint("http://b", fallback)],
        );
        assert_eq!(balance(&pool).await.unwrap(), 9);
        assert_eq!(balance(&pool).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_application_error_is_not_retried() {
        let mut primary = MockLedgerRpc::new();
        primary
            .expect_get_balance()
            .times(1)
            .returning(|_| Err(RpcFailure::application("Invalid param: WrongSize")));
        // No expectations: any call on the fallback fails the test.
        let fallback = MockLedgerRpc::new();

        let pool = EndpointPool::new(
            Network::Mainnet,
            vec![endpoint("http://a", primary), endpoint("http://b", fallback)],
        );
        assert_eq!(
            balance(&pool).await,
            Err(ReclaimError::Unclassified("Invalid param: WrongSize".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = EndpointPool::new(Network::Testnet, Vec::new());
        assert!(pool.primary().is_err());
        assert!(matches!(
            balance(&pool).await,
            Err(ReclaimError::AllEndpointsUnavailable { attempts: 0, .. })
        ));
    }
}
