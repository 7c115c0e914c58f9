//! Ledger RPC access.
//!
//! [`LedgerRpc`] is the narrow set of JSON-RPC calls the reclaimer needs. The
//! production implementation wraps the nonblocking Solana RPC client; tests
//! substitute the generated mock.

use async_trait::async_trait;
use serde_json::json;
use solana_account_decoder::UiAccountEncoding;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::RpcFilterType;
use solana_client::rpc_request::{RpcError, RpcRequest, TokenAccountsFilter};
use solana_client::rpc_response::RpcKeyedAccount;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never produced a ledger answer: connection, timeout, HTTP status.
    Transport,
    /// The node answered with an error.
    Application,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RpcFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RpcFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            status: None,
            message: message.into(),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Application,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_transport(&self) -> bool {
        self.kind == FailureKind::Transport
    }
}

impl From<ClientError> for RpcFailure {
    fn from(err: ClientError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ClientErrorKind::Reqwest(e) => {
                let failure = RpcFailure::transport(message);
                match e.status() {
                    Some(status) => failure.with_status(status.as_u16()),
                    None => failure,
                }
            }
            ClientErrorKind::Io(_) | ClientErrorKind::RpcError(RpcError::RpcRequestError(_)) => {
                RpcFailure::transport(message)
            }
            _ => RpcFailure::application(message),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcFailure>;

    async fn get_account_info(&self, pubkey: &Pubkey) -> Result<Option<Account>, RpcFailure>;

    /// `getProgramAccounts` with `jsonParsed` encoding.
    async fn get_parsed_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<RpcKeyedAccount>, RpcFailure>;

    /// `getTokenAccountsByOwner` for the SPL Token program, `jsonParsed` encoding.
    async fn get_parsed_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<RpcKeyedAccount>, RpcFailure>;

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcFailure>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcFailure>;

    /// `None` until the node has seen the signature at the configured commitment.
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcFailure>;
}

/// Builds one [`LedgerRpc`] per endpoint URL.
pub trait RpcConnector: Send + Sync {
    fn connect(&self, url: &str) -> Arc<dyn LedgerRpc>;
}

pub struct SolanaRpc {
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcFailure> {
        Ok(self.client.get_balance(pubkey).await?)
    }

    async fn get_account_info(&self, pubkey: &Pubkey) -> Result<Option<Account>, RpcFailure> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.client.commitment())
            .await?;
        Ok(response.value)
    }

    async fn get_parsed_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<RpcKeyedAccount>, RpcFailure> {
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::JsonParsed),
                commitment: Some(self.client.commitment()),
                ..Default::default()
            },
            ..Default::default()
        };

        // The typed helpers decode to binary accounts, so go through the raw request.
        let accounts = self
            .client
            .send(
                RpcRequest::GetProgramAccounts,
                json!([program_id.to_string(), config]),
            )
            .await?;
        Ok(accounts)
    }

    async fn get_parsed_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<RpcKeyedAccount>, RpcFailure> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await?;
        Ok(accounts)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcFailure> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcFailure> {
        Ok(self.client.send_transaction(transaction).await?)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcFailure> {
        Ok(self
            .client
            .get_signature_status_with_commitment(signature, self.client.commitment())
            .await?)
    }
}

pub struct SolanaConnector {
    commitment: CommitmentConfig,
}

impl SolanaConnector {
    pub fn new(commitment: CommitmentConfig) -> Self {
        Self { commitment }
    }
}

impl RpcConnector for SolanaConnector {
    fn connect(&self, url: &str) -> Arc<dyn LedgerRpc> {
        Arc::new(SolanaRpc::new(url, self.commitment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_response_is_application() {
        let err = ClientError::from(RpcError::RpcResponseError {
            code: -32002,
            message: "Transaction simulation failed".to_string(),
            data: solana_client::rpc_request::RpcResponseErrorData::Empty,
        });
        let failure = RpcFailure::from(err);
        assert_eq!(failure.kind, FailureKind::Application);
        assert!(failure.message.contains("Transaction simulation failed"));
    }

    #[test]
    fn test_request_error_is_transport() {
        let err = ClientError::from(RpcError::RpcRequestError("connection reset".to_string()));
        assert!(RpcFailure::from(err).is_transport());
    }

    #[test]
    fn test_io_error_is_transport() {
        let err = ClientError::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "operation timed out",
        ));
        assert!(RpcFailure::from(err).is_transport());
    }
}
