use crate::config::{ClaimConfig, ClaimStrategy};
use crate::core::abandoned::{AbandonedSet, Snapshot};
use crate::core::rate_limit::{Action, RateLimiter};
use crate::core::scanner::TokenAccountRecord;
use crate::error::{classify, classify_status, ReclaimError};
use crate::provider::WalletProvider;
use crate::rpc::{EndpointPool, LedgerRpc, RpcFailure};
use log::{debug, info, warn};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// What a claim needs from the session.
pub struct ClaimContext<'a> {
    pub owner: Pubkey,
    pub pool: &'a EndpointPool,
    pub provider: &'a dyn WalletProvider,
    pub limiter: &'a RateLimiter,
    pub abandoned: &'a AbandonedSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    pub signature: Signature,
    pub accounts: u64,
    pub lamports: u64,
}

/// An unsigned claim transaction and the accounts it covers.
#[derive(Debug, Clone)]
pub struct ClaimPreview {
    pub transaction: Transaction,
    pub snapshot: Snapshot,
}

pub struct ClaimBuilder {
    strategy: ClaimStrategy,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl ClaimBuilder {
    pub fn new(config: &ClaimConfig) -> Self {
        Self {
            strategy: config.strategy,
            confirm_timeout: config.confirm_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// One instruction per record, in record order, all paying out to `owner`.
    pub fn instructions(&self, records: &[TokenAccountRecord], owner: &Pubkey) -> Result<Vec<Instruction>, ReclaimError> {
        records
            .iter()
            .map(|record| match self.strategy {
                ClaimStrategy::Transfer => Ok(system_instruction::transfer(&record.account, owner, record.lamports)),
                ClaimStrategy::CloseAccount => {
                    spl_token::instruction::close_account(&spl_token::id(), &record.account, owner, owner, &[])
                        .map_err(|e| ReclaimError::Unclassified(e.to_string()))
                }
            })
            .collect()
    }

    fn take_snapshot(&self, ctx: &ClaimContext<'_>) -> Result<Snapshot, ReclaimError> {
        let snapshot = ctx.abandoned.snapshot();
        if snapshot.records.is_empty() {
            return Err(ReclaimError::NothingToClaim);
        }
        if snapshot.network != ctx.pool.network() {
            warn!(
                "Abandoned accounts belong to {}, session is on {}",
                snapshot.network,
                ctx.pool.network()
            );
            return Err(ReclaimError::NothingToClaim);
        }
        Ok(snapshot)
    }

    /// Build the claim transaction without signing or sending it.
    pub fn preview(&self, ctx: &ClaimContext<'_>) -> Result<ClaimPreview, ReclaimError> {
        let snapshot = self.take_snapshot(ctx)?;
        let instructions = self.instructions(&snapshot.records, &ctx.owner)?;
        Ok(ClaimPreview {
            transaction: Transaction::new_with_payer(&instructions, Some(&ctx.owner)),
            snapshot,
        })
    }

    /// Reclaim every account in the current abandoned set in one transaction.
    ///
    /// The set is only modified once the ledger confirms the transaction.
    pub async fn claim(&self, ctx: ClaimContext<'_>) -> Result<ClaimOutcome, ReclaimError> {
        let snapshot = self.take_snapshot(&ctx)?;
        ctx.limiter.check_and_mark(Action::Claim)?;

        let instructions = self.instructions(&snapshot.records, &ctx.owner)?;
        let blockhash = ctx
            .pool
            .execute(|rpc| async move { rpc.get_latest_blockhash().await })
            .await?;

        let mut transaction = Transaction::new_with_payer(&instructions, Some(&ctx.owner));
        transaction.message.recent_blockhash = blockhash;

        let signed = ctx
            .provider
            .sign_transaction(transaction)
            .await
            .map_err(|e| classify(&e.to_string()))?;

        let primary = ctx.pool.primary()?;
        info!(
            "Submitting claim of {} accounts ({} lamports) via {}",
            snapshot.records.len(),
            snapshot.total_lamports(),
            primary.url
        );
        let signature = submit_and_confirm(&*primary.client, &signed, self.confirm_timeout, self.poll_interval).await?;

        ctx.abandoned.complete_claim(&snapshot);
        info!("Claim confirmed: {}", signature);
        Ok(ClaimOutcome {
            signature,
            accounts: snapshot.records.len() as u64,
            lamports: snapshot.total_lamports(),
        })
    }
}

/// A submission the ledger answered is a rejection, whatever its text says.
fn submission_error(failure: RpcFailure) -> ReclaimError {
    if failure.is_transport() {
        classify_status(failure.status, &failure.message)
    } else {
        ReclaimError::TransactionRejected(failure.message)
    }
}

/// Send through exactly one connection and wait for it to confirm.
pub async fn submit_and_confirm(
    rpc: &dyn LedgerRpc,
    transaction: &Transaction,
    confirm_timeout: Duration,
    poll_interval: Duration,
) -> Result<Signature, ReclaimError> {
    let signature = rpc.send_transaction(transaction).await.map_err(submission_error)?;
    debug!("Sent {}, waiting for confirmation", signature);
    confirm(rpc, &signature, confirm_timeout, poll_interval).await?;
    Ok(signature)
}

pub async fn confirm(
    rpc: &dyn LedgerRpc,
    signature: &Signature,
    confirm_timeout: Duration,
    poll_interval: Duration,
) -> Result<(), ReclaimError> {
    let wait = async {
        loop {
            match rpc.get_signature_status(signature).await {
                Ok(Some(Ok(()))) => return Ok(()),
                Ok(Some(Err(e))) => return Err(ReclaimError::TransactionRejected(e.to_string())),
                Ok(None) => {}
                Err(e) => debug!("Status check for {} failed: {}", signature, e),
            }
            sleep(poll_interval).await;
        }
    };

    timeout(confirm_timeout, wait)
        .await
        .map_err(|_| ReclaimError::ConfirmationTimeout {
            signature: signature.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::provider::MockWalletProvider;
    use crate::rpc::client::MockLedgerRpc;
    use crate::rpc::Endpoint;
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::InstructionError;
    use solana_sdk::system_instruction::SystemInstruction;
    use solana_sdk::system_program;
    use solana_sdk::transaction::TransactionError;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn record(lamports: u64) -> TokenAccountRecord {
        TokenAccountRecord {
            account: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            lamports,
            ui_amount: 0.0,
        }
    }

    fn builder() -> ClaimBuilder {
        ClaimBuilder::new(&ClaimConfig::default())
    }

    fn signing_provider() -> MockWalletProvider {
        let mut provider = MockWalletProvider::new();
        provider.expect_sign_transaction().times(1).returning(Ok);
        provider
    }

    fn ledger(send: Result<Signature, RpcFailure>) -> MockLedgerRpc {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_get_latest_blockhash().returning(|| Ok(Hash::new_unique()));
        rpc.expect_send_transaction().times(1).return_once(move |_| send);
        rpc
    }

    #[test]
    fn test_transfer_instructions() {
        let owner = Pubkey::new_unique();
        let records = vec![record(2_039_280), record(1_000)];
        let instructions = builder().instructions(&records, &owner).unwrap();

        assert_eq!(instructions.len(), 2);
        for (ix, record) in instructions.iter().zip(&records) {
            assert_eq!(ix.program_id, system_program::id());
            assert_eq!(ix.accounts[0].pubkey, record.account);
            assert_eq!(ix.accounts[1].pubkey, owner);
            let decoded: SystemInstruction = bincode::deserialize(&ix.data).unwrap();
            assert_eq!(decoded, SystemInstruction::Transfer { lamports: record.lamports });
        }
    }

    #[test]
    fn test_close_account_instructions() {
        let config = ClaimConfig {
            strategy: ClaimStrategy::CloseAccount,
            ..ClaimConfig::default()
        };
        let owner = Pubkey::new_unique();
        let records = vec![record(2_039_280)];
        let instructions = ClaimBuilder::new(&config).instructions(&records, &owner).unwrap();
        assert_eq!(instructions[0].program_id, spl_token::id());
        assert_eq!(instructions[0].accounts[0].pubkey, records[0].account);
        assert_eq!(instructions[0].accounts[1].pubkey, owner);
    }

    #[tokio::test]
    async fn test_empty_set_makes_no_calls() {
        let pool = EndpointPool::new(
            Network::Mainnet,
            vec![Endpoint::new("http://a", Arc::new(MockLedgerRpc::new()))],
        );
        let provider = MockWalletProvider::new();
        let limiter = RateLimiter::new();
        let abandoned = AbandonedSet::new(Network::Mainnet, HashSet::new());

        let result = builder()
            .claim(ClaimContext {
                owner: Pubkey::new_unique(),
                pool: &pool,
                provider: &provider,
                limiter: &limiter,
                abandoned: &abandoned,
            })
            .await;
        assert_eq!(result, Err(ReclaimError::NothingToClaim));
        assert!(limiter.check_and_mark(Action::Claim).is_ok());
    }

    #[tokio::test]
    async fn test_claim_clears_set_on_confirmation() {
        let owner = Pubkey::new_unique();
        let signature = Signature::new_unique();
        let records = vec![record(2_039_280), record(2_039_280), record(5_000)];

        let mut rpc = ledger(Ok(signature));
        rpc.expect_get_signature_status().returning(|_| Ok(Some(Ok(()))));
        let pool = EndpointPool::new(Network::Mainnet, vec![Endpoint::new("http://a", Arc::new(rpc))]);
        let provider = signing_provider();
        let limiter = RateLimiter::new();
        let abandoned = AbandonedSet::new(Network::Mainnet, HashSet::new());
        abandoned.derive(Network::Mainnet, &records);

        let outcome = builder()
            .claim(ClaimContext {
                owner,
                pool: &pool,
                provider: &provider,
                limiter: &limiter,
                abandoned: &abandoned,
            })
            .await
            .unwrap();

        assert_eq!(outcome.signature, signature);
        assert_eq!(outcome.accounts, 3);
        assert_eq!(outcome.lamports, 4_083_560);
        assert!(abandoned.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_batch_leaves_set_intact() {
        let records = vec![record(2_039_280), record(2_039_280)];
        let rpc = ledger(Err(RpcFailure::application(
            "RPC response error -32602: base64 encoded solana_sdk::transaction::versioned::VersionedTransaction too large",
        )));
        let pool = EndpointPool::new(Network::Mainnet, vec![Endpoint::new("http://a", Arc::new(rpc))]);
        let provider = signing_provider();
        let limiter = RateLimiter::new();
        let abandoned = AbandonedSet::new(Network::Mainnet, HashSet::new());
        abandoned.derive(Network::Mainnet, &records);

        let result = builder()
            .claim(ClaimContext {
                owner: Pubkey::new_unique(),
                pool: &pool,
                provider: &provider,
                limiter: &limiter,
                abandoned: &abandoned,
            })
            .await;

        assert!(matches!(result, Err(ReclaimError::TransactionRejected(_))));
        assert_eq!(abandoned.records(), records);
    }

    #[tokio::test]
    async fn test_failed_transaction_status_is_rejection() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_get_signature_status()
            .returning(|_| Ok(Some(Err(TransactionError::InstructionError(0, InstructionError::Custom(1))))));
        let result = confirm(
            &rpc,
            &Signature::new_unique(),
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(ReclaimError::TransactionRejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout() {
        let signature = Signature::new_unique();
        let mut rpc = MockLedgerRpc::new();
        let mut polls = 0;
        rpc.expect_get_signature_status().returning(move |_| {
            polls += 1;
            if polls % 2 == 0 {
                Err(RpcFailure::transport("connection reset"))
            } else {
                Ok(None)
            }
        });

        let result = confirm(&rpc, &signature, Duration::from_secs(30), Duration::from_millis(500)).await;
        assert_eq!(
            result,
            Err(ReclaimError::ConfirmationTimeout {
                signature: signature.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_simulation_failure_with_digits_is_rejection() {
        let message = "RPC response error -32002: Transaction simulation failed: \
                       Error processing Instruction 0: insufficient lamports 1403, need 2039280";
        let rpc = ledger(Err(RpcFailure::application(message)));
        let tx = Transaction::default();
        let result = submit_and_confirm(&rpc, &tx, Duration::from_secs(1), Duration::from_millis(10)).await;
        assert_eq!(result, Err(ReclaimError::TransactionRejected(message.to_string())));
        assert!(!result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_application_error_never_reads_as_access_denied() {
        let rpc = ledger(Err(RpcFailure::application("Program log: status 403 from oracle")));
        let tx = Transaction::default();
        let result = submit_and_confirm(&rpc, &tx, Duration::from_secs(1), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ReclaimError::TransactionRejected(_))));
    }

    #[tokio::test]
    async fn test_forbidden_submission() {
        let rpc = ledger(Err(RpcFailure::transport("HTTP status client error (403 Forbidden)").with_status(403)));
        let tx = Transaction::default();
        let result = submit_and_confirm(&rpc, &tx, Duration::from_secs(1), Duration::from_millis(10)).await;
        assert_eq!(result, Err(ReclaimError::NetworkAccessDenied));
    }
}
