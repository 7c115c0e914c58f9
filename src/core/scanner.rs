use crate::error::ReclaimError;
use crate::rpc::EndpointPool;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::Deserialize;
use solana_account_decoder::UiAccountData;
use solana_client::rpc_filter::{Memcmp, MemcmpEncodedBytes, RpcFilterType};
use solana_client::rpc_response::RpcKeyedAccount;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Offset of the owner field in an SPL Token account.
pub const OWNER_OFFSET: usize = 32;

/// Size of an SPL Token account (165 bytes).
pub const TOKEN_ACCOUNT_LEN: usize = spl_token::state::Account::LEN;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenAccountRecord {
    pub account: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub lamports: u64,
    pub ui_amount: f64,
}

/// `parsed` payload of a `jsonParsed` SPL Token account.
#[derive(Debug, Deserialize)]
struct ParsedTokenAccount {
    #[serde(rename = "type")]
    kind: String,
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    mint: String,
    owner: String,
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAmount {
    ui_amount: Option<f64>,
    ui_amount_string: Option<String>,
}

pub struct Scanner;

impl Scanner {
    /// Ledger filters selecting token accounts whose owner field is `owner`.
    pub fn filters(owner: &Pubkey) -> Vec<RpcFilterType> {
        vec![
            RpcFilterType::DataSize(TOKEN_ACCOUNT_LEN as u64),
            RpcFilterType::Memcmp(Memcmp::new(
                OWNER_OFFSET,
                MemcmpEncodedBytes::Base58(owner.to_string()),
            )),
        ]
    }

    /// All token accounts owned by `owner`, in the order the ledger returned them.
    ///
    /// Matches that do not parse, or parse to another owner, are skipped.
    pub async fn scan(owner: &Pubkey, pool: &EndpointPool) -> Result<Vec<TokenAccountRecord>, ReclaimError> {
        let owner = *owner;
        let token_program = spl_token::id();

        let accounts = pool
            .execute(|rpc| async move {
                rpc.get_parsed_program_accounts(&token_program, Self::filters(&owner))
                    .await
            })
            .await
            .map_err(|e| match e {
                ReclaimError::AllEndpointsUnavailable { .. } => ReclaimError::ScanFailed(e.to_string()),
                other => other,
            })?;

        let records = Self::collect(&owner, &accounts);
        debug!(
            "Scan on {} matched {} accounts, {} usable",
            pool.network(),
            accounts.len(),
            records.len()
        );
        Ok(records)
    }

    /// Token accounts through `getTokenAccountsByOwner`.
    pub async fn token_accounts(owner: &Pubkey, pool: &EndpointPool) -> Result<Vec<TokenAccountRecord>, ReclaimError> {
        let owner = *owner;
        let accounts = pool
            .execute(|rpc| async move { rpc.get_parsed_token_accounts_by_owner(&owner).await })
            .await?;
        Ok(Self::collect(&owner, &accounts))
    }

    fn collect(owner: &Pubkey, accounts: &[RpcKeyedAccount]) -> Vec<TokenAccountRecord> {
        let mut records = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            match parse_record(keyed) {
                Ok(record) if record.owner == *owner => records.push(record),
                Ok(record) => {
                    warn!(
                        "Skipping {}: owned by {}, expected {}",
                        record.account, record.owner, owner
                    );
                }
                Err(e) => warn!("Skipping {}: {:#}", keyed.pubkey, e),
            }
        }
        records
    }
}

pub fn parse_record(keyed: &RpcKeyedAccount) -> Result<TokenAccountRecord> {
    let account = Pubkey::from_str(&keyed.pubkey).context("invalid account address")?;

    let parsed = match &keyed.account.data {
        UiAccountData::Json(parsed) => parsed,
        _ => return Err(anyhow!("account data is not jsonParsed")),
    };
    let token: ParsedTokenAccount =
        serde_json::from_value(parsed.parsed.clone()).context("unexpected token account layout")?;
    if token.kind != "account" {
        return Err(anyhow!("parsed type is {}, not a token account", token.kind));
    }

    let amount = &token.info.token_amount;
    let ui_amount = match (amount.ui_amount, amount.ui_amount_string.as_deref()) {
        (Some(value), _) => value,
        (None, Some(text)) => text.parse().context("invalid uiAmountString")?,
        (None, None) => return Err(anyhow!("missing token amount")),
    };

    Ok(TokenAccountRecord {
        account,
        mint: Pubkey::from_str(&token.info.mint).context("invalid mint")?,
        owner: Pubkey::from_str(&token.info.owner).context("invalid owner")?,
        lamports: keyed.account.lamports,
        ui_amount,
    })
}
