use crate::config::Network;
use crate::core::scanner::TokenAccountRecord;
use crate::session::AccountSummary;
use crate::state::ReclaimStats;
use clap::{Parser, Subcommand};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use std::fmt::Write;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the configured network
    #[arg(short, long)]
    pub network: Option<Network>,

    /// Override the configured keypair file
    #[arg(short, long)]
    pub keypair: Option<String>,

    /// Build claims without signing or sending them
    #[arg(short, long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List wallet providers available on this host
    Wallets,
    /// Connect and show balance, token accounts and abandoned accounts
    Info,
    /// Show the native balance
    Balance,
    /// Scan for abandoned token accounts
    Scan,
    /// Reclaim rent from every abandoned account in one transaction
    Claim,
    /// Request, sign and submit a transaction from the claim service
    ClaimSol {
        /// Amount in SOL
        amount: f64,
    },
    /// Rescan periodically, optionally claiming what is found
    Watch {
        /// Seconds between scans, defaults to the configured interval
        #[arg(long)]
        interval_secs: Option<u64>,

        #[arg(long)]
        auto_claim: bool,
    },
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> anyhow::Result<u64> {
    if !sol.is_finite() || sol <= 0.0 {
        anyhow::bail!("Amount must be a positive number of SOL, got {}", sol);
    }
    Ok((sol * LAMPORTS_PER_SOL as f64).round() as u64)
}

pub fn format_records(records: &[TokenAccountRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "  {}  mint {}  {} tokens  {:.9} SOL",
            record.account,
            record.mint,
            record.ui_amount,
            lamports_to_sol(record.lamports)
        );
    }
    out
}

pub fn format_summary(summary: &AccountSummary) -> String {
    let reclaimable: u64 = summary.abandoned.iter().map(|r| r.lamports).sum();
    let mut out = format!(
        "Balance: {:.9} SOL\nToken accounts: {}\nAbandoned: {} ({:.9} SOL reclaimable)\n",
        lamports_to_sol(summary.balance_lamports),
        summary.token_accounts.len(),
        summary.abandoned.len(),
        lamports_to_sol(reclaimable)
    );
    out.push_str(&format_records(&summary.abandoned));
    out
}

pub fn format_stats(stats: &ReclaimStats, dry_run: bool) -> String {
    format!(
        "Stats:\n- Total Reclaimed: {} SOL\n- Accounts Closed: {}\n- Uptime: {:?}\n- Dry Run: {}",
        lamports_to_sol(stats.total_reclaimed_lamports),
        stats.total_accounts_closed,
        stats.start_time.elapsed(),
        dry_run
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    #[test]
    fn test_parse_claim_sol() {
        let args = Args::try_parse_from(["rent-reclaimer", "--network", "devnet", "claim-sol", "0.5"]).unwrap();
        assert_eq!(args.network, Some(Network::Devnet));
        assert_eq!(args.command, Command::ClaimSol { amount: 0.5 });
    }

    #[test]
    fn test_parse_watch() {
        let args = Args::try_parse_from(["rent-reclaimer", "-d", "watch", "--auto-claim"]).unwrap();
        assert!(args.dry_run);
        assert_eq!(
            args.command,
            Command::Watch {
                interval_secs: None,
                auto_claim: true
            }
        );
    }

    #[test]
    fn test_sol_conversion() {
        assert_eq!(sol_to_lamports(1.5).unwrap(), 1_500_000_000);
        assert_eq!(sol_to_lamports(0.002039280).unwrap(), 2_039_280);
        assert!(sol_to_lamports(0.0).is_err());
        assert!(sol_to_lamports(f64::NAN).is_err());
        assert_eq!(lamports_to_sol(2_039_280), 0.00203928);
    }

    #[test]
    fn test_summary_totals_abandoned_rent() {
        let record = TokenAccountRecord {
            account: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            lamports: 2_039_280,
            ui_amount: 0.0,
        };
        let summary = AccountSummary {
            balance_lamports: LAMPORTS_PER_SOL,
            token_accounts: vec![record.clone()],
            abandoned: vec![record.clone(), record],
        };
        let text = format_summary(&summary);
        assert!(text.contains("Balance: 1.000000000 SOL"));
        assert!(text.contains("Abandoned: 2 (0.004078560 SOL reclaimable)"));
    }
}
