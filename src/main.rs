use clap::Parser;
use log::{error, info, warn};
use rent_reclaimer::backend::HttpClaimService;
use rent_reclaimer::cli::{self, Args, Command};
use rent_reclaimer::config::Config;
use rent_reclaimer::provider::{KeypairProvider, ProviderKind, ProviderRegistry};
use rent_reclaimer::rpc::SolanaConnector;
use rent_reclaimer::session::{spawn_network_listener, SharedSession, WalletSession};
use rent_reclaimer::ReclaimError;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const WATCH_TICK: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting rent-reclaimer...");

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(network) = args.network {
        config.solana.network = network;
    }
    if let Some(keypair) = &args.keypair {
        config.solana.keypair_path = keypair.clone();
    }
    if args.dry_run {
        config.settings.dry_run = true;
    }

    let connector = Arc::new(SolanaConnector::new(config.commitment()?));
    let mut registry = ProviderRegistry::new();
    if config.solana.keypair_path.is_empty() {
        warn!("No keypair path configured, the local keypair wallet is unavailable");
    } else {
        match KeypairProvider::from_file(config.keypair_path()) {
            Ok(provider) => registry.register(Box::new(provider)),
            Err(e) => warn!("Local keypair wallet unavailable: {:#}", e),
        }
    }

    if args.command == Command::Wallets {
        let detected = registry.detect();
        if detected.is_empty() {
            println!("No wallet providers found");
        }
        for kind in detected {
            println!("{}", kind);
        }
        return Ok(());
    }

    let provider = registry
        .take(ProviderKind::LocalKeypair)
        .ok_or_else(|| anyhow::anyhow!("No wallet provider available, pass --keypair"))?;

    let mut session = WalletSession::new(config.clone(), provider, connector)?;
    if let Some(url) = &config.claim.service_url {
        session = session.with_claim_service(Arc::new(HttpClaimService::new(url)?));
    }
    let session: SharedSession = Arc::new(session);
    let listener = spawn_network_listener(session.clone());

    let result = run(args.command, &session, &config).await;
    listener.abort();
    result
}

async fn run(command: Command, session: &SharedSession, config: &Config) -> anyhow::Result<()> {
    let summary = session.connect().await?;
    let dry_run = config.settings.dry_run;

    match command {
        Command::Wallets => {}
        Command::Info => {
            println!("Wallet: {} ({})", display_key(session), session.network());
            print!("{}", cli::format_summary(&summary));
        }
        Command::Balance => {
            let lamports = session.check_balance().await?;
            println!("{:.9} SOL", cli::lamports_to_sol(lamports));
        }
        Command::Scan => {
            println!("Found {} abandoned accounts", summary.abandoned.len());
            print!("{}", cli::format_records(&summary.abandoned));
        }
        Command::Claim => {
            if dry_run {
                let preview = session.preview_claim()?;
                println!(
                    "Dry run: would reclaim {:.9} SOL from {} accounts in {} instructions",
                    cli::lamports_to_sol(preview.snapshot.total_lamports()),
                    preview.snapshot.records.len(),
                    preview.transaction.message.instructions.len()
                );
            } else {
                let outcome = session.claim_abandoned().await?;
                println!(
                    "Reclaimed {:.9} SOL from {} accounts: {}",
                    cli::lamports_to_sol(outcome.lamports),
                    outcome.accounts,
                    outcome.signature
                );
            }
        }
        Command::ClaimSol { amount } => {
            let lamports = cli::sol_to_lamports(amount)?;
            if dry_run {
                println!("Dry run: would request a claim of {} lamports", lamports);
            } else {
                let signature = session.claim_sol(lamports).await?;
                println!("Claim confirmed: {}", signature);
            }
        }
        Command::Watch {
            interval_secs,
            auto_claim,
        } => {
            let interval = Duration::from_secs(interval_secs.unwrap_or(config.settings.scan_interval_secs));
            watch_loop(session, interval, auto_claim, dry_run).await;
        }
    }

    Ok(())
}

fn display_key(session: &SharedSession) -> String {
    session
        .public_key()
        .map(|key| key.to_string())
        .unwrap_or_default()
}

async fn watch_loop(session: &SharedSession, interval: Duration, auto_claim: bool, dry_run: bool) {
    let auto_claim = auto_claim && !dry_run;
    info!("Watching every {:?} (auto-claim: {})", interval, auto_claim);
    loop {
        if session.stats().scan_due(interval) {
            info!("Starting scan...");
            match session.scan_abandoned().await {
                Ok(found) if auto_claim && !found.is_empty() => match session.claim_abandoned().await {
                    Ok(outcome) => info!(
                        "Reclaim cycle complete. Reclaimed {} accounts ({} lamports).",
                        outcome.accounts, outcome.lamports
                    ),
                    Err(e @ ReclaimError::RateLimited { .. }) => warn!("{}", e),
                    Err(e) => error!("Reclaim error: {}", e),
                },
                Ok(found) => info!("Found {} reclaimable accounts", found.len()),
                Err(e) => error!("Scanner error: {}", e),
            }
            info!("{}", cli::format_stats(&session.stats(), dry_run));
        }

        sleep(WATCH_TICK.min(interval)).await;
    }
}
