use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use colored::Colorize;
use rand::Rng;
use serde_json::json;
use tracing::warn;
use vault_chain::{build_block, quit_channel, sign_block, Blockchain, QuitHandle};
use vault_crypto::{fingerprint_file, SigningKey, VerifyingKey};
use vault_history::HistoryDb;
use vault_repair::{
    corrupt_db_path, CorruptionChecker, Recovery, RepairConfig, RepairError, ScanReport,
    StoreDoctor, Verdict,
};
use vault_store::{Store, StoreOptions};
use vault_types::{Address, Transaction};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Check(args) => {
            let config = load_config(cli.config.as_deref(), &args)?;
            cmd_check(args, config, format).await
        }
        Command::Repair(args) => {
            let config = load_config(cli.config.as_deref(), &args)?;
            cmd_repair(args, config, format).await
        }
        Command::Fingerprint(args) => cmd_fingerprint(args, format),
        Command::InitDemo(args) => cmd_init_demo(args, format),
    }
}

fn load_config(path: Option<&std::path::Path>, args: &CheckArgs) -> anyhow::Result<RepairConfig> {
    let mut config = match path {
        Some(path) => RepairConfig::load(path)?,
        None => RepairConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.verify_workers = workers;
    }
    if args.exhaustive {
        config.exhaustive_scan = true;
    }
    if let Some(timeout) = args.timeout_ms {
        config.open_timeout_ms = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn parse_pubkey(hex: &str) -> anyhow::Result<VerifyingKey> {
    VerifyingKey::from_hex(hex).context("--pubkey must be a 64-character hex Ed25519 key")
}

/// Raise quit on Ctrl-C so long walks stop at the next block.
fn quit_on_ctrl_c(handle: QuitHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight blocks");
            handle.raise();
        }
    });
}

async fn cmd_check(args: CheckArgs, config: RepairConfig, format: OutputFormat) -> anyhow::Result<()> {
    let pubkey = parse_pubkey(&args.pubkey)?;
    let options = StoreOptions {
        read_only: true,
        ..config.store_options()
    };
    let store = Store::open(&args.db, options)
        .with_context(|| format!("failed to open {}", args.db.display()))?;
    let checker = CorruptionChecker::new(pubkey, config.checker_config());
    let (handle, quit) = quit_channel();
    quit_on_ctrl_c(handle);

    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<ScanReport> {
        let report = checker.scan(&store, &quit)?;
        store.close()?;
        Ok(report)
    })
    .await??;

    print_scan(&args, &report, format);
    if !report.verdict.is_healthy() {
        bail!("store is not healthy ({})", report.verdict.label());
    }
    Ok(())
}

fn print_scan(args: &CheckArgs, report: &ScanReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let value = json!({
                "path": args.db.display().to_string(),
                "verdict": report.verdict.label(),
                "detail": report.verdict.to_string(),
                "head": report.head,
                "verified": report.verified,
                "faults": report.faults,
                "fault_seq": report.fault_seq,
            });
            println!("{value}");
        }
        OutputFormat::Text => {
            println!("Store {}", args.db.display().to_string().bold());
            match report.head {
                Some(head) => println!("  Head: {}", head.to_string().cyan()),
                None => println!("  Head: {}", "empty".dimmed()),
            }
            println!("  Verified: {} blocks", report.verified.to_string().bold());
            if !report.faults.is_empty() {
                let faults: Vec<String> = report.faults.iter().map(u64::to_string).collect();
                println!("  Faulty blocks: {}", faults.join(", ").red());
            }
            println!("  Verdict: {}", verdict_colored(&report.verdict));
        }
    }
}

fn verdict_colored(verdict: &Verdict) -> colored::ColoredString {
    let text = verdict.to_string();
    match verdict {
        Verdict::Healthy => format!("✓ {text}").green().bold(),
        Verdict::Interrupted => text.yellow(),
        Verdict::Repairable(_) => text.yellow().bold(),
        Verdict::Fatal(_) | Verdict::Error(_) => format!("✗ {text}").red().bold(),
    }
}

async fn cmd_repair(args: CheckArgs, config: RepairConfig, format: OutputFormat) -> anyhow::Result<()> {
    let pubkey = parse_pubkey(&args.pubkey)?;
    let store = Store::open(&args.db, config.store_options())
        .with_context(|| format!("failed to open {}", args.db.display()))?;
    let doctor = StoreDoctor::from_config(pubkey, &config);
    let (handle, quit) = quit_channel();
    quit_on_ctrl_c(handle);

    let recovery = match doctor.spawn(store, quit)?.outcome().await {
        Ok(recovery) => recovery,
        Err(mut failure) => {
            if let Some(store) = failure.store.take() {
                store.close()?;
            }
            return Err(failure.into());
        }
    };
    print_recovery(&args, &recovery, format);
    let complete = recovery.is_complete();
    let state = recovery.state;
    recovery.store.close()?;
    if !complete {
        bail!("repair did not finish (stopped in state {state})");
    }
    Ok(())
}

fn print_recovery(args: &CheckArgs, recovery: &Recovery, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let transitions: Vec<&str> = recovery.transitions.iter().map(|s| s.as_str()).collect();
            let value = json!({
                "path": args.db.display().to_string(),
                "state": recovery.state.as_str(),
                "transitions": transitions,
                "verdict": recovery.verdict.label(),
                "detail": recovery.verdict.to_string(),
                "faults": recovery.faults,
                "rebuild": recovery.rebuild.map(|r| json!({
                    "head": r.head,
                    "indexed": r.indexed,
                    "complete": r.complete,
                })),
                "quarantine_path": recovery.quarantine_path.as_ref().map(|p| p.display().to_string()),
            });
            println!("{value}");
        }
        OutputFormat::Text => {
            let path = args.db.display().to_string();
            println!("Store {}", path.bold());
            println!("  Verdict: {}", verdict_colored(&recovery.verdict));
            let transitions: Vec<&str> = recovery.transitions.iter().map(|s| s.as_str()).collect();
            println!("  Lifecycle: {}", transitions.join(" → ").cyan());
            if let Some(rebuild) = recovery.rebuild {
                let status = if rebuild.complete {
                    "complete".green()
                } else {
                    "partial".yellow()
                };
                println!(
                    "  Rebuilt history index: {}/{} blocks ({status})",
                    rebuild.indexed,
                    rebuild.head + 1
                );
            }
            if let Some(moved) = &recovery.quarantine_path {
                println!(
                    "  {} Corrupted store moved to {}",
                    "!".red().bold(),
                    moved.display().to_string().yellow()
                );
                println!("  A fresh, empty store is now at {path}; the chain must be resynced.");
            }
        }
    }
}

fn cmd_fingerprint(args: FingerprintArgs, format: OutputFormat) -> anyhow::Result<()> {
    let fingerprint = fingerprint_file(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let target = corrupt_db_path(&args.file)?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "file": args.file.display().to_string(),
                "fingerprint": fingerprint,
                "quarantine_path": target.display().to_string(),
            })
        ),
        OutputFormat::Text => {
            println!("Fingerprint: {}", fingerprint.yellow().bold());
            println!("Quarantine path: {}", target.display());
        }
    }
    Ok(())
}

fn cmd_init_demo(args: InitDemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.db.exists() {
        bail!("{} already exists", args.db.display());
    }
    let key = SigningKey::generate();
    let chain = Blockchain::new(key.verifying_key());
    let store = Store::open(&args.db, StoreOptions::default())?;

    let mut rng = rand::thread_rng();
    let accounts: Vec<Address> = (0..8).map(|_| Address::from_raw(rng.gen())).collect();
    let start = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64;

    store.update("init_demo", |tx| {
        let mut prev = None;
        for seq in 0..args.blocks {
            let txns = rng.gen_range(0..=args.max_txns);
            let body: Vec<Transaction> = (0..txns)
                .map(|i| Transaction {
                    from: accounts[rng.gen_range(0..accounts.len())],
                    to: accounts[rng.gen_range(0..accounts.len())],
                    amount: rng.gen_range(1..1_000),
                    nonce: seq * 1_000 + i,
                })
                .collect();
            let block = build_block(prev.as_ref(), body, start + seq * 1_000);
            chain.append_block(tx, &sign_block(&key, block.clone()))?;
            HistoryDb::parse_block(tx, &block)?;
            prev = Some(block.header);
        }
        Ok::<_, RepairError>(())
    })?;
    store.close()?;

    let pubkey = key.verifying_key().to_hex();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "path": args.db.display().to_string(),
                "blocks": args.blocks,
                "pubkey": pubkey,
            })
        ),
        OutputFormat::Text => {
            println!(
                "{} Created {} with {} blocks",
                "✓".green().bold(),
                args.db.display().to_string().bold(),
                args.blocks
            );
            println!("  Chain key: {}", pubkey.cyan());
        }
    }
    Ok(())
}
