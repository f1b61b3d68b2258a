//! dnspod-ddns - keep DNSPod records pointed at this machine's public IP.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dnspod_ddns::config::{Config, Schedule, CONFIG_FILE_NAME};
use dnspod_ddns::detector::{IpDetector, IpSource};
use dnspod_ddns::providers::{create_provider, RecordLookup, RecordType};
use dnspod_ddns::reconciler::{CycleOutcome, Reconciler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dnspod-ddns")]
#[command(about = "Keep DNSPod records pointed at this machine's public IP")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation loop until interrupted (default)
    Run {
        /// Check interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run one independent task per domain
        #[arg(long)]
        per_domain: bool,
    },

    /// Run a single reconciliation cycle
    Update {
        /// Update even if IP hasn't changed
        #[arg(short, long)]
        force: bool,
    },

    /// Show current public IP and published records
    Status,

    /// Validate configuration and credentials
    Validate,

    /// Write an example configuration file
    Init {
        /// Where to write it (default: ./config.json)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        overwrite: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load_from(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn build_reconciler(config: Config) -> anyhow::Result<Reconciler> {
    let detector = IpDetector::new(config.ip_services.clone(), config.http.timeout())?;
    let provider = create_provider(&config)?;
    Ok(Reconciler::new(Arc::new(config), Arc::new(detector), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let command = cli.command.unwrap_or(Commands::Run {
        interval: None,
        per_domain: false,
    });

    match command {
        Commands::Run {
            interval,
            per_domain,
        } => {
            let mut config = load_config(&config_path)?;
            if let Some(secs) = interval {
                config.check_interval_secs = secs;
            }
            if per_domain {
                config.schedule = Schedule::PerDomain;
            }
            config.validate()?;
            cmd_run(config).await?;
        }
        Commands::Update { force } => {
            cmd_update(load_config(&config_path)?, force).await?;
        }
        Commands::Status => {
            cmd_status(load_config(&config_path)?).await?;
        }
        Commands::Validate => {
            cmd_validate(&config_path).await?;
        }
        Commands::Init { path, overwrite } => {
            cmd_init(path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)), overwrite)?;
        }
    }

    Ok(())
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let reconciler = Arc::new(build_reconciler(config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn cmd_update(config: Config, force: bool) -> anyhow::Result<()> {
    let reconciler = build_reconciler(config)?;

    for report in reconciler.run_once(force).await {
        let line = match report.outcome {
            CycleOutcome::Unchanged { ip } => format!("skipped (IP unchanged: {})", ip),
            CycleOutcome::Updated {
                from: Some(prev),
                to,
            } => format!("OK ({} -> {})", prev, to),
            CycleOutcome::Updated { from: None, to } => format!("OK ({})", to),
            CycleOutcome::Created { ip } => format!("created ({})", ip),
            CycleOutcome::UpdateFailed { reason } => format!("FAILED: {}", reason),
            CycleOutcome::Skipped(reason) => format!("skipped ({:?})", reason),
        };
        println!(
            "[{}] {}: {}",
            report.checked_at.format("%Y-%m-%d %H:%M:%S"),
            report.domain,
            line
        );
    }

    Ok(())
}

async fn cmd_status(config: Config) -> anyhow::Result<()> {
    let detector = IpDetector::new(config.ip_services.clone(), config.http.timeout())?;
    let provider = create_provider(&config)?;

    println!("dnspod-ddns Status");
    println!("==================\n");

    let record_type = match detector.current_ip().await {
        Ok(ip) => {
            println!("Current Public IP: {}", ip);
            RecordType::for_ip(&ip)
        }
        Err(e) => {
            println!("Failed to detect IP: {}", e);
            RecordType::A
        }
    };

    println!("\nRecords:");
    println!("--------");

    for domain in config.domains() {
        print!("  {}: ", domain);

        let zone = match provider.resolve_domain_id(&domain).await {
            Ok(Some(zone)) => zone,
            Ok(None) => {
                println!("(no matching domain)");
                continue;
            }
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };

        match provider.resolve_record(&zone, &domain, record_type).await {
            Ok(RecordLookup::Found(record)) => println!(
                "{} ({} in {}, domain {}, record {})",
                record.value,
                zone.host_label(&domain),
                zone.name,
                zone.id,
                record.id
            ),
            Ok(RecordLookup::Missing) => println!("(no {} record)", record_type.as_str()),
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}

async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    println!("Validating {}...\n", config_path.display());

    let config = load_config(config_path)?;
    let provider = create_provider(&config)?;

    print!("  credentials: ");
    if let Err(e) = provider.validate().await {
        println!("FAILED - {}", e);
        std::process::exit(1);
    }
    println!("OK");

    let mut all_valid = true;
    for domain in config.domains() {
        print!("  {}: ", domain);
        match provider.resolve_domain_id(&domain).await {
            Ok(Some(zone)) => println!("OK (zone {}, domain {})", zone.name, zone.id),
            Ok(None) => {
                println!("FAILED - no matching domain in account");
                all_valid = false;
            }
            Err(e) => {
                println!("FAILED - {}", e);
                all_valid = false;
            }
        }
    }

    println!();

    if all_valid {
        println!("Configuration is valid.");
    } else {
        println!("Some domains failed validation.");
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_init(path: PathBuf, overwrite: bool) -> anyhow::Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "{} already exists (use --overwrite to replace it)",
            path.display()
        );
    }

    Config::example().save_to(&path)?;
    println!("Wrote example configuration to {}", path.display());
    Ok(())
}
