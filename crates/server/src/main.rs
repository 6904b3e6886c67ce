use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shepherd_server::config::ShepherdConfig;
use shepherd_server::coordinator::Coordinator;

/// Administration tool for the shepherd job-coordination core.
#[derive(Parser, Debug)]
#[command(name = "shepherd", about = "Inspect and administer shepherd coordination state")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "shepherd.toml")]
    config: PathBuf,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and round-trip a lock through the store.
    Check,
    /// List an organization's active trackers.
    Trackers {
        #[arg(long)]
        org: String,
        /// Drop members whose heartbeat has expired before listing.
        #[arg(long)]
        reconcile: bool,
    },
    /// Show whether a resource lock is held.
    Locks {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        id: String,
        /// Delete the lock regardless of owner.
        #[arg(long)]
        release: bool,
    },
    /// Show an organization's usage of a weekly quota field.
    Quota {
        #[arg(long)]
        org: String,
        #[arg(long)]
        field: String,
        /// Report remaining capacity against this limit as well.
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Log an organization's active trackers until interrupted.
    Watch {
        #[arg(long)]
        org: String,
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, found) = ShepherdConfig::load(&cli.config)?;
    shepherd_server::telemetry::init(&config.telemetry);
    if !found {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    let store = shepherd_server::state_factory::create_state(&config.state)?;
    let coordinator = Coordinator::from_config(&config, store)?;

    match cli.command {
        Commands::Check => run_check(&config, &coordinator).await?,
        Commands::Trackers { org, reconcile } => {
            run_trackers(&coordinator, &org, reconcile, cli.json).await?;
        }
        Commands::Locks { scope, id, release } => {
            run_locks(&coordinator, &scope, &id, release, cli.json).await?;
        }
        Commands::Quota { org, field, limit } => {
            run_quota(&coordinator, &org, &field, limit, cli.json).await?;
        }
        Commands::Watch { org, interval_secs } => {
            run_watch(&coordinator, &org, Duration::from_secs(interval_secs.max(1))).await?;
        }
    }
    Ok(())
}

/// Acquire, inspect and release a throwaway lock to prove the store works.
async fn run_check(
    config: &ShepherdConfig,
    coordinator: &Coordinator,
) -> Result<(), Box<dyn std::error::Error>> {
    let lock = coordinator.lock_for("check");
    let id = format!("check-{}", std::process::id());

    lock.acquire("shepherd-check", "check", &id).await?;
    let held = lock.is_running("check", &id).await?;
    lock.release("check", &id).await?;
    let released = !lock.is_running("check", &id).await?;

    if !(held && released) {
        return Err(format!("state backend {} failed the lock round-trip", config.state.backend).into());
    }

    println!("config ok: {} work class(es)", config.work_classes.len());
    for wc in &config.work_classes {
        println!(
            "  {}: every {}s, lock ttl {}s, {:?}",
            wc.name, wc.poll_interval_seconds, wc.lock_ttl_seconds, wc.criticality
        );
    }
    println!("state ok: {} backend", config.state.backend);
    Ok(())
}

async fn run_trackers(
    coordinator: &Coordinator,
    org: &str,
    reconcile: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let semaphore = coordinator.semaphore();
    let removed = if reconcile {
        semaphore.reconcile(org).await?
    } else {
        0
    };
    let active = semaphore.active_trackers(org).await?;

    if json {
        let out = serde_json::json!({ "org_id": org, "active": active, "reconciled": removed });
        println!("{out}");
        return Ok(());
    }
    if reconcile {
        println!("reconciled: removed {removed} stale tracker(s)");
    }
    if active.is_empty() {
        println!("no active trackers for {org}");
    }
    for tracker in &active {
        println!("{tracker}");
    }
    Ok(())
}

async fn run_locks(
    coordinator: &Coordinator,
    scope: &str,
    id: &str,
    release: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let lock = coordinator.lock_for(scope);
    let key = lock.key(scope, id);
    let held = lock.is_running(scope, id).await?;
    let owner = if held {
        coordinator.store().get(&key).await?
    } else {
        None
    };
    if release && held {
        lock.release(scope, id).await?;
        warn!(%key, "lock force-released");
    }

    if json {
        let out = serde_json::json!({
            "key": key.canonical(),
            "held": held,
            "owner": owner,
            "released": release && held,
        });
        println!("{out}");
    } else if held {
        println!("{key}: held by {}", owner.as_deref().unwrap_or("unknown"));
        if release {
            println!("{key}: released");
        }
    } else {
        println!("{key}: free");
    }
    Ok(())
}

async fn run_quota(
    coordinator: &Coordinator,
    org: &str,
    field: &str,
    limit: Option<i64>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let quota = coordinator.quota();
    let key = quota.weekly_key(org, &Utc::now());
    let used = quota.used(&key, field).await?;
    let remaining = match limit {
        Some(limit) => Some(quota.remaining(&key, field, limit).await?),
        None => None,
    };

    if json {
        let out = serde_json::json!({
            "key": key.canonical(),
            "field": field,
            "used": used,
            "remaining": remaining,
        });
        println!("{out}");
    } else {
        match remaining {
            Some(remaining) => println!("{key} {field}: {used} used, {remaining} remaining"),
            None => println!("{key} {field}: {used} used"),
        }
    }
    Ok(())
}

async fn run_watch(
    coordinator: &Coordinator,
    org: &str,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    let signal = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = coordinator.semaphore().reconcile(org).await?;
                let active = coordinator.semaphore().active_trackers(org).await?;
                info!(org_id = org, active = active.len(), reconciled = removed, trackers = ?active, "active trackers");
            }
        }
    }

    signal.abort();
    info!("watch stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
