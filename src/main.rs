use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tournament_lock::config::DriverConfig;
use tournament_lock::sync::context::ContextId;
use tournament_lock::{form_group, LockPool};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = DriverConfig::parse();
    tracing::debug!(?cfg, "starting");

    let outcomes = form_group(LockPool::global(), cfg.participants, |p| -> Result<()> {
        let mut rng = rand::thread_rng();
        for round in 0..cfg.rounds {
            p.acquire().with_context(|| {
                format!("participant {} failed to acquire in round {round}", p.index())
            })?;

            tracing::info!(
                participant = p.index(),
                context = %ContextId::current(),
                round,
                "entered critical section"
            );
            let extra = rng.gen_range(Duration::ZERO..=cfg.jitter());
            thread::sleep(cfg.hold() + extra);

            p.release().with_context(|| {
                format!("participant {} failed to release in round {round}", p.index())
            })?;
        }
        Ok(())
    })
    .context("failed to run tournament")?;

    for outcome in outcomes {
        outcome?;
    }
    Ok(())
}
