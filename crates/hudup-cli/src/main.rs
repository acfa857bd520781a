#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod seed;
mod shutdown;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use hudup_remote::exchanged::DatasetPoolExchanged;
use hudup_remote::{DatasetPoolsService, DatasetPoolsServiceImpl, Registry};

use crate::config::Cli;
use crate::seed::seed_pool;
use crate::shutdown::shutdown_signal;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "hudup_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "hudup_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "hudup_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.log();
    cli.validate().context("invalid configuration")?;

    let registry = Registry::new(cli.registry.clone());
    let service = Arc::new(DatasetPoolsServiceImpl::new(
        registry.clone(),
        cli.pools.clone(),
    ));

    let served = serve(&registry, &service, &cli).await;
    if served.is_ok() {
        shutdown_signal().await;
    }

    service.close().await;
    registry.shutdown().await;
    served
}

/// Exports the pools service and registers the seeded pool.
async fn serve(
    registry: &Arc<Registry>,
    service: &Arc<DatasetPoolsServiceImpl>,
    cli: &Cli,
) -> anyhow::Result<()> {
    let stub = service
        .export()
        .await
        .context("failed to export the pools service")?;
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        registry_id = %registry.id(),
        object_id = %stub.object_id,
        port = stub.port,
        "pools service exported"
    );

    let pool = seed_pool(&cli.seed).await?;
    if pool.is_empty() {
        return Ok(());
    }

    let pool = DatasetPoolExchanged::from_pool(&pool);
    let name = &cli.seed.pool_name;
    if !service.put(name, pool, &[]).await? {
        anyhow::bail!("pool {name:?} is already registered");
    }

    if let Some(exported) = service.get(name).await? {
        for pair in exported.manifest().await.pairs {
            tracing::info!(
                target: TRACING_TARGET_STARTUP,
                pool = %name,
                training = ?pair.training.stub.map(|stub| stub.object_id),
                testing = ?pair.testing.stub.map(|stub| stub.object_id),
                "pair exported"
            );
        }
    }

    Ok(())
}
