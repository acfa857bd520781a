//! CLI configuration.
//!
//! ```text
//! Cli
//! ├── registry: RegistryConfig    # Advertised host, default export port
//! ├── pools: PoolsServiceConfig   # Pools export port, exclusivity
//! └── seed: SeedConfig            # Pool seeded at startup
//! ```
//!
//! Everything can be given as arguments or environment variables.

use std::path::PathBuf;
use std::process;

use anyhow::bail;
use clap::{Args, Parser};
use hudup_remote::{PoolsServiceConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "hudup")]
#[command(about = "Hudup dataset registry and pools service")]
#[command(version)]
pub struct Cli {
    /// Registry configuration.
    #[clap(flatten)]
    pub registry: RegistryConfig,

    /// Pools service configuration.
    #[clap(flatten)]
    pub pools: PoolsServiceConfig,

    /// Pool seeded at startup.
    #[clap(flatten)]
    pub seed: SeedConfig,
}

/// The pool registered at startup.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Name of the seeded pool
    #[arg(long = "pool-name", env = "HUDUP_POOL_NAME", default_value = "default")]
    pub pool_name: String,

    /// Training ratings, one `user,item,rating` triple per line
    #[arg(long = "ratings", env = "HUDUP_RATINGS")]
    pub ratings: Option<PathBuf>,

    /// Testing ratings; without them the pair is tested against nothing
    #[arg(long = "testing-ratings", env = "HUDUP_TESTING_RATINGS", requires = "ratings")]
    pub testing_ratings: Option<PathBuf>,
}

impl Cli {
    /// Loads `.env` (if enabled) and parses arguments.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.seed.pool_name.trim().is_empty() {
            bail!("pool name must not be empty");
        }
        if self.registry.registry_port == 0 {
            bail!("registry port must not be 0");
        }
        Ok(())
    }

    /// Logs build information and configuration.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "build information"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            registry_host = %self.registry.registry_host,
            registry_port = self.registry.registry_port,
            pools_port = self.pools.port_or(self.registry.registry_port),
            pools_exclusive = self.pools.pools_exclusive,
            pool_name = %self.seed.pool_name,
            ratings = ?self.seed.ratings,
            testing_ratings = ?self.seed.testing_ratings,
            "configuration"
        );
    }

    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "hudup",
            "--registry-port",
            "9000",
            "--pools-exclusive",
            "--pool-name",
            "movies",
            "--ratings",
            "ratings.csv",
        ]);

        assert_eq!(cli.registry.registry_port, 9000);
        assert_eq!(cli.pools.port_or(cli.registry.registry_port), 9000);
        assert!(cli.pools.pools_exclusive);
        assert_eq!(cli.seed.pool_name, "movies");
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn testing_ratings_need_training_ratings() {
        let parsed = Cli::try_parse_from(["hudup", "--testing-ratings", "testing.csv"]);
        assert!(parsed.is_err());
    }
}
