//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::bods::FeedFormat;
use crate::error::{Error, Result};
use crate::model::BoundingBox;

const DEFAULT_BODS_URL: &str = "https://data.bus-data.dft.gov.uk/api/v1";
const DEFAULT_POSTCODES_URL: &str = "https://api.postcodes.io";

/// Env files read at startup, in priority order.
const ENV_FILES: [&str; 2] = ["env_variables.env", ".env"];

/// Loads the env files found in `dir` into the process environment and
/// returns the paths that were read.
///
/// Variables already set are never overwritten, so the real environment
/// beats `env_variables.env`, which beats `.env`.
pub fn load_env_files(dir: &Path) -> Vec<PathBuf> {
    ENV_FILES
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| dotenvy::from_path(path).is_ok())
        .collect()
}

/// Live bus positions near a UK postcode.
#[derive(Debug, Clone, Parser)]
#[command(name = "bus-tracker", version, about)]
pub struct Config {
    /// BODS API key
    #[arg(long, env = "BODS_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Address the dashboard listens on
    #[arg(long, env = "BUS_TRACKER_LISTEN", default_value = "0.0.0.0:3030")]
    pub listen: SocketAddr,

    /// Area to fetch buses for: min_lat,max_lat,min_lon,max_lon
    #[arg(
        long,
        env = "BUS_TRACKER_BBOX",
        default_value = "52.65,52.75,-2.55,-2.35",
        allow_hyphen_values = true
    )]
    pub bounding_box: BoundingBox,

    /// Live location feed to read
    #[arg(long, env = "BUS_TRACKER_FEED", value_enum, default_value_t = FeedFormat::Siri)]
    pub feed: FeedFormat,

    #[arg(long, env = "BODS_URL", default_value = DEFAULT_BODS_URL)]
    pub bods_url: String,

    #[arg(long, env = "POSTCODES_URL", default_value = DEFAULT_POSTCODES_URL)]
    pub postcodes_url: String,

    /// Seconds a feed fetch is reused before BODS is queried again
    #[arg(long, env = "BUS_TRACKER_CACHE_TTL", default_value_t = 10)]
    pub cache_ttl_secs: u64,

    /// Upstream request timeout in seconds
    #[arg(long, env = "BUS_TRACKER_TIMEOUT", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Buses shown when a request doesn't pass `limit`
    #[arg(long, env = "BUS_TRACKER_LIMIT", default_value_t = 10)]
    pub default_limit: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::invalid_argument("BODS_API_KEY cannot be empty"));
        }

        self.bounding_box.validate()?;

        for (name, url) in [("bods_url", &self.bods_url), ("postcodes_url", &self.postcodes_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::invalid_argument(format!(
                    "{name} must start with http:// or https://"
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(Error::invalid_argument("timeout cannot be zero"));
        }

        if self.default_limit == 0 {
            return Err(Error::invalid_argument("default limit must be at least 1"));
        }

        Ok(())
    }
}
