use std::path::PathBuf;

use clap::Parser;

use crate::facade::DatabaseOptions;
use crate::storage::DurabilityMode;

/// Server configuration. Every flag falls back to an environment variable,
/// and `.env` is read before parsing.
#[derive(Debug, Clone, Parser)]
#[command(name = "mortuary", about = "Mortuary chamber occupancy service")]
pub struct AppConfig {
    #[arg(long, env = "APP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "APP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory for the write-ahead log and snapshots. Omit to run in memory.
    #[arg(long, env = "MORTUARY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "MORTUARY_DURABILITY", default_value = "async")]
    pub durability: DurabilityMode,

    #[arg(long, env = "MORTUARY_CHECKPOINT_EVERY", default_value_t = 1000)]
    pub checkpoint_every: usize,

    #[arg(long, env = "MORTUARY_COMMIT_RETRIES", default_value_t = 3)]
    pub commit_retries: u32,
}

impl AppConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_options(&self) -> DatabaseOptions {
        let options = match self.data_dir.as_ref() {
            Some(dir) => DatabaseOptions::persistent(dir),
            None => DatabaseOptions::in_memory(),
        };
        options
            .durability(self.durability)
            .checkpoint_every(self.checkpoint_every)
            .commit_retries(self.commit_retries)
    }
}
