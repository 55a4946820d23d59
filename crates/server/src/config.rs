use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub explorer_url: String,
    pub explorer_timeout: Duration,
    /// Where the opening stats cache is loaded from and saved to
    pub opening_cache_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            explorer_url: env::var("EXPLORER_URL")
                .unwrap_or_else(|_| "https://explorer.lichess.ovh/masters".to_string()),
            explorer_timeout: Duration::from_secs(
                env::var("EXPLORER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            opening_cache_path: env::var("OPENING_CACHE_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}
