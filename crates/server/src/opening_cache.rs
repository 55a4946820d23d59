//! Opening statistics with an in-memory cache.
//!
//! Stats for a position never change in practice, so every successful
//! lookup is kept for the life of the process. The cache can be snapshotted
//! to a binary file on shutdown and loaded again at startup.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::RwLock;

use chess_core::position_key;
use tracing::{debug, warn};

use crate::clients::explorer::{ExplorerClient, OpeningStats};

/// FEN (without move counters) -> stats
pub type StatsCache = HashMap<String, OpeningStats>;

/// Load a cache snapshot from a binary file.
pub fn load_cache<P: AsRef<Path>>(path: P) -> Result<StatsCache, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let cache: StatsCache = bincode::deserialize_from(reader)?;
    Ok(cache)
}

/// Save a cache snapshot to a binary file.
pub fn save_cache<P: AsRef<Path>>(
    cache: &StatsCache,
    path: P,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), cache)?;
    Ok(())
}

pub struct OpeningLookup {
    client: ExplorerClient,
    cache: RwLock<StatsCache>,
}

impl OpeningLookup {
    pub fn new(client: ExplorerClient) -> Self {
        Self::with_cache(client, StatsCache::new())
    }

    pub fn with_cache(client: ExplorerClient, cache: StatsCache) -> Self {
        Self {
            client,
            cache: RwLock::new(cache),
        }
    }

    pub fn cached(&self, fen: &str) -> Option<OpeningStats> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(&position_key(fen)).cloned()
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stats for `fen`. Lookup failures are logged and come back as an
    /// empty result so they never hold up the game.
    pub async fn stats(&self, fen: &str) -> OpeningStats {
        if let Some(hit) = self.cached(fen) {
            return hit;
        }

        match self.client.fetch(fen).await {
            Ok(stats) => {
                let key = position_key(fen);
                debug!(fen = %key, games = stats.total_games(), "Opening stats fetched");
                self.cache
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key, stats.clone());
                stats
            }
            Err(e) => {
                warn!(error = %e, %fen, "Opening stats lookup failed");
                OpeningStats::default()
            }
        }
    }

    /// Write the current cache to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<usize, Box<dyn std::error::Error>> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        save_cache(&cache, path)?;
        Ok(cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::explorer::ExplorerMove;
    use std::time::Duration;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn sample() -> OpeningStats {
        OpeningStats {
            white: 10,
            draws: 5,
            black: 3,
            moves: vec![ExplorerMove {
                uci: "c7c5".into(),
                san: "c5".into(),
                average_rating: Some(2500),
                white: 4,
                draws: 2,
                black: 2,
            }],
        }
    }

    fn offline_client() -> ExplorerClient {
        // Nothing listens here; a cache miss would fail fast.
        ExplorerClient::new("http://127.0.0.1:9/masters", Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut cache = StatsCache::new();
        cache.insert(position_key(AFTER_E4), sample());

        let path = std::env::temp_dir().join(format!("opening-cache-{}.bin", std::process::id()));
        save_cache(&cache, &path).unwrap();
        let loaded = load_cache(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, cache);
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        assert!(load_cache("/nonexistent/opening-cache.bin").is_err());
    }

    #[tokio::test]
    async fn test_cache_ignores_move_counters() {
        let mut cache = StatsCache::new();
        cache.insert(position_key(AFTER_E4), sample());
        let lookup = OpeningLookup::with_cache(offline_client(), cache);

        let later = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 4 9";
        assert_eq!(lookup.stats(later).await, sample());
    }

    #[tokio::test]
    async fn test_failed_lookup_is_empty_and_not_cached() {
        let lookup = OpeningLookup::new(offline_client());
        let stats = lookup.stats(AFTER_E4).await;
        assert!(stats.is_empty());
        assert!(lookup.is_empty());
    }
}
