//! Masters opening explorer client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Aggregate results for a position plus the moves played from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningStats {
    #[serde(default)]
    pub white: u64,
    #[serde(default)]
    pub draws: u64,
    #[serde(default)]
    pub black: u64,
    #[serde(default)]
    pub moves: Vec<ExplorerMove>,
}

impl OpeningStats {
    pub fn total_games(&self) -> u64 {
        self.white + self.draws + self.black
    }

    pub fn is_empty(&self) -> bool {
        self.total_games() == 0 && self.moves.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerMove {
    pub uci: String,
    pub san: String,
    #[serde(default)]
    pub average_rating: Option<u32>,
    #[serde(default)]
    pub white: u64,
    #[serde(default)]
    pub draws: u64,
    #[serde(default)]
    pub black: u64,
}

impl ExplorerMove {
    pub fn games(&self) -> u64 {
        self.white + self.draws + self.black
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub struct ExplorerClient {
    client: Client,
    base_url: String,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExplorerError> {
        let client = Client::builder()
            .user_agent("ChessSession/1.0")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Stats for `fen`. A position the explorer has never seen is an empty
    /// result, not an error.
    pub async fn fetch(&self, fen: &str) -> Result<OpeningStats, ExplorerError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("fen", fen)])
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(OpeningStats::default()),
            StatusCode::TOO_MANY_REQUESTS => Err(ExplorerError::RateLimited),
            status if !status.is_success() => Err(ExplorerError::Status(status)),
            _ => Ok(resp.json::<OpeningStats>().await?),
        }
    }
}
