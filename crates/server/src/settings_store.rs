//! Settings storage, keyed by an opaque client session id.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use chrono::{DateTime, Utc};
use game_session::Settings;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Alphanumeric, 10-50 characters.
static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]{10,50}$").unwrap());

pub fn is_valid_session_id(session_id: &str) -> bool {
    SESSION_ID_RE.is_match(session_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    pub session_id: String,
    #[serde(flatten)]
    pub settings: Settings,
    pub updated_at: DateTime<Utc>,
}

pub trait SettingsStore: Send + Sync {
    fn load(&self, session_id: &str) -> Option<StoredSettings>;

    /// Insert or replace; returns what was stored.
    fn save(&self, session_id: &str, settings: Settings) -> StoredSettings;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: RwLock<HashMap<String, StoredSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, session_id: &str) -> Option<StoredSettings> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    fn save(&self, session_id: &str, settings: Settings) -> StoredSettings {
        let stored = StoredSettings {
            session_id: session_id.to_string(),
            settings,
            updated_at: Utc::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), stored.clone());
        stored
    }
}
