use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::record::FoodId;

pub const DEFAULT_SKIPPED_LOG: &str = "data/logs/skipped_items.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    pub food_id: FoodId,
    pub reason: String,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// JSON log of items that yielded nothing, with the reason, so a later
/// `retry-skipped` run can revisit exactly those ids.
pub struct SkippedLog {
    path: PathBuf,
    items: Vec<SkippedItem>,
}

impl SkippedLog {
    /// Open the log, keeping any existing entries. An unreadable file is
    /// not fatal for a log: it starts fresh with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!("Skipped log unreadable ({}), starting fresh", err);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self { path, items }
    }

    /// Add or update the entry for `food_id` and persist immediately.
    pub fn record(&mut self, food_id: FoodId, reason: &str, error: Option<String>) -> Result<()> {
        let entry = SkippedItem {
            food_id,
            reason: reason.to_string(),
            error,
            timestamp: Utc::now(),
        };
        match self.items.iter_mut().find(|i| i.food_id == food_id) {
            Some(existing) => *existing = entry,
            None => self.items.push(entry),
        }
        debug!("Skipped log: recorded ID {} ({})", food_id, reason);
        self.save()
    }

    /// Drop an id after a successful retry. Returns whether it was present.
    pub fn remove(&mut self, food_id: FoodId) -> Result<bool> {
        let before = self.items.len();
        self.items.retain(|i| i.food_id != food_id);
        if self.items.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn ids(&self) -> Vec<FoodId> {
        self.items.iter().map(|i| i.food_id).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.items)?)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
