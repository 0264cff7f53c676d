use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::record::FoodId;

/// Everything the pipeline needs to know about a run. The CLI fills this in;
/// the core never touches clap directly.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub start_id: FoodId,
    pub end_id: FoodId,
    pub resume: bool,
    /// Save a checkpoint every N completed ids.
    pub checkpoint_frequency: usize,
    /// Bounds for the randomized inter-request delay, in seconds.
    pub delay_min: f64,
    pub delay_max: f64,
    pub output_dir: PathBuf,
    pub csv_filename: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            start_id: 3,
            end_id: 1967,
            resume: false,
            checkpoint_frequency: 50,
            delay_min: 0.5,
            delay_max: 1.5,
            output_dir: PathBuf::from("output"),
            csv_filename: "mankan_nutritional_data.csv".to_string(),
        }
    }
}

impl ScrapeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.start_id > self.end_id {
            bail!(
                "start id {} is greater than end id {}",
                self.start_id,
                self.end_id
            );
        }
        if self.checkpoint_frequency == 0 {
            bail!("checkpoint frequency must be at least 1");
        }
        if self.delay_min < 0.0 || self.delay_max < self.delay_min {
            bail!(
                "invalid delay bounds: {}-{} seconds",
                self.delay_min,
                self.delay_max
            );
        }
        Ok(())
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(&self.csv_filename)
    }
}
