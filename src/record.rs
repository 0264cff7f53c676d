use serde::{Deserialize, Serialize};

pub type FoodId = u32;

pub const BASE_URL: &str = "https://www.mankan.me/mag/lib/read_one.php";

/// The page URL for a food id is fully determined by the id.
pub fn source_url(id: FoodId) -> String {
    format!("{}?id={}", BASE_URL, id)
}

/// One measurement row exactly as scraped. Numeric fields are kept as raw
/// text so the validator can judge them instead of the extractor guessing.
#[derive(Debug, Clone)]
pub struct RawMeasurement {
    pub food_id: FoodId,
    pub food_name: String,
    pub unit_label: String,
    pub unit_value: String,
    pub calories: String,
    pub carbs_g: String,
    pub protein_g: String,
    pub fat_g: String,
    pub fiber_g: String,
    pub source_url: String,
}

/// A cleaned row ready for the checkpoint and the CSV output. `None` in a
/// numeric field is the explicit missing marker, never a raw string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub food_id: FoodId,
    pub food_name: String,
    pub unit_label: String,
    pub unit_value: Option<f64>,
    pub calories: Option<f64>,
    pub carbs_g: Option<f64>,
    pub protein_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub source_url: String,
}
