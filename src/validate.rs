use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::record::{RawMeasurement, ValidatedRecord};

/// Why a raw row was excluded from output. Rejection never fails the
/// enclosing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Every nutrient field is missing and the unit value is unparsable.
    EmptyRecord,
    EmptyUnit,
    EmptyName,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::EmptyRecord => "empty_record",
            RejectReason::EmptyUnit => "empty_unit",
            RejectReason::EmptyName => "empty_name",
        })
    }
}

/// Clean and type-check one raw row. Total over all inputs: every raw
/// measurement becomes exactly one of a validated record or a rejection.
pub fn validate(raw: &RawMeasurement) -> Result<ValidatedRecord, RejectReason> {
    let food_name = raw.food_name.trim().to_string();
    if food_name.is_empty() {
        return Err(RejectReason::EmptyName);
    }

    let unit_label = canonical_unit(&raw.unit_label);
    if unit_label.is_empty() {
        return Err(RejectReason::EmptyUnit);
    }

    let unit_value = coerce_numeric(&raw.unit_value);
    let calories = coerce_numeric(&raw.calories);
    let carbs_g = coerce_numeric(&raw.carbs_g);
    let protein_g = coerce_numeric(&raw.protein_g);
    let fat_g = coerce_numeric(&raw.fat_g);
    let fiber_g = coerce_numeric(&raw.fiber_g);

    if unit_value.is_none()
        && [calories, carbs_g, protein_g, fat_g, fiber_g]
            .iter()
            .all(Option::is_none)
    {
        return Err(RejectReason::EmptyRecord);
    }

    Ok(ValidatedRecord {
        food_id: raw.food_id,
        food_name,
        unit_label,
        unit_value,
        calories,
        carbs_g,
        protein_g,
        fat_g,
        fiber_g,
        source_url: raw.source_url.clone(),
    })
}

/// Extract a numeric value from raw cell text ("59.4g" -> 59.4). Parse
/// failures, negatives, and non-finite values all become the missing marker.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    static NON_NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NON_NUMERIC.get_or_init(|| Regex::new(r"[^\d.\-]").unwrap());

    let stripped = re.replace_all(raw.trim(), "");
    let value: f64 = stripped.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value)
}

/// Normalize a unit label: trim, map known synonyms (compared lowercased) to
/// a canonical label, pass unknown non-empty labels through unchanged.
pub fn canonical_unit(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_lowercase().as_str() {
        "g" | "gram" | "grams" | "گرم" => "g".to_string(),
        "cup" | "لیوان" => "cup".to_string(),
        "tbsp" | "tablespoon" | "قاشق غذاخوری" => "tbsp".to_string(),
        "tsp" | "teaspoon" | "قاشق چایخوری" => "tsp".to_string(),
        _ => trimmed.to_string(),
    }
}
