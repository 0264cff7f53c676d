use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::record::ValidatedRecord;

/// Write the final record sequence to CSV, order preserved, headers from the
/// record's field names.
pub fn write_csv(path: &Path, records: &[ValidatedRecord]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::source_url;

    #[test]
    fn writes_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("nutrition.csv");
        let records = vec![ValidatedRecord {
            food_id: 3,
            food_name: "تخم مرغ آب پز".to_string(),
            unit_label: "g".to_string(),
            unit_value: Some(100.0),
            calories: Some(155.0),
            carbs_g: Some(1.1),
            protein_g: Some(13.0),
            fat_g: Some(10.6),
            fiber_g: None,
            source_url: source_url(3),
        }];

        write_csv(&path, &records).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "food_id,food_name,unit_label,unit_value,calories,carbs_g,protein_g,fat_g,fiber_g,source_url"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("3,"));
        // Missing fiber serializes as an empty cell, not a string.
        assert!(row.contains(",10.6,,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn empty_run_still_produces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&path, &[]).unwrap();
        assert!(path.exists());
    }
}
