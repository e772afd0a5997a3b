use crate::config::sanitize_for_path;
use crate::model::ExtractionResult;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// One JSON tariff record per source, named after the sanitized source key.
pub fn snapshot_path(dir: &Path, source_key: &str) -> PathBuf {
    dir.join(format!("{}.json", sanitize_for_path(source_key)))
}

/// Reads the stored tariff record for `source_key`, if one was ever written.
/// A file whose record belongs to another source is rejected, since two keys
/// can sanitize to the same file name.
pub fn load_snapshot(dir: &Path, source_key: &str) -> Result<Option<ExtractionResult>> {
    let path = snapshot_path(dir, source_key);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read tariff snapshot {}", path.display()))?;
    let result: ExtractionResult = serde_json::from_str(&content)
        .with_context(|| format!("tariff snapshot {} is not a tariff record", path.display()))?;
    if result.source_key != source_key {
        bail!(
            "tariff snapshot {} holds source {} instead of {source_key}",
            path.display(),
            result.source_key
        );
    }
    Ok(Some(result))
}

pub fn save_snapshot(dir: &Path, result: &ExtractionResult) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;

    let path = snapshot_path(dir, &result.source_key);
    let serialized = serde_json::to_string_pretty(result)?;
    std::fs::write(&path, serialized).with_context(|| {
        format!(
            "failed to write tariff snapshot for {} to {}",
            result.source_key,
            path.display()
        )
    })?;
    Ok(path)
}
