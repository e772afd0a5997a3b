use crate::model::{ConsumerClass, ExtractionResult};
use crate::numeric::round2;
use crate::pipeline::{extract, select_sources};
use crate::store::{load_snapshot, snapshot_path};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub config_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub source: Option<String>,
    pub threshold_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    PriceDifference,
    MissingInBaseline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDifference {
    pub source_key: String,
    pub class: ConsumerClass,
    pub kind: DifferenceKind,
    pub baseline: Option<f64>,
    pub extracted: f64,
    pub difference_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceError {
    pub source_key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub sources_checked: usize,
    pub differences: Vec<PriceDifference>,
    pub errors: Vec<SourceError>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.differences.is_empty() && self.errors.is_empty()
    }
}

pub fn run_verify(options: &VerifyOptions) -> Result<VerifyReport> {
    let sources = select_sources(&options.config_dir, options.source.as_deref())?;
    let mut report = VerifyReport::default();

    for source in sources {
        let key = source.config.source.key.clone();
        report.sources_checked += 1;

        let extracted = extract(&source)?;
        if let Some(error) = &extracted.error {
            warn!(source = %key, error = %error, "extraction failed during verify");
            report.errors.push(SourceError {
                source_key: key,
                error: error.clone(),
            });
            continue;
        }

        let Some(baseline) = load_snapshot(&options.baseline_dir, &key)? else {
            let expected = snapshot_path(&options.baseline_dir, &key);
            warn!(source = %key, file = %expected.display(), "no baseline snapshot");
            report.errors.push(SourceError {
                source_key: key,
                error: format!("no baseline snapshot at {}", expected.display()),
            });
            continue;
        };

        let found = compare_results(&baseline, &extracted, options.threshold_percent);
        info!(source = %key, differences = found.len(), "verified against baseline");
        report.differences.extend(found);
    }

    Ok(report)
}

pub fn compare_results(
    baseline: &ExtractionResult,
    extracted: &ExtractionResult,
    threshold_percent: f64,
) -> Vec<PriceDifference> {
    let mut out = Vec::new();

    for entry in &extracted.tariff_entries {
        let Some(previous) = baseline.entry_for(entry.class) else {
            out.push(PriceDifference {
                source_key: extracted.source_key.clone(),
                class: entry.class,
                kind: DifferenceKind::MissingInBaseline,
                baseline: None,
                extracted: entry.unit_price,
                difference_percent: None,
            });
            continue;
        };

        if previous.unit_price <= 0.0 {
            continue;
        }
        let percent = (entry.unit_price - previous.unit_price).abs() / previous.unit_price * 100.0;
        if percent > threshold_percent {
            out.push(PriceDifference {
                source_key: extracted.source_key.clone(),
                class: entry.class,
                kind: DifferenceKind::PriceDifference,
                baseline: Some(previous.unit_price),
                extracted: entry.unit_price,
                difference_percent: Some(round2(percent)),
            });
        }
    }

    out
}
