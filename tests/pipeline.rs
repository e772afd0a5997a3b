use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tarifas::config::{LoadedSource, load_source_file, parse_source_config};
use tarifas::error::ExtractionError;
use tarifas::model::{ConsumerClass, PriceSource, Provenance, ServiceType};
use tarifas::pipeline::{ExtractOptions, extract_at, extract_sources};
use tarifas::store::{load_snapshot, snapshot_path};
use tempfile::{TempDir, tempdir};

#[test]
fn file_source_picks_latest_document_and_fills_missing_classes() -> Result<()> {
    let env = setup_fixture_env()?;
    let source = load_source_file(&env.config_dir.join("afinia_file.toml"))?;

    let now = Utc.with_ymd_and_hms(2025, 10, 16, 15, 0, 0).unwrap();
    let result = extract_at(&source, now)?;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.service_type, ServiceType::Electricity);
    assert_eq!(result.unit, "kWh");
    assert_eq!(result.provider, "Afinia (fixture)");
    assert_eq!(result.extraction_timestamp, "2025-10-16T10:00:00-05:00");
    assert_eq!(result.subsistence_consumption, 173.0);

    let document_url = result.document_url.as_deref().unwrap_or_default();
    assert!(document_url.ends_with("docs/tarifas-octubre-2025.pdf"));
    let period = result.document_period.clone().expect("period must be recorded");
    assert_eq!(period.year, Some(2025));
    assert_eq!(period.month.as_deref(), Some("octubre"));
    assert_eq!(result.document_sha256.as_deref().map(str::len), Some(64));

    assert_eq!(result.reference_price, Some(862.45));
    assert_eq!(result.cost_components.get("Generación"), Some(&312.5));

    let stratum1 = result.entry_for(ConsumerClass::Stratum(1)).expect("stratum 1");
    assert_close(stratum1.unit_price, 345.12);
    assert_eq!(stratum1.price_source, PriceSource::Table);
    assert_eq!(stratum1.subsidy_percent, -55.0);
    assert_eq!(stratum1.provenance, Provenance::Extracted);

    let stratum5 = result.entry_for(ConsumerClass::Stratum(5)).expect("stratum 5");
    assert_close(stratum5.unit_price, 1035.36);

    // The linked document is a real PDF; its rows come through pdf-extract.
    for stratum in 1..=6 {
        let entry = result
            .entry_for(ConsumerClass::Stratum(stratum))
            .expect("every stratum is in the PDF table");
        assert_eq!(entry.price_source, PriceSource::Table);
        assert_close(entry.fixed_charge, 4250.0);
    }

    // Text inside <script> is not page content.
    let stratum3 = result.entry_for(ConsumerClass::Stratum(3)).expect("stratum 3");
    assert_eq!(stratum3.subsidy_percent, -15.0);
    assert_eq!(stratum3.provenance, Provenance::Regulatory);

    let commercial = result.entry_for(ConsumerClass::Commercial).expect("commercial");
    assert_eq!(commercial.price_source, PriceSource::Calculated);
    assert_close(commercial.unit_price, 1034.94);
    let official = result.entry_for(ConsumerClass::Official).expect("official");
    assert_close(official.unit_price, 862.45);

    assert_eq!(result.tariff_entries.len(), 9);
    assert_eq!(result.subsidy_records.len(), 9);

    Ok(())
}

#[test]
fn stale_documents_are_ignored() -> Result<()> {
    let env = setup_fixture_env()?;
    let source = load_source_file(&env.config_dir.join("afinia_file.toml"))?;

    // Every linked document is older than the allowed age window in 2030.
    let now = Utc.with_ymd_and_hms(2030, 3, 1, 12, 0, 0).unwrap();
    let result = extract_at(&source, now)?;

    assert!(result.document_url.is_none());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("no tariff document found"))
    );
    // The page still carries a CU, so the calculator produces the full set.
    assert!(result.is_success());
    assert!(
        result
            .tariff_entries
            .iter()
            .all(|entry| entry.price_source == PriceSource::Calculated)
    );
    let stratum1 = result.entry_for(ConsumerClass::Stratum(1)).expect("stratum 1");
    assert_close(stratum1.unit_price, 388.1);

    Ok(())
}

#[test]
fn undated_documents_are_skipped_without_a_keyword() -> Result<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("page.html"),
        r#"<html><body>
<p>Estrato 1: $ 420,50 /kWh</p>
<a href="docs/reglamento-interno.pdf">Reglamento interno</a>
</body></html>"#,
    )?;
    let source = write_source(
        dir.path(),
        "afinia.toml",
        r#"
[source]
key = "test.afinia.undated"
name = "Afinia"
service = "electricity"

[fetch]
mode = "file"
file_path = "page.html"
"#,
    )?;

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let result = extract_at(&source, now)?;

    assert!(result.document_url.is_none());
    assert!(result.document_period.is_none());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("no tariff document found"))
    );
    let stratum1 = result.entry_for(ConsumerClass::Stratum(1)).expect("stratum 1");
    assert_eq!(stratum1.price_source, PriceSource::Text);

    Ok(())
}

#[test]
fn inline_table_source_resolves_subsidies_with_sanity_bound() -> Result<()> {
    let env = setup_fixture_env()?;
    let source = load_source_file(&env.config_dir.join("water_inline.toml"))?;

    let result = extract_at(&source, Utc::now())?;

    assert!(result.is_success());
    assert_eq!(result.service_type, ServiceType::Water);
    assert_eq!(result.subsistence_consumption, 16.0);
    assert!(result.document_url.is_none());
    assert!(result.reference_price.is_none());
    assert!(result.cost_components.is_empty());

    let classes: Vec<ConsumerClass> = result.tariff_entries.iter().map(|e| e.class).collect();
    assert_eq!(
        classes,
        vec![
            ConsumerClass::Stratum(1),
            ConsumerClass::Stratum(2),
            ConsumerClass::Stratum(4),
            ConsumerClass::Commercial,
        ]
    );

    let stratum1 = result.entry_for(ConsumerClass::Stratum(1)).expect("stratum 1");
    assert_close(stratum1.unit_price, 1890.5);
    assert_close(stratum1.fixed_charge, 4250.0);
    assert_eq!(stratum1.subsidy_percent, -70.0);
    assert_eq!(stratum1.provenance, Provenance::Extracted);

    // 95% exceeds the discount bound and falls back to the regulator.
    let stratum2 = result.entry_for(ConsumerClass::Stratum(2)).expect("stratum 2");
    assert_eq!(stratum2.subsidy_percent, -40.0);
    assert_eq!(stratum2.provenance, Provenance::Regulatory);

    let commercial = result.entry_for(ConsumerClass::Commercial).expect("commercial");
    assert_close(commercial.fixed_charge, 10625.0);
    assert_eq!(commercial.subsidy_percent, 20.0);

    Ok(())
}

#[test]
fn unreachable_page_degrades_to_error_result() -> Result<()> {
    let dir = tempdir()?;
    let source = write_source(
        dir.path(),
        "missing.toml",
        r#"
[source]
key = "test.missing"
name = "Missing"
service = "gas"

[fetch]
mode = "file"
file_path = "does-not-exist.html"
"#,
    )?;

    let result = extract_at(&source, Utc::now())?;

    assert!(!result.is_success());
    assert!(result.tariff_entries.is_empty());
    let error = result.error.as_deref().unwrap_or_default();
    assert!(error.starts_with("request to file://"), "{error}");
    let suggestion = result.suggestion.as_deref().unwrap_or_default();
    assert!(suggestion.contains(&result.source_url));

    let json = serde_json::to_value(&result)?;
    assert!(json.get("sugerencia").is_some());
    assert!(json.get("error").is_some());
    assert_eq!(json["serviceType"], "gas");

    Ok(())
}

#[test]
fn page_without_documents_or_tariffs_reports_no_document() -> Result<()> {
    let dir = tempdir()?;
    let source = write_source(
        dir.path(),
        "empty.toml",
        r#"
[source]
key = "test.empty"
name = "Empty"
service = "gas"

[fetch]
mode = "inline"
inline_data = "<html><body><p>Sitio en mantenimiento</p></body></html>"
"#,
    )?;

    let result = extract_at(&source, Utc::now())?;

    let expected = ExtractionError::NoDocumentFound {
        url: result.source_url.clone(),
    };
    assert_eq!(result.error.as_deref(), Some(expected.to_string().as_str()));
    assert!(result.suggestion.is_some());
    assert!(result.subsidy_records.is_empty());

    Ok(())
}

#[test]
fn page_with_nothing_to_extract_reports_no_data() -> Result<()> {
    let dir = tempdir()?;
    let source = write_source(
        dir.path(),
        "nodata.toml",
        r#"
[source]
key = "test.nodata"
name = "No data"
service = "water"

[fetch]
mode = "inline"
inline_data = "<html><body><p>Consulte su factura</p></body></html>"

[locate]
enabled = false
"#,
    )?;

    let result = extract_at(&source, Utc::now())?;

    assert_eq!(
        result.error.as_deref(),
        Some("no tariffs could be extracted from the page or its document")
    );

    Ok(())
}

#[test]
fn failed_document_download_falls_back_to_page_text() -> Result<()> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("page.html"),
        r#"<html><body>
<p>Estrato 1: $ 420,50 /kWh</p>
<p>Estrato 2: $ 525,62 /kWh</p>
<a href="tarifas-vigentes.pdf">Tarifas vigentes</a>
</body></html>"#,
    )?;
    let source = write_source(
        dir.path(),
        "partial.toml",
        r#"
[source]
key = "test.partial"
name = "Partial"
service = "electricity"

[fetch]
mode = "file"
file_path = "page.html"

[locate]
keyword = "tarifa"
"#,
    )?;

    let result = extract_at(&source, Utc::now())?;

    assert!(result.is_success());
    assert!(
        result
            .document_url
            .as_deref()
            .is_some_and(|url| url.ends_with("tarifas-vigentes.pdf"))
    );
    assert!(result.document_sha256.is_none());
    assert_eq!(result.warnings.len(), 1);

    // No CU on the page, so nothing is computed for the other classes.
    assert_eq!(result.tariff_entries.len(), 2);
    let stratum2 = result.entry_for(ConsumerClass::Stratum(2)).expect("stratum 2");
    assert_close(stratum2.unit_price, 525.62);
    assert_eq!(stratum2.price_source, PriceSource::Text);

    Ok(())
}

#[test]
fn missing_renderer_program_is_a_setup_failure() -> Result<()> {
    let config = parse_source_config(
        r#"
[source]
key = "test.rendered"
name = "Rendered"
service = "gas"

[fetch]
base_url = "http://127.0.0.1:9/tarifas"

[render]
mode = "command"
program = "tarifas-renderer-that-does-not-exist"
"#,
    )?;
    let source = LoadedSource {
        path: PathBuf::from("rendered.toml"),
        config,
    };

    let err = extract_at(&source, Utc::now()).expect_err("setup failure must propagate");
    assert!(err.is_fatal());
    assert!(matches!(err, ExtractionError::Setup(_)));

    Ok(())
}

#[test]
fn extract_sources_writes_snapshots() -> Result<()> {
    let env = setup_fixture_env()?;
    let out_dir = env.root.join("out");

    let results = extract_sources(&ExtractOptions {
        config_dir: env.config_dir.clone(),
        source: Some("test.water.inline".to_string()),
        out_dir: Some(out_dir.clone()),
    })?;

    assert_eq!(results.len(), 1);
    assert!(out_dir.join("test-water-inline.json").exists());
    let stored = load_snapshot(&out_dir, "test.water.inline")?.expect("snapshot must be written");
    assert_eq!(stored.source_key, "test.water.inline");
    assert_eq!(stored.tariff_entries.len(), 4);
    assert_eq!(stored.tariff_entries[0].class, ConsumerClass::Stratum(1));

    Ok(())
}

#[test]
fn snapshots_belong_to_the_source_that_wrote_them() -> Result<()> {
    let env = setup_fixture_env()?;
    let out_dir = env.root.join("out");

    extract_sources(&ExtractOptions {
        config_dir: env.config_dir.clone(),
        source: Some("test.water.inline".to_string()),
        out_dir: Some(out_dir.clone()),
    })?;

    // Both keys sanitize to the same file name.
    assert_eq!(
        snapshot_path(&out_dir, "test-water-inline"),
        snapshot_path(&out_dir, "test.water.inline")
    );
    let err = load_snapshot(&out_dir, "test-water-inline").expect_err("foreign snapshot");
    assert!(err.to_string().contains("holds source test.water.inline"), "{err}");

    assert!(load_snapshot(&out_dir, "test.gas.none")?.is_none());

    Ok(())
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn write_source(dir: &Path, name: &str, toml: &str) -> Result<LoadedSource> {
    let path = dir.join(name);
    fs::write(&path, toml)?;
    load_source_file(&path)
}

struct FixtureEnv {
    _temp: TempDir,
    root: PathBuf,
    config_dir: PathBuf,
}

fn setup_fixture_env() -> Result<FixtureEnv> {
    let temp = tempdir()?;
    let root = temp.path().to_path_buf();

    let fixture_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let config_dir = root.join("sources");
    copy_dir(&fixture_root.join("sources"), &config_dir)?;

    Ok(FixtureEnv {
        _temp: temp,
        root,
        config_dir,
    })
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else {
            fs::copy(src_path, dst_path)?;
        }
    }

    Ok(())
}
