use crate::calculator::fill_missing;
use crate::config::{LoadedSource, load_source_file, load_sources_from_dir};
use crate::error::ExtractionError;
use crate::fetch::{DocumentKind, FetchedDocument, fetch_document, page_url};
use crate::locator::{DocumentCandidate, locate_document};
use crate::model::{
    ConsumerClass, DocumentPeriod, ExtractionResult, TariffCandidate, TariffEntry,
};
use crate::profile::ServiceProfile;
use crate::render::{PageSnapshot, renderer_for};
use crate::store::save_snapshot;
use crate::subsidy::SubsidyResolver;
use crate::table::{Grid, extract_from_grids, grids_from_text};
use crate::text::{
    extract_components, extract_reference_price, extract_subsidies, extract_text_tariffs,
};
use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub config_dir: PathBuf,
    pub source: Option<String>,
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub config_dir: Option<PathBuf>,
    pub source_file: Option<PathBuf>,
}

pub fn select_sources(
    config_dir: &std::path::Path,
    filter: Option<&str>,
) -> Result<Vec<LoadedSource>> {
    let mut sources = load_sources_from_dir(config_dir)?;
    if let Some(filter) = filter {
        sources.retain(|s| s.config.source.key == filter);
    } else {
        sources.retain(|s| {
            if !s.config.source.enabled {
                info!(source = %s.config.source.key, "source disabled; skipping");
            }
            s.config.source.enabled
        });
    }
    if sources.is_empty() {
        bail!("no matching source configurations found");
    }
    Ok(sources)
}

pub fn extract_sources(options: &ExtractOptions) -> Result<Vec<ExtractionResult>> {
    let sources = select_sources(&options.config_dir, options.source.as_deref())?;

    let mut results = Vec::new();
    for source in sources {
        let result = extract(&source)?;
        if let Some(out_dir) = &options.out_dir {
            let path = save_snapshot(out_dir, &result)?;
            info!(source = %source.config.source.key, file = %path.display(), "result written");
        }
        results.push(result);
    }
    Ok(results)
}

pub fn validate_configs(options: &ValidateOptions) -> Result<Vec<String>> {
    let mut messages = Vec::new();

    if let Some(file) = &options.source_file {
        let source = load_source_file(file)?;
        messages.push(format!(
            "OK: {} ({})",
            source.config.source.key,
            file.display()
        ));
        return Ok(messages);
    }

    if let Some(dir) = &options.config_dir {
        let sources = load_sources_from_dir(dir)?;
        for source in sources {
            messages.push(format!(
                "OK: {} ({})",
                source.config.source.key,
                source.path.display()
            ));
        }
        return Ok(messages);
    }

    bail!("either --config-dir or --source-file must be provided");
}

pub fn extract(source: &LoadedSource) -> Result<ExtractionResult, ExtractionError> {
    extract_at(source, Utc::now())
}

pub fn extract_at(
    source: &LoadedSource,
    now: DateTime<Utc>,
) -> Result<ExtractionResult, ExtractionError> {
    let profile = ServiceProfile::from_config(&source.config)
        .map_err(|err| ExtractionError::Setup(format!("{err:#}")))?;
    let source_url =
        page_url(source).map_err(|err| ExtractionError::Setup(format!("{err:#}")))?;
    let local_now = now.with_timezone(&source.config.timezone());

    info!(
        source = %source.config.source.key,
        service = %profile.service,
        url = %source_url,
        "extraction start"
    );

    let mut run = Run {
        source,
        profile: &profile,
        result: ExtractionResult {
            source_key: source.config.source.key.clone(),
            provider: source.config.source.name.clone(),
            region: source.config.source.region.clone(),
            source_url: source_url.clone(),
            document_url: None,
            document_period: None,
            document_sha256: None,
            extraction_timestamp: local_now.to_rfc3339(),
            service_type: profile.service,
            unit: profile.unit.clone(),
            reference_price: None,
            tariff_entries: Vec::new(),
            subsidy_records: Vec::new(),
            cost_components: BTreeMap::new(),
            subsistence_consumption: profile.subsistence_consumption,
            warnings: Vec::new(),
            error: None,
            suggestion: None,
        },
    };

    if let Err(err) = run.execute(local_now.year()) {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(source = %source.config.source.key, error = %err, "extraction degraded");
        run.result.suggestion = Some(err.suggestion(&source_url));
        run.result.error = Some(err.to_string());
    }

    info!(
        source = %source.config.source.key,
        tariffs = run.result.tariff_entries.len(),
        subsidies = run.result.subsidy_records.len(),
        components = run.result.cost_components.len(),
        error = run.result.error.as_deref().unwrap_or("none"),
        "extraction finished"
    );
    Ok(run.result)
}

struct Content {
    label: &'static str,
    text: String,
    grids: Vec<Grid>,
}

impl Content {
    fn from_page(page: &PageSnapshot) -> Self {
        Self {
            label: "page",
            text: page.visible_text(),
            grids: page.tables(),
        }
    }

    fn from_document(doc: &FetchedDocument) -> Self {
        let raw = doc.text();
        let looks_like_html = doc.kind == DocumentKind::Markup && {
            let lowered = raw.to_lowercase();
            lowered.contains("<html") || lowered.contains("<table")
        };
        if looks_like_html {
            let snapshot = PageSnapshot::parse(&doc.url, &raw);
            return Self {
                label: "document",
                text: snapshot.visible_text(),
                grids: snapshot.tables(),
            };
        }
        Self {
            label: "document",
            grids: grids_from_text(&raw),
            text: raw,
        }
    }

    fn tariffs(&self, profile: &ServiceProfile) -> Vec<TariffCandidate> {
        let from_tables = extract_from_grids(&self.grids, profile);
        if !from_tables.is_empty() {
            info!(content = self.label, tariffs = from_tables.len(), "tariffs from tables");
            return from_tables;
        }
        let from_text = extract_text_tariffs(&self.text, profile);
        if !from_text.is_empty() {
            info!(content = self.label, tariffs = from_text.len(), "tariffs from text");
        }
        from_text
    }
}

struct Run<'a> {
    source: &'a LoadedSource,
    profile: &'a ServiceProfile,
    result: ExtractionResult,
}

impl Run<'_> {
    fn execute(&mut self, current_year: i32) -> Result<(), ExtractionError> {
        let source = self.source;
        let profile = self.profile;
        let key = source.config.source.key.as_str();

        info!(source = %key, stage = "locate_document", "stage");
        let renderer = renderer_for(source);
        info!(source = %key, renderer = renderer.key(), "acquiring page");
        let rendered = renderer.render(source, &self.result.source_url)?;
        let page = PageSnapshot::parse(&rendered.url, &rendered.html);
        let page_content = Content::from_page(&page);

        let locate = &source.config.locate;
        let candidate = if locate.enabled {
            let found = locate_document(&page.links(), locate, current_year);
            if found.is_none() {
                let missing = ExtractionError::NoDocumentFound {
                    url: self.result.source_url.clone(),
                };
                warn!(source = %key, "{missing}");
                self.result.warnings.push(missing.to_string());
            }
            found
        } else {
            None
        };

        let document_content = match &candidate {
            Some(found) => self.fetch_document_stage(found),
            None => None,
        };

        info!(source = %key, stage = "extract_table", "stage");
        let mut contents: Vec<&Content> = Vec::new();
        if let Some(doc) = &document_content {
            contents.push(doc);
        }
        contents.push(&page_content);

        let candidates = contents
            .iter()
            .map(|content| content.tariffs(profile))
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let mut subsidies = extract_subsidies(&page_content.text, profile);
        if let Some(doc) = &document_content {
            for (class, percent) in extract_subsidies(&doc.text, profile) {
                subsidies.entry(class).or_insert(percent);
            }
        }

        let reference_price = extract_reference_price(&page_content.text, profile).or_else(
            || {
                document_content
                    .as_ref()
                    .and_then(|doc| extract_reference_price(&doc.text, profile))
            },
        );
        self.result.reference_price = reference_price;

        for content in &contents {
            for (name, value) in extract_components(&content.text, profile) {
                self.result.cost_components.entry(name).or_insert(value);
            }
        }

        info!(source = %key, stage = "resolve_subsidies", "stage");
        let resolver = SubsidyResolver::new(
            &profile.regulator,
            &subsidies,
            profile.max_discount_percent,
        );
        let mut entries: Vec<TariffEntry> = candidates
            .into_iter()
            .map(|candidate| {
                let subsidy = resolver.resolve(candidate.class);
                TariffEntry {
                    class: candidate.class,
                    unit_price: candidate.unit_price,
                    fixed_charge: candidate.fixed_charge,
                    subsidy_percent: subsidy.percent,
                    provenance: subsidy.provenance,
                    price_source: candidate.source,
                }
            })
            .collect();

        info!(source = %key, stage = "calculate_missing", "stage");
        let computed = fill_missing(
            &entries,
            reference_price,
            &resolver,
            &profile.regulator,
            profile.fill_missing_classes,
        );
        entries.extend(computed);
        entries.sort_by_key(|entry| entry.class);

        let classes: Vec<ConsumerClass> = entries
            .iter()
            .map(|entry| entry.class)
            .chain(subsidies.keys().copied())
            .collect();
        self.result.subsidy_records = resolver.resolve_all(classes);
        self.result.tariff_entries = entries;

        info!(source = %key, stage = "emit_result", "stage");
        if self.result.tariff_entries.is_empty() {
            if locate.enabled && candidate.is_none() {
                return Err(ExtractionError::NoDocumentFound {
                    url: self.result.source_url.clone(),
                });
            }
            return Err(ExtractionError::NoExtractableData {
                url: self.result.source_url.clone(),
            });
        }

        Ok(())
    }

    // The downloaded file lives in a temp file owned by `FetchedDocument`; it is
    // removed when this stage returns, whatever the outcome.
    fn fetch_document_stage(&mut self, found: &DocumentCandidate) -> Option<Content> {
        let source = self.source;
        let key = source.config.source.key.as_str();
        self.result.document_url = Some(found.url.clone());
        self.result.document_period = Some(DocumentPeriod {
            year: found.known_year(),
            month: found.month.clone(),
        });

        if !source.config.locate.download {
            info!(source = %key, url = %found.url, "document located; download disabled");
            return None;
        }

        info!(source = %key, stage = "fetch_document", url = %found.url, "stage");
        match fetch_document(source, &found.url) {
            Ok(doc) => {
                self.result.document_sha256 = Some(doc.sha256.clone());
                let content = Content::from_document(&doc);
                info!(
                    source = %key,
                    bytes = doc.bytes,
                    grids = content.grids.len(),
                    "document parsed"
                );
                Some(content)
            }
            Err(err) => {
                warn!(source = %key, error = %err, "document download failed; using page only");
                self.result.warnings.push(err.to_string());
                None
            }
        }
    }
}
