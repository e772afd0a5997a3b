use crate::model::ServiceType;
use crate::profile::{MagnitudeWindows, ServiceProfile};
use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub path: PathBuf,
    pub config: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source: SourceMeta,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub locate: LocateConfig,
    #[serde(default)]
    pub windows: Option<MagnitudeWindows>,
    #[serde(default)]
    pub regulator: BTreeMap<String, f64>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.key.trim().is_empty() {
            bail!("source.key must not be empty");
        }
        if self.source.name.trim().is_empty() {
            bail!("source.name must not be empty");
        }

        match self.fetch.mode {
            FetchMode::Http => {
                if self.fetch.base_url.is_none() {
                    bail!("fetch.base_url is required for http mode");
                }
            }
            FetchMode::File => {
                if self.fetch.file_path.is_none() {
                    bail!("fetch.file_path is required for file mode");
                }
            }
            FetchMode::Inline => {
                if self.fetch.inline_data.is_none() {
                    bail!("fetch.inline_data is required for inline mode");
                }
            }
        }

        if self.render.mode == RenderMode::Command && self.render.program.is_none() {
            bail!("render.program is required for command rendering");
        }

        if !self.locate.extension.starts_with('.') {
            bail!("locate.extension must start with a dot");
        }

        if let Some(tz) = &self.source.timezone {
            tz.parse::<Tz>()
                .map_err(|err| anyhow!("invalid source.timezone {tz}: {err}"))?;
        }

        ServiceProfile::from_config(self).context("invalid service profile overrides")?;

        Ok(())
    }

    pub fn timezone(&self) -> Tz {
        self.source
            .timezone
            .as_deref()
            .and_then(|tz| tz.parse::<Tz>().ok())
            .unwrap_or(chrono_tz::America::Bogota)
    }

    pub fn sanitized_source_file_name(&self) -> String {
        sanitize_for_path(&self.source.key)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceMeta {
    pub key: String,
    pub name: String,
    pub service: ServiceType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Http,
    File,
    Inline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub mode: FetchMode,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub inline_data: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_document_timeout_secs")]
    pub document_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Http,
            base_url: None,
            file_path: None,
            inline_data: None,
            headers: BTreeMap::new(),
            user_agent: None,
            timeout_secs: default_timeout_secs(),
            document_timeout_secs: default_document_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Static,
    Command,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default = "default_render_args")]
    pub args: Vec<String>,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Static,
            program: None,
            args: default_render_args(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub accept_undated: Option<bool>,
    #[serde(default = "default_max_age_years")]
    pub max_age_years: i32,
    #[serde(default = "default_true")]
    pub download: bool,
    #[serde(default = "default_months")]
    pub months: Vec<String>,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extension: default_extension(),
            keyword: None,
            accept_undated: None,
            max_age_years: default_max_age_years(),
            download: true,
            months: default_months(),
        }
    }
}

impl LocateConfig {
    // A keyword already narrows the links to tariff documents, so undated ones
    // are kept. Without one, an undated link is more likely a manual or notice.
    pub fn accepts_undated(&self) -> bool {
        self.accept_undated.unwrap_or(self.keyword.is_some())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub fill_missing_classes: Option<bool>,
    #[serde(default)]
    pub subsistence_consumption: Option<f64>,
    #[serde(default)]
    pub max_discount_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KeywordConfig {
    #[serde(default)]
    pub table: Option<Vec<String>>,
    #[serde(default)]
    pub class_markers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PatternConfig {
    #[serde(default)]
    pub tariff: Option<Vec<String>>,
    #[serde(default)]
    pub subsidy: Option<Vec<String>>,
    #[serde(default)]
    pub reference: Option<Vec<String>>,
    #[serde(default)]
    pub components: Option<Vec<ComponentRule>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRule {
    pub name: String,
    pub pattern: String,
}

pub fn load_sources_from_dir(config_dir: &Path) -> Result<Vec<LoadedSource>> {
    if !config_dir.exists() {
        bail!("config dir does not exist: {}", config_dir.display());
    }

    let mut loaded = Vec::new();
    for entry in WalkDir::new(config_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("toml") {
            continue;
        }

        loaded.push(load_source_file(path)?);
    }

    loaded.sort_by(|a, b| a.config.source.key.cmp(&b.config.source.key));
    Ok(loaded)
}

pub fn load_source_file(config_path: &Path) -> Result<LoadedSource> {
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read source config: {}", config_path.display()))?;
    let config = parse_source_config(&text)
        .with_context(|| format!("invalid source config {}", config_path.display()))?;
    Ok(LoadedSource {
        path: config_path.to_path_buf(),
        config,
    })
}

pub fn parse_source_config(text: &str) -> Result<SourceConfig> {
    let config: SourceConfig = toml::from_str(text).context("failed to parse toml")?;
    config.validate()?;
    Ok(config)
}

pub fn resolve_path(base_config_path: &Path, maybe_relative: &Path) -> Result<PathBuf> {
    if maybe_relative.is_absolute() {
        return Ok(maybe_relative.to_path_buf());
    }

    let parent = base_config_path.parent().ok_or_else(|| {
        anyhow!(
            "source config has no parent directory: {}",
            base_config_path.display()
        )
    })?;

    Ok(parent.join(maybe_relative))
}

pub fn sanitize_for_path(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_document_timeout_secs() -> u64 {
    60
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_render_args() -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--virtual-time-budget={settle_ms}".to_string(),
        "--dump-dom".to_string(),
        "{url}".to_string(),
    ]
}

fn default_extension() -> String {
    ".pdf".to_string()
}

fn default_max_age_years() -> i32 {
    1
}

fn default_months() -> Vec<String> {
    [
        "enero",
        "febrero",
        "marzo",
        "abril",
        "mayo",
        "junio",
        "julio",
        "agosto",
        "septiembre",
        "octubre",
        "noviembre",
        "diciembre",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}
