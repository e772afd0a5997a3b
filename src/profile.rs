use crate::config::SourceConfig;
use crate::model::{ConsumerClass, ServiceType};
use crate::subsidy::{DEFAULT_MAX_DISCOUNT_PERCENT, RegulatorTable};
use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Window {
    pub min: f64,
    pub max: f64,
}

impl Window {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value > self.min && value < self.max
    }
}

impl From<[f64; 2]> for Window {
    fn from(value: [f64; 2]) -> Self {
        Window::new(value[0], value[1])
    }
}

impl From<Window> for [f64; 2] {
    fn from(value: Window) -> Self {
        [value.min, value.max]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeWindows {
    pub version: String,
    pub unit_price: Window,
    pub fixed_charge: Window,
    pub reference_price: Window,
    pub component: Window,
}

impl MagnitudeWindows {
    pub fn for_service(service: ServiceType) -> Self {
        match service {
            ServiceType::Electricity => Self {
                version: "cop-2024".to_string(),
                unit_price: Window::new(100.0, 2000.0),
                fixed_charge: Window::new(3000.0, 50000.0),
                reference_price: Window::new(500.0, 2000.0),
                component: Window::new(10.0, 500.0),
            },
            ServiceType::Gas => Self {
                version: "cop-2024".to_string(),
                unit_price: Window::new(500.0, 10000.0),
                fixed_charge: Window::new(3000.0, 100000.0),
                reference_price: Window::new(500.0, 10000.0),
                component: Window::new(50.0, 5000.0),
            },
            ServiceType::Water => Self {
                version: "cop-2024".to_string(),
                unit_price: Window::new(500.0, 10000.0),
                fixed_charge: Window::new(3000.0, 100000.0),
                reference_price: Window::new(500.0, 10000.0),
                component: Window::new(50.0, 5000.0),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, window) in [
            ("unit_price", self.unit_price),
            ("fixed_charge", self.fixed_charge),
            ("reference_price", self.reference_price),
            ("component", self.component),
        ] {
            if !(window.min < window.max) {
                bail!(
                    "windows.{name} must have min < max (got [{}, {}])",
                    window.min,
                    window.max
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ComponentPattern {
    pub name: String,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct ServiceProfile {
    pub service: ServiceType,
    pub unit: String,
    pub windows: MagnitudeWindows,
    pub table_keywords: Vec<String>,
    pub class_cell: Regex,
    pub tariff_patterns: Vec<Regex>,
    pub subsidy_patterns: Vec<Regex>,
    pub reference_patterns: Vec<Regex>,
    pub component_patterns: Vec<ComponentPattern>,
    pub regulator: RegulatorTable,
    pub fill_missing_classes: bool,
    pub subsistence_consumption: f64,
    pub max_discount_percent: f64,
}

impl ServiceProfile {
    pub fn for_service(service: ServiceType) -> Result<Self> {
        let defaults = ProfileDefaults::for_service(service);
        Ok(Self {
            service,
            unit: defaults.unit.to_string(),
            windows: MagnitudeWindows::for_service(service),
            table_keywords: to_strings(defaults.table_keywords),
            class_cell: class_cell_regex(&to_strings(defaults.class_markers))?,
            tariff_patterns: compile_all(defaults.tariff_patterns.iter().copied())?,
            subsidy_patterns: compile_all(defaults.subsidy_patterns.iter().copied())?,
            reference_patterns: compile_all(defaults.reference_patterns.iter().copied())?,
            component_patterns: defaults
                .component_patterns
                .iter()
                .map(|(name, pattern)| compile_component(name, pattern))
                .collect::<Result<Vec<_>>>()?,
            regulator: RegulatorTable::for_service(service),
            fill_missing_classes: defaults.fill_missing_classes,
            subsistence_consumption: defaults.subsistence_consumption,
            max_discount_percent: DEFAULT_MAX_DISCOUNT_PERCENT,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let mut profile = Self::for_service(config.source.service)?;

        if let Some(unit) = &config.source.unit {
            profile.unit = unit.clone();
        }
        if let Some(windows) = &config.windows {
            windows.validate()?;
            profile.windows = windows.clone();
        }
        if let Some(keywords) = &config.keywords.table {
            profile.table_keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        }
        if let Some(markers) = &config.keywords.class_markers {
            profile.class_cell = class_cell_regex(markers)?;
        }
        if let Some(patterns) = &config.patterns.tariff {
            profile.tariff_patterns = compile_all(patterns.iter().map(String::as_str))?;
        }
        if let Some(patterns) = &config.patterns.subsidy {
            profile.subsidy_patterns = compile_all(patterns.iter().map(String::as_str))?;
        }
        if let Some(patterns) = &config.patterns.reference {
            profile.reference_patterns = compile_all(patterns.iter().map(String::as_str))?;
        }
        if let Some(rules) = &config.patterns.components {
            profile.component_patterns = rules
                .iter()
                .map(|rule| compile_component(&rule.name, &rule.pattern))
                .collect::<Result<Vec<_>>>()?;
        }

        if !config.regulator.is_empty() {
            let mut overrides = BTreeMap::new();
            for (key, percent) in &config.regulator {
                let class = key
                    .parse::<ConsumerClass>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("invalid regulator class {key}"))?;
                overrides.insert(class, *percent);
            }
            profile.regulator = profile.regulator.with_overrides(&overrides);
        }

        if let Some(fill) = config.policy.fill_missing_classes {
            profile.fill_missing_classes = fill;
        }
        if let Some(subsistence) = config.policy.subsistence_consumption {
            profile.subsistence_consumption = subsistence;
        }
        if let Some(max_discount) = config.policy.max_discount_percent {
            if max_discount < 0.0 {
                bail!("policy.max_discount_percent must not be negative");
            }
            profile.max_discount_percent = max_discount;
        }

        Ok(profile)
    }

    pub fn is_tariff_header(&self, header_text: &str) -> bool {
        let lowered = header_text.to_lowercase();
        self.table_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

struct ProfileDefaults {
    unit: &'static str,
    table_keywords: &'static [&'static str],
    class_markers: &'static [&'static str],
    tariff_patterns: &'static [&'static str],
    subsidy_patterns: &'static [&'static str],
    reference_patterns: &'static [&'static str],
    component_patterns: &'static [(&'static str, &'static str)],
    fill_missing_classes: bool,
    subsistence_consumption: f64,
}

const STRATUM_PERCENT: &str = r"estrato\s*(\d)[^0-9]*([\d.,]+)\s*%";
const EQUALS_PERCENT: &str = r"(?:estrato\s*|\b)(\d)\s*[=:]\s*([\d.,]+)\s*%";
const RESIDENTIAL_VALUE: &str = r"residencial\s*(\d)[:\s]*\$?([\d.,]+)";
const STRATUM_PESOS: &str = r"estrato\s*(\d)[^0-9]*([\d.,]+)\s*pesos";

impl ProfileDefaults {
    fn for_service(service: ServiceType) -> Self {
        match service {
            ServiceType::Electricity => Self {
                unit: "kWh",
                table_keywords: &["estrato", "kwh", "tarifa", "cargo", "nivel"],
                class_markers: &["estrato"],
                tariff_patterns: &[
                    r"estrato\s*(\d)[:\s]*\$?\s*([\d.,]+)\s*(?:\$\s*)?/?\s*kwh",
                    RESIDENTIAL_VALUE,
                    STRATUM_PESOS,
                ],
                subsidy_patterns: &[EQUALS_PERCENT, STRATUM_PERCENT],
                reference_patterns: &[
                    r"(\d{1,3}[.,]?\d{0,3}[.,]?\d{2})\s*\$/kwh",
                    r"\b(?:cu|costo\s*unitario)\b[:\s]*\$?\s*([\d.,]+)",
                    r"([\d.,]+)\s*\$/kwh",
                    r"nivel\s*(?:de\s*)?tensi[oó]n\s*1[^0-9]*([\d.,]+)",
                ],
                component_patterns: &[
                    ("Generación", r"generaci[oó]n[:\s]*([\d.,]+)"),
                    ("Transmisión", r"transmisi[oó]n[:\s]*([\d.,]+)"),
                    ("Distribución", r"distribuci[oó]n[:\s]*([\d.,]+)"),
                    ("Comercialización", r"comercializaci[oó]n[:\s]*([\d.,]+)"),
                    ("Pérdidas", r"p[eé]rdidas[:\s]*([\d.,]+)"),
                    ("Restricciones", r"restricciones[:\s]*([\d.,]+)"),
                ],
                fill_missing_classes: true,
                subsistence_consumption: 173.0,
            },
            ServiceType::Gas => Self {
                unit: "m³",
                table_keywords: &["estrato", "m3", "m³", "cargo", "tarifa", "consumo", "uso"],
                class_markers: &["estrato"],
                tariff_patterns: &[
                    r"estrato\s*(\d)[:\s]*\$?\s*([\d.,]+)\s*/?\s*m[³3]",
                    RESIDENTIAL_VALUE,
                    STRATUM_PESOS,
                ],
                subsidy_patterns: &[STRATUM_PERCENT],
                reference_patterns: &[],
                component_patterns: &[
                    ("Costo_gas_natural", r"costo\s*gas\s*natural[:\s]*([\d.,]+)"),
                    ("Cargo_distribución", r"cargo\s*distribuci[oó]n[:\s]*([\d.,]+)"),
                    (
                        "Cargo_comercialización",
                        r"cargo\s*comercializaci[oó]n[:\s]*([\d.,]+)",
                    ),
                    ("Cargo_transporte", r"cargo\s*transporte[:\s]*([\d.,]+)"),
                ],
                fill_missing_classes: false,
                subsistence_consumption: 20.0,
            },
            ServiceType::Water => Self {
                unit: "m³",
                table_keywords: &[
                    "estrato",
                    "uso",
                    "cargo",
                    "tarifa",
                    "m3",
                    "m³",
                    "consumo",
                    "acueducto",
                    "alcantarillado",
                ],
                class_markers: &["estrato"],
                tariff_patterns: &[
                    r"estrato\s*(\d)[:\s]*\$?\s*([\d.,]+)\s*/?\s*m[³3]",
                    RESIDENTIAL_VALUE,
                    STRATUM_PESOS,
                ],
                subsidy_patterns: &[STRATUM_PERCENT],
                reference_patterns: &[],
                component_patterns: &[],
                fill_missing_classes: false,
                subsistence_consumption: 16.0,
            },
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){pattern}")).with_context(|| format!("invalid pattern {pattern}"))
}

fn compile_all<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<Vec<Regex>> {
    patterns.map(compile).collect()
}

fn compile_component(name: &str, pattern: &str) -> Result<ComponentPattern> {
    Ok(ComponentPattern {
        name: name.to_string(),
        regex: compile(pattern)?,
    })
}

fn class_cell_regex(markers: &[String]) -> Result<Regex> {
    if markers.is_empty() {
        bail!("at least one class marker is required");
    }
    let alternation = markers
        .iter()
        .map(|m| regex::escape(&m.to_lowercase()))
        .collect::<Vec<_>>()
        .join("|");
    compile(&format!(r"(?:{alternation})\s*(\d)"))
}
