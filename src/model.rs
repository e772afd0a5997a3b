use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ConsumerClass {
    Stratum(u8),
    Residential,
    Commercial,
    Industrial,
    Official,
    VehicularGas,
}

impl ConsumerClass {
    pub fn stratum(value: u8) -> Option<Self> {
        (1..=6).contains(&value).then_some(ConsumerClass::Stratum(value))
    }

    pub fn from_digit(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.len() != 1 {
            return None;
        }
        token.parse::<u8>().ok().and_then(Self::stratum)
    }

    pub fn from_category(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "residencial" | "residential" => Some(ConsumerClass::Residential),
            "comercial" | "commercial" => Some(ConsumerClass::Commercial),
            "industrial" => Some(ConsumerClass::Industrial),
            "oficial" | "official" | "institucional" => Some(ConsumerClass::Official),
            "gnv" => Some(ConsumerClass::VehicularGas),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            ConsumerClass::Stratum(n) => n.to_string(),
            ConsumerClass::Residential => "Residencial".to_string(),
            ConsumerClass::Commercial => "Comercial".to_string(),
            ConsumerClass::Industrial => "Industrial".to_string(),
            ConsumerClass::Official => "Oficial".to_string(),
            ConsumerClass::VehicularGas => "GNV".to_string(),
        }
    }

    pub fn calculator_set() -> Vec<ConsumerClass> {
        let mut classes: Vec<ConsumerClass> = (1..=6).map(ConsumerClass::Stratum).collect();
        classes.push(ConsumerClass::Commercial);
        classes.push(ConsumerClass::Industrial);
        classes.push(ConsumerClass::Official);
        classes
    }
}

impl fmt::Display for ConsumerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for ConsumerClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConsumerClass::from_digit(s)
            .or_else(|| ConsumerClass::from_category(s))
            .ok_or_else(|| format!("unknown consumer class {s:?}"))
    }
}

impl From<ConsumerClass> for String {
    fn from(value: ConsumerClass) -> Self {
        value.label()
    }
}

impl TryFrom<String> for ConsumerClass {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Electricity,
    Gas,
    Water,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceType::Electricity => "electricity",
            ServiceType::Gas => "gas",
            ServiceType::Water => "water",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Extracted,
    Regulatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Table,
    Text,
    Calculated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TariffCandidate {
    pub class: ConsumerClass,
    pub unit_price: f64,
    pub fixed_charge: f64,
    pub source: PriceSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffEntry {
    pub class: ConsumerClass,
    pub unit_price: f64,
    #[serde(default)]
    pub fixed_charge: f64,
    pub subsidy_percent: f64,
    pub provenance: Provenance,
    pub price_source: PriceSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsidyRecord {
    pub class: ConsumerClass,
    pub percent: f64,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPeriod {
    pub year: Option<i32>,
    pub month: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub source_key: String,
    pub provider: String,
    pub region: Option<String>,
    pub source_url: String,
    pub document_url: Option<String>,
    pub document_period: Option<DocumentPeriod>,
    pub document_sha256: Option<String>,
    pub extraction_timestamp: String,
    pub service_type: ServiceType,
    pub unit: String,
    pub reference_price: Option<f64>,
    pub tariff_entries: Vec<TariffEntry>,
    pub subsidy_records: Vec<SubsidyRecord>,
    pub cost_components: BTreeMap<String, f64>,
    pub subsistence_consumption: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        rename = "sugerencia",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub suggestion: Option<String>,
}

impl ExtractionResult {
    pub fn entry_for(&self, class: ConsumerClass) -> Option<&TariffEntry> {
        self.tariff_entries.iter().find(|entry| entry.class == class)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
