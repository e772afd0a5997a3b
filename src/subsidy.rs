use crate::model::{ConsumerClass, Provenance, ServiceType, SubsidyRecord};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const ELECTRICITY_DEFAULTS: &[(ConsumerClass, f64)] = &[
    (ConsumerClass::Stratum(1), -60.0),
    (ConsumerClass::Stratum(2), -50.0),
    (ConsumerClass::Stratum(3), -15.0),
    (ConsumerClass::Stratum(4), 0.0),
    (ConsumerClass::Stratum(5), 20.0),
    (ConsumerClass::Stratum(6), 20.0),
    (ConsumerClass::Commercial, 20.0),
    (ConsumerClass::Industrial, 20.0),
    (ConsumerClass::Official, 0.0),
];

const GAS_DEFAULTS: &[(ConsumerClass, f64)] = &[
    (ConsumerClass::Stratum(1), -50.0),
    (ConsumerClass::Stratum(2), -40.0),
    (ConsumerClass::Stratum(3), -15.0),
    (ConsumerClass::Stratum(4), 0.0),
    (ConsumerClass::Stratum(5), 20.0),
    (ConsumerClass::Stratum(6), 20.0),
    (ConsumerClass::Commercial, 20.0),
    (ConsumerClass::Industrial, 20.0),
];

const WATER_DEFAULTS: &[(ConsumerClass, f64)] = &[
    (ConsumerClass::Stratum(1), -70.0),
    (ConsumerClass::Stratum(2), -40.0),
    (ConsumerClass::Stratum(3), -15.0),
    (ConsumerClass::Stratum(4), 0.0),
    (ConsumerClass::Stratum(5), 20.0),
    (ConsumerClass::Stratum(6), 20.0),
    (ConsumerClass::Commercial, 20.0),
    (ConsumerClass::Industrial, 20.0),
    (ConsumerClass::Official, 0.0),
];

pub const DEFAULT_MAX_DISCOUNT_PERCENT: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RegulatorTable {
    service: ServiceType,
    defaults: BTreeMap<ConsumerClass, f64>,
}

impl RegulatorTable {
    pub fn for_service(service: ServiceType) -> Self {
        let rows = match service {
            ServiceType::Electricity => ELECTRICITY_DEFAULTS,
            ServiceType::Gas => GAS_DEFAULTS,
            ServiceType::Water => WATER_DEFAULTS,
        };
        Self {
            service,
            defaults: rows.iter().copied().collect(),
        }
    }

    pub fn with_overrides(mut self, overrides: &BTreeMap<ConsumerClass, f64>) -> Self {
        for (class, percent) in overrides {
            self.defaults.insert(*class, *percent);
        }
        self
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn default_for(&self, class: ConsumerClass) -> Option<f64> {
        self.defaults.get(&class).copied()
    }

    pub fn covers(&self, class: ConsumerClass) -> bool {
        self.defaults.contains_key(&class)
    }
}

#[derive(Debug, Clone)]
pub struct SubsidyResolver<'a> {
    table: &'a RegulatorTable,
    extracted: &'a BTreeMap<ConsumerClass, f64>,
    max_discount_percent: f64,
}

impl<'a> SubsidyResolver<'a> {
    pub fn new(
        table: &'a RegulatorTable,
        extracted: &'a BTreeMap<ConsumerClass, f64>,
        max_discount_percent: f64,
    ) -> Self {
        Self {
            table,
            extracted,
            max_discount_percent,
        }
    }

    pub fn resolve(&self, class: ConsumerClass) -> SubsidyRecord {
        if let Some(percent) = self.extracted.get(&class).copied() {
            if self.is_plausible(percent) {
                return SubsidyRecord {
                    class,
                    percent,
                    provenance: Provenance::Extracted,
                };
            }
            warn!(
                service = %self.table.service(),
                class = %class,
                percent,
                max_discount = self.max_discount_percent,
                "extracted subsidy outside sanity bound; using regulatory default"
            );
        }

        let percent = self.table.default_for(class).unwrap_or_else(|| {
            debug!(
                service = %self.table.service(),
                class = %class,
                "no regulatory default for class; assuming 0%"
            );
            0.0
        });
        SubsidyRecord {
            class,
            percent,
            provenance: Provenance::Regulatory,
        }
    }

    pub fn resolve_all(
        &self,
        classes: impl IntoIterator<Item = ConsumerClass>,
    ) -> Vec<SubsidyRecord> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for class in classes {
            if seen.contains(&class) {
                continue;
            }
            seen.push(class);
            out.push(self.resolve(class));
        }
        out.sort_by_key(|record| record.class);
        out
    }

    fn is_plausible(&self, percent: f64) -> bool {
        if !percent.is_finite() {
            return false;
        }
        percent >= 0.0 || percent.abs() <= self.max_discount_percent
    }
}
