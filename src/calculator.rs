use crate::model::{ConsumerClass, PriceSource, TariffEntry};
use crate::numeric::round2;
use crate::subsidy::{RegulatorTable, SubsidyResolver};
use tracing::debug;

pub fn final_unit_price(reference_price: f64, percent: f64) -> f64 {
    round2(reference_price * (1.0 + percent / 100.0))
}

pub fn calculator_classes(table: &RegulatorTable) -> Vec<ConsumerClass> {
    ConsumerClass::calculator_set()
        .into_iter()
        .filter(|class| *class != ConsumerClass::Official || table.covers(*class))
        .collect()
}

// Extracted entries always win; computed ones only fill classes nobody saw.
// With no extracted entries the full set is computed regardless of
// `fill_missing`.
pub fn fill_missing(
    existing: &[TariffEntry],
    reference_price: Option<f64>,
    resolver: &SubsidyResolver<'_>,
    table: &RegulatorTable,
    fill_missing: bool,
) -> Vec<TariffEntry> {
    let Some(reference_price) = reference_price else {
        return Vec::new();
    };
    if !existing.is_empty() && !fill_missing {
        return Vec::new();
    }

    let mut computed = Vec::new();
    for class in calculator_classes(table) {
        if existing.iter().any(|entry| entry.class == class) {
            continue;
        }
        let subsidy = resolver.resolve(class);
        let unit_price = final_unit_price(reference_price, subsidy.percent);
        debug!(
            class = %class,
            reference_price,
            percent = subsidy.percent,
            unit_price,
            "computed tariff from reference price"
        );
        computed.push(TariffEntry {
            class,
            unit_price,
            fixed_charge: 0.0,
            subsidy_percent: subsidy.percent,
            provenance: subsidy.provenance,
            price_source: PriceSource::Calculated,
        });
    }
    computed
}
