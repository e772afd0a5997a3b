use std::collections::BTreeMap;
use tarifas::calculator::{calculator_classes, fill_missing, final_unit_price};
use tarifas::model::{ConsumerClass, PriceSource, Provenance, ServiceType, TariffEntry};
use tarifas::subsidy::{DEFAULT_MAX_DISCOUNT_PERCENT, RegulatorTable, SubsidyResolver};

fn extracted_entry(class: ConsumerClass, unit_price: f64) -> TariffEntry {
    TariffEntry {
        class,
        unit_price,
        fixed_charge: 0.0,
        subsidy_percent: 0.0,
        provenance: Provenance::Regulatory,
        price_source: PriceSource::Table,
    }
}

#[test]
fn regulator_defaults_per_service() {
    let electricity = RegulatorTable::for_service(ServiceType::Electricity);
    assert_eq!(electricity.default_for(ConsumerClass::Stratum(1)), Some(-60.0));
    assert_eq!(electricity.default_for(ConsumerClass::Stratum(6)), Some(20.0));
    assert_eq!(electricity.default_for(ConsumerClass::Official), Some(0.0));

    let water = RegulatorTable::for_service(ServiceType::Water);
    assert_eq!(water.default_for(ConsumerClass::Stratum(1)), Some(-70.0));
    assert_eq!(water.default_for(ConsumerClass::Stratum(2)), Some(-40.0));

    let gas = RegulatorTable::for_service(ServiceType::Gas);
    assert_eq!(gas.default_for(ConsumerClass::Stratum(1)), Some(-50.0));
    assert!(!gas.covers(ConsumerClass::Official));
}

#[test]
fn extracted_percent_wins_over_default() {
    let table = RegulatorTable::for_service(ServiceType::Electricity);
    let extracted = BTreeMap::from([(ConsumerClass::Stratum(1), -55.0)]);
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);

    let record = resolver.resolve(ConsumerClass::Stratum(1));
    assert_eq!(record.percent, -55.0);
    assert_eq!(record.provenance, Provenance::Extracted);

    let record = resolver.resolve(ConsumerClass::Stratum(2));
    assert_eq!(record.percent, -50.0);
    assert_eq!(record.provenance, Provenance::Regulatory);
}

#[test]
fn implausible_discount_falls_back_to_default() {
    let table = RegulatorTable::for_service(ServiceType::Electricity);
    let extracted = BTreeMap::from([
        (ConsumerClass::Stratum(1), -95.0),
        (ConsumerClass::Stratum(5), 150.0),
    ]);
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);

    let record = resolver.resolve(ConsumerClass::Stratum(1));
    assert_eq!(record.percent, -60.0);
    assert_eq!(record.provenance, Provenance::Regulatory);

    // Contributions carry no upper bound.
    assert_eq!(resolver.resolve(ConsumerClass::Stratum(5)).percent, 150.0);
}

#[test]
fn uncovered_class_resolves_to_zero() {
    let table = RegulatorTable::for_service(ServiceType::Gas);
    let extracted = BTreeMap::new();
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);

    let record = resolver.resolve(ConsumerClass::VehicularGas);
    assert_eq!(record.percent, 0.0);
    assert_eq!(record.provenance, Provenance::Regulatory);
}

#[test]
fn resolve_all_dedupes_and_sorts() {
    let table = RegulatorTable::for_service(ServiceType::Water);
    let extracted = BTreeMap::new();
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);

    let records = resolver.resolve_all([
        ConsumerClass::Commercial,
        ConsumerClass::Stratum(3),
        ConsumerClass::Commercial,
        ConsumerClass::Stratum(1),
    ]);
    let classes: Vec<ConsumerClass> = records.iter().map(|r| r.class).collect();
    assert_eq!(
        classes,
        vec![
            ConsumerClass::Stratum(1),
            ConsumerClass::Stratum(3),
            ConsumerClass::Commercial
        ]
    );
}

#[test]
fn overrides_replace_table_rows() {
    let overrides = BTreeMap::from([(ConsumerClass::Stratum(3), 0.0)]);
    let table = RegulatorTable::for_service(ServiceType::Electricity).with_overrides(&overrides);

    assert_eq!(table.default_for(ConsumerClass::Stratum(3)), Some(0.0));
    assert_eq!(table.default_for(ConsumerClass::Stratum(2)), Some(-50.0));
}

#[test]
fn final_price_applies_percent_to_reference() {
    assert_eq!(final_unit_price(1000.0, 0.0), 1000.0);
    assert_eq!(final_unit_price(1000.0, -60.0), 400.0);
    assert_eq!(final_unit_price(1000.0, 20.0), 1200.0);
    assert_eq!(final_unit_price(862.45, -15.0), 733.08);
}

#[test]
fn calculator_set_drops_official_when_uncovered() {
    let gas = calculator_classes(&RegulatorTable::for_service(ServiceType::Gas));
    assert_eq!(gas.len(), 8);
    assert!(!gas.contains(&ConsumerClass::Official));

    let electricity = calculator_classes(&RegulatorTable::for_service(ServiceType::Electricity));
    assert_eq!(electricity.len(), 9);
}

#[test]
fn full_set_is_computed_when_nothing_was_extracted() {
    let table = RegulatorTable::for_service(ServiceType::Electricity);
    let extracted = BTreeMap::new();
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);

    let computed = fill_missing(&[], Some(1000.0), &resolver, &table, false);
    assert_eq!(computed.len(), 9);
    assert!(computed.iter().all(|e| e.price_source == PriceSource::Calculated));

    let stratum1 = computed
        .iter()
        .find(|e| e.class == ConsumerClass::Stratum(1))
        .expect("stratum 1");
    assert_eq!(stratum1.unit_price, 400.0);
    assert_eq!(stratum1.subsidy_percent, -60.0);
}

#[test]
fn extracted_entries_are_never_overwritten() {
    let table = RegulatorTable::for_service(ServiceType::Electricity);
    let extracted = BTreeMap::new();
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);
    let existing = vec![extracted_entry(ConsumerClass::Stratum(4), 870.0)];

    let computed = fill_missing(&existing, Some(1000.0), &resolver, &table, true);
    assert_eq!(computed.len(), 8);
    assert!(computed.iter().all(|e| e.class != ConsumerClass::Stratum(4)));

    let none = fill_missing(&existing, Some(1000.0), &resolver, &table, false);
    assert!(none.is_empty());
}

#[test]
fn no_reference_price_means_nothing_computed() {
    let table = RegulatorTable::for_service(ServiceType::Water);
    let extracted = BTreeMap::new();
    let resolver = SubsidyResolver::new(&table, &extracted, DEFAULT_MAX_DISCOUNT_PERCENT);

    assert!(fill_missing(&[], None, &resolver, &table, true).is_empty());
}
