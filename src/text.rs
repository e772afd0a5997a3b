use crate::model::{ConsumerClass, PriceSource, TariffCandidate};
use crate::numeric::normalize_number;
use crate::profile::{ServiceProfile, Window};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

pub fn extract_text_tariffs(text: &str, profile: &ServiceProfile) -> Vec<TariffCandidate> {
    let mut out: Vec<TariffCandidate> = Vec::new();

    for pattern in &profile.tariff_patterns {
        for caps in pattern.captures_iter(text) {
            let (Some(class_token), Some(value_text)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(class) = ConsumerClass::from_digit(class_token.as_str()) else {
                continue;
            };
            let value = normalize_number(value_text.as_str());
            if !profile.windows.unit_price.contains(value) {
                continue;
            }
            if out.iter().any(|candidate| candidate.class == class) {
                continue;
            }
            debug!(class = %class, value, pattern = %pattern.as_str(), "tariff from text");
            out.push(TariffCandidate {
                class,
                unit_price: value,
                fixed_charge: 0.0,
                source: PriceSource::Text,
            });
        }
    }

    out
}

// Percent text carries no sign: strata 1-3 are read as discounts, 5-6 as
// contributions. Other classes are not recognized from prose. Within one
// pattern the last mention of a class wins; earlier patterns outrank later ones.
pub fn extract_subsidies(text: &str, profile: &ServiceProfile) -> BTreeMap<ConsumerClass, f64> {
    let mut out = BTreeMap::new();

    for pattern in &profile.subsidy_patterns {
        let mut found = BTreeMap::new();
        for caps in pattern.captures_iter(text) {
            let (Some(class_token), Some(value_text)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(class) = ConsumerClass::from_digit(class_token.as_str()) else {
                continue;
            };
            let value = normalize_number(value_text.as_str());
            if value <= 0.0 {
                continue;
            }
            let signed = match class {
                ConsumerClass::Stratum(1..=3) => -value,
                ConsumerClass::Stratum(5..=6) => value,
                _ => continue,
            };
            found.insert(class, signed);
        }
        for (class, signed) in found {
            if out.contains_key(&class) {
                continue;
            }
            debug!(class = %class, percent = signed, "subsidy from text");
            out.insert(class, signed);
        }
    }

    out
}

pub fn extract_reference_price(text: &str, profile: &ServiceProfile) -> Option<f64> {
    first_in_window(text, &profile.reference_patterns, profile.windows.reference_price)
}

// Only the first mention of a component counts; an out-of-window first value
// leaves the component unset.
pub fn extract_components(text: &str, profile: &ServiceProfile) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for component in &profile.component_patterns {
        let Some(value) = component
            .regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| normalize_number(m.as_str()))
        else {
            continue;
        };
        if !profile.windows.component.contains(value) {
            debug!(component = %component.name, value, "cost component out of range");
            continue;
        }
        debug!(component = %component.name, value, "cost component");
        out.insert(component.name.clone(), value);
    }
    out
}

fn first_in_window(text: &str, patterns: &[Regex], window: Window) -> Option<f64> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| normalize_number(m.as_str())))
            .find(|value| window.contains(*value))
    })
}
