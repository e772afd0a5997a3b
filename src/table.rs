use crate::model::{ConsumerClass, PriceSource, TariffCandidate};
use crate::numeric::normalize_number;
use crate::profile::ServiceProfile;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static TEXT_COLUMNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\t+|\s{2,}|\s*\|\s*").expect("column split regex must compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn header_text(&self) -> String {
        self.header()
            .iter()
            .map(|cell| cell.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?\d[\d.,]*$").expect("amount token regex must compile")
});

// Runs of lines that split into two or more cells become one grid each. Blank
// lines never end a run: pdf-extract puts one between every table row.
pub fn grids_from_text(text: &str) -> Vec<Grid> {
    let mut grids = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();
    let mut previous: Option<&str> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some(row) = split_class_row(line) {
            if current.is_empty()
                && let Some(header) = previous
            {
                current.push(vec![header.to_string()]);
            }
            current.push(row);
        } else {
            let cells = split_columns(line);
            if cells.len() >= 2 {
                current.push(cells);
            } else {
                flush_run(&mut grids, &mut current);
            }
        }
        previous = Some(line);
    }
    flush_run(&mut grids, &mut current);

    grids
}

fn split_columns(line: &str) -> Vec<String> {
    TEXT_COLUMNS
        .split(line)
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(ToString::to_string)
        .collect()
}

// PDF text joins a row with single spaces, so a row is recognized by its shape:
// a class token ("3", "Comercial", "Estrato 3") followed only by amounts.
fn split_class_row(line: &str) -> Option<Vec<String>> {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .filter(|token| !matches!(*token, "$" | "|"))
        .collect();

    let label_len = match tokens.as_slice() {
        [first, ..]
            if ConsumerClass::from_digit(first).is_some()
                || ConsumerClass::from_category(first).is_some() =>
        {
            1
        }
        [first, second, ..]
            if first.chars().all(char::is_alphabetic)
                && ConsumerClass::from_digit(second).is_some() =>
        {
            2
        }
        _ => return None,
    };

    let amounts = &tokens[label_len..];
    if amounts.is_empty() || !amounts.iter().all(|token| AMOUNT.is_match(token)) {
        return None;
    }

    let mut cells = vec![tokens[..label_len].join(" ")];
    cells.extend(amounts.iter().map(ToString::to_string));
    Some(cells)
}

fn flush_run(grids: &mut Vec<Grid>, current: &mut Vec<Vec<String>>) {
    let rows = std::mem::take(current);
    if rows.len() >= 2 {
        grids.push(Grid::new(rows));
    }
}

pub fn is_tariff_table(grid: &Grid, profile: &ServiceProfile) -> bool {
    profile.is_tariff_header(&grid.header_text())
}

pub fn class_from_cell(cell: &str, class_cell: &Regex) -> Option<ConsumerClass> {
    let trimmed = cell.trim();
    if let Some(class) = ConsumerClass::from_digit(trimmed) {
        return Some(class);
    }
    if let Some(caps) = class_cell.captures(trimmed)
        && let Some(digit) = caps.get(1)
    {
        return ConsumerClass::from_digit(digit.as_str());
    }
    ConsumerClass::from_category(trimmed)
}

pub fn extract_table_rows(grid: &Grid, profile: &ServiceProfile) -> Vec<TariffCandidate> {
    if !is_tariff_table(grid, profile) {
        debug!(header = %grid.header_text(), "table skipped; no tariff keyword in header");
        return Vec::new();
    }

    let windows = &profile.windows;
    let mut out: Vec<TariffCandidate> = Vec::new();

    for row in grid.data_rows() {
        if row.len() < 2 {
            continue;
        }
        let Some(class) = class_from_cell(&row[0], &profile.class_cell) else {
            continue;
        };

        let values = row[1..]
            .iter()
            .map(|cell| normalize_number(cell))
            .filter(|value| *value > 0.0)
            .collect::<Vec<_>>();
        if values.is_empty() {
            continue;
        }

        let unit_price = values
            .iter()
            .copied()
            .find(|v| windows.unit_price.contains(*v))
            .unwrap_or(values[0]);
        let fixed_charge = values
            .iter()
            .copied()
            .find(|v| windows.fixed_charge.contains(*v) && *v != unit_price)
            .unwrap_or(0.0);

        if out.iter().any(|candidate| candidate.class == class) {
            debug!(class = %class, "duplicate class row dropped");
            continue;
        }

        debug!(class = %class, unit_price, fixed_charge, "tariff row");
        out.push(TariffCandidate {
            class,
            unit_price,
            fixed_charge,
            source: PriceSource::Table,
        });
    }

    out
}

pub fn extract_from_grids(grids: &[Grid], profile: &ServiceProfile) -> Vec<TariffCandidate> {
    let mut out: Vec<TariffCandidate> = Vec::new();
    for (idx, grid) in grids.iter().enumerate() {
        let rows = extract_table_rows(grid, profile);
        if !rows.is_empty() {
            info!(table = idx, rows = rows.len(), "tariff table found");
        }
        for candidate in rows {
            if !out.iter().any(|existing| existing.class == candidate.class) {
                out.push(candidate);
            }
        }
    }
    out
}
