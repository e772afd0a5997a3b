pub fn normalize_number(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');

    let canonical = if has_dot && has_comma {
        cleaned.replace('.', "").replace(',', ".")
    } else if has_comma {
        cleaned.replace(',', ".")
    } else if cleaned.matches('.').count() > 1 {
        collapse_thousands_dots(&cleaned)
    } else {
        cleaned
    };

    canonical.parse::<f64>().unwrap_or(0.0)
}

// "1.234.567" groups every dot as thousands; "1.234.56" keeps the last dot as
// the decimal point because its tail is not a three-digit group.
fn collapse_thousands_dots(cleaned: &str) -> String {
    let Some((head, tail)) = cleaned.rsplit_once('.') else {
        return cleaned.to_string();
    };
    let head = head.replace('.', "");
    if tail.len() == 3 {
        format!("{head}{tail}")
    } else {
        format!("{head}.{tail}")
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
