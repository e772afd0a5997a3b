use crate::config::LocateConfig;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"20\d{2}").expect("year regex must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

impl Link {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCandidate {
    pub url: String,
    pub text: String,
    pub year: i32,
    pub month_index: i32,
    pub month: Option<String>,
}

impl DocumentCandidate {
    pub fn known_year(&self) -> Option<i32> {
        (self.year > 0).then_some(self.year)
    }
}

pub fn locate_document(
    links: &[Link],
    policy: &LocateConfig,
    current_year: i32,
) -> Option<DocumentCandidate> {
    let extension = policy.extension.to_lowercase();
    let documents: Vec<&Link> = links
        .iter()
        .filter(|link| link.href.to_lowercase().contains(&extension))
        .collect();

    let pool = match policy.keyword.as_deref().map(str::to_lowercase) {
        Some(keyword) => {
            let keyed: Vec<&Link> = documents
                .iter()
                .copied()
                .filter(|link| {
                    link.text.to_lowercase().contains(&keyword)
                        || link.href.to_lowercase().contains(&keyword)
                })
                .collect();
            if keyed.is_empty() {
                debug!(keyword = %keyword, "no keyword match; accepting any document link");
                documents
            } else {
                keyed
            }
        }
        None => documents,
    };

    let oldest = current_year - policy.max_age_years;
    let mut candidates: Vec<DocumentCandidate> = pool
        .into_iter()
        .map(|link| to_candidate(link, &policy.months))
        .filter(|candidate| match candidate.known_year() {
            Some(year) => year >= oldest,
            None => policy.accepts_undated(),
        })
        .collect();

    candidates.sort_by(|a, b| (b.year, b.month_index).cmp(&(a.year, a.month_index)));

    info!(candidates = candidates.len(), "document candidates");
    let selected = candidates.into_iter().next()?;
    info!(
        url = %selected.url,
        year = selected.year,
        month = selected.month.as_deref().unwrap_or("unknown"),
        "selected document"
    );
    Some(selected)
}

// Only the last path segment is searched so directory names never leak a year
// or month into the ranking.
fn to_candidate(link: &Link, months: &[String]) -> DocumentCandidate {
    let href = link.href.to_lowercase();
    let file_name = href.rsplit('/').next().unwrap_or(href.as_str());
    let text = link.text.to_lowercase();

    let year = YEAR
        .find(file_name)
        .or_else(|| YEAR.find(&text))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .unwrap_or(0);

    let found = months.iter().enumerate().find(|(_, month)| {
        let month = month.to_lowercase();
        text.contains(&month) || file_name.contains(&month)
    });
    let (month_index, month) = match found {
        Some((idx, name)) => (idx as i32, Some(name.clone())),
        None => (-1, None),
    };

    DocumentCandidate {
        url: link.href.clone(),
        text: link.text.trim().to_string(),
        year,
        month_index,
        month,
    }
}
