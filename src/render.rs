use crate::config::{FetchMode, LoadedSource, RenderMode};
use crate::error::ExtractionError;
use crate::fetch::{FetchedPage, fetch_page};
use crate::locator::Link;
use crate::table::Grid;
use scraper::{ElementRef, Html, Selector};
use std::process::Command;
use tracing::{debug, info};
use url::Url;

pub trait PageRenderer {
    fn key(&self) -> &'static str;
    fn render(&self, source: &LoadedSource, url: &str) -> Result<FetchedPage, ExtractionError>;
}

pub struct StaticRenderer;

impl PageRenderer for StaticRenderer {
    fn key(&self) -> &'static str {
        "static"
    }

    fn render(&self, source: &LoadedSource, url: &str) -> Result<FetchedPage, ExtractionError> {
        fetch_page(source, url)
    }
}

pub struct CommandRenderer {
    pub program: String,
    pub args: Vec<String>,
    pub settle_ms: u64,
}

impl PageRenderer for CommandRenderer {
    fn key(&self) -> &'static str {
        "command"
    }

    fn render(&self, source: &LoadedSource, url: &str) -> Result<FetchedPage, ExtractionError> {
        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{url}", url)
                    .replace("{settle_ms}", &self.settle_ms.to_string())
            })
            .collect::<Vec<_>>();

        debug!(program = %self.program, args = ?args, "spawning renderer");
        let output = Command::new(&self.program).args(&args).output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ExtractionError::Setup(format!("renderer program {} not found", self.program))
            } else {
                ExtractionError::transport(url, format!("renderer {} failed: {err}", self.program))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::transport(
                url,
                format!(
                    "renderer {} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        let html = String::from_utf8_lossy(&output.stdout).to_string();
        info!(
            source = %source.config.source.key,
            url = %url,
            bytes = html.len(),
            settle_ms = self.settle_ms,
            "rendered page"
        );
        Ok(FetchedPage {
            url: url.to_string(),
            html,
        })
    }
}

pub fn renderer_for(source: &LoadedSource) -> Box<dyn PageRenderer> {
    let render = &source.config.render;
    match (source.config.fetch.mode, render.mode, render.program.as_ref()) {
        (FetchMode::Http, RenderMode::Command, Some(program)) => Box::new(CommandRenderer {
            program: program.clone(),
            args: render.args.clone(),
            settle_ms: render.settle_ms,
        }),
        _ => Box::new(StaticRenderer),
    }
}

pub struct PageSnapshot {
    url: String,
    document: Html,
}

impl PageSnapshot {
    pub fn parse(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            document: Html::parse_document(html),
        }
    }

    pub fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(css) {
            Ok(selector) => self.document.select(&selector).collect(),
            Err(err) => {
                debug!(selector = css, error = ?err, "invalid selector");
                Vec::new()
            }
        }
    }

    pub fn links(&self) -> Vec<Link> {
        self.select("a[href]")
            .into_iter()
            .filter_map(|el| {
                let href = el.value().attr("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                Some(Link {
                    href: absolutize_url(&self.url, href),
                    text: element_text(el),
                })
            })
            .collect()
    }

    pub fn tables(&self) -> Vec<Grid> {
        let Ok(row_selector) = Selector::parse("tr") else {
            return Vec::new();
        };
        let Ok(cell_selector) = Selector::parse("th, td") else {
            return Vec::new();
        };

        self.select("table")
            .into_iter()
            .map(|table| {
                let rows = table
                    .select(&row_selector)
                    .map(|row| row.select(&cell_selector).map(element_text).collect())
                    .filter(|cells: &Vec<String>| !cells.is_empty())
                    .collect();
                Grid::new(rows)
            })
            .filter(|grid| !grid.is_empty())
            .collect()
    }

    pub fn visible_text(&self) -> String {
        let mut parts = Vec::new();
        for node in self.document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().is_some_and(|el| {
                    matches!(el.name(), "script" | "style" | "noscript" | "head" | "template")
                })
            });
            if hidden {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        parts.join("\n")
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn absolutize_url(base_url: &str, value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }

    if let Ok(base) = Url::parse(base_url)
        && let Ok(joined) = base.join(value)
    {
        return joined.to_string();
    }

    value.to_string()
}
