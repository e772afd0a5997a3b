use crate::config::{FetchConfig, FetchMode, LoadedSource, resolve_path};
use crate::error::ExtractionError;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Markup,
}

#[derive(Debug)]
pub struct FetchedDocument {
    pub url: String,
    pub kind: DocumentKind,
    pub sha256: String,
    pub bytes: usize,
    file: NamedTempFile,
}

impl FetchedDocument {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn text(&self) -> String {
        match self.kind {
            DocumentKind::Pdf => match pdf_extract::extract_text(self.path()) {
                Ok(text) => text,
                Err(err) => {
                    warn!(
                        url = %self.url,
                        error = %err,
                        "pdf text extraction failed; falling back to utf8 decode"
                    );
                    self.lossy_text()
                }
            },
            DocumentKind::Markup => self.lossy_text(),
        }
    }

    fn lossy_text(&self) -> String {
        match std::fs::read(self.path()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(err) => {
                warn!(url = %self.url, error = %err, "failed to read downloaded document");
                String::new()
            }
        }
    }
}

pub fn page_url(source: &LoadedSource) -> Result<String> {
    let fetch = &source.config.fetch;
    match fetch.mode {
        FetchMode::Http => fetch
            .base_url
            .clone()
            .context("fetch.base_url missing for http mode"),
        FetchMode::File => {
            let file_path = fetch
                .file_path
                .as_ref()
                .context("fetch.file_path missing for file mode")?;
            let resolved = std::path::absolute(resolve_path(&source.path, file_path)?)?;
            Url::from_file_path(&resolved)
                .map(|u| u.to_string())
                .map_err(|_| anyhow!("cannot build file url for {}", resolved.display()))
        }
        FetchMode::Inline => Ok(format!(
            "inline://{}/",
            source.config.sanitized_source_file_name()
        )),
    }
}

pub fn build_client(fetch: &FetchConfig, timeout_secs: u64) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (k, v) in &fetch.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .with_context(|| format!("invalid header name {k}"))?;
        let value =
            HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
        headers.insert(name, value);
    }

    let user_agent = fetch.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .context("failed to build reqwest client")
}

pub fn fetch_page(source: &LoadedSource, url: &str) -> Result<FetchedPage, ExtractionError> {
    let html = match source.config.fetch.mode {
        FetchMode::Inline => source.config.fetch.inline_data.clone().unwrap_or_default(),
        FetchMode::Http | FetchMode::File => {
            let client = build_client(&source.config.fetch, source.config.fetch.timeout_secs)
                .map_err(|err| ExtractionError::Setup(format!("{err:#}")))?;
            let bytes = fetch_bytes(&client, url)
                .map_err(|err| ExtractionError::transport(url, format!("{err:#}")))?;
            String::from_utf8_lossy(&bytes).to_string()
        }
    };

    info!(
        source = %source.config.source.key,
        url = %url,
        bytes = html.len(),
        "fetched page"
    );

    Ok(FetchedPage {
        url: url.to_string(),
        html,
    })
}

pub fn fetch_document(
    source: &LoadedSource,
    url: &str,
) -> Result<FetchedDocument, ExtractionError> {
    let client = build_client(
        &source.config.fetch,
        source.config.fetch.document_timeout_secs,
    )
    .map_err(|err| ExtractionError::Setup(format!("{err:#}")))?;
    let body = fetch_bytes(&client, url)
        .map_err(|err| ExtractionError::transport(url, format!("{err:#}")))?;

    let kind = if body.starts_with(b"%PDF") {
        DocumentKind::Pdf
    } else {
        DocumentKind::Markup
    };
    let sha256 = hex::encode(Sha256::digest(&body));

    let file = write_temp_document(&body, &source.config.locate.extension)
        .map_err(|err| ExtractionError::transport(url, format!("{err:#}")))?;

    info!(
        source = %source.config.source.key,
        url = %url,
        bytes = body.len(),
        kind = ?kind,
        file = %file.path().display(),
        "downloaded document"
    );

    Ok(FetchedDocument {
        url: url.to_string(),
        kind,
        sha256,
        bytes: body.len(),
        file,
    })
}

pub fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let parsed = Url::parse(url).with_context(|| format!("invalid url {url}"))?;
    match parsed.scheme() {
        "http" | "https" => {
            let resp = client
                .get(url)
                .send()
                .with_context(|| format!("request to {url} failed"))?;
            let status = resp.status();
            if !status.is_success() {
                bail!("request to {url} failed with status {status}");
            }
            Ok(resp.bytes()?.to_vec())
        }
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| anyhow!("invalid file url {url}"))?;
            debug!(file = %path.display(), "reading local file");
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
        }
        other => bail!("unsupported url scheme {other} in {url}"),
    }
}

fn write_temp_document(body: &[u8], extension: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("tarifa-")
        .suffix(extension)
        .tempfile()
        .context("failed to create temporary document file")?;
    file.write_all(body)
        .context("failed to write temporary document file")?;
    file.flush()?;
    Ok(file)
}
