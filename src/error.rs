use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("no tariff document found on {url}")]
    NoDocumentFound { url: String },

    #[error("no tariffs could be extracted from the page or its document")]
    NoExtractableData { url: String },

    #[error("setup failure: {0}")]
    Setup(String),
}

impl ExtractionError {
    pub fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        ExtractionError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::Setup(_))
    }

    pub fn suggestion(&self, source_url: &str) -> String {
        match self {
            ExtractionError::Transport { .. } => {
                format!("Check connectivity and that the URL is reachable: {source_url}")
            }
            ExtractionError::NoDocumentFound { .. } => format!(
                "No current tariff document is linked from the page; review it manually: {source_url}"
            ),
            ExtractionError::NoExtractableData { .. } => format!(
                "The page structure may have changed; review it manually: {source_url}"
            ),
            ExtractionError::Setup(_) => format!(
                "Install or configure the required renderer before extracting from {source_url}"
            ),
        }
    }
}
