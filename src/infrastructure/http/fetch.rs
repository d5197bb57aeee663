use thiserror::Error;
use tracing::info;

use crate::domain::{ApiDocument, DocumentError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch API description from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API description endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("API description at {url} is not valid JSON: {source}")]
    Json {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Fetch and parse the legacy service's OpenAPI document.
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
) -> Result<ApiDocument, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let value = response
        .json::<serde_json::Value>()
        .await
        .map_err(|source| FetchError::Json {
            url: url.to_string(),
            source,
        })?;

    let document = ApiDocument::from_value(&value)?;
    info!(
        title = %document.title,
        version = %document.version,
        operations = document.operations.len(),
        "fetched API description"
    );
    Ok(document)
}
