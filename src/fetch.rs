use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("model file {0} not found and MODEL_URL is not set")]
    Missing(PathBuf),

    #[error("invalid GITHUB_TOKEN format")]
    BadToken,

    #[error("download of {url} failed: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Makes sure the model artifact is on disk, downloading it from `url` when absent.
pub async fn ensure_model(
    path: &Path,
    url: Option<&str>,
    token: Option<&str>,
) -> Result<(), FetchError> {
    if path.exists() {
        info!(path = %path.display(), "model file present");
        return Ok(());
    }

    let url = url.ok_or_else(|| FetchError::Missing(path.to_path_buf()))?;
    download_file(url, path, token).await
}

async fn download_file(url: &str, path: &Path, token: Option<&str>) -> Result<(), FetchError> {
    info!(%url, path = %path.display(), "downloading model");

    let mut header_map = HeaderMap::new();
    if let Some(token) = token {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| FetchError::BadToken)?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let response = reqwest::Client::new()
        .get(url)
        .headers(header_map)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let bytes = response.bytes().await?;
    persist(path, &bytes).await?;

    info!(bytes = bytes.len(), "model downloaded");
    Ok(())
}

/// Writes through a `.part` sibling, then renames it to `path`.
async fn persist(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let write_err = |source| FetchError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let partial = partial_path(path);
    tokio::fs::write(&partial, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&partial, path).await.map_err(write_err)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
