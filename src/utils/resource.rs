//! Resource loader.
//!
//! Resolves a string reference to text content by one of three strategies,
//! tried in order:
//!
//! 1. `http://` / `https://` — remote fetch, non-success status is an error
//! 2. `file://` URI or a bare path (`./x`, `/x`, `~/x`) — local file read
//! 3. anything else — passed through unchanged as literal text

use std::path::PathBuf;

/// Errors from resolving a resource reference.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Remote fetch failed at the transport level
    #[error("failed to fetch '{reference}': {source}")]
    Fetch {
        reference: String,
        #[source]
        source: reqwest::Error,
    },

    /// Remote fetch answered with a non-success status
    #[error("failed to fetch '{reference}': HTTP {status}")]
    FetchStatus {
        reference: String,
        status: reqwest::StatusCode,
    },

    /// Local file could not be read
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve `reference` to text content.
pub async fn load_resource(
    http: &reqwest::Client,
    reference: &str,
) -> Result<String, ResourceError> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return fetch_remote(http, reference).await;
    }

    if let Some(path) = reference.strip_prefix("file://") {
        return read_file(path).await;
    }

    if reference.starts_with("./")
        || reference.starts_with("../")
        || reference.starts_with('/')
        || reference.starts_with('~')
    {
        return read_file(reference).await;
    }

    Ok(reference.to_string())
}

async fn fetch_remote(http: &reqwest::Client, url: &str) -> Result<String, ResourceError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|source| ResourceError::Fetch {
            reference: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ResourceError::FetchStatus {
            reference: url.to_string(),
            status,
        });
    }

    response.text().await.map_err(|source| ResourceError::Fetch {
        reference: url.to_string(),
        source,
    })
}

async fn read_file(path: &str) -> Result<String, ResourceError> {
    let expanded = expand_home(path);
    tokio::fs::read_to_string(&expanded)
        .await
        .map_err(|source| ResourceError::Read {
            path: expanded.display().to_string(),
            source,
        })
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn remote_url_returns_fetched_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instructions.txt")
            .with_status(200)
            .with_body("summarize briefly")
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/instructions.txt", server.url());
        let text = load_resource(&http, &url).await.expect("load");
        assert_eq!(text, "summarize briefly");
    }

    #[tokio::test]
    async fn remote_error_status_is_descriptive() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.txt")
            .with_status(404)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/gone.txt", server.url());
        let err = load_resource(&http, &url).await.expect_err("must fail");
        assert!(err.to_string().contains("404"), "got: {err}");
    }

    #[tokio::test]
    async fn local_path_returns_file_contents() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "local instructions").expect("write");

        let http = reqwest::Client::new();
        let path = file.path().display().to_string();

        let text = load_resource(&http, &path).await.expect("load");
        assert_eq!(text, "local instructions");

        let uri = format!("file://{}", path);
        let text = load_resource(&http, &uri).await.expect("load file uri");
        assert_eq!(text, "local instructions");
    }

    #[tokio::test]
    async fn plain_text_passes_through_unchanged() {
        let http = reqwest::Client::new();
        let text = load_resource(&http, "plain text").await.expect("load");
        assert_eq!(text, "plain text");
    }
}
