use crate::error::{ProcessingError, Result};
use crate::utils::constants::PARTIAL_DOWNLOAD_PREFIX;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).expect("href pattern is valid"));

/// A remote file server the source directory can be filled from.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Names of the objects directly under the configured path.
    async fn list(&self) -> Result<Vec<String>>;

    /// Download one listed object to `dest`.
    async fn download(&self, name: &str, dest: &Path) -> Result<()>;
}

/// Reads an HTTP directory index, the way open-data weather servers publish archives.
pub struct HttpIndexSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIndexSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProcessingError::Remote(e.to_string()))?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl RemoteSource for HttpIndexSource {
    async fn list(&self) -> Result<Vec<String>> {
        let body = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProcessingError::Remote(e.to_string()))?
            .text()
            .await
            .map_err(|e| ProcessingError::Remote(e.to_string()))?;

        Ok(parse_index(&body))
    }

    async fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let url = format!("{}{}", self.base_url, name);
        debug!("Downloading {}", url);

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProcessingError::Remote(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProcessingError::Remote(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}

/// File links of a directory index page, skipping parent and sub-directory links.
pub fn parse_index(body: &str) -> Vec<String> {
    let mut names: Vec<String> = HREF
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|href| !href.ends_with('/') && !href.starts_with('?') && !href.contains("://"))
        .map(|href| href.rsplit('/').next().unwrap_or(href).to_string())
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Download every remote object into `source_dir` when it holds no files yet.
///
/// Objects are staged as hidden `.partial-*` files and only renamed to their final
/// names once every download has finished, so a failed or interrupted populate leaves
/// the directory looking empty and the next run starts over.
///
/// Returns the number of files downloaded.
pub async fn populate_if_empty(source_dir: &Path, remote: &dyn RemoteSource) -> Result<usize> {
    tokio::fs::create_dir_all(source_dir).await?;

    let mut entries = tokio::fs::read_dir(source_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let staged = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(PARTIAL_DOWNLOAD_PREFIX));
        if entry.file_type().await?.is_file() && !staged {
            debug!("{} already populated", source_dir.display());
            return Ok(0);
        }
    }

    let names = remote.list().await?;
    info!(
        "Source directory {} is empty, downloading {} files",
        source_dir.display(),
        names.len()
    );

    let mut staged = Vec::with_capacity(names.len());
    for name in &names {
        let partial = tempfile::Builder::new()
            .prefix(PARTIAL_DOWNLOAD_PREFIX)
            .tempfile_in(source_dir)?;
        remote.download(name, partial.path()).await?;
        staged.push((partial, source_dir.join(name)));
    }

    for (partial, dest) in staged {
        partial.persist(&dest).map_err(|e| e.error)?;
    }

    Ok(names.len())
}
