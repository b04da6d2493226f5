//! Image search and bulk download
//!
//! A query is sent to the image search API, each result's original image is
//! fetched into `<root>/<sanitized query>/<n>.<ext>`, and the folder can then
//! be packed into `<root>/<sanitized query>_images.zip`. Individual image
//! failures are logged and skipped; only search failures abort the batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{StreamExt, stream};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub mod archive;
mod serpapi;

pub use serpapi::{ImageResult, ImageSearchClient};

/// Images fetched at the same time
const DOWNLOAD_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("API_KEY not found. Please add it to the .env file.")]
    MissingApiKey,

    #[error("API Error: {0}")]
    ApiError(String),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("could not parse search response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    ZipError(#[from] async_zip::error::ZipError),
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Folder-safe form of a query: every non-alphanumeric character becomes `_`
pub fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Extension for a downloaded image, taken from the text after the URL's last `.`
pub fn image_extension(url: &str) -> &str {
    let ext = url.rsplit('.').next().unwrap_or_default();
    if ext.is_empty() || ext.chars().count() > 4 || !ext.chars().all(char::is_alphanumeric) {
        "jpg"
    } else {
        ext
    }
}

/// Outcome of one query
#[derive(Debug, Clone)]
pub struct ImageBatch {
    pub folder: PathBuf,
    pub saved: Vec<PathBuf>,
    pub failed: usize,
}

pub struct ImageFetcher {
    search: ImageSearchClient,
    client: Client,
}

impl ImageFetcher {
    /// `timeout` bounds each individual image download
    pub fn new(search: ImageSearchClient, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { search, client })
    }

    /// Search for `query` and save up to `max_results` images under `root`
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub async fn download(&self, query: &str, root: &Path, max_results: usize) -> Result<ImageBatch> {
        let folder = root.join(sanitize_query(query));
        let results = self.search.search(query, max_results).await?;

        if results.is_empty() {
            info!("No images found or retrieved");
            return Ok(ImageBatch {
                folder,
                saved: Vec::new(),
                failed: 0,
            });
        }

        tokio::fs::create_dir_all(&folder).await?;

        // Numbering follows the result position, so skipped entries leave gaps.
        // Results without an original URL are skipped and do not count as failures.
        let downloadable = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, image)| image.original.map(|url| (index, url)));

        let outcomes: Vec<Option<PathBuf>> = stream::iter(downloadable)
            .map(|(index, url)| {
                let folder = &folder;
                async move {
                    match self.save_image(&url, folder, index + 1).await {
                        Ok(path) => {
                            debug!(path = ?path, "Saved image");
                            Some(path)
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "Failed to download image");
                            None
                        }
                    }
                }
            })
            .buffered(DOWNLOAD_CONCURRENCY)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.is_none()).count();
        let saved: Vec<PathBuf> = outcomes.into_iter().flatten().collect();
        info!(saved = saved.len(), failed, "Image download finished");

        Ok(ImageBatch {
            folder,
            saved,
            failed,
        })
    }

    /// Download, then zip the query's folder next to it.
    ///
    /// Returns `None` when the folder ended up empty.
    pub async fn download_archive(
        &self,
        query: &str,
        root: &Path,
        max_results: usize,
    ) -> Result<Option<PathBuf>> {
        let batch = self.download(query, root, max_results).await?;
        let is_dir = tokio::fs::metadata(&batch.folder)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Ok(None);
        }

        let zip_path = root.join(format!("{}_images.zip", sanitize_query(query)));
        let entries = archive::zip_directory(&batch.folder, &zip_path).await?;
        if entries == 0 {
            tokio::fs::remove_file(&zip_path).await?;
            return Ok(None);
        }
        Ok(Some(zip_path))
    }

    async fn save_image(&self, url: &str, folder: &Path, number: usize) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        let path = folder.join(format!("{number}.{}", image_extension(url)));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}
