//! SerpApi Google Images client

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{ImageError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResult {
    /// Full-size image URL
    pub original: Option<String>,
    pub title: Option<String>,
    pub position: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    error: Option<String>,
    #[serde(default)]
    images_results: Vec<ImageResult>,
}

#[derive(Debug, Clone)]
pub struct ImageSearchClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ImageSearchClient {
    /// `timeout` bounds the whole search request
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    /// First `max_results` image results for `query`
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ImageResult>> {
        let api_key = self.api_key.as_deref().ok_or(ImageError::MissingApiKey)?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("tbm", "isch"),
                ("api_key", api_key),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        let body: SearchResponse = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(ImageError::ApiError(format!("search returned {status}")));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = body.error {
            return Err(ImageError::ApiError(error));
        }
        if !status.is_success() {
            return Err(ImageError::ApiError(format!("search returned {status}")));
        }

        let mut images = body.images_results;
        images.truncate(max_results);
        debug!(results = images.len(), "Image search complete");
        Ok(images)
    }
}
