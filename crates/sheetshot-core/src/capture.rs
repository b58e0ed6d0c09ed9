use std::time::Duration;

use crate::config::CaptureConfig;
use crate::error::{CoreError, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// Renders a web page to an image through a URL-to-image HTTP API.
pub struct CaptureClient {
    api_url: String,
    access_key: String,
    width: u32,
    height: u32,
    quality: u8,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RenderResponse {
    url: Option<String>,
}

impl CaptureClient {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            access_key: config.access_key.clone(),
            width: config.width,
            height: config.height,
            quality: config.quality,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_default(),
        }
    }

    fn query(&self, url: &str) -> Vec<(&'static str, String)> {
        vec![
            ("access_key", self.access_key.clone()),
            ("url", url.to_string()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
            ("quality", self.quality.to_string()),
            ("full_page", "true".to_string()),
            ("response_type", "json".to_string()),
        ]
    }

    /// Render `url` and download the resulting image.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        if self.access_key.is_empty() {
            return Err(CoreError::Capture("capture access key is not set".to_string()));
        }
        if url.is_empty() {
            return Err(CoreError::Capture("page url is not set".to_string()));
        }

        debug!(url, "requesting render");
        let response = self
            .client
            .get(&self.api_url)
            .query(&self.query(url))
            .send()
            .await
            .map_err(|e| CoreError::Capture(format!("render request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Capture(format!(
                "render api returned status {}",
                response.status()
            )));
        }

        let body: RenderResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Capture(format!("parse response: {e}")))?;
        let image_url = body
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::Capture("no image url in render response".to_string()))?;

        let image = self
            .client
            .get(&image_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Capture(format!("image download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| CoreError::Capture(format!("image download failed: {e}")))?;

        info!(bytes = image.len(), "page rendered");
        Ok(image.to_vec())
    }
}
