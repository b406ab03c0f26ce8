//! Apilot Fetch
//!
//! Normalized HTTP access to the information providers: JSON fetches with a
//! uniform failure record, image URL probing, and binary downloads to
//! uniquely named temp files.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const DOWNLOAD_TIMEOUT_SECS: u64 = 15;

/// Uniform failure record for a provider call. Transport failures, non-200
/// statuses, and undecodable bodies all land here; downstream treats them
/// identically.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct FetchError {
    pub reason: String,
    pub status: Option<u16>,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            status: None,
        }
    }

    pub fn with_status(reason: impl Into<String>, status: u16) -> Self {
        Self {
            reason: reason.into(),
            status: Some(status),
        }
    }
}

/// HTTP seam for the provider clients. Implemented by [`HttpFetcher`] in
/// production and by stubs in tests.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// GET with query parameters and extra headers, decoded as JSON.
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Value, FetchError>;

    /// POST an urlencoded form, decoded as JSON.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, FetchError>;

    /// HEAD request; true iff the URL answers 200.
    async fn probe_url(&self, url: &str) -> bool;

    /// Download binary content to a uniquely named temp file. The extension
    /// follows the Content-Type header. Returns `None` on any failure; the
    /// file is never cleaned up by this crate.
    async fn download_image(&self, url: &str) -> Option<PathBuf>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    fn truncate_for_error(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let truncated: String = text.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }

    async fn decode_response(
        url: &str,
        response: reqwest::Response,
    ) -> Result<Value, FetchError> {
        let status = response.status();
        if !status.is_success() {
            error!("API request to {} failed with status {}", url, status);
            return Err(FetchError::with_status(
                format!("HTTP Error: {}", status.as_u16()),
                status.as_u16(),
            ));
        }
        let raw_body = response
            .text()
            .await
            .map_err(|e| FetchError::new(format!("body read failed: {}", e)))?;
        match serde_json::from_str::<Value>(&raw_body) {
            Ok(value) => {
                debug!("API response from {}: {}", url, Self::truncate_for_error(&raw_body, 300));
                Ok(value)
            }
            Err(e) => {
                error!(
                    "Failed to parse JSON response from {}: {} | body={}",
                    url,
                    e,
                    Self::truncate_for_error(&raw_body, 300)
                );
                Err(FetchError::new(format!("JSON Decode Error: {}", e)))
            }
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(|e| {
            error!("API request to {} failed: {}", url, e);
            FetchError::new(e.to_string())
        })?;
        Self::decode_response(url, response).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, FetchError> {
        let response = self.client.post(url).form(form).send().await.map_err(|e| {
            error!("API request to {} failed: {}", url, e);
            FetchError::new(e.to_string())
        })?;
        Self::decode_response(url, response).await
    }

    async fn probe_url(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn download_image(&self, url: &str) -> Option<PathBuf> {
        let response = match self
            .client
            .get(url)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Image download from {} failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!(
                "Image download from {} failed with status {}",
                url,
                response.status()
            );
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let ext = extension_for_content_type(&content_type);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Image download from {} failed mid-body: {}", url, e);
                return None;
            }
        };

        let path = std::env::temp_dir().join(format!("apilot-{}{}", Uuid::new_v4(), ext));
        match tokio::fs::write(&path, &bytes).await {
            Ok(()) => {
                info!("Image downloaded to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to write downloaded image {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    if content_type.contains("image/jpeg") || content_type.contains("image/jpg") {
        ".jpg"
    } else if content_type.contains("image/png") {
        ".png"
    } else if content_type.contains("image/gif") {
        ".gif"
    } else {
        ".jpg"
    }
}

/// True iff the string parses as an absolute URL with both a scheme and a
/// host. Bare paths and free text fail the host requirement.
pub fn is_absolute_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(parsed) => parsed.has_host(),
        Err(_) => false,
    }
}
