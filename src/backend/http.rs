use super::{BackendError, ImageBackend};
use crate::types::{Image, ImagePath, detect_mime_type};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_USER_AGENT: &str = concat!("image-stack/", env!("CARGO_PKG_VERSION"));

/// Fetches images over HTTP(S) from `root_url/path`.
///
/// Any failure (transport error, timeout, non-2xx status) is reported as
/// not found; the cause is logged, not returned.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    root_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(root_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_options(root_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS), None)
    }

    pub fn with_options(
        root_url: impl Into<String>,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Failed(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            root_url: root_url.into(),
            client,
        })
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Absolute URL requested for `path`, or `None` when a `..` segment
    /// would climb above `root_url`.
    pub fn url_for(&self, path: &str) -> Option<String> {
        let climbs = path
            .split(['/', '\\'])
            .any(|segment| segment == ".." || segment.eq_ignore_ascii_case("%2e%2e"));
        if climbs {
            return None;
        }
        Some(format!(
            "{}/{}",
            self.root_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

impl ImageBackend for HttpBackend {
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError> {
        let Some(url) = self.url_for(path.path()) else {
            debug!(path = path.path(), "rejected path outside root URL");
            return Err(BackendError::not_found(path));
        };
        debug!(url = %url, "fetching over HTTP");

        let response = match self.client.get(&url).send() {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "HTTP request failed");
                return Err(BackendError::not_found(path));
            }
        };

        if !response.status().is_success() {
            debug!(url = %url, status = response.status().as_u16(), "HTTP miss");
            return Err(BackendError::not_found(path));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("image/"));

        let body = match response.bytes() {
            Ok(body) => body.to_vec(),
            Err(e) => {
                warn!(url = %url, error = %e, "HTTP body read failed");
                return Err(BackendError::not_found(path));
            }
        };

        let mime_type = content_type.unwrap_or_else(|| detect_mime_type(&body, Some(path.path())));
        Ok(Image::new(body, mime_type))
    }
}
