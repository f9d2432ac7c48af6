//! ACP HTTP client

use crate::plan::AcpImagingPlan;
use crate::status::{self, ObservatoryStatus};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// ACP-specific error types.
#[derive(Debug, Error)]
pub enum AcpError {
    #[error("timeout after {duration_ms}ms during {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("connection refused: {url} - {cause}")]
    ConnectionRefused { url: String, cause: String },

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("the observatory is offline: {0}")]
    Offline(String),

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("request failed: {0}")]
    RequestFailed(String),
}

impl AcpError {
    /// Whether the caller may retry after this error. Server-side overload
    /// and network failures are transient; authentication and protocol
    /// errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AcpError::Timeout { .. } => true,
            AcpError::ConnectionRefused { .. } => true,
            AcpError::HttpError { status, .. } => *status >= 500 || *status == 429,
            AcpError::Offline(_) => true,
            AcpError::RequestFailed(_) => true,
            AcpError::Rejected(_) => false,
            AcpError::ParseError(_) => false,
        }
    }
}

impl From<reqwest::Error> for AcpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AcpError::Timeout {
                operation: "HTTP request".to_string(),
                duration_ms: 0, // actual budget tracked per call site
            }
        } else if err.is_connect() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
            AcpError::ConnectionRefused { url, cause: err.to_string() }
        } else if let Some(status) = err.status() {
            AcpError::HttpError { status: status.as_u16(), message: err.to_string() }
        } else {
            AcpError::RequestFailed(err.to_string())
        }
    }
}

/// Per-operation timeout budget, independent of the scheduler's poll
/// interval so a hung request can never block cancellation.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Status queries.
    pub quick_query_ms: u64,
    /// Plan submission and script stop.
    pub submit_ms: u64,
    /// Initial connection check.
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quick_query_ms: 10_000,
            submit_ms: 30_000,
            connect_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Async client for one ACP server.
pub struct AcpClient {
    base_url: String,
    credentials: Credentials,
    timeouts: TimeoutConfig,
    http: Client,
}

impl AcpClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeouts: TimeoutConfig,
    ) -> Result<Self, AcpError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(timeouts.connect_ms))
            .build()
            .map_err(AcpError::from)?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, credentials, timeouts, http })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<String, AcpError> {
        let response = self
            .http
            .post(self.url(endpoint))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .timeout(Duration::from_millis(timeout_ms))
            .form(form)
            .send()
            .await?;

        let http_status = response.status();
        let body = response.text().await?;
        if !http_status.is_success() {
            return Err(AcpError::HttpError {
                status: http_status.as_u16(),
                message: format!("{endpoint} returned {http_status}"),
            });
        }
        Ok(body)
    }

    /// Verify the server answers and the credentials are accepted.
    pub async fn connect(&self) -> Result<(), AcpError> {
        let response = self
            .http
            .get(self.url("/index.asp"))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .timeout(Duration::from_millis(self.timeouts.connect_ms))
            .send()
            .await?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(AcpError::HttpError {
                status: http_status.as_u16(),
                message: "login check failed".to_string(),
            });
        }

        let body = response.text().await?;
        let title = extract_title(&body).unwrap_or_else(|| "ACP Observatory".to_string());
        info!(server = %self.base_url, %title, "connected to ACP server");
        Ok(())
    }

    /// Fetch and decode the current system status.
    pub async fn system_status(&self) -> Result<ObservatoryStatus, AcpError> {
        let body = self
            .post_form("/ac/asystemstatus.asp", &[], self.timeouts.quick_query_ms)
            .await?;
        let parsed = status::ObservatoryStatus::from_response(&body);
        debug!(
            observatory = %parsed.observatory_status,
            telescope = %parsed.telescope_status,
            camera = %parsed.camera_status,
            progress = %parsed.plan_progress,
            "system status"
        );
        Ok(parsed)
    }

    /// Submit an acquisition plan. Warnings in the response body are
    /// treated as rejection; an offline observatory is reported as the
    /// retryable [`AcpError::Offline`].
    pub async fn submit_plan(&self, plan: &AcpImagingPlan) -> Result<(), AcpError> {
        let form = plan.form_data();
        let body = self
            .post_form("/ac/aacqform.asp", &form, self.timeouts.submit_ms)
            .await?;

        if status::mentions_offline(&body) {
            return Err(AcpError::Offline("the observatory is offline".to_string()));
        }
        let warnings = status::extract_warnings(&body);
        if !warnings.is_empty() {
            warn!(target_name = %plan.target, ?warnings, "plan submission warned");
            return Err(AcpError::Rejected(warnings.join("; ")));
        }

        info!(target_name = %plan.target, ra = %plan.ra, dec = %plan.dec, "plan submitted");
        Ok(())
    }

    /// Stop whatever script is currently running. ACP acknowledges with
    /// "Received" in the response body.
    pub async fn stop_script(&self) -> Result<(), AcpError> {
        let form = vec![("Command".to_string(), "StopScript".to_string())];
        let body = self
            .post_form("/ac/astopscript.asp", &form, self.timeouts.submit_ms)
            .await?;
        if body.contains("Received") {
            info!("stop script acknowledged");
            Ok(())
        } else {
            Err(AcpError::Rejected(format!("stop script not acknowledged: {}", body.trim())))
        }
    }
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title>")?;
    let close = lower[open..].find("</title>")? + open;
    Some(html[open + "<title>".len()..close].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_fatal_but_server_overload_is_not() {
        let unauthorized = AcpError::HttpError { status: 401, message: "unauthorized".into() };
        assert!(!unauthorized.is_retryable());
        let overloaded = AcpError::HttpError { status: 503, message: "busy".into() };
        assert!(overloaded.is_retryable());
        let throttled = AcpError::HttpError { status: 429, message: "slow down".into() };
        assert!(throttled.is_retryable());
        assert!(AcpError::Offline("offline".into()).is_retryable());
        assert!(!AcpError::Rejected("bad form".into()).is_retryable());
    }

    #[test]
    fn title_extraction_is_case_insensitive() {
        assert_eq!(
            extract_title("<html><TITLE> ACP Observatory </TITLE></html>").as_deref(),
            Some("ACP Observatory")
        );
        assert_eq!(extract_title("<html>no title</html>"), None);
    }

    #[test]
    fn base_url_trailing_slashes_are_normalized() {
        let client = AcpClient::new(
            "http://observatory.example:80/",
            Credentials { username: "obs".into(), password: "secret".into() },
            TimeoutConfig::default(),
        )
        .unwrap();
        assert_eq!(client.url("/index.asp"), "http://observatory.example:80/index.asp");
    }
}
