//! Client runtime configuration.
//!
//! This module defines configuration that is resolved once at process startup and then passed
//! into the client and view-models. Services never read process-wide environment variables
//! themselves; binaries collect the raw values and hand them to [`ClientConfig::new`].

use crate::constants::{
    DEFAULT_API_URL, DEFAULT_ATTENDANCE_POLL_SECS, DEFAULT_LIST_POLL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, SESSION_FILENAME,
};
use crate::{ClinicError, ClinicResult};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    api_url: Url,
    ws_url: Url,
    api_key: String,
    session_path: PathBuf,
    request_timeout: Duration,
    list_poll_interval: Duration,
    attendance_poll_interval: Duration,
}

impl ClientConfig {
    /// Create a new `ClientConfig`.
    ///
    /// `ws_url` defaults to `api_url` when absent; the real-time server shares the backend host.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::InvalidConfig` if either URL does not parse as `http(s)` or the API
    /// key is blank. The backend rejects every request without the key, so there is no point
    /// starting without one.
    pub fn new(
        api_url: &str,
        ws_url: Option<&str>,
        api_key: &str,
        session_path: PathBuf,
    ) -> ClinicResult<Self> {
        if api_key.trim().is_empty() {
            return Err(ClinicError::InvalidConfig("API key is not configured".into()));
        }

        let api_url = parse_http_url(api_url)?;
        let ws_url = match ws_url {
            Some(raw) => parse_http_url(raw)?,
            None => api_url.clone(),
        };

        Ok(Self {
            api_url,
            ws_url,
            api_key: api_key.trim().to_string(),
            session_path,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            list_poll_interval: Duration::from_secs(DEFAULT_LIST_POLL_SECS),
            attendance_poll_interval: Duration::from_secs(DEFAULT_ATTENDANCE_POLL_SECS),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_intervals(mut self, list: Duration, attendances: Duration) -> Self {
        self.list_poll_interval = list;
        self.attendance_poll_interval = attendances;
        self
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn list_poll_interval(&self) -> Duration {
        self.list_poll_interval
    }

    pub fn attendance_poll_interval(&self) -> Duration {
        self.attendance_poll_interval
    }
}

fn parse_http_url(raw: &str) -> ClinicResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ClinicError::InvalidConfig(format!("invalid URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClinicError::InvalidConfig(format!(
            "unsupported URL scheme {other:?} (expected http or https)"
        ))),
    }
}

/// Returns the configured API URL or the local development default.
pub fn api_url_or_default(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

/// Resolve where the session file lives without reading environment variables.
///
/// If `override_path` is provided it is used as-is. Otherwise the platform data directory for
/// the application is used (for example `~/.local/share/clinic-call/session.json` on Linux).
///
/// # Errors
///
/// Returns `ClinicError::InvalidConfig` if no home directory can be determined.
pub fn resolve_session_path(override_path: Option<PathBuf>) -> ClinicResult<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    directories::ProjectDirs::from("br", "clinic", "clinic-call")
        .map(|dirs| dirs.data_dir().join(SESSION_FILENAME))
        .ok_or_else(|| {
            ClinicError::InvalidConfig(
                "could not determine a data directory for the session file".into(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_blank_api_key() {
        let err = ClientConfig::new("http://localhost:5000", None, "  ", "s.json".into())
            .expect_err("blank key should be rejected");
        assert!(matches!(err, ClinicError::InvalidConfig(_)));
    }

    #[test]
    fn test_new_rejects_non_http_scheme() {
        let err = ClientConfig::new("ftp://localhost", None, "key", "s.json".into())
            .expect_err("ftp should be rejected");
        assert!(matches!(err, ClinicError::InvalidConfig(_)));
    }

    #[test]
    fn test_ws_url_defaults_to_api_url() {
        let cfg = ClientConfig::new("http://clinic.local:5000", None, "key", "s.json".into())
            .expect("config should build");
        assert_eq!(cfg.ws_url(), cfg.api_url());
        assert_eq!(cfg.api_key(), "key");
        assert_eq!(cfg.list_poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.attendance_poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_api_url_or_default() {
        assert_eq!(api_url_or_default(None), DEFAULT_API_URL);
        assert_eq!(api_url_or_default(Some("  ".into())), DEFAULT_API_URL);
        assert_eq!(
            api_url_or_default(Some("http://x:1".into())),
            "http://x:1".to_string()
        );
    }

    #[test]
    fn test_resolve_session_path_prefers_override() {
        let path = resolve_session_path(Some(PathBuf::from("/tmp/custom.json")))
            .expect("override should resolve");
        assert_eq!(path, PathBuf::from("/tmp/custom.json"));
    }
}
