//! HTTP client for the clinic backend.
//!
//! [`ApiClient`] implements every service trait in [`crate::api`] over `reqwest`. Every request
//! carries the static `api_key` header; authenticated requests add the session's bearer token.
//! Non-2xx responses are mapped onto the [`ClinicError`] taxonomy using the body's `message`.

use crate::api::{
    AttendanceApi, AttendanceReport, AuthApi, DirectoryApi, Envelope, LoginData, LoginRequest,
    OneOrMany, Page, Record, ReportApi, ReportQuery,
};
use crate::config::ClientConfig;
use crate::constants::{API_KEY_HEADER, API_PREFIX, FALLBACK_SERVER_MESSAGE};
use crate::models::{Attendance, SetOfficeRequest};
use crate::session::Session;
use crate::{ClinicError, ClinicResult};
use async_trait::async_trait;
use clinic_types::Cpf;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Older backends answer login without the envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum LoginResponse {
    Wrapped(Envelope<LoginData>),
    Bare(LoginData),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientIdBody {
    patient_id: i64,
}

/// REST client bound to one backend.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Builds a client from startup configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::InvalidConfig` if the API key is not a valid header value, or
    /// `ClinicError::Transport` if the HTTP client cannot be constructed.
    pub fn new(cfg: &ClientConfig) -> ClinicResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(cfg.api_key())
            .map_err(|_| ClinicError::InvalidConfig("API key is not a valid header value".into()))?;
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(cfg.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base: cfg.api_url().clone(),
        })
    }

    /// `<base>/api/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> ClinicResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ClinicError::InvalidConfig(format!("{} cannot be used as a base URL", self.base))
            })?;
            path.pop_if_empty();
            path.push(API_PREFIX.trim_start_matches('/'));
            path.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, session: Option<&Session>) -> RequestBuilder {
        tracing::debug!("{} {}", method, url.path());
        let builder = self.http.request(method, url);
        match session {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClinicResult<T> {
        let response = check_status(builder.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ClinicError::Decode)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> ClinicResult<()> {
        check_status(builder.send().await?).await?;
        Ok(())
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        session: &Session,
        segments: &[&str],
    ) -> ClinicResult<Vec<T>> {
        let url = self.url(segments)?;
        let envelope: Envelope<Option<OneOrMany<T>>> = self
            .send_json(self.request(Method::GET, url, Some(session)))
            .await?;
        Ok(envelope.data.map(OneOrMany::into_vec).unwrap_or_default())
    }

    /// Search endpoints answer 404 when nothing matches.
    async fn search<T: DeserializeOwned>(
        &self,
        session: &Session,
        segments: &[&str],
    ) -> ClinicResult<Vec<T>> {
        match self.get_list(session, segments).await {
            Err(ClinicError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}

async fn check_status(response: Response) -> ClinicResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_SERVER_MESSAGE.to_string());

    tracing::warn!("backend returned {}: {}", status, message);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClinicError::Unauthenticated(message),
        StatusCode::NOT_FOUND => ClinicError::NotFound(message),
        StatusCode::CONFLICT => ClinicError::Conflict(message),
        other => ClinicError::Api {
            status: other.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, cpf: &str, password: &str) -> ClinicResult<LoginData> {
        let url = self.url(&["auth", "login"])?;
        let response: LoginResponse = self
            .send_json(
                self.request(Method::POST, url, None)
                    .json(&LoginRequest { cpf, password }),
            )
            .await?;
        Ok(match response {
            LoginResponse::Wrapped(envelope) => envelope.data,
            LoginResponse::Bare(data) => data,
        })
    }

    async fn set_office(&self, session: &Session, request: &SetOfficeRequest) -> ClinicResult<()> {
        let url = self.url(&["auth", "set-office"])?;
        self.send_empty(self.request(Method::POST, url, Some(session)).json(request))
            .await
    }
}

#[async_trait]
impl<R: Record> DirectoryApi<R> for ApiClient {
    async fn page(&self, session: &Session, page: u32) -> ClinicResult<Page<R>> {
        let page_str = page.to_string();
        let url = self.url(&[R::COLLECTION, "page", &page_str])?;
        let envelope: Envelope<Vec<R>> = self
            .send_json(self.request(Method::GET, url, Some(session)))
            .await?;
        Ok(Page::from_envelope(envelope, page))
    }

    async fn all(&self, session: &Session) -> ClinicResult<Vec<R>> {
        self.get_list(session, &[R::COLLECTION]).await
    }

    async fn search_by_name(&self, session: &Session, name: &str) -> ClinicResult<Vec<R>> {
        self.search(session, &[R::COLLECTION, "name", name.trim()])
            .await
    }

    async fn search_by_cpf(&self, session: &Session, cpf: &Cpf) -> ClinicResult<Vec<R>> {
        self.search(session, &[R::COLLECTION, "cpf", cpf.as_str()])
            .await
    }

    async fn create(&self, session: &Session, input: &R::Input) -> ClinicResult<R> {
        let url = self.url(&[R::COLLECTION])?;
        let envelope: Envelope<R> = self
            .send_json(self.request(Method::POST, url, Some(session)).json(input))
            .await?;
        Ok(envelope.data)
    }

    async fn update(&self, session: &Session, id: i64, input: &R::Input) -> ClinicResult<R> {
        let id_str = id.to_string();
        let url = self.url(&[R::COLLECTION, &id_str])?;
        let envelope: Envelope<R> = self
            .send_json(self.request(Method::PUT, url, Some(session)).json(input))
            .await?;
        Ok(envelope.data)
    }

    async fn delete(&self, session: &Session, id: i64) -> ClinicResult<()> {
        let id_str = id.to_string();
        let url = self.url(&[R::COLLECTION, &id_str])?;
        self.send_empty(self.request(Method::DELETE, url, Some(session)))
            .await
    }
}

#[async_trait]
impl AttendanceApi for ApiClient {
    async fn attendances(&self, session: &Session) -> ClinicResult<Vec<Attendance>> {
        self.get_list(session, &["attendances"]).await
    }

    async fn create_attendance(&self, session: &Session, patient_id: i64) -> ClinicResult<()> {
        let url = self.url(&["attendances"])?;
        self.send_empty(
            self.request(Method::POST, url, Some(session))
                .json(&PatientIdBody { patient_id }),
        )
        .await
    }

    async fn call(&self, session: &Session, attendance_id: i64, office: u32) -> ClinicResult<()> {
        let id_str = attendance_id.to_string();
        let url = self.url(&["attendances", &id_str, "call"])?;
        self.send_empty(
            self.request(Method::POST, url, Some(session))
                .json(&json!({ "officeNumber": office })),
        )
        .await
    }

    async fn finish(
        &self,
        session: &Session,
        attendance_id: i64,
        professional_id: i64,
    ) -> ClinicResult<()> {
        let id_str = attendance_id.to_string();
        let url = self.url(&["attendances", &id_str, "finish"])?;
        self.send_empty(
            self.request(Method::POST, url, Some(session))
                .json(&json!({ "professionalId": professional_id })),
        )
        .await
    }
}

#[async_trait]
impl ReportApi for ApiClient {
    async fn attendance_report(
        &self,
        session: &Session,
        query: &ReportQuery,
    ) -> ClinicResult<AttendanceReport> {
        let [professional, start_date, start_time, end_date, end_time] = query.path_segments();
        let url = self.url(&[
            "reports",
            "attendances",
            &professional,
            &start_date,
            &start_time,
            &end_date,
            &end_time,
        ])?;
        let envelope: Envelope<AttendanceReport> = self
            .send_json(self.request(Method::GET, url, Some(session)))
            .await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        let cfg = ClientConfig::new(base, None, "test-key", "s.json".into())
            .expect("config should build");
        ApiClient::new(&cfg).expect("client should build")
    }

    #[test]
    fn test_url_joins_prefix_and_encodes_segments() {
        let api = client("http://localhost:5000");
        let url = api
            .url(&["patients", "name", "maria silva"])
            .expect("url should build");
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/patients/name/maria%20silva"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let api = client("http://clinic.local/backend/");
        let url = api.url(&["attendances", "3", "call"]).expect("url should build");
        assert_eq!(
            url.as_str(),
            "http://clinic.local/backend/api/attendances/3/call"
        );
    }
}
