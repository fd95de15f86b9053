//! Backend API seams.
//!
//! View-models talk to the backend only through these traits, so they can be driven by the
//! real [`crate::client::ApiClient`] or by an in-memory fake in tests. Wire envelopes shared by
//! every endpoint live here too.

use crate::models::{
    Attendance, Patient, PatientInput, Professional, ProfessionalInput, SetOfficeRequest, User,
};
use crate::session::Session;
use crate::constants::{PATIENTS_COLLECTION, PROFESSIONALS_COLLECTION};
use crate::ClinicResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clinic_types::Cpf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A backend collection with list/search/create/update/delete endpoints.
pub trait Record: Clone + Send + Sync + DeserializeOwned + 'static {
    /// Validated create/update payload.
    type Input: Serialize + Send + Sync;

    /// Path segment under `/api`.
    const COLLECTION: &'static str;

    fn id(&self) -> i64;
}

impl Record for Patient {
    type Input = PatientInput;
    const COLLECTION: &'static str = PATIENTS_COLLECTION;

    fn id(&self) -> i64 {
        self.id
    }
}

impl Record for Professional {
    type Input = ProfessionalInput;
    const COLLECTION: &'static str = PROFESSIONALS_COLLECTION;

    fn id(&self) -> i64 {
        self.id
    }
}

// ============================================================================
// WIRE ENVELOPES
// ============================================================================

/// Standard response wrapper: `{ message, data, status_code, pagination }`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

/// Search-by-CPF answers with either a single record or an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// One page of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Builds a page from an envelope; a missing pagination block means a single page.
    pub fn from_envelope(envelope: Envelope<Vec<T>>, requested: u32) -> Self {
        let pagination = envelope.pagination.unwrap_or(Pagination {
            current_page: requested,
            total_pages: requested.max(1),
        });
        Self {
            items: envelope.data,
            current_page: pagination.current_page,
            total_pages: pagination.total_pages.max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoginData {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub cpf: &'a str,
    pub password: &'a str,
}

// ============================================================================
// REPORTS
// ============================================================================

/// Time window for an attendance report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportQuery {
    pub professional_id: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ReportQuery {
    /// # Errors
    ///
    /// Returns `ClinicError::Validation` when `start` is after `end`.
    pub fn new(professional_id: i64, start: NaiveDateTime, end: NaiveDateTime) -> ClinicResult<Self> {
        if start > end {
            return Err(crate::ClinicError::invalid_field(
                "start",
                "start must not be after end",
            ));
        }
        Ok(Self {
            professional_id,
            start,
            end,
        })
    }

    /// The whole of `day`, 00:00 to 23:59.
    pub fn for_day(professional_id: i64, day: NaiveDate) -> Self {
        Self {
            professional_id,
            start: day.and_time(NaiveTime::MIN),
            end: day.and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)),
        }
    }

    /// `{professionalId}/{startDate}/{startTime}/{endDate}/{endTime}`.
    pub fn path_segments(&self) -> [String; 5] {
        [
            self.professional_id.to_string(),
            self.start.format("%Y-%m-%d").to_string(),
            self.start.format("%H:%M").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
            self.end.format("%H:%M").to_string(),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AttendanceReport {
    pub count: u64,
    #[serde(default)]
    pub attendances: Vec<ReportEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub id: i64,
    #[serde(default)]
    pub patient_id: Option<i64>,
    pub status: crate::models::AttendanceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub professional_id: Option<i64>,
    #[serde(default)]
    pub office_number: Option<u32>,
    #[serde(default)]
    pub patient: Option<ReportPatient>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPatient {
    pub full_name: String,
    pub cpf: String,
}

// ============================================================================
// SERVICE TRAITS
// ============================================================================

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// # Errors
    ///
    /// `Unauthenticated` on bad credentials, transport/decode errors otherwise.
    async fn login(&self, cpf: &str, password: &str) -> ClinicResult<LoginData>;

    /// # Errors
    ///
    /// Any API error from the backend.
    async fn set_office(&self, session: &Session, request: &SetOfficeRequest) -> ClinicResult<()>;
}

#[async_trait]
pub trait DirectoryApi<R: Record>: Send + Sync {
    async fn page(&self, session: &Session, page: u32) -> ClinicResult<Page<R>>;
    async fn all(&self, session: &Session) -> ClinicResult<Vec<R>>;
    async fn search_by_name(&self, session: &Session, name: &str) -> ClinicResult<Vec<R>>;
    async fn search_by_cpf(&self, session: &Session, cpf: &Cpf) -> ClinicResult<Vec<R>>;
    async fn create(&self, session: &Session, input: &R::Input) -> ClinicResult<R>;
    async fn update(&self, session: &Session, id: i64, input: &R::Input) -> ClinicResult<R>;
    async fn delete(&self, session: &Session, id: i64) -> ClinicResult<()>;
}

#[async_trait]
pub trait AttendanceApi: Send + Sync {
    async fn attendances(&self, session: &Session) -> ClinicResult<Vec<Attendance>>;
    async fn create_attendance(&self, session: &Session, patient_id: i64) -> ClinicResult<()>;
    async fn call(&self, session: &Session, attendance_id: i64, office: u32) -> ClinicResult<()>;
    async fn finish(
        &self,
        session: &Session,
        attendance_id: i64,
        professional_id: i64,
    ) -> ClinicResult<()>;
}

#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn attendance_report(
        &self,
        session: &Session,
        query: &ReportQuery,
    ) -> ClinicResult<AttendanceReport>;
}
