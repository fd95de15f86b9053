//! The doctor's attendance queue.

use crate::api::AttendanceApi;
use crate::directory::{Notice, NoticeKind, Refreshable};
use crate::forms::OFFICE;
use crate::models::{Attendance, AttendanceStatus};
use crate::session::Session;
use crate::{ClinicError, ClinicResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_types::OfficeNumber;

/// Attendance list with call/finish actions.
///
/// Transitions are checked against the locally known status before any request; after a
/// successful action the list is refetched so other doctors' changes show up too.
pub struct ConsultationQueue<A> {
    api: A,
    session: Session,
    attendances: Vec<Attendance>,
    notices: Vec<Notice>,
    last_updated: Option<DateTime<Utc>>,
}

impl<A: AttendanceApi> ConsultationQueue<A> {
    pub fn new(api: A, session: Session) -> Self {
        Self {
            api,
            session,
            attendances: Vec::new(),
            notices: Vec::new(),
            last_updated: None,
        }
    }

    pub fn attendances(&self) -> &[Attendance] {
        &self.attendances
    }

    pub fn with_status(&self, status: AttendanceStatus) -> impl Iterator<Item = &Attendance> {
        self.attendances.iter().filter(move |a| a.status == status)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// # Errors
    ///
    /// Any API error; an error notice is pushed and the current list is kept.
    pub async fn refresh(&mut self) -> ClinicResult<()> {
        match self.fetch().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.report_failure(e)),
        }
    }

    async fn fetch(&mut self) -> ClinicResult<()> {
        let attendances = self.api.attendances(&self.session).await?;
        self.attendances = attendances;
        self.last_updated = Some(Utc::now());
        Ok(())
    }

    /// Calls a pending patient to `office`.
    ///
    /// # Errors
    ///
    /// - `ClinicError::Validation` for office 0.
    /// - `ClinicError::UnknownAttendance` / `InvalidTransition` when the local list does not allow it.
    /// - Any API error from the call. A stale attendance refetches the list before returning.
    pub async fn call(&mut self, attendance_id: i64, office: u32) -> ClinicResult<()> {
        let office = OfficeNumber::new(office)
            .map_err(|_| ClinicError::invalid_field(OFFICE, "please enter a valid office number"))?;
        self.check_transition(attendance_id, AttendanceStatus::InProgress)?;

        if let Err(e) = self.api.call(&self.session, attendance_id, office.get()).await {
            return Err(self.fail_action(e).await);
        }
        tracing::info!("attendance {} called to office {}", attendance_id, office);
        self.notices.push(Notice {
            kind: NoticeKind::Success,
            message: "patient called".into(),
        });
        self.refetch_after_action().await;
        Ok(())
    }

    /// Finishes an attendance on behalf of `professional_id`.
    ///
    /// # Errors
    ///
    /// `ClinicError::UnknownAttendance` / `InvalidTransition` when the local list does not allow
    /// it, or any API error from the finish. A stale attendance refetches the list before
    /// returning.
    pub async fn finish(&mut self, attendance_id: i64, professional_id: i64) -> ClinicResult<()> {
        self.check_transition(attendance_id, AttendanceStatus::Finished)?;

        if let Err(e) = self
            .api
            .finish(&self.session, attendance_id, professional_id)
            .await
        {
            return Err(self.fail_action(e).await);
        }
        tracing::info!("attendance {} finished", attendance_id);
        self.notices.push(Notice {
            kind: NoticeKind::Success,
            message: "attendance finished".into(),
        });
        self.refetch_after_action().await;
        Ok(())
    }

    /// The action already landed; a failed refetch only leaves the list behind until the next tick.
    async fn refetch_after_action(&mut self) {
        if let Err(e) = self.fetch().await {
            self.report_failure(e);
        }
    }

    /// Someone else moved or removed the attendance: bring the list up to date so the local
    /// transition check stops allowing the same request.
    async fn fail_action(&mut self, e: ClinicError) -> ClinicError {
        let stale = e.is_stale_record();
        let e = self.report_failure(e);
        if stale {
            if let Err(refresh) = self.fetch().await {
                tracing::warn!("refresh after stale attendance failed: {}", refresh);
            }
        }
        e
    }

    fn check_transition(&self, attendance_id: i64, to: AttendanceStatus) -> ClinicResult<()> {
        let current = self
            .attendances
            .iter()
            .find(|a| a.id == attendance_id)
            .ok_or(ClinicError::UnknownAttendance(attendance_id))?;
        if !current.status.can_transition_to(to) {
            return Err(ClinicError::InvalidTransition {
                id: attendance_id,
                from: current.status,
                to,
            });
        }
        Ok(())
    }

    fn report_failure(&mut self, e: ClinicError) -> ClinicError {
        tracing::warn!("attendance request failed: {}", e);
        self.notices.push(Notice {
            kind: NoticeKind::Error,
            message: e.user_message(),
        });
        e
    }
}

#[async_trait]
impl<A: AttendanceApi> Refreshable for ConsultationQueue<A> {
    async fn refresh_tick(&mut self) -> bool {
        if let Err(e) = self.fetch().await {
            tracing::warn!("background refresh of attendances failed: {}", e);
        }
        true
    }
}
