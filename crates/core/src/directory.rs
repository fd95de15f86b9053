//! Patient and professional list view-models.
//!
//! A [`Directory`] owns one page (or the full list, or a search result) of a collection and
//! applies create/update/delete results locally instead of refetching. Background refreshes go
//! through [`Directory::refresh_tick`], which is suppressed while a dialog is open or a search
//! result is on screen so the user's view never shifts underneath them.

use crate::api::{AttendanceApi, AttendanceReport, DirectoryApi, Record, ReportApi, ReportQuery};
use crate::constants::MIN_PASSWORD_LEN;
use crate::forms::{
    patient_form, patient_form_for, professional_form, professional_form_for, Form, FormErrors,
    FormMode, BIRTH_DATE, CONFIRM_PASSWORD, CPF, FULL_NAME, PASSWORD, ROLE,
};
use crate::models::{Patient, PatientInput, Professional, ProfessionalInput, Role};
use crate::session::Session;
use crate::validation::parse_iso_date;
use crate::{ClinicError, ClinicResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinic_types::{Cpf, NonEmptyText};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// A [`Record`] that can be edited through a [`Form`].
pub trait DirectoryRecord: Record {
    /// Singular noun used in notices.
    const NOUN: &'static str;

    fn blank_form() -> Form;

    fn edit_form(&self) -> Form;

    /// Converts an already validated form into the request payload.
    ///
    /// # Errors
    ///
    /// Returns per-field errors for values that pass the field validators but still cannot be
    /// sent, such as a password confirmation that does not match.
    fn input_from(form: &Form) -> Result<Self::Input, FormErrors>;
}

impl DirectoryRecord for Patient {
    const NOUN: &'static str = "patient";

    fn blank_form() -> Form {
        patient_form(FormMode::Create)
    }

    fn edit_form(&self) -> Form {
        patient_form_for(self)
    }

    fn input_from(form: &Form) -> Result<PatientInput, FormErrors> {
        let mut errors = FormErrors::default();
        let full_name = NonEmptyText::new(form.value(FULL_NAME))
            .map_err(|e| errors.insert(FULL_NAME, e.to_string()))
            .ok();
        let cpf = Cpf::parse(form.value(CPF))
            .map_err(|e| errors.insert(CPF, e.to_string()))
            .ok();
        let birth_date = parse_iso_date(form.value(BIRTH_DATE));
        if birth_date.is_none() {
            errors.insert(BIRTH_DATE, "date must be in YYYY-MM-DD format");
        }

        match (full_name, cpf, birth_date) {
            (Some(full_name), Some(cpf), Some(birth_date)) => Ok(PatientInput {
                full_name,
                cpf,
                birth_date,
            }),
            _ => Err(errors),
        }
    }
}

impl DirectoryRecord for Professional {
    const NOUN: &'static str = "professional";

    fn blank_form() -> Form {
        professional_form(FormMode::Create)
    }

    fn edit_form(&self) -> Form {
        professional_form_for(self)
    }

    fn input_from(form: &Form) -> Result<ProfessionalInput, FormErrors> {
        let mut errors = FormErrors::default();
        let full_name = NonEmptyText::new(form.value(FULL_NAME))
            .map_err(|e| errors.insert(FULL_NAME, e.to_string()))
            .ok();
        let cpf = Cpf::parse(form.value(CPF))
            .map_err(|e| errors.insert(CPF, e.to_string()))
            .ok();
        let role = Role::from_wire(form.value(ROLE));
        if role.is_none() {
            errors.insert(ROLE, "Profile is required");
        }

        let password = form.optional(PASSWORD);
        if let Some(password) = &password {
            if password.chars().count() < MIN_PASSWORD_LEN {
                errors.insert(
                    PASSWORD,
                    format!("password must have at least {MIN_PASSWORD_LEN} characters"),
                );
            }
            if form.optional(CONFIRM_PASSWORD).as_ref() != Some(password) {
                errors.insert(CONFIRM_PASSWORD, "passwords do not match");
            }
        }

        match (full_name, cpf, role) {
            (Some(full_name), Some(cpf), Some(role)) if errors.is_empty() => {
                Ok(ProfessionalInput::new(full_name, cpf, role, password))
            }
            _ => Err(errors),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient user notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// The modal currently open over the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialog {
    Create,
    Edit(i64),
    Delete(i64),
    Report(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Listing {
    Page,
    All,
    Search,
}

/// Anything a poll loop can refresh.
#[async_trait]
pub trait Refreshable: Send {
    /// Returns `false` when the refresh was skipped.
    async fn refresh_tick(&mut self) -> bool;
}

/// Drives `model.refresh_tick()` every `every`, `ticks` times. The first tick fires after one
/// full period. Returns how many ticks actually refreshed.
pub async fn poll<T: Refreshable + ?Sized>(model: &mut T, every: Duration, ticks: usize) -> usize {
    let mut timer = interval_at(Instant::now() + every, every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut refreshed = 0;
    for _ in 0..ticks {
        timer.tick().await;
        if model.refresh_tick().await {
            refreshed += 1;
        }
    }
    refreshed
}

/// View-model for a paginated collection.
///
/// Holding `&mut self` across every request means at most one request per directory is ever
/// in flight.
pub struct Directory<R, A> {
    api: A,
    session: Session,
    items: Vec<R>,
    page: u32,
    total_pages: u32,
    listing: Listing,
    dialog: Option<Dialog>,
    notices: Vec<Notice>,
    last_updated: Option<DateTime<Utc>>,
    _record: PhantomData<R>,
}

impl<R: DirectoryRecord, A: DirectoryApi<R>> Directory<R, A> {
    pub fn new(api: A, session: Session) -> Self {
        Self {
            api,
            session,
            items: Vec::new(),
            page: 1,
            total_pages: 1,
            listing: Listing::Page,
            dialog: None,
            notices: Vec::new(),
            last_updated: None,
            _record: PhantomData,
        }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn find(&self, id: i64) -> Option<&R> {
        self.items.iter().find(|r| r.id() == id)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn is_searching(&self) -> bool {
        self.listing == Listing::Search
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Returns and clears pending notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ------------------------------------------------------------------
    // Dialogs
    // ------------------------------------------------------------------

    pub fn dialog(&self) -> Option<Dialog> {
        self.dialog
    }

    /// Opens the create dialog and returns its blank form.
    pub fn open_create(&mut self) -> Form {
        self.dialog = Some(Dialog::Create);
        R::blank_form()
    }

    /// Opens the edit dialog prefilled from the listed record.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::NotFound` when `id` is not in the current listing.
    pub fn open_edit(&mut self, id: i64) -> ClinicResult<Form> {
        let form = self
            .find(id)
            .map(R::edit_form)
            .ok_or_else(|| ClinicError::NotFound(format!("{} {} is not listed", R::NOUN, id)))?;
        self.dialog = Some(Dialog::Edit(id));
        Ok(form)
    }

    pub fn open_delete(&mut self, id: i64) {
        self.dialog = Some(Dialog::Delete(id));
    }

    pub fn open_report(&mut self, id: i64) {
        self.dialog = Some(Dialog::Report(id));
    }

    pub fn close_dialog(&mut self) {
        self.dialog = None;
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Any API error; an error notice is pushed and the listing is left unchanged.
    pub async fn load_page(&mut self, page: u32) -> ClinicResult<()> {
        let page = page.max(1);
        match self.api.page(&self.session, page).await {
            Ok(result) => {
                self.items = result.items;
                self.page = result.current_page;
                self.total_pages = result.total_pages;
                self.listing = Listing::Page;
                self.touch();
                Ok(())
            }
            Err(e) => Err(self.report_failure(e)),
        }
    }

    /// Loads the unpaginated collection.
    ///
    /// # Errors
    ///
    /// Any API error; an error notice is pushed and the listing is left unchanged.
    pub async fn load_all(&mut self) -> ClinicResult<()> {
        match self.api.all(&self.session).await {
            Ok(items) => {
                self.items = items;
                self.page = 1;
                self.total_pages = 1;
                self.listing = Listing::All;
                self.touch();
                Ok(())
            }
            Err(e) => Err(self.report_failure(e)),
        }
    }

    /// Searches by name. A blank name clears the search instead.
    ///
    /// # Errors
    ///
    /// Any API error; an error notice is pushed and the listing is left unchanged.
    pub async fn search_by_name(&mut self, name: &str) -> ClinicResult<()> {
        if name.trim().is_empty() {
            return self.clear_search().await;
        }
        match self.api.search_by_name(&self.session, name).await {
            Ok(items) => {
                self.show_search(items);
                Ok(())
            }
            Err(e) => Err(self.report_failure(e)),
        }
    }

    /// Searches by CPF. The CPF is validated first; invalid input issues no request.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::Validation` for an invalid CPF, or any API error.
    pub async fn search_by_cpf(&mut self, cpf: &str) -> ClinicResult<()> {
        let cpf = Cpf::parse(cpf).map_err(|e| ClinicError::invalid_field(CPF, e.to_string()))?;
        match self.api.search_by_cpf(&self.session, &cpf).await {
            Ok(items) => {
                self.show_search(items);
                Ok(())
            }
            Err(e) => Err(self.report_failure(e)),
        }
    }

    /// Leaves search mode and reloads the page that was shown before.
    ///
    /// # Errors
    ///
    /// Any API error from reloading.
    pub async fn clear_search(&mut self) -> ClinicResult<()> {
        self.listing = Listing::Page;
        self.load_page(self.page).await
    }

    fn show_search(&mut self, items: Vec<R>) {
        self.items = items;
        self.listing = Listing::Search;
        self.touch();
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Validates `form`, creates the record and appends it to the listing.
    ///
    /// # Errors
    ///
    /// `ClinicError::Validation` if the form is invalid (no request is made), otherwise any API
    /// error. Failures are recorded on the form and as an error notice.
    pub async fn create(&mut self, form: &mut Form) -> ClinicResult<R> {
        let input = prepare::<R>(form)?;
        match self.api.create(&self.session, &input).await {
            Ok(record) => {
                tracing::info!("{} {} created", R::NOUN, record.id());
                self.items.push(record.clone());
                self.finish_mutation(form, format!("{} created", R::NOUN));
                Ok(record)
            }
            Err(e) => Err(self.fail_mutation(form, e).await),
        }
    }

    /// Validates `form`, updates record `id` and replaces it in the listing.
    ///
    /// # Errors
    ///
    /// `ClinicError::Validation` if the form is invalid (no request is made), otherwise any API
    /// error. A stale record closes the dialog and refreshes the listing once.
    pub async fn update(&mut self, id: i64, form: &mut Form) -> ClinicResult<R> {
        let input = prepare::<R>(form)?;
        match self.api.update(&self.session, id, &input).await {
            Ok(record) => {
                tracing::info!("{} {} updated", R::NOUN, id);
                match self.items.iter_mut().find(|r| r.id() == id) {
                    Some(slot) => *slot = record.clone(),
                    None => self.items.push(record.clone()),
                }
                self.finish_mutation(form, format!("{} updated", R::NOUN));
                Ok(record)
            }
            Err(e) => Err(self.fail_mutation(form, e).await),
        }
    }

    /// Deletes record `id` and removes it from the listing. The dialog closes either way.
    ///
    /// # Errors
    ///
    /// Any API error; an error notice is pushed.
    pub async fn delete(&mut self, id: i64) -> ClinicResult<()> {
        let result = self.api.delete(&self.session, id).await;
        self.dialog = None;
        match result {
            Ok(()) => {
                tracing::info!("{} {} deleted", R::NOUN, id);
                self.items.retain(|r| r.id() != id);
                self.notify(NoticeKind::Success, format!("{} deleted", R::NOUN));
                Ok(())
            }
            Err(e) => {
                let stale = e.is_stale_record();
                let e = self.report_failure(e);
                if stale {
                    self.reload_silently().await;
                }
                Err(e)
            }
        }
    }

    fn finish_mutation(&mut self, form: &mut Form, message: String) {
        form.mark_saved();
        self.dialog = None;
        self.touch();
        self.notify(NoticeKind::Success, message);
    }

    async fn fail_mutation(&mut self, form: &mut Form, e: ClinicError) -> ClinicError {
        form.fail_submit(e.user_message());
        let stale = e.is_stale_record();
        let e = self.report_failure(e);
        if stale {
            self.dialog = None;
            self.reload_silently().await;
        }
        e
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    fn refresh_suppressed(&self) -> bool {
        self.dialog.is_some() || self.listing == Listing::Search
    }

    async fn reload_silently(&mut self) {
        let result = match self.listing {
            Listing::All => self.api.all(&self.session).await.map(|items| (items, 1, 1)),
            Listing::Page | Listing::Search => self
                .api
                .page(&self.session, self.page)
                .await
                .map(|p| (p.items, p.current_page, p.total_pages)),
        };
        match result {
            Ok((items, page, total_pages)) => {
                self.items = items;
                self.page = page;
                self.total_pages = total_pages;
                if self.listing == Listing::Search {
                    self.listing = Listing::Page;
                }
                self.touch();
            }
            Err(e) => tracing::warn!("background refresh of {} list failed: {}", R::NOUN, e),
        }
    }

    fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }

    fn notify(&mut self, kind: NoticeKind, message: String) {
        self.notices.push(Notice { kind, message });
    }

    fn report_failure(&mut self, e: ClinicError) -> ClinicError {
        tracing::warn!("{} request failed: {}", R::NOUN, e);
        self.notify(NoticeKind::Error, e.user_message());
        e
    }
}

#[async_trait]
impl<R: DirectoryRecord, A: DirectoryApi<R>> Refreshable for Directory<R, A> {
    /// Skipped while a dialog is open or a search result is shown.
    async fn refresh_tick(&mut self) -> bool {
        if self.refresh_suppressed() {
            tracing::debug!("{} list refresh skipped", R::NOUN);
            return false;
        }
        self.reload_silently().await;
        true
    }
}

impl<A: DirectoryApi<Patient> + AttendanceApi> Directory<Patient, A> {
    /// Opens a new attendance for a listed patient.
    ///
    /// # Errors
    ///
    /// Any API error; an error notice is pushed.
    pub async fn create_attendance(&mut self, patient_id: i64) -> ClinicResult<()> {
        match self.api.create_attendance(&self.session, patient_id).await {
            Ok(()) => {
                tracing::info!("attendance created for patient {}", patient_id);
                self.notify(NoticeKind::Success, "attendance created".into());
                Ok(())
            }
            Err(e) => Err(self.report_failure(e)),
        }
    }
}

impl<A: DirectoryApi<Professional> + ReportApi> Directory<Professional, A> {
    /// Fetches the attendance report for a professional.
    ///
    /// # Errors
    ///
    /// Any API error; an error notice is pushed.
    pub async fn report(&mut self, query: &ReportQuery) -> ClinicResult<AttendanceReport> {
        match self.api.attendance_report(&self.session, query).await {
            Ok(report) => Ok(report),
            Err(e) => Err(self.report_failure(e)),
        }
    }
}

fn prepare<R: DirectoryRecord>(form: &mut Form) -> ClinicResult<R::Input> {
    form.validate().map_err(ClinicError::Validation)?;
    R::input_from(form).map_err(|errors| {
        form.set_errors(errors.clone());
        ClinicError::Validation(errors)
    })
}
