//! Form specifications and the generic form model.
//!
//! Every edit/create dialog is described by a list of [`FieldSpec`] values, each tagged with a
//! [`FieldKind`]. A single [`Form`] type holds the values for any such list: it applies
//! per-field formatters on input, validates required fields and per-field validators, tracks
//! whether the user has changed anything, and renders itself as text.
//!
//! The concrete forms used by the client are built by [`patient_form`], [`professional_form`]
//! and [`office_form`].

use crate::models::{Patient, Professional, Role};
use crate::validation::{format_cpf, validate_birth_date, validate_cpf, validate_office};
use std::collections::BTreeMap;
use std::fmt;

/// Formats a raw typed value before it is stored in the form.
pub type Formatter = fn(&str) -> String;

/// Returns `Some(message)` when the value is invalid.
pub type Validator = fn(&str) -> Option<String>;

/// A selectable value for [`FieldKind::Select`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// What kind of input a field takes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Password,
    Select { options: Vec<SelectOption> },
}

/// Describes a single form field.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub placeholder: Option<&'static str>,
    pub formatter: Option<Formatter>,
    pub validator: Option<Validator>,
}

impl FieldSpec {
    pub fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            placeholder: None,
            formatter: None,
            validator: None,
        }
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn check(&self, value: &str) -> Option<String> {
        if value.trim().is_empty() {
            return self.required.then(|| format!("{} is required", self.label));
        }

        if let FieldKind::Select { options } = &self.kind {
            if !options.iter().any(|o| o.value == value) {
                return Some(format!("{} has an unknown option", self.label));
            }
        }

        self.validator.and_then(|validate| validate(value))
    }
}

/// Per-field validation messages plus an optional submit-level message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<String, String>,
    submit: Option<String>,
}

impl FormErrors {
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.fields.insert(field.to_string(), message.into());
    }

    pub fn set_submit(&mut self, message: impl Into<String>) {
        self.submit = Some(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn submit(&self) -> Option<&str> {
        self.submit.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.submit.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        if let Some(submit) = &self.submit {
            parts.push(submit.clone());
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// What to do when the user asks to close a dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDecision {
    Close,
    /// The form has unsaved changes; ask before discarding them.
    ConfirmDiscard,
}

/// Whether a form creates a record or edits an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

/// Values for a list of field specifications.
#[derive(Clone, Debug)]
pub struct Form {
    title: &'static str,
    fields: Vec<FieldSpec>,
    values: BTreeMap<&'static str, String>,
    errors: FormErrors,
    dirty: bool,
    confirm_before_close: bool,
}

impl Form {
    pub fn new(title: &'static str, fields: Vec<FieldSpec>) -> Self {
        let values = fields.iter().map(|f| (f.name, String::new())).collect();
        Self {
            title,
            fields,
            values,
            errors: FormErrors::default(),
            dirty: false,
            confirm_before_close: true,
        }
    }

    pub fn without_close_confirmation(mut self) -> Self {
        self.confirm_before_close = false;
        self
    }

    /// Loads initial values without marking the form dirty. Unknown names are ignored.
    pub fn with_values<'a>(mut self, values: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        for (name, value) in values {
            if let Some(field) = self.fields.iter().find(|f| f.name == name) {
                let value = match field.formatter {
                    Some(format) => format(&value),
                    None => value,
                };
                self.values.insert(field.name, value);
            }
        }
        self
    }

    pub fn title(&self) -> &str {
        self.title
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Sets a field from user input, applying its formatter and clearing its error.
    ///
    /// Returns `false` if the form has no such field.
    pub fn set(&mut self, name: &str, raw: &str) -> bool {
        let Some(field) = self.fields.iter().find(|f| f.name == name) else {
            return false;
        };
        let value = match field.formatter {
            Some(format) => format(raw),
            None => raw.to_string(),
        };
        self.values.insert(field.name, value);
        self.errors.fields.remove(name);
        self.dirty = true;
        true
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Trimmed value, `None` when blank.
    pub fn optional(&self, name: &str) -> Option<String> {
        let value = self.value(name).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Validates every field, storing and returning the resulting errors.
    ///
    /// # Errors
    ///
    /// Returns the collected [`FormErrors`] when any field fails.
    pub fn validate(&mut self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        for field in &self.fields {
            if let Some(message) = field.check(self.value(field.name)) {
                errors.insert(field.name, message);
            }
        }
        self.errors = errors.clone();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Replaces the stored errors with ones found while converting values.
    pub fn set_errors(&mut self, errors: FormErrors) {
        self.errors = errors;
    }

    /// Records a failure reported by the server after submission.
    pub fn fail_submit(&mut self, message: impl Into<String>) {
        self.errors.set_submit(message);
    }

    /// Marks the form as saved.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn request_close(&self) -> CloseDecision {
        if self.dirty && self.confirm_before_close {
            CloseDecision::ConfirmDiscard
        } else {
            CloseDecision::Close
        }
    }

    /// Plain-text rendering: one line per field, with inline errors.
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.title);
        for field in &self.fields {
            let value = self.value(field.name);
            let shown = match &field.kind {
                FieldKind::Password if !value.is_empty() => "********".to_string(),
                FieldKind::Select { options } => options
                    .iter()
                    .find(|o| o.value == value)
                    .map(|o| o.label.clone())
                    .unwrap_or_default(),
                _ => value.to_string(),
            };
            let marker = if field.required { "*" } else { "" };
            out.push_str(&format!("  {}{}: {}", field.label, marker, shown));
            if shown.is_empty() {
                if let Some(placeholder) = field.placeholder {
                    out.push_str(&format!("({placeholder})"));
                }
            }
            if let Some(error) = self.errors.get(field.name) {
                out.push_str(&format!("  <- {error}"));
            }
            out.push('\n');
        }
        if let Some(submit) = self.errors.submit() {
            out.push_str(&format!("  ! {submit}\n"));
        }
        out
    }
}

// ============================================================================
// CONCRETE FORMS
// ============================================================================

pub const FULL_NAME: &str = "fullName";
pub const CPF: &str = "cpf";
pub const BIRTH_DATE: &str = "birthDate";
pub const ROLE: &str = "profile";
pub const PASSWORD: &str = "password";
pub const CONFIRM_PASSWORD: &str = "confirmPassword";
pub const OFFICE: &str = "office";

pub fn patient_form(mode: FormMode) -> Form {
    let title = match mode {
        FormMode::Create => "New patient",
        FormMode::Edit => "Edit patient",
    };
    Form::new(
        title,
        vec![
            FieldSpec::text(FULL_NAME, "Full name").required(),
            FieldSpec::text(CPF, "CPF")
                .required()
                .placeholder("000.000.000-00")
                .formatter(format_cpf)
                .validator(validate_cpf),
            FieldSpec::new(BIRTH_DATE, "Birth date", FieldKind::Date)
                .required()
                .placeholder("YYYY-MM-DD")
                .validator(validate_birth_date),
        ],
    )
}

pub fn patient_form_for(patient: &Patient) -> Form {
    patient_form(FormMode::Edit).with_values([
        (FULL_NAME, patient.full_name.clone()),
        (CPF, patient.cpf.clone()),
        (BIRTH_DATE, patient.birth_date.clone()),
    ])
}

pub fn role_options() -> Vec<SelectOption> {
    Role::ALL
        .iter()
        .map(|role| SelectOption::new(role.as_wire(), role.label()))
        .collect()
}

/// Password is required when creating; on edit a blank password keeps the current one.
pub fn professional_form(mode: FormMode) -> Form {
    let (title, password) = match mode {
        FormMode::Create => (
            "New professional",
            FieldSpec::new(PASSWORD, "Password", FieldKind::Password).required(),
        ),
        FormMode::Edit => (
            "Edit professional",
            FieldSpec::new(PASSWORD, "New password", FieldKind::Password)
                .placeholder("leave blank to keep"),
        ),
    };
    Form::new(
        title,
        vec![
            FieldSpec::text(FULL_NAME, "Full name").required(),
            FieldSpec::text(CPF, "CPF")
                .required()
                .placeholder("000.000.000-00")
                .formatter(format_cpf)
                .validator(validate_cpf),
            FieldSpec::new(
                ROLE,
                "Profile",
                FieldKind::Select {
                    options: role_options(),
                },
            )
            .required(),
            password,
            FieldSpec::new(CONFIRM_PASSWORD, "Confirm password", FieldKind::Password),
        ],
    )
}

pub fn professional_form_for(professional: &Professional) -> Form {
    professional_form(FormMode::Edit).with_values([
        (FULL_NAME, professional.full_name.clone()),
        (CPF, professional.cpf.clone()),
        (ROLE, professional.role.as_wire().to_string()),
    ])
}

pub fn office_form() -> Form {
    Form::new(
        "Select office",
        vec![FieldSpec::new(OFFICE, "Office number", FieldKind::Number)
            .required()
            .validator(validate_office)],
    )
    .without_close_confirmation()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_applies_formatter_and_marks_dirty() {
        let mut form = patient_form(FormMode::Create);
        assert!(!form.is_dirty());
        assert!(form.set(CPF, "52998224725"));
        assert_eq!(form.value(CPF), "529.982.247-25");
        assert!(form.is_dirty());
        assert!(!form.set("unknown", "x"));
    }

    #[test]
    fn test_validate_reports_required_and_validator_errors() {
        let mut form = patient_form(FormMode::Create);
        form.set(CPF, "111.111.111-11");
        form.set(BIRTH_DATE, "1990-01-15");

        let errors = form.validate().expect_err("form should be invalid");
        assert_eq!(errors.get(FULL_NAME), Some("Full name is required"));
        assert_eq!(errors.get(CPF), Some("invalid CPF"));
        assert_eq!(errors.get(BIRTH_DATE), None);
        assert_eq!(form.errors(), &errors);
    }

    #[test]
    fn test_set_clears_field_error() {
        let mut form = patient_form(FormMode::Create);
        let _ = form.validate();
        assert!(form.errors().get(FULL_NAME).is_some());
        form.set(FULL_NAME, "Maria");
        assert!(form.errors().get(FULL_NAME).is_none());
    }

    #[test]
    fn test_select_rejects_unknown_option() {
        let mut form = professional_form(FormMode::Edit);
        form.set(FULL_NAME, "Ana");
        form.set(CPF, "52998224725");
        form.set(ROLE, "JANITOR");
        let errors = form.validate().expect_err("unknown role should fail");
        assert!(errors.get(ROLE).is_some());
    }

    #[test]
    fn test_password_required_only_on_create() {
        let mut create = professional_form(FormMode::Create);
        create.set(FULL_NAME, "Ana");
        create.set(CPF, "52998224725");
        create.set(ROLE, "DOCTOR");
        assert!(create.validate().expect_err("password missing").get(PASSWORD).is_some());

        let mut edit = professional_form(FormMode::Edit);
        edit.set(FULL_NAME, "Ana");
        edit.set(CPF, "52998224725");
        edit.set(ROLE, "DOCTOR");
        assert!(edit.validate().is_ok());
    }

    #[test]
    fn test_request_close_asks_only_when_dirty() {
        let mut form = patient_form(FormMode::Create);
        assert_eq!(form.request_close(), CloseDecision::Close);
        form.set(FULL_NAME, "Maria");
        assert_eq!(form.request_close(), CloseDecision::ConfirmDiscard);
        form.mark_saved();
        assert_eq!(form.request_close(), CloseDecision::Close);

        let mut office = office_form();
        office.set(OFFICE, "3");
        assert_eq!(office.request_close(), CloseDecision::Close);
    }

    #[test]
    fn test_prefilled_edit_form_is_clean_and_formatted() {
        let patient = Patient {
            id: 1,
            full_name: "MARIA".into(),
            cpf: "52998224725".into(),
            birth_date: "1990-05-17".into(),
        };
        let form = patient_form_for(&patient);
        assert!(!form.is_dirty());
        assert_eq!(form.value(CPF), "529.982.247-25");
    }

    #[test]
    fn test_render_masks_password_and_shows_errors() {
        let mut form = professional_form(FormMode::Create);
        form.set(PASSWORD, "secret");
        form.set(ROLE, "DOCTOR");
        let _ = form.validate();
        let text = form.render();
        assert!(text.contains("Password*: ********"));
        assert!(text.contains("Profile*: Médico"));
        assert!(text.contains("<- Full name is required"));
        assert!(!text.contains("secret"));
    }
}
