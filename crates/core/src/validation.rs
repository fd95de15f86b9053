//! Input validation and display formatting.
//!
//! Validators return `Some(message)` when the value is rejected so they can be plugged
//! straight into [`crate::forms::FieldSpec`]. Formatters are pure projections; the stored
//! value is always the digit-only or ISO form.

use crate::constants::MAX_AGE_YEARS;
use chrono::{Datelike, Local, NaiveDate};
use clinic_types::{Cpf, OfficeNumber, TypesError};

/// Strips everything but ASCII digits.
pub fn strip_cpf(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Renders `XXX.XXX.XXX-XX` from the digits of `value`.
///
/// Inputs without exactly 11 digits come back as their bare digits. Idempotent: formatting an
/// already formatted value yields the same string.
pub fn format_cpf(value: &str) -> String {
    let digits = strip_cpf(value);
    if digits.len() != 11 {
        return digits;
    }
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

/// Form validator for CPF fields.
pub fn validate_cpf(value: &str) -> Option<String> {
    match Cpf::parse(value) {
        Ok(_) => None,
        Err(TypesError::CpfLength) => Some("CPF must have 11 digits".into()),
        Err(_) => Some("invalid CPF".into()),
    }
}

/// Form validator for birth dates, against the local calendar date.
pub fn validate_birth_date(value: &str) -> Option<String> {
    validate_birth_date_on(value, Local::now().date_naive())
}

/// Birth date must be ISO `YYYY-MM-DD`, not in the future and not more than 130 years back.
pub fn validate_birth_date_on(value: &str, today: NaiveDate) -> Option<String> {
    let date = match parse_iso_date(value) {
        Some(date) => date,
        None => return Some("date must be in YYYY-MM-DD format".into()),
    };

    if date > today {
        return Some("date cannot be in the future".into());
    }

    let oldest = today
        .with_year(today.year() - MAX_AGE_YEARS)
        .or_else(|| NaiveDate::from_ymd_opt(today.year() - MAX_AGE_YEARS, 2, 28))
        .unwrap_or(NaiveDate::MIN);
    if date < oldest {
        return Some("date is too old".into());
    }

    None
}

/// Form validator for office numbers.
pub fn validate_office(value: &str) -> Option<String> {
    OfficeNumber::parse(value)
        .err()
        .map(|_| "please enter a valid office number".into())
}

pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// `YYYY-MM-DD` to `DD/MM/YYYY`. Values that do not split into three parts are returned as-is.
pub fn format_date(value: &str) -> String {
    let parts: Vec<&str> = value.split('-').collect();
    match parts.as_slice() {
        [year, month, day] => format!("{day}/{month}/{year}"),
        _ => value.to_string(),
    }
}
