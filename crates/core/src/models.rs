//! Wire-aligned data model for the clinic backend.
//!
//! Records received from the backend are kept permissive (plain strings for CPF and dates) so
//! a single odd row never breaks a whole list. Values the client *sends* go through the
//! validated input types instead.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_types::{Cpf, NonEmptyText, OfficeNumber};
use serde::{Deserialize, Serialize};

/// Professional profile as the backend names it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Doctor,
    Receptionist,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Doctor, Role::Receptionist, Role::Administrator];

    pub fn as_wire(self) -> &'static str {
        match self {
            Role::Doctor => "DOCTOR",
            Role::Receptionist => "RECEPTIONIST",
            Role::Administrator => "ADMINISTRATOR",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "DOCTOR" => Some(Role::Doctor),
            "RECEPTIONIST" => Some(Role::Receptionist),
            "ADMINISTRATOR" => Some(Role::Administrator),
            _ => None,
        }
    }

    /// Display label shown to staff.
    pub fn label(self) -> &'static str {
        match self {
            Role::Doctor => "Médico",
            Role::Receptionist => "Recepcionista",
            Role::Administrator => "Administrador",
        }
    }
}

/// Attendance lifecycle. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Pending,
    InProgress,
    Finished,
}

impl AttendanceStatus {
    /// `Pending -> Finished` is allowed: a doctor may close an attendance without calling.
    pub fn can_transition_to(self, next: AttendanceStatus) -> bool {
        next > self
    }

    pub fn is_terminal(self) -> bool {
        self == AttendanceStatus::Finished
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "Pendente",
            AttendanceStatus::InProgress => "Em Atendimento",
            AttendanceStatus::Finished => "Finalizado",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: i64,
    pub full_name: String,
    /// Digits only.
    pub cpf: String,
    /// `YYYY-MM-DD`.
    pub birth_date: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professional {
    pub id: i64,
    pub full_name: String,
    pub cpf: String,
    #[serde(rename = "profile")]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_office: Option<u32>,
}

/// The authenticated professional, as returned by login.
pub type User = Professional;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: i64,
    pub patient: Patient,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub professional_id: Option<i64>,
    #[serde(default)]
    pub office_number: Option<u32>,
}

impl Attendance {
    /// Office the patient was called to. Only meaningful once the attendance has been called.
    pub fn office(&self) -> Option<u32> {
        if self.status >= AttendanceStatus::InProgress {
            self.office_number
        } else {
            None
        }
    }
}

/// A "patient called" notification from the real-time channel.
///
/// Carries no identity beyond its arrival order; `sequence` is assigned locally on receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEvent {
    pub sequence: u64,
    pub attendance_id: i64,
    pub patient: Patient,
    pub office_number: Option<u32>,
}

impl CallEvent {
    pub fn from_attendance(attendance: Attendance, sequence: u64) -> Self {
        Self {
            sequence,
            attendance_id: attendance.id,
            patient: attendance.patient,
            office_number: attendance.office_number,
        }
    }

    /// Sentence read aloud and shown on the panel.
    pub fn announcement(&self) -> String {
        match self.office_number {
            Some(office) => format!(
                "{}, compareça ao consultório {}",
                self.patient.full_name, office
            ),
            None => format!("{}, compareça ao consultório", self.patient.full_name),
        }
    }
}

// ============================================================================
// OUTBOUND INPUTS
// ============================================================================

/// Validated patient payload for create/update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    pub full_name: NonEmptyText,
    pub cpf: Cpf,
    pub birth_date: NaiveDate,
}

/// Validated professional payload for create/update.
///
/// The backend stores names upper-cased; [`ProfessionalInput::new`] applies that.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalInput {
    pub full_name: NonEmptyText,
    pub cpf: Cpf,
    #[serde(rename = "profile")]
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProfessionalInput {
    pub fn new(full_name: NonEmptyText, cpf: Cpf, role: Role, password: Option<String>) -> Self {
        Self {
            full_name: full_name.to_uppercase(),
            cpf,
            role,
            password: password.filter(|p| !p.is_empty()),
        }
    }
}

/// Office selection payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOfficeRequest {
    pub professional_id: i64,
    pub office: OfficeNumber,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patient() -> Patient {
        Patient {
            id: 7,
            full_name: "MARIA SILVA".into(),
            cpf: "52998224725".into(),
            birth_date: "1990-05-17".into(),
        }
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use AttendanceStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Finished));
        assert!(InProgress.can_transition_to(Finished));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Finished.can_transition_to(InProgress));
        assert!(!Finished.can_transition_to(Finished));
        assert!(Finished.is_terminal());
    }

    #[test]
    fn test_attendance_deserializes_camel_case() {
        let json = r#"{
            "id": 3,
            "patient": {"id": 7, "fullName": "MARIA SILVA", "cpf": "52998224725", "birthDate": "1990-05-17"},
            "status": "IN_PROGRESS",
            "createdAt": "2024-03-01T12:00:00Z",
            "officeNumber": 4
        }"#;
        let attendance: Attendance = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(attendance.status, AttendanceStatus::InProgress);
        assert_eq!(attendance.office(), Some(4));
        assert_eq!(attendance.patient, sample_patient());
        assert!(attendance.finished_at.is_none());
    }

    #[test]
    fn test_office_hidden_while_pending() {
        let attendance = Attendance {
            id: 1,
            patient: sample_patient(),
            status: AttendanceStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
            professional_id: None,
            office_number: Some(2),
        };
        assert_eq!(attendance.office(), None);
    }

    #[test]
    fn test_professional_role_uses_profile_key() {
        let json = r#"{"id": 1, "fullName": "DR HOUSE", "cpf": "52998224725", "profile": "DOCTOR"}"#;
        let professional: Professional = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(professional.role, Role::Doctor);
        assert_eq!(professional.current_office, None);
        assert_eq!(Role::from_wire("ADMINISTRATOR"), Some(Role::Administrator));
        assert_eq!(Role::Receptionist.label(), "Recepcionista");
    }

    #[test]
    fn test_professional_input_uppercases_and_drops_empty_password() {
        let input = ProfessionalInput::new(
            NonEmptyText::new("Ana Souza").expect("valid name"),
            Cpf::parse("52998224725").expect("valid CPF"),
            Role::Receptionist,
            Some(String::new()),
        );
        let json = serde_json::to_value(&input).expect("should serialize");
        assert_eq!(json["fullName"], "ANA SOUZA");
        assert_eq!(json["profile"], "RECEPTIONIST");
        assert!(json.get("password").is_none());
    }

    #[test]
    fn test_patient_input_serializes_digits_and_iso_date() {
        let input = PatientInput {
            full_name: NonEmptyText::new("Maria Silva").expect("valid name"),
            cpf: Cpf::parse("529.982.247-25").expect("valid CPF"),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 17).expect("valid date"),
        };
        let json = serde_json::to_value(&input).expect("should serialize");
        assert_eq!(json["cpf"], "52998224725");
        assert_eq!(json["birthDate"], "1990-05-17");
    }

    #[test]
    fn test_call_event_announcement() {
        let mut event = CallEvent {
            sequence: 1,
            attendance_id: 3,
            patient: sample_patient(),
            office_number: Some(4),
        };
        assert_eq!(
            event.announcement(),
            "MARIA SILVA, compareça ao consultório 4"
        );
        event.office_number = None;
        assert_eq!(event.announcement(), "MARIA SILVA, compareça ao consultório");
    }
}
