//! # Clinic Core
//!
//! Client-side business logic for the clinic call and queue system.
//!
//! This crate talks to the external clinic backend and holds the state the staff screens need:
//! - Typed REST client (`api_key` header plus bearer token) with a uniform error taxonomy
//! - Session context with a load/save/clear lifecycle
//! - Form specifications, CPF and birth-date validation
//! - Patient/professional list view-models with polling suppression
//! - The doctor's attendance queue and attendance reports
//!
//! **No display concerns**: the real-time call panel and speech live in `call-panel`; terminal
//! rendering of menus and tables belongs to the binaries.

pub mod api;
pub mod client;
pub mod config;
pub mod constants;
pub mod consultation;
pub mod directory;
pub mod error;
pub mod forms;
pub mod login;
pub mod models;
pub mod session;
pub mod validation;

pub use api::{AttendanceApi, AuthApi, DirectoryApi, Page, Record, ReportApi, ReportQuery};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use consultation::ConsultationQueue;
pub use directory::{Dialog, Directory, Notice, NoticeKind};
pub use error::{ClinicError, ClinicResult};
pub use login::{menu_for, LoginFlow, LoginOutcome, MenuEntry};
pub use models::{Attendance, AttendanceStatus, CallEvent, Patient, Professional, Role, User};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use reqwest::Url;
