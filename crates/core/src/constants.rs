//! Constants used throughout the clinic core crate.
//!
//! Route fragments, header names and defaults live here so the client, the binaries and the
//! tests agree on them.

/// Path prefix every backend route is mounted under.
pub const API_PREFIX: &str = "/api";

/// Header carrying the static application key.
pub const API_KEY_HEADER: &str = "api_key";

/// Default backend address when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Filename for the persisted session inside the data directory.
pub const SESSION_FILENAME: &str = "session.json";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Refresh period for patient and professional lists.
pub const DEFAULT_LIST_POLL_SECS: u64 = 10;

/// Refresh period for the doctor's attendance list.
pub const DEFAULT_ATTENDANCE_POLL_SECS: u64 = 30;

/// Oldest accepted birth date, in years before today.
pub const MAX_AGE_YEARS: i32 = 130;

/// Message used when the backend returns an error without a body message.
pub const FALLBACK_SERVER_MESSAGE: &str = "server error";

/// Collection path segments.
pub const PATIENTS_COLLECTION: &str = "patients";
pub const PROFESSIONALS_COLLECTION: &str = "professionals";

/// Shortest password accepted when creating or changing a professional's password.
pub const MIN_PASSWORD_LEN: usize = 6;
