//! # Call Panel
//!
//! The public waiting-room screen: listens for "patient called" events on the real-time channel,
//! shows the current call and the last few calls, and reads each call aloud.
//!
//! - [`realtime`]: Socket.IO client with fixed-delay reconnection and a connection-state watch
//! - [`speech`]: one-at-a-time announcement queue over a pluggable synthesizer
//! - [`board`]: current call and bounded history, rendered as text
//! - [`panel`]: wires the three together

pub mod board;
pub mod dedup;
pub mod error;
pub mod panel;
pub mod protocol;
pub mod realtime;
pub mod speech;

pub use board::CallBoard;
pub use error::{PanelError, PanelResult, SpeechError};
pub use panel::{CallPanel, PanelConfig};
pub use realtime::{ConnectionState, RealtimeClient};
