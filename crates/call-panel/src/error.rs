#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("invalid real-time URL: {0}")]
    Url(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type PanelResult<T> = std::result::Result<T, PanelError>;

/// A single utterance failed. The queue logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("failed to start speech command: {0}")]
    Spawn(std::io::Error),
    #[error("speech command failed: {0}")]
    Failed(String),
}
