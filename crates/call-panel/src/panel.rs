//! The call panel service: every call event updates the board and is queued for speech.

use crate::board::{CallBoard, DEFAULT_HISTORY_SIZE};
use crate::dedup::RedeliveryFilter;
use crate::realtime::{ConnectionState, DEFAULT_RECONNECT_DELAY};
use crate::speech::{
    CommandSynthesizer, SilentSynthesizer, SpeechQueue, SpeechSynthesizer, Utterance,
    DEFAULT_COMMAND, DEFAULT_LANGUAGE, DEFAULT_RATE,
};
use clinic_core::CallEvent;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Panel settings resolved at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelConfig {
    pub history_size: usize,
    pub language: String,
    pub rate: f32,
    /// External TTS program; `None` disables audio.
    pub speech_command: Option<String>,
    pub reconnect_delay: Duration,
    /// Drop repeats of the same attendance and office inside this window. Off by default.
    pub redelivery_window: Option<Duration>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            language: DEFAULT_LANGUAGE.to_string(),
            rate: DEFAULT_RATE,
            speech_command: Some(DEFAULT_COMMAND.to_string()),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            redelivery_window: None,
        }
    }
}

impl PanelConfig {
    pub fn synthesizer(&self) -> Arc<dyn SpeechSynthesizer> {
        match &self.speech_command {
            Some(program) => Arc::new(CommandSynthesizer::new(
                program.clone(),
                self.language.clone(),
                self.rate,
            )),
            None => Arc::new(SilentSynthesizer),
        }
    }
}

pub struct CallPanel {
    board: CallBoard,
    speech: SpeechQueue,
    filter: Option<RedeliveryFilter>,
}

impl CallPanel {
    /// Must be called inside a tokio runtime; the speech worker starts immediately.
    pub fn new(config: &PanelConfig, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            board: CallBoard::new(config.history_size),
            speech: SpeechQueue::spawn(synthesizer),
            filter: config.redelivery_window.map(RedeliveryFilter::new),
        }
    }

    pub fn board(&self) -> &CallBoard {
        &self.board
    }

    /// Records and announces one call. Returns `false` if the redelivery filter dropped it.
    pub fn handle(&mut self, event: CallEvent) -> bool {
        if let Some(filter) = &mut self.filter {
            if !filter.admit(&event, Instant::now()) {
                return false;
            }
        }
        let utterance = Utterance {
            sequence: event.sequence,
            text: event.announcement(),
        };
        self.board.record(event);
        if !self.speech.enqueue(utterance) {
            tracing::warn!("speech worker is gone, call shown without audio");
        }
        true
    }

    /// Runs until `shutdown` resolves or the event stream ends, calling `render` with the
    /// board text after every event and every connection state change.
    pub async fn run<S, R>(
        mut self,
        mut events: mpsc::UnboundedReceiver<CallEvent>,
        mut state: watch::Receiver<ConnectionState>,
        shutdown: S,
        mut render: R,
    ) where
        S: Future<Output = ()>,
        R: FnMut(&str),
    {
        tokio::pin!(shutdown);
        render(&self.board.render(*state.borrow()));

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle(event) {
                            render(&self.board.render(*state.borrow()));
                        }
                    }
                    None => break,
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    render(&self.board.render(*state.borrow()));
                }
                _ = &mut shutdown => break,
            }
        }
        self.close().await;
    }

    /// Stops announcing. Pending announcements are discarded; the current one finishes.
    pub async fn close(self) {
        self.speech.shutdown().await;
        tracing::info!("call panel closed");
    }
}
