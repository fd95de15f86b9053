//! Sequential speech announcements.
//!
//! [`AnnouncementQueue`] is the pure state machine: the front item is the one being spoken,
//! everything behind it is pending. [`SpeechQueue`] drives it from a worker task so that at
//! most one utterance is ever in flight, in arrival order, and a failing utterance never
//! blocks the next one.

use crate::error::SpeechError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_LANGUAGE: &str = "pt-BR";
pub const DEFAULT_RATE: f32 = 0.9;
pub const DEFAULT_COMMAND: &str = "espeak-ng";

/// espeak's words-per-minute at rate 1.0.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utterance {
    pub sequence: u64,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Speaking,
}

#[derive(Debug, Default)]
pub struct AnnouncementQueue {
    items: VecDeque<Utterance>,
}

impl AnnouncementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> QueueState {
        if self.items.is_empty() {
            QueueState::Idle
        } else {
            QueueState::Speaking
        }
    }

    /// Appends an utterance. Returns it back when the queue was idle and it should start now.
    pub fn push(&mut self, utterance: Utterance) -> Option<Utterance> {
        let start = self.items.is_empty().then(|| utterance.clone());
        self.items.push_back(utterance);
        start
    }

    /// Marks the current utterance finished and returns the next one to start, if any.
    pub fn complete(&mut self) -> Option<Utterance> {
        self.items.pop_front();
        self.items.front().cloned()
    }

    /// Drops every pending utterance. The one being spoken stays current until completed.
    /// Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let pending = self.items.len().saturating_sub(1);
        self.items.truncate(self.items.len().min(1));
        pending
    }

    pub fn pending(&self) -> usize {
        self.items.len().saturating_sub(1)
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speaks `text` and resolves when the utterance has finished.
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Speaks through an external TTS program with espeak-compatible arguments. The text goes in
/// on stdin, so patient names never reach the argument list.
#[derive(Clone, Debug)]
pub struct CommandSynthesizer {
    program: String,
    language: String,
    rate: f32,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, language: impl Into<String>, rate: f32) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
            rate,
        }
    }

    /// espeak voices are lower-case (`pt-br`).
    fn args(&self) -> Vec<String> {
        let wpm = (BASE_WORDS_PER_MINUTE * self.rate).round().max(1.0) as u32;
        vec![
            "-v".to_string(),
            self.language.to_lowercase(),
            "-s".to_string(),
            wpm.to_string(),
            "--stdin".to_string(),
        ]
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(SpeechError::Spawn)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| SpeechError::Failed(format!("writing to {}: {e}", self.program)))?;
            // Closing stdin ends the utterance.
            drop(stdin);
        }
        let status = child
            .wait()
            .await
            .map_err(|e| SpeechError::Failed(format!("waiting for {}: {e}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::Failed(format!("{} exited with {}", self.program, status)))
        }
    }
}

/// Announces nothing; used when audio is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        tracing::debug!("speech disabled, skipping {} characters", text.chars().count());
        Ok(())
    }
}

enum Request {
    Speak(Utterance),
    Shutdown,
}

/// Handle to the speech worker task.
///
/// Dropping the handle has the same effect as [`SpeechQueue::shutdown`] without waiting.
pub struct SpeechQueue {
    commands: mpsc::UnboundedSender<Request>,
    worker: JoinHandle<()>,
}

impl SpeechQueue {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(synthesizer, receiver));
        Self { commands, worker }
    }

    /// Queues an announcement. Returns `false` if the worker has stopped.
    pub fn enqueue(&self, utterance: Utterance) -> bool {
        self.commands.send(Request::Speak(utterance)).is_ok()
    }

    /// Discards pending announcements and stops the worker. The utterance currently being
    /// spoken is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Request::Shutdown);
        if let Err(e) = self.worker.await {
            tracing::warn!("speech worker ended abnormally: {}", e);
        }
    }
}

fn start(
    synthesizer: &Arc<dyn SpeechSynthesizer>,
    utterance: Utterance,
    done: &mpsc::UnboundedSender<()>,
) {
    let synthesizer = Arc::clone(synthesizer);
    let done = done.clone();
    tokio::spawn(async move {
        tracing::debug!("speaking announcement {}", utterance.sequence);
        if let Err(e) = synthesizer.speak(&utterance.text).await {
            tracing::warn!("announcement {} failed: {}", utterance.sequence, e);
        }
        let _ = done.send(());
    });
}

async fn run_worker(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    mut commands: mpsc::UnboundedReceiver<Request>,
) {
    let mut queue = AnnouncementQueue::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Request::Speak(utterance)) => {
                    if let Some(next) = queue.push(utterance) {
                        start(&synthesizer, next, &done_tx);
                    }
                }
                Some(Request::Shutdown) | None => {
                    let dropped = queue.discard();
                    tracing::debug!("speech worker stopping, {} pending discarded", dropped);
                    break;
                }
            },
            Some(()) = done_rx.recv() => {
                if let Some(next) = queue.complete() {
                    start(&synthesizer, next, &done_tx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn utterance(sequence: u64, text: &str) -> Utterance {
        Utterance {
            sequence,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_queue_starts_only_when_idle() {
        let mut queue = AnnouncementQueue::new();
        assert_eq!(queue.state(), QueueState::Idle);
        assert_eq!(queue.push(utterance(1, "E1")), Some(utterance(1, "E1")));
        assert_eq!(queue.push(utterance(2, "E2")), None);
        assert_eq!(queue.push(utterance(3, "E3")), None);
        assert_eq!(queue.state(), QueueState::Speaking);
        assert_eq!(queue.pending(), 2);

        assert_eq!(queue.complete(), Some(utterance(2, "E2")));
        assert_eq!(queue.complete(), Some(utterance(3, "E3")));
        assert_eq!(queue.complete(), None);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[test]
    fn test_discard_keeps_current() {
        let mut queue = AnnouncementQueue::new();
        queue.push(utterance(1, "E1"));
        queue.push(utterance(2, "E2"));
        queue.push(utterance(3, "E3"));
        assert_eq!(queue.discard(), 2);
        assert_eq!(queue.state(), QueueState::Speaking);
        assert_eq!(queue.complete(), None);
        assert_eq!(AnnouncementQueue::new().discard(), 0);
    }

    #[test]
    fn test_command_synthesizer_arguments() {
        let synth = CommandSynthesizer::new("espeak-ng", "pt-BR", 2.0);
        assert_eq!(synth.args(), vec!["-v", "pt-br", "-s", "350", "--stdin"]);
    }

    #[tokio::test]
    async fn test_announcement_text_never_becomes_an_argument() {
        let synth = CommandSynthesizer::new("espeak-ng", "pt-BR", 1.0);
        let text = "-w /tmp/out.wav, compareça ao consultório 4";
        assert!(synth.args().iter().all(|arg| !arg.contains("out.wav")));
        assert_eq!(synth.args().last().map(String::as_str), Some("--stdin"));

        let missing = CommandSynthesizer::new("clinic-no-such-tts-program", "pt-BR", 1.0);
        assert!(matches!(
            missing.speak(text).await,
            Err(SpeechError::Spawn(_))
        ));
    }

    /// Records start order and the highest number of overlapping utterances.
    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<String>>,
        finished: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for Recorder {
        async fn speak(&self, text: &str) -> Result<(), SpeechError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.started.lock().expect("lock").push(text.to_string());
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            if text == "E2" {
                return Err(SpeechError::Failed("synthetic failure".into()));
            }
            Ok(())
        }
    }

    async fn wait_for(recorder: &Recorder, finished: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.finished.load(Ordering::SeqCst) < finished {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("utterances should finish");
    }

    #[tokio::test]
    async fn test_worker_speaks_in_order_one_at_a_time_despite_failure() {
        let recorder = Arc::new(Recorder::default());
        let queue = SpeechQueue::spawn(recorder.clone());

        for (i, text) in ["E1", "E2", "E3"].into_iter().enumerate() {
            assert!(queue.enqueue(utterance(i as u64 + 1, text)));
        }
        wait_for(&recorder, 3).await;

        assert_eq!(*recorder.started.lock().expect("lock"), vec!["E1", "E2", "E3"]);
        assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_discards_pending_but_finishes_current() {
        let recorder = Arc::new(Recorder::default());
        let queue = SpeechQueue::spawn(recorder.clone());

        queue.enqueue(utterance(1, "E1"));
        queue.enqueue(utterance(2, "E2"));
        queue.enqueue(utterance(3, "E3"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        queue.shutdown().await;

        wait_for(&recorder, 1).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*recorder.started.lock().expect("lock"), vec!["E1"]);
        assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
    }
}
