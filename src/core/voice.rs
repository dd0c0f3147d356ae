//! Speech capability seam and the controller the chat loop talks to.

use crate::common::config::VoiceConfig;
use crate::common::{JarvisError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Begin recognition. Events arrive on the returned channel until
    /// `stop_listening` is called or the engine runs dry.
    async fn start_listening(&self) -> Result<mpsc::Receiver<TranscriptEvent>>;

    async fn stop_listening(&self);

    /// Resolves once the utterance finishes or is cancelled.
    async fn speak(&self, text: &str) -> Result<()>;

    fn cancel_speaking(&self);
}

/// Owns "start listening" and "cancel speaking" for the whole app.
pub struct VoiceController {
    engine: Box<dyn SpeechEngine>,
    listening: AtomicBool,
}

impl VoiceController {
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self { engine, listening: AtomicBool::new(false) }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Start recognition, interrupting any reply being spoken. Returns
    /// `None` when already listening. Only final, non-blank transcripts
    /// reach the receiver.
    pub async fn start_listening(&self) -> Result<Option<mpsc::Receiver<String>>> {
        self.engine.cancel_speaking();
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let mut events = match self.engine.start_listening().await {
            Ok(events) => events,
            Err(e) => {
                self.listening.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let text = event.text.trim();
                if !event.is_final || text.is_empty() {
                    continue;
                }
                if tx.send(text.to_string()).await.is_err() {
                    break;
                }
            }
        });
        tracing::debug!("Listening started");
        Ok(Some(rx))
    }

    pub async fn stop_listening(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.engine.stop_listening().await;
            tracing::debug!("Listening stopped");
        }
    }

    pub async fn speak(&self, text: &str) -> Result<()> {
        self.engine.speak(text).await
    }

    pub fn cancel_speaking(&self) {
        self.engine.cancel_speaking();
    }
}

type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Where the reader delivers lines. `tx` is swapped by start/stop; lines
/// read while it is empty wait in `pending` for the next start.
#[derive(Default)]
struct Gate {
    tx: Option<mpsc::Sender<TranscriptEvent>>,
    pending: VecDeque<String>,
    closed: bool,
}

fn lock_gate(gate: &Mutex<Gate>) -> MutexGuard<'_, Gate> {
    gate.lock().unwrap_or_else(|e| e.into_inner())
}

/// Terminal adapter: input lines are final transcripts, replies are
/// printed and optionally piped to an external TTS command.
///
/// A single reader task owns the input for the adapter's lifetime, so
/// no line is lost when listening is stopped and started again.
pub struct TerminalSpeech {
    tts_command: Option<String>,
    input: Mutex<Option<LineSource>>,
    gate: Arc<Mutex<Gate>>,
    cancel: Notify,
}

impl TerminalSpeech {
    pub fn new(config: &VoiceConfig) -> Self {
        Self::with_input(config, BufReader::new(tokio::io::stdin()))
    }

    /// Read transcripts from `input` instead of stdin.
    pub fn with_input<R>(config: &VoiceConfig, input: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            tts_command: config.tts_command.clone().filter(|c| !c.trim().is_empty()),
            input: Mutex::new(Some(Box::new(input))),
            gate: Arc::new(Mutex::new(Gate::default())),
            cancel: Notify::new(),
        }
    }

    fn spawn_tts(&self, command: &str) -> Result<Child> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| JarvisError::Config("tts_command is empty".into()))?;
        Ok(Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?)
    }
}

async fn read_lines(input: LineSource, gate: Arc<Mutex<Gate>>) {
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Reading input failed: {}", e);
                break;
            }
        };

        let tx = {
            let mut gate = lock_gate(&gate);
            match gate.tx.clone() {
                Some(tx) => tx,
                None => {
                    gate.pending.push_back(line);
                    continue;
                }
            }
        };
        if let Err(mpsc::error::SendError(event)) = tx.send(TranscriptEvent { text: line, is_final: true }).await {
            lock_gate(&gate).pending.push_back(event.text);
        }
    }

    let mut gate = lock_gate(&gate);
    gate.closed = true;
    gate.tx = None;
    tracing::debug!("Input closed");
}

#[async_trait]
impl SpeechEngine for TerminalSpeech {
    async fn start_listening(&self) -> Result<mpsc::Receiver<TranscriptEvent>> {
        let (rx, closed) = {
            let mut gate = lock_gate(&self.gate);
            let (tx, rx) = mpsc::channel(gate.pending.len().max(8));
            for text in gate.pending.drain(..) {
                // Capacity covers every pending line.
                let _ = tx.try_send(TranscriptEvent { text, is_final: true });
            }
            if !gate.closed {
                gate.tx = Some(tx);
            }
            (rx, gate.closed)
        };

        if !closed {
            let input = self.input.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(input) = input {
                tokio::spawn(read_lines(input, self.gate.clone()));
            }
        }
        Ok(rx)
    }

    async fn stop_listening(&self) {
        lock_gate(&self.gate).tx = None;
    }

    async fn speak(&self, text: &str) -> Result<()> {
        println!("J.A.R.V.I.S.: {}", text);
        let Some(command) = &self.tts_command else {
            return Ok(());
        };

        let mut child = self.spawn_tts(command)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    tracing::warn!("TTS command exited with {}", status);
                }
            }
            _ = self.cancel.notified() => {
                tracing::debug!("Speech cancelled");
                child.kill().await?;
            }
        }
        Ok(())
    }

    fn cancel_speaking(&self) {
        self.cancel.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        starts: AtomicUsize,
        stops: AtomicUsize,
        cancels: AtomicUsize,
        spoken: Mutex<Vec<String>>,
    }

    struct FakeEngine {
        events: Mutex<Vec<TranscriptEvent>>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl SpeechEngine for FakeEngine {
        async fn start_listening(&self) -> Result<mpsc::Receiver<TranscriptEvent>> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            let events: Vec<_> = self.events.lock().unwrap().drain(..).collect();
            let (tx, rx) = mpsc::channel(events.len().max(1));
            for event in events {
                tx.send(event).await.unwrap();
            }
            Ok(rx)
        }

        async fn stop_listening(&self) {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn speak(&self, text: &str) -> Result<()> {
            self.counters.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn cancel_speaking(&self) {
            self.counters.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(text: &str, is_final: bool) -> TranscriptEvent {
        TranscriptEvent { text: text.into(), is_final }
    }

    fn controller(events: Vec<TranscriptEvent>) -> (VoiceController, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let engine = FakeEngine { events: Mutex::new(events), counters: counters.clone() };
        (VoiceController::new(Box::new(engine)), counters)
    }

    #[tokio::test]
    async fn forwards_only_final_nonblank_transcripts() {
        let (voice, _) = controller(vec![
            event("what is", false),
            event("what is the time", true),
            event("   ", true),
            event(" open the pod bay doors ", true),
        ]);
        let mut rx = voice.start_listening().await.unwrap().unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("what is the time"));
        assert_eq!(rx.recv().await.as_deref(), Some("open the pod bay doors"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn start_cancels_speech_and_is_idempotent() {
        let (voice, counters) = controller(vec![]);
        assert!(voice.start_listening().await.unwrap().is_some());
        assert!(voice.start_listening().await.unwrap().is_none());

        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 2);
        assert!(voice.is_listening());

        voice.stop_listening().await;
        voice.stop_listening().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert!(!voice.is_listening());
    }

    #[tokio::test]
    async fn speak_delegates_to_engine() {
        let (voice, counters) = controller(vec![]);
        voice.speak("Good evening.").await.unwrap();
        assert_eq!(*counters.spoken.lock().unwrap(), vec!["Good evening.".to_string()]);
    }

    #[tokio::test]
    async fn terminal_speech_without_command_only_prints() {
        let speech = TerminalSpeech::new(&VoiceConfig { speak_replies: true, tts_command: Some("  ".into()) });
        assert!(speech.tts_command.is_none());
        speech.speak("Hello").await.unwrap();
    }

    #[tokio::test]
    async fn rearming_keeps_every_typed_line() {
        let (mut keyboard, input) = tokio::io::duplex(256);
        let speech = TerminalSpeech::with_input(&VoiceConfig::default(), BufReader::new(input));
        let voice = VoiceController::new(Box::new(speech));

        let mut rx = voice.start_listening().await.unwrap().unwrap();
        keyboard.write_all(b"first\n").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("first"));

        voice.stop_listening().await;
        assert_eq!(rx.recv().await, None);
        keyboard.write_all(b"second\n").await.unwrap();

        let mut rx = voice.start_listening().await.unwrap().unwrap();
        keyboard.write_all(b"third\n").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
        assert_eq!(rx.recv().await.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn end_of_input_closes_current_and_later_listeners() {
        let (mut keyboard, input) = tokio::io::duplex(64);
        let speech = TerminalSpeech::with_input(&VoiceConfig::default(), BufReader::new(input));

        let mut events = speech.start_listening().await.unwrap();
        keyboard.write_all(b"bye\n").await.unwrap();
        drop(keyboard);
        assert_eq!(events.recv().await.map(|e| e.text).as_deref(), Some("bye"));
        assert_eq!(events.recv().await, None);

        speech.stop_listening().await;
        let mut events = speech.start_listening().await.unwrap();
        assert_eq!(events.recv().await, None);
    }
}
