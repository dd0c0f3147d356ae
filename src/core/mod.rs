pub mod auth;
pub mod chat;
pub mod poller;
pub mod voice;

pub use auth::{AuthFlowController, AuthSnapshot, Phase, Step, Tab};
pub use chat::{AssistantStatus, ChatBackend, ChatSession, Conversation, MockChat, RemoteChat};
pub use poller::{FaceRect, PollSchedule};
pub use voice::{SpeechEngine, TerminalSpeech, TranscriptEvent, VoiceController};
