use crate::common::config::ChatConfig;
use crate::common::{ChatMode, JarvisError, Result};
use crate::service::protocol::{Message, Role};
use crate::service::ApiClient;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const CHAT_ERROR_REPLY: &str = "I encountered an error. Please check your API key or try again.";

pub const MOCK_RESPONSES: [&str; 8] = [
    "At your service. How may I assist you today?",
    "Processing your request. I'm always here to help.",
    "An excellent question. Allow me to elaborate...",
    "Sir, I've analyzed the situation. Here are my findings.",
    "Indeed. Would you like me to elaborate on that?",
    "I'm afraid I'll need more context. Could you clarify?",
    "Absolutely. Consider it done.",
    "My circuits are at your disposal. What else can I help with?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantStatus {
    Idle,
    Listening,
    Thinking,
}

/// Ordered chat log.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

/// Produces the assistant's next reply for a conversation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

pub struct RemoteChat {
    client: Arc<ApiClient>,
}

impl RemoteChat {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatBackend for RemoteChat {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.client.chat(messages).await
    }
}

/// Offline stand-in that answers with a canned line after a short pause.
pub struct MockChat {
    delay_min: Duration,
    delay_max: Duration,
}

impl MockChat {
    pub fn new(config: &ChatConfig) -> Self {
        let min = config.mock_delay_min_ms.min(config.mock_delay_max_ms);
        let max = config.mock_delay_min_ms.max(config.mock_delay_max_ms);
        Self {
            delay_min: Duration::from_millis(min),
            delay_max: Duration::from_millis(max),
        }
    }

    fn pick(&self) -> (Duration, &'static str) {
        let mut rng = rand::thread_rng();
        let delay = if self.delay_max > self.delay_min {
            rng.gen_range(self.delay_min..=self.delay_max)
        } else {
            self.delay_min
        };
        let reply = MOCK_RESPONSES.choose(&mut rng).copied().unwrap_or(MOCK_RESPONSES[0]);
        (delay, reply)
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        let (delay, reply) = self.pick();
        tokio::time::sleep(delay).await;
        Ok(reply.to_string())
    }
}

/// Backend for the configured chat mode.
pub fn backend_for(config: &ChatConfig, client: Arc<ApiClient>) -> Arc<dyn ChatBackend> {
    match config.mode {
        ChatMode::Backend => Arc::new(RemoteChat::new(client)),
        ChatMode::Mock => {
            tracing::info!("Chat running in mock mode");
            Arc::new(MockChat::new(config))
        }
    }
}

/// Result of one accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub reply: String,
    /// False when the backend failed and the apology was used instead.
    pub from_backend: bool,
}

/// One conversation plus its send affordance.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    conversation: Mutex<Conversation>,
    thinking: AtomicBool,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            conversation: Mutex::new(Conversation::new()),
            thinking: AtomicBool::new(false),
        }
    }

    fn log(&self) -> MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn conversation(&self) -> Conversation {
        self.log().clone()
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::SeqCst)
    }

    /// Orb state. Thinking wins over listening.
    pub fn status(&self, listening: bool) -> AssistantStatus {
        if self.is_thinking() {
            AssistantStatus::Thinking
        } else if listening {
            AssistantStatus::Listening
        } else {
            AssistantStatus::Idle
        }
    }

    /// Append `text` and the assistant's answer to the log.
    ///
    /// Returns `Ok(None)` for blank input. Fails without touching the log
    /// while another send is outstanding.
    pub async fn send(&self, text: &str) -> Result<Option<ChatTurn>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if self
            .thinking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(JarvisError::Other(anyhow::anyhow!("A reply is already in progress")));
        }

        let history = {
            let mut log = self.log();
            log.push(Message::user(text));
            log.messages().to_vec()
        };

        let turn = match self.backend.complete(&history).await {
            Ok(reply) => ChatTurn { reply, from_backend: true },
            Err(e) => {
                tracing::error!("Chat request failed: {}", e);
                ChatTurn { reply: CHAT_ERROR_REPLY.to_string(), from_backend: false }
            }
        };

        self.log().push(Message::assistant(turn.reply.clone()));
        self.thinking.store(false, Ordering::SeqCst);
        Ok(Some(turn))
    }
}
