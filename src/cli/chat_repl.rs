use crate::cli::logs::{LogKind, SystemLog};
use crate::common::Result;
use crate::core::{ChatSession, VoiceController};
use crate::storage::SessionManager;
use std::sync::Arc;

/// Commands understood by the chat prompt besides plain messages.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Logs,
    Message(&'a str),
}

fn parse(line: &str) -> Input<'_> {
    match line.trim() {
        "/quit" | "/exit" => Input::Quit,
        "/logs" => Input::Logs,
        other => Input::Message(other),
    }
}

/// Line-based conversation. Stops on `/quit`, end of input or when the
/// session is logged out underneath us (for example after a 401).
pub async fn run(
    chat: &ChatSession,
    voice: &VoiceController,
    sessions: &Arc<SessionManager>,
    speak_replies: bool,
) -> Result<()> {
    let mut log = SystemLog::default();
    let mut user = sessions.subscribe();
    let name = user.borrow().as_ref().map(|u| u.name.clone()).unwrap_or_default();

    log.system("J.A.R.V.I.S. online");
    println!("Good to see you{}. Type /logs for the system log, /quit to leave.", greeting_suffix(&name));

    let Some(mut lines) = voice.start_listening().await? else {
        return Ok(());
    };

    loop {
        tracing::debug!("Assistant status: {:?}", chat.status(voice.is_listening()));
        let line = tokio::select! {
            line = lines.recv() => line,
            changed = user.changed() => {
                if changed.is_err() || user.borrow().is_none() {
                    log.event("Session ended");
                    println!("Session expired. Please log in again.");
                    break;
                }
                continue;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse(&line) {
            Input::Quit => break,
            Input::Logs => {
                for entry in log.entries() {
                    println!("{}", entry);
                }
            }
            Input::Message(text) => {
                log.push(LogKind::User, text);
                let Some(turn) = chat.send(text).await? else {
                    continue;
                };
                log.push(LogKind::Assistant, turn.reply.clone());
                if !turn.from_backend {
                    log.event("Chat request failed");
                }

                if speak_replies {
                    voice.stop_listening().await;
                    if let Err(e) = voice.speak(&turn.reply).await {
                        tracing::warn!("Speech failed: {}", e);
                    }
                    match voice.start_listening().await? {
                        Some(rx) => lines = rx,
                        None => break,
                    }
                } else {
                    println!("J.A.R.V.I.S.: {}", turn.reply);
                }
            }
        }
    }

    voice.stop_listening().await;
    voice.cancel_speaking();
    Ok(())
}

fn greeting_suffix(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!(", {}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(parse(" /quit "), Input::Quit);
        assert_eq!(parse("/logs"), Input::Logs);
        assert_eq!(parse("  hello there "), Input::Message("hello there"));
    }

    #[test]
    fn greeting_uses_name_when_known() {
        assert_eq!(greeting_suffix("Ada"), ", Ada");
        assert_eq!(greeting_suffix(""), "");
    }
}
