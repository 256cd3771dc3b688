use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of trailing messages included when formatting history for prompts.
const HISTORY_WINDOW: usize = 5;
/// Assistant turns are truncated to this many characters in formatted history.
const ASSISTANT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of caller-supplied conversation history. The retrieval core does
/// not own or mutate history; it is passed through to the answering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            ChatRole::User => write!(f, "User: {}", self.content),
            ChatRole::Assistant => {
                let preview: String = self.content.chars().take(ASSISTANT_PREVIEW_CHARS).collect();
                if self.content.chars().count() > ASSISTANT_PREVIEW_CHARS {
                    write!(f, "Assistant: {preview}...")
                } else {
                    write!(f, "Assistant: {preview}")
                }
            }
        }
    }
}

pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "No previous conversation.".to_string();
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history
        .get(start..)
        .unwrap_or_default()
        .iter()
        .map(|msg| format!("{msg}"))
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_only_recent_turns() {
        let history: Vec<ChatMessage> = (0..8).map(|i| ChatMessage::user(format!("q{i}"))).collect();

        let formatted = format_history(&history);
        assert!(!formatted.contains("q2"));
        assert!(formatted.contains("q3"));
        assert!(formatted.contains("q7"));
    }

    #[test]
    fn long_assistant_turns_are_truncated() {
        let long_reply = "x".repeat(300);
        let formatted = format_history(&[ChatMessage::assistant(long_reply)]);

        assert!(formatted.ends_with("..."));
        assert!(formatted.chars().count() < 300);
    }

    #[test]
    fn empty_history_has_placeholder() {
        assert_eq!(format_history(&[]), "No previous conversation.");
    }
}
