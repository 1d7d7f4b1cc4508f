use crate::domain::market::Source;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Fast,
    Grounded,
    Thinking,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::Fast => "fast",
            ChatMode::Grounded => "grounded",
            ChatMode::Thinking => "thinking",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ChatMode::Fast),
            "grounded" => Ok(ChatMode::Grounded),
            "thinking" => Ok(ChatMode::Thinking),
            other => {
                anyhow::bail!("unknown chat mode: {other} (expected fast, grounded or thinking)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A transcript entry. The reply to a user message carries the same `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub request_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub is_thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl ChatMessage {
    pub fn user(request_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            request_id,
            role: ChatRole::User,
            content: content.into(),
            is_thinking: false,
            sources: None,
        }
    }

    pub fn assistant(
        request_id: Uuid,
        content: impl Into<String>,
        mode: ChatMode,
        sources: Option<Vec<Source>>,
    ) -> Self {
        Self {
            request_id,
            role: ChatRole::Assistant,
            content: content.into(),
            is_thinking: mode == ChatMode::Thinking,
            sources,
        }
    }
}
