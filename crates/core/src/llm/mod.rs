pub mod error;
pub mod gemini;
pub mod json;

use crate::domain::market::Source;
use serde_json::Value;

const DEFAULT_FAST_MODEL: &str = "gemini-2.5-flash-lite";
const DEFAULT_SEARCH_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_THINKING_MODEL: &str = "gemini-3-pro-preview";

/// Model tiers: `fast` for structured metrics and quick chat, `search` for grounded
/// analysis, `thinking` for extended-reasoning chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Models {
    pub fast: String,
    pub search: String,
    pub thinking: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_MODEL.to_string(),
            search: DEFAULT_SEARCH_MODEL.to_string(),
            thinking: DEFAULT_THINKING_MODEL.to_string(),
        }
    }
}

impl Models {
    pub fn from_env() -> Self {
        let read = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            fast: read("GEMINI_FAST_MODEL", DEFAULT_FAST_MODEL),
            search: read("GEMINI_SEARCH_MODEL", DEFAULT_SEARCH_MODEL),
            thinking: read("GEMINI_THINKING_MODEL", DEFAULT_THINKING_MODEL),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
}

/// A single-turn generation request. Optional knobs map to backend features:
/// a response schema forces JSON output, `search_grounding` enables web search with
/// citations, `thinking_budget` enables extended reasoning.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub response_schema: Option<Value>,
    pub search_grounding: bool,
    pub thinking_budget: Option<u32>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_instruction: None,
            response_schema: None,
            search_grounding: false,
            thinking_budget: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_search_grounding(mut self) -> Self {
        self.search_grounding = true;
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub text: String,
    pub sources: Vec<Source>,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse>;
}
