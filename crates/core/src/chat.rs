use crate::domain::chat::ChatMode;
use crate::domain::market::{MarketSnapshot, Source};
use crate::llm::{GenerateRequest, LlmClient, Models};
use anyhow::Context;
use std::fmt::Write as _;
use std::sync::Arc;

pub const THINKING_BUDGET: u32 = 32768;
pub const EMPTY_REPLY_TEXT: &str = "I'm sorry, I couldn't process that request.";
pub const CONNECTION_ERROR_TEXT: &str = "Error connecting to the analyst. Please try again.";
pub const NO_MARKET_CONTEXT: &str = "Market data not yet available.";

const SYSTEM_INSTRUCTION: &str = "You are a senior bullion market analyst. Provide concise, expert-level insights. If using thinking mode, be extremely thorough. If using grounded mode, cite current market news.";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub sources: Option<Vec<Source>>,
}

#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn ask(
        &self,
        query: &str,
        mode: ChatMode,
        market_context: &str,
    ) -> anyhow::Result<ChatReply>;
}

pub struct ChatClient {
    llm: Arc<dyn LlmClient>,
    models: Models,
}

impl ChatClient {
    pub fn new(llm: Arc<dyn LlmClient>, models: Models) -> Self {
        Self { llm, models }
    }

    fn request(&self, query: &str, mode: ChatMode, market_context: &str) -> GenerateRequest {
        let prompt = format!(
            "Context: You are the Lumina Bullion Analyst. Here is the current market state: {market_context}\n\nUser Question: {query}"
        );
        let req = match mode {
            ChatMode::Fast => GenerateRequest::new(&self.models.fast, prompt),
            ChatMode::Grounded => {
                GenerateRequest::new(&self.models.search, prompt).with_search_grounding()
            }
            ChatMode::Thinking => GenerateRequest::new(&self.models.thinking, prompt)
                .with_thinking_budget(THINKING_BUDGET),
        };
        req.with_system_instruction(SYSTEM_INSTRUCTION)
    }
}

#[async_trait::async_trait]
impl ChatBackend for ChatClient {
    async fn ask(
        &self,
        query: &str,
        mode: ChatMode,
        market_context: &str,
    ) -> anyhow::Result<ChatReply> {
        let res = self
            .llm
            .generate(self.request(query, mode, market_context))
            .await
            .with_context(|| format!("analyst chat request failed (mode={mode})"))?;

        let text = if res.text.trim().is_empty() {
            EMPTY_REPLY_TEXT.to_string()
        } else {
            res.text
        };
        let sources = (!res.sources.is_empty()).then_some(res.sources);
        Ok(ChatReply { text, sources })
    }
}

/// Compact description of the latest snapshot handed to the analyst as context.
pub fn market_context(snapshot: Option<&MarketSnapshot>) -> String {
    let Some(snapshot) = snapshot else {
        return NO_MARKET_CONTEXT.to_string();
    };

    let mut out = String::new();
    let _ = write!(
        out,
        "Sentiment {}; headline \"{}\". ",
        snapshot.summary.sentiment.as_str(),
        snapshot.summary.headline
    );
    let fx = &snapshot.summary.fx;
    let _ = write!(
        out,
        "FX USD/INR {:.2}, USD/CNY {:.2}, USD/AED {:.2}. ",
        fx.usdinr, fx.usdcny, fx.usdaed
    );
    let hubs: Vec<String> = snapshot
        .hubs
        .iter()
        .map(|h| {
            format!(
                "{} {}{:.2}/{} ({:+.2}% 24h, {} vol)",
                h.name,
                h.currency,
                h.current_price,
                h.unit,
                h.change_24h,
                h.volatility.as_str()
            )
        })
        .collect();
    if !hubs.is_empty() {
        let _ = write!(out, "Hubs: {}.", hubs.join("; "));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{
        FxRates, MarketSummary, Metal, MetalData, Region, Sentiment, Volatility,
    };
    use crate::llm::{GenerateResponse, Provider};
    use std::sync::Mutex;

    struct EchoLlm {
        reply: GenerateResponse,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for EchoLlm {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.seen.lock().unwrap().push(req);
            Ok(self.reply.clone())
        }
    }

    fn echo(text: &str, sources: Vec<Source>) -> Arc<EchoLlm> {
        Arc::new(EchoLlm {
            reply: GenerateResponse {
                text: text.to_string(),
                sources,
            },
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn mode_selects_model_and_features() {
        let llm = echo("ok", Vec::new());
        let client = ChatClient::new(llm.clone(), Models::default());
        for mode in [ChatMode::Fast, ChatMode::Grounded, ChatMode::Thinking] {
            client.ask("q", mode, "ctx").await.unwrap();
        }

        let seen = llm.seen.lock().unwrap();
        let models = Models::default();
        assert_eq!(seen[0].model, models.fast);
        assert!(!seen[0].search_grounding && seen[0].thinking_budget.is_none());
        assert_eq!(seen[1].model, models.search);
        assert!(seen[1].search_grounding);
        assert_eq!(seen[2].model, models.thinking);
        assert_eq!(seen[2].thinking_budget, Some(THINKING_BUDGET));
        assert!(seen.iter().all(|r| r.system_instruction.is_some()));
        assert!(seen[0].prompt.contains("ctx") && seen[0].prompt.ends_with("User Question: q"));
    }

    #[tokio::test]
    async fn empty_text_becomes_apology_and_sources_are_optional() {
        let client = ChatClient::new(echo("  ", Vec::new()), Models::default());
        let reply = client.ask("q", ChatMode::Fast, "ctx").await.unwrap();
        assert_eq!(reply.text, EMPTY_REPLY_TEXT);
        assert!(reply.sources.is_none());

        let cited = vec![Source {
            title: "FT".to_string(),
            uri: "https://example.com/ft".to_string(),
        }];
        let client = ChatClient::new(echo("Gold rallies", cited.clone()), Models::default());
        let reply = client.ask("q", ChatMode::Grounded, "ctx").await.unwrap();
        assert_eq!(reply.sources, Some(cited));
    }

    #[test]
    fn context_without_snapshot() {
        assert_eq!(market_context(None), NO_MARKET_CONTEXT);
    }

    #[test]
    fn context_lists_hub_prices() {
        let snapshot = MarketSnapshot {
            hubs: vec![MetalData {
                region: Region::Usa,
                metal: Metal::Gold,
                symbol: "XAU".to_string(),
                name: "USA Gold".to_string(),
                current_price: 2350.0,
                change_24h: -0.5,
                high_24h: 2360.0,
                low_24h: 2340.0,
                volatility: Volatility::Low,
                history: Vec::new(),
                currency: "$".to_string(),
                unit: "oz".to_string(),
            }],
            summary: MarketSummary {
                headline: "Calm".to_string(),
                analysis: String::new(),
                sentiment: Sentiment::Neutral,
                drivers: Vec::new(),
                sources: Vec::new(),
                fx: FxRates::default(),
                predictions: Vec::new(),
            },
            fetched_at: chrono::Utc::now(),
        };
        let ctx = market_context(Some(&snapshot));
        assert!(ctx.contains("USA Gold $2350.00/oz (-0.50% 24h, Low vol)"));
        assert!(ctx.contains("USD/AED 3.67"));
        assert!(ctx.starts_with("Sentiment Neutral"));
    }
}
