use crate::domain::contract::{LlmMarketAnalysis, LlmMarketData};
use crate::domain::market::MarketSnapshot;
use crate::llm::{json, GenerateRequest, LlmClient, Models};
use anyhow::Context;
use std::sync::Arc;

/// Produces a complete market snapshot. The dashboard only depends on this seam.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_snapshot(&self) -> anyhow::Result<MarketSnapshot>;
}

pub struct MarketDataClient {
    llm: Arc<dyn LlmClient>,
    models: Models,
}

impl MarketDataClient {
    pub fn new(llm: Arc<dyn LlmClient>, models: Models) -> Self {
        Self { llm, models }
    }

    fn metrics_request(&self) -> GenerateRequest {
        GenerateRequest::new(&self.models.fast, metrics_prompt())
            .with_response_schema(metrics_schema())
    }

    fn analysis_request(&self) -> GenerateRequest {
        GenerateRequest::new(&self.models.search, analysis_prompt())
            .with_response_schema(analysis_schema())
            .with_search_grounding()
    }
}

#[async_trait::async_trait]
impl MarketDataSource for MarketDataClient {
    async fn fetch_snapshot(&self) -> anyhow::Result<MarketSnapshot> {
        let provider = self.llm.provider();

        let metrics = self
            .llm
            .generate(self.metrics_request())
            .await
            .context("hub metrics request failed")?;
        let raw_data: LlmMarketData = json::parse_object(provider, &metrics.text)
            .context("hub metrics response could not be parsed")?;
        let hubs = raw_data.hubs();
        tracing::debug!(hubs = hubs.len(), "normalized hub metrics");

        let analysis = self
            .llm
            .generate(self.analysis_request())
            .await
            .context("market analysis request failed")?;
        let raw_analysis: LlmMarketAnalysis = json::parse_object(provider, &analysis.text)
            .context("market analysis response could not be parsed")?;
        let summary = raw_analysis.into_summary(raw_data.fx_rates(), analysis.sources);

        Ok(MarketSnapshot {
            hubs,
            summary,
            fetched_at: chrono::Utc::now(),
        })
    }
}

fn metrics_prompt() -> String {
    [
        "Act as a financial data provider. Provide current prices, 24h high/low, % change, volatility, and 5-day historical closing prices for:",
        "1. USA Hub: Gold Spot (USD/oz), Silver Spot (USD/oz)",
        "2. China Hub: Shanghai Gold (CNY/g), Shanghai Silver (CNY/g)",
        "3. UAE Hub: Dubai Gold (AED/g), Dubai Silver (AED/g)",
        "4. India Hub: MCX Gold (INR/10g), MCX Silver (INR/kg)",
        "Also provide current FX rates: USD/INR, USD/CNY, USD/AED.",
    ]
    .join("\n")
}

fn analysis_prompt() -> String {
    [
        "Analyze global bullion markets and provide 7-day price forecasts for Gold and Silver.",
        "Include confidence intervals (low/high bounds) and the logical reasoning based on trends.",
        "Also discuss price spreads between hubs.",
    ]
    .join(" ")
}

fn metal_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "currentPrice": {"type": "NUMBER"},
            "high24h": {"type": "NUMBER"},
            "low24h": {"type": "NUMBER"},
            "change24h": {"type": "NUMBER"},
            "volatility": {"type": "STRING", "enum": ["Low", "Medium", "High"]},
            "history": {
                "type": "ARRAY",
                "minItems": 5,
                "maxItems": 5,
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "date": {"type": "STRING"},
                        "price": {"type": "NUMBER"}
                    },
                    "required": ["date", "price"]
                }
            }
        },
        "required": ["currentPrice", "high24h", "low24h", "change24h", "volatility", "history"]
    })
}

fn metrics_schema() -> serde_json::Value {
    let hub = serde_json::json!({
        "type": "OBJECT",
        "properties": {"gold": metal_schema(), "silver": metal_schema()},
        "required": ["gold", "silver"]
    });

    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "fx": {
                "type": "OBJECT",
                "properties": {
                    "usdinr": {"type": "NUMBER"},
                    "usdcny": {"type": "NUMBER"},
                    "usdaed": {"type": "NUMBER"}
                },
                "required": ["usdinr", "usdcny", "usdaed"]
            },
            "usa": hub.clone(),
            "china": hub.clone(),
            "uae": hub.clone(),
            "india": hub
        },
        "required": ["fx", "usa", "china", "uae", "india"]
    })
}

fn analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "headline": {"type": "STRING"},
            "analysis": {"type": "STRING"},
            "sentiment": {
                "type": "STRING",
                "enum": ["Strong Bullish", "Bullish", "Neutral", "Bearish", "Strong Bearish"]
            },
            "drivers": {"type": "ARRAY", "items": {"type": "STRING"}},
            "predictions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "metal": {"type": "STRING"},
                        "predictedPrice": {"type": "NUMBER"},
                        "lowBound": {"type": "NUMBER"},
                        "highBound": {"type": "NUMBER"},
                        "changePercent": {"type": "NUMBER"},
                        "timeframe": {"type": "STRING"},
                        "reasoning": {"type": "STRING"}
                    },
                    "required": [
                        "metal",
                        "predictedPrice",
                        "lowBound",
                        "highBound",
                        "changePercent",
                        "timeframe",
                        "reasoning"
                    ]
                }
            }
        },
        "required": ["headline", "analysis", "sentiment", "drivers", "predictions"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Sentiment, Source};
    use crate::llm::{GenerateResponse, Provider};
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies to the fast model with `metrics` and to any other model with `analysis`.
    struct ScriptedLlm {
        metrics: anyhow::Result<String>,
        analysis: String,
        sources: Vec<Source>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedLlm {
        fn new(metrics: anyhow::Result<String>, analysis: &str) -> Self {
            Self {
                metrics,
                analysis: analysis.to_string(),
                sources: vec![Source {
                    title: "Kitco".to_string(),
                    uri: "https://example.com/kitco".to_string(),
                }],
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
            let is_metrics = req.model == Models::default().fast;
            self.seen.lock().unwrap().push(req);
            if is_metrics {
                match &self.metrics {
                    Ok(text) => Ok(GenerateResponse {
                        text: text.clone(),
                        sources: Vec::new(),
                    }),
                    Err(err) => Err(anyhow::anyhow!("{err}")),
                }
            } else {
                Ok(GenerateResponse {
                    text: self.analysis.clone(),
                    sources: self.sources.clone(),
                })
            }
        }
    }

    fn metrics_body() -> String {
        let metal = |p: f64| {
            json!({
                "currentPrice": p,
                "high24h": p,
                "low24h": p,
                "change24h": 0.1,
                "volatility": "High",
                "history": []
            })
        };
        json!({
            "fx": {"usdinr": 83.9, "usdcny": 7.1},
            "usa": {"gold": metal(2300.0), "silver": metal(27.0)},
            "china": {"gold": metal(540.0), "silver": {"high24h": 7.0}},
        })
        .to_string()
    }

    #[tokio::test]
    async fn combines_both_responses_into_snapshot() {
        let analysis = json!({
            "headline": "Spreads widen",
            "analysis": "Para one.\n\nPara two.",
            "sentiment": "Bearish",
            "drivers": ["Dollar strength"],
            "predictions": []
        })
        .to_string();
        let llm = Arc::new(ScriptedLlm::new(Ok(metrics_body()), &analysis));
        let client = MarketDataClient::new(llm.clone(), Models::default());

        let snapshot = client.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.hubs.len(), 3);
        assert_eq!(snapshot.summary.headline, "Spreads widen");
        assert_eq!(snapshot.summary.sentiment, Sentiment::Bearish);
        assert_eq!(snapshot.summary.fx.usdaed, 3.67);
        assert_eq!(snapshot.summary.sources.len(), 1);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].search_grounding);
        assert!(seen[0].response_schema.is_some());
        assert!(seen[1].search_grounding);
    }

    #[tokio::test]
    async fn metrics_failure_fails_the_sync() {
        let llm = Arc::new(ScriptedLlm::new(Err(anyhow::anyhow!("503")), "{}"));
        let client = MarketDataClient::new(llm.clone(), Models::default());
        assert!(client.fetch_snapshot().await.is_err());
        // The analysis call is never made once metrics fail.
        assert_eq!(llm.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_metrics_fail_the_sync() {
        let llm = Arc::new(ScriptedLlm::new(Ok("no data today".to_string()), "{}"));
        let client = MarketDataClient::new(llm, Models::default());
        assert!(client.fetch_snapshot().await.is_err());
    }

    #[test]
    fn metrics_schema_requires_every_hub() {
        let schema = metrics_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 5);
        let gold = &schema["properties"]["india"]["properties"]["gold"];
        assert_eq!(gold["properties"]["history"]["maxItems"], 5);
    }
}
