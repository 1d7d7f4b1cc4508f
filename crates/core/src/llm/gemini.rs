use crate::config::Settings;
use crate::domain::market::Source;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{GenerateRequest, GenerateResponse, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    /// Builds a client even without an API key; requests then fail at call time.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        if settings.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; every backend request will fail");
        }
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(settings.gemini_api_key.clone(), base_url, Duration::from_secs(timeout_secs))
    }

    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.into(),
        })
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate_content(
        &self,
        model: &str,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmDiagnosticsError::missing_credentials(Provider::Gemini))?;

        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(api_key)?);

        let res = self
            .http
            .post(self.url(model))
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        Self::decode_response(text)
    }

    /// Decodes a 2xx body. Failures keep the raw body for diagnostics.
    fn decode_response(text: String) -> anyhow::Result<GenerateContentResponse> {
        let raw_json = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(v) => v,
            Err(err) => {
                return Err(LlmDiagnosticsError {
                    provider: Provider::Gemini,
                    stage: "decode",
                    detail: format!("response body is not JSON: {err}"),
                    raw_output: Some(text),
                    raw_response_json: None,
                }
                .into())
            }
        };
        match serde_json::from_value::<GenerateContentResponse>(raw_json.clone()) {
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "decode",
                detail: format!("unexpected generateContent response shape: {err}"),
                raw_output: Some(text),
                raw_response_json: Some(raw_json),
            }
            .into()),
        }
    }

    fn build_request(req: &GenerateRequest) -> GenerateContentRequest {
        let generation_config = if req.response_schema.is_some() || req.thinking_budget.is_some()
        {
            Some(GenerationConfig {
                response_mime_type: req
                    .response_schema
                    .as_ref()
                    .map(|_| "application/json"),
                response_schema: req.response_schema.clone(),
                thinking_config: req.thinking_budget.map(|thinking_budget| ThinkingConfig {
                    thinking_budget,
                }),
            })
        } else {
            None
        };

        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: req.prompt.clone(),
                }],
            }],
            system_instruction: req.system_instruction.as_ref().map(|text| SystemInstruction {
                parts: vec![Part { text: text.clone() }],
            }),
            tools: req.search_grounding.then(|| {
                vec![Tool {
                    google_search: serde_json::json!({}),
                }]
            }),
            generation_config,
        }
    }

    fn response_text(res: &GenerateContentResponse) -> String {
        let mut out = String::new();
        let Some(candidate) = res.candidates.first() else {
            return out;
        };
        let Some(content) = &candidate.content else {
            return out;
        };
        for part in &content.parts {
            if part.thought {
                // Reasoning summaries are not part of the answer.
                continue;
            }
            if let Some(text) = &part.text {
                out.push_str(text);
            }
        }
        out
    }

    fn response_sources(res: &GenerateContentResponse) -> Vec<Source> {
        let Some(metadata) = res
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
        else {
            return Vec::new();
        };

        metadata
            .grounding_chunks
            .iter()
            .filter_map(|chunk| {
                let web = chunk.web.as_ref()?;
                let uri = web.uri.clone().filter(|u| !u.trim().is_empty())?;
                let title = web
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| uri.clone());
                Some(Source { title, uri })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let body = Self::build_request(&req);
        let res = self.generate_content(&req.model, &body).await?;

        if let Some(reason) = res.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
            if reason != "STOP" {
                tracing::warn!(model = %req.model, finish_reason = reason, "Gemini finished early");
            }
        }

        Ok(GenerateResponse {
            text: Self::response_text(&res),
            sources: Self::response_sources(&res),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}
