use crate::llm::error::LlmDiagnosticsError;
use crate::llm::Provider;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```), on one line or several.
        let mut inner = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Parses model output that should be a single JSON object. Individual fields are
/// validated by the target type; only a non-object body is an error.
pub fn parse_object<T: DeserializeOwned>(
    provider: Provider,
    text: &str,
) -> anyhow::Result<T> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let value = match serde_json::from_str::<Value>(&json_str) {
        Ok(v @ Value::Object(_)) => v,
        Ok(other) => {
            return Err(LlmDiagnosticsError {
                provider,
                stage: "parse",
                detail: format!("expected a JSON object, got {}", json_kind(&other)),
                raw_output: Some(text.to_string()),
                raw_response_json: Some(other),
            }
            .into())
        }
        Err(err) => {
            return Err(LlmDiagnosticsError {
                provider,
                stage: "parse",
                detail: format!("model output is not valid JSON: {err}"),
                raw_output: Some(text.to_string()),
                raw_response_json: None,
            }
            .into())
        }
    };

    serde_json::from_value::<T>(value.clone()).map_err(|err| {
        LlmDiagnosticsError {
            provider,
            stage: "decode",
            detail: err.to_string(),
            raw_output: Some(text.to_string()),
            raw_response_json: Some(value),
        }
        .into()
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::{LlmMarketAnalysis, LlmMarketData};

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_handles_single_line_fences() {
        assert_eq!(extract_json("```json{\"a\":1}```"), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("``` {\"a\":1} ```"), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_object_accepts_fenced_market_data() {
        let text = "```json\n{\"fx\": {\"usdinr\": 84.0}}\n```";
        let parsed: LlmMarketData = parse_object(Provider::Gemini, text).unwrap();
        assert_eq!(parsed.fx_rates().usdinr, 84.0);
    }

    #[test]
    fn parse_object_rejects_non_object_bodies() {
        let err = parse_object::<LlmMarketAnalysis>(Provider::Gemini, "[1, 2, 3]").unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "parse");
        assert!(diag.detail.contains("array"));
    }

    #[test]
    fn parse_object_rejects_prose() {
        let err =
            parse_object::<LlmMarketAnalysis>(Provider::Gemini, "markets are closed").unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "parse");
        assert_eq!(diag.raw_output.as_deref(), Some("markets are closed"));
    }

    #[test]
    fn parse_object_tolerates_empty_object() {
        let parsed: LlmMarketAnalysis = parse_object(Provider::Gemini, "{}").unwrap();
        assert!(parsed.headline.is_none());
    }
}
