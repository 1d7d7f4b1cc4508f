use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_USDINR: f64 = 83.0;
pub const DEFAULT_USDCNY: f64 = 7.2;
pub const DEFAULT_USDAED: f64 = 3.67;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "USA")]
    Usa,
    China,
    #[serde(rename = "UAE")]
    Uae,
    India,
}

impl Region {
    /// Display order of the hub sections.
    pub const ALL: [Region; 4] = [Region::Usa, Region::China, Region::Uae, Region::India];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::China => "China",
            Region::Uae => "UAE",
            Region::India => "India",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metal {
    Gold,
    Silver,
}

impl Metal {
    pub fn as_str(self) -> &'static str {
        match self {
            Metal::Gold => "Gold",
            Metal::Silver => "Silver",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Volatility {
    Low,
    #[default]
    Medium,
    High,
}

impl Volatility {
    /// Lenient parse of the backend's free-form volatility label.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Volatility::Low),
            "medium" | "med" | "moderate" => Some(Volatility::Medium),
            "high" => Some(Volatility::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Volatility::Low => "Low",
            Volatility::Medium => "Medium",
            Volatility::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Sentiment {
    #[serde(rename = "Strong Bullish")]
    StrongBullish,
    Bullish,
    #[default]
    Neutral,
    Bearish,
    #[serde(rename = "Strong Bearish")]
    StrongBearish,
}

impl Sentiment {
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "strong bullish" => Some(Sentiment::StrongBullish),
            "bullish" => Some(Sentiment::Bullish),
            "neutral" => Some(Sentiment::Neutral),
            "bearish" => Some(Sentiment::Bearish),
            "strong bearish" => Some(Sentiment::StrongBearish),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::StrongBullish => "Strong Bullish",
            Sentiment::Bullish => "Bullish",
            Sentiment::Neutral => "Neutral",
            Sentiment::Bearish => "Bearish",
            Sentiment::StrongBearish => "Strong Bearish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalData {
    pub region: Region,
    pub metal: Metal,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub change_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volatility: Volatility,
    pub history: Vec<PricePoint>,
    pub currency: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FxRates {
    pub usdinr: f64,
    pub usdcny: f64,
    pub usdaed: f64,
}

impl Default for FxRates {
    fn default() -> Self {
        Self {
            usdinr: DEFAULT_USDINR,
            usdcny: DEFAULT_USDCNY,
            usdaed: DEFAULT_USDAED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalPrediction {
    pub metal: String,
    pub predicted_price: f64,
    pub low_bound: f64,
    pub high_bound: f64,
    pub change_percent: f64,
    pub timeframe: String,
    pub reasoning: String,
}

impl MetalPrediction {
    /// The producer is asked for `low <= predicted <= high` but does not guarantee it.
    pub fn bounds_ordered(&self) -> bool {
        self.low_bound <= self.predicted_price && self.predicted_price <= self.high_bound
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub headline: String,
    pub analysis: String,
    pub sentiment: Sentiment,
    pub drivers: Vec<String>,
    pub sources: Vec<Source>,
    pub fx: FxRates,
    pub predictions: Vec<MetalPrediction>,
}

/// One complete result of a market sync. Replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub hubs: Vec<MetalData>,
    pub summary: MarketSummary,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn hubs_in(&self, region: Region) -> impl Iterator<Item = &MetalData> {
        self.hubs.iter().filter(move |h| h.region == region)
    }
}
