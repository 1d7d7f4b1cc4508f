//! Raw shapes returned by the generative backend and their normalization into the
//! dashboard model. Every field is optional here: the schema is requested, not enforced.

use crate::domain::market::{
    FxRates, MarketSummary, Metal, MetalData, MetalPrediction, PricePoint, Region, Sentiment,
    Source, Volatility, DEFAULT_USDAED, DEFAULT_USDCNY, DEFAULT_USDINR,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_HEADLINE: &str = "Global Market Update";
pub const DEFAULT_TIMEFRAME: &str = "7D";

struct HubSpec {
    region: Region,
    metal: Metal,
    name: &'static str,
    symbol: &'static str,
    currency: &'static str,
    unit: &'static str,
}

const HUBS: [HubSpec; 8] = [
    hub(Region::Usa, Metal::Gold, "USA Gold", "XAU", "$", "oz"),
    hub(Region::Usa, Metal::Silver, "USA Silver", "XAG", "$", "oz"),
    hub(Region::China, Metal::Gold, "CN Gold", "SGE", "¥", "g"),
    hub(Region::China, Metal::Silver, "CN Silver", "SGE", "¥", "g"),
    hub(Region::Uae, Metal::Gold, "UAE Gold", "DGCX", "د.إ", "g"),
    hub(Region::Uae, Metal::Silver, "UAE Silver", "DGCX", "د.إ", "g"),
    hub(Region::India, Metal::Gold, "IN Gold", "MCX", "₹", "10g"),
    hub(Region::India, Metal::Silver, "IN Silver", "MCX", "₹", "kg"),
];

const fn hub(
    region: Region,
    metal: Metal,
    name: &'static str,
    symbol: &'static str,
    currency: &'static str,
    unit: &'static str,
) -> HubSpec {
    HubSpec {
        region,
        metal,
        name,
        symbol,
        currency,
        unit,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmMarketData {
    #[serde(default, deserialize_with = "lenient")]
    pub fx: Option<LlmFx>,
    #[serde(default, deserialize_with = "lenient")]
    pub usa: Option<LlmHub>,
    #[serde(default, deserialize_with = "lenient")]
    pub china: Option<LlmHub>,
    #[serde(default, deserialize_with = "lenient")]
    pub uae: Option<LlmHub>,
    #[serde(default, deserialize_with = "lenient")]
    pub india: Option<LlmHub>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmFx {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub usdinr: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub usdcny: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub usdaed: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmHub {
    #[serde(default, deserialize_with = "lenient")]
    pub gold: Option<LlmMetal>,
    #[serde(default, deserialize_with = "lenient")]
    pub silver: Option<LlmMetal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmMetal {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", rename = "high24h")]
    pub high_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", rename = "low24h")]
    pub low_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", rename = "change24h")]
    pub change_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub volatility: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub history: Option<Vec<LlmPricePoint>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmPricePoint {
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmMarketAnalysis {
    #[serde(default, deserialize_with = "lenient")]
    pub headline: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub analysis: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sentiment: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub drivers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub predictions: Option<Vec<LlmPrediction>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPrediction {
    #[serde(default, deserialize_with = "lenient")]
    pub metal: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub predicted_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low_bound: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high_bound: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}

impl LlmMarketData {
    fn hub(&self, region: Region) -> Option<&LlmHub> {
        match region {
            Region::Usa => self.usa.as_ref(),
            Region::China => self.china.as_ref(),
            Region::Uae => self.uae.as_ref(),
            Region::India => self.india.as_ref(),
        }
    }

    /// Hub entries in display order. Entries without a usable price are dropped.
    pub fn hubs(&self) -> Vec<MetalData> {
        HUBS.iter()
            .filter_map(|spec| {
                let hub = self.hub(spec.region)?;
                let raw = match spec.metal {
                    Metal::Gold => hub.gold.as_ref(),
                    Metal::Silver => hub.silver.as_ref(),
                }?;
                raw.to_metal_data(spec)
            })
            .collect()
    }

    /// Each missing rate falls back to its own default.
    pub fn fx_rates(&self) -> FxRates {
        let fx = self.fx.clone().unwrap_or_default();
        FxRates {
            usdinr: fx.usdinr.unwrap_or(DEFAULT_USDINR),
            usdcny: fx.usdcny.unwrap_or(DEFAULT_USDCNY),
            usdaed: fx.usdaed.unwrap_or(DEFAULT_USDAED),
        }
    }
}

impl LlmMetal {
    fn to_metal_data(&self, spec: &HubSpec) -> Option<MetalData> {
        let current_price = self.current_price?;

        let history = self
            .history
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|p| {
                Some(PricePoint {
                    date: p.date.clone().unwrap_or_default(),
                    price: p.price?,
                })
            })
            .collect();

        Some(MetalData {
            region: spec.region,
            metal: spec.metal,
            symbol: spec.symbol.to_string(),
            name: spec.name.to_string(),
            current_price,
            change_24h: self.change_24h.unwrap_or(0.0),
            high_24h: self.high_24h.unwrap_or(current_price),
            low_24h: self.low_24h.unwrap_or(current_price),
            volatility: self
                .volatility
                .as_deref()
                .and_then(Volatility::parse_lenient)
                .unwrap_or_default(),
            history,
            currency: spec.currency.to_string(),
            unit: spec.unit.to_string(),
        })
    }
}

impl LlmMarketAnalysis {
    pub fn into_summary(self, fx: FxRates, sources: Vec<Source>) -> MarketSummary {
        let headline = self
            .headline
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_HEADLINE.to_string());

        let drivers = self
            .drivers
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let predictions = self
            .predictions
            .unwrap_or_default()
            .into_iter()
            .filter_map(LlmPrediction::into_prediction)
            .collect();

        MarketSummary {
            headline,
            analysis: self.analysis.unwrap_or_default(),
            sentiment: self
                .sentiment
                .as_deref()
                .and_then(Sentiment::parse_lenient)
                .unwrap_or_default(),
            drivers,
            sources,
            fx,
            predictions,
        }
    }
}

impl LlmPrediction {
    fn into_prediction(self) -> Option<MetalPrediction> {
        let metal = self
            .metal
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())?;
        let predicted_price = self.predicted_price?;

        Some(MetalPrediction {
            metal,
            predicted_price,
            low_bound: self.low_bound.unwrap_or(predicted_price),
            high_bound: self.high_bound.unwrap_or(predicted_price),
            change_percent: self.change_percent.unwrap_or(0.0),
            timeframe: self
                .timeframe
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
            reasoning: self.reasoning.unwrap_or_default(),
        })
    }
}

/// A field of the wrong shape is treated as absent instead of failing the whole document.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Accepts JSON numbers and numeric strings ("2,034.50" included). Non-finite values are absent.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()))
}
