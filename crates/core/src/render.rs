//! Presentation layer: a pure function from dashboard state to a view model, plus a
//! plain-text rendering of that view for terminals.

use crate::dashboard::state::DashboardState;
use crate::domain::chat::{ChatMessage, ChatMode, ChatRole};
use crate::domain::market::{Metal, MarketSnapshot, MetalData, MetalPrediction, Region, Source};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::fmt::Write as _;

const HUB_TAGS: [&str; 4] = ["NY", "SH", "DXB", "BOM"];
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    /// Full-screen loader: a sync is running and nothing has arrived yet.
    pub loading_screen: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub utc_clock: String,
    pub sync_in: String,
    pub fx: Vec<FxQuote>,
    pub sections: Vec<HubSection>,
    pub forecasts: Vec<ForecastView>,
    pub analysis: Option<AnalysisView>,
    pub chat: ChatView,
}

#[derive(Debug, Clone, Serialize)]
pub struct FxQuote {
    pub pair: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubSection {
    pub region: Region,
    pub title: String,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    /// Position in display order; the handle used to toggle the card.
    pub index: usize,
    pub region: Region,
    pub symbol: String,
    pub name: String,
    pub metal: Metal,
    pub currency: String,
    pub price: String,
    pub unit_label: String,
    pub change: String,
    pub positive: bool,
    pub volatility: String,
    /// Where the price sits in the 24h range, 0-100.
    pub range_progress: f64,
    pub low: String,
    pub high: String,
    pub expanded: bool,
    pub chart: Option<ChartView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub title: String,
    pub points: Vec<ChartPoint>,
    pub sparkline: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub label: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastView {
    pub metal: String,
    pub timeframe_label: String,
    pub change: String,
    pub positive: bool,
    pub predicted: String,
    pub low: String,
    pub high: String,
    pub band_left_pct: f64,
    pub band_right_pct: f64,
    pub bounds_ordered: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisView {
    pub sentiment: String,
    pub headline: String,
    pub paragraphs: Vec<String>,
    pub drivers: Vec<String>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub mode: ChatMode,
    pub loading: bool,
    pub messages: Vec<ChatMessage>,
}

/// Hub cards in the order they are displayed: USA, China, UAE, India.
pub fn cards_in_display_order(snapshot: &MarketSnapshot) -> impl Iterator<Item = &MetalData> {
    Region::ALL
        .into_iter()
        .flat_map(move |region| snapshot.hubs_in(region))
}

impl DashboardView {
    pub fn build(state: &DashboardState, now: DateTime<Utc>) -> Self {
        let snapshot = state.snapshot.as_ref();

        let fx = snapshot
            .map(|s| {
                let fx = &s.summary.fx;
                vec![
                    FxQuote {
                        pair: "USD/INR",
                        value: format!("₹{:.2}", fx.usdinr),
                    },
                    FxQuote {
                        pair: "USD/CNY",
                        value: format!("¥{:.2}", fx.usdcny),
                    },
                    FxQuote {
                        pair: "USD/AED",
                        value: format!("د.إ{:.2}", fx.usdaed),
                    },
                ]
            })
            .unwrap_or_default();

        let sections = snapshot
            .map(|s| build_sections(s, state))
            .unwrap_or_default();

        let forecasts = snapshot
            .map(|s| s.summary.predictions.iter().map(forecast_view).collect())
            .unwrap_or_default();

        let analysis = snapshot.map(|s| AnalysisView {
            sentiment: s.summary.sentiment.as_str().to_string(),
            headline: s.summary.headline.clone(),
            paragraphs: s
                .summary
                .analysis
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            drivers: s.summary.drivers.clone(),
            sources: s.summary.sources.clone(),
        });

        Self {
            loading_screen: state.is_loading() && snapshot.is_none(),
            loading: state.is_loading(),
            error: state.error.clone(),
            utc_clock: now.format("%H:%M").to_string(),
            sync_in: format_countdown(state.countdown.remaining()),
            fx,
            sections,
            forecasts,
            analysis,
            chat: ChatView {
                mode: state.chat_mode,
                loading: state.is_chat_loading(),
                messages: state.transcript.clone(),
            },
        }
    }
}

fn build_sections(snapshot: &MarketSnapshot, state: &DashboardState) -> Vec<HubSection> {
    let mut index = 0;
    Region::ALL
        .into_iter()
        .map(|region| {
            let cards = snapshot
                .hubs_in(region)
                .map(|hub| {
                    let card = card_view(index, hub, state.is_expanded(&hub.name));
                    index += 1;
                    card
                })
                .collect();
            HubSection {
                region,
                title: format!("{region} Market"),
                cards,
            }
        })
        .collect()
}

fn card_view(index: usize, hub: &MetalData, expanded: bool) -> CardView {
    let positive = hub.change_24h >= 0.0;
    let price_digits = if hub.current_price > 1000.0 { 0 } else { 2 };
    let range = hub.high_24h - hub.low_24h;
    let range = if range == 0.0 { 1.0 } else { range };
    let range_progress = ((hub.current_price - hub.low_24h) / range * 100.0).clamp(0.0, 100.0);

    CardView {
        index,
        region: hub.region,
        symbol: hub.symbol.clone(),
        name: hub.name.clone(),
        metal: hub.metal,
        currency: hub.currency.clone(),
        price: format_number(hub.current_price, price_digits),
        unit_label: format!("PER {}", hub.unit.to_uppercase()),
        change: format!("{}{:.2}%", arrow(positive), hub.change_24h.abs()),
        positive,
        volatility: format!("{} VOL", hub.volatility.as_str()),
        range_progress,
        low: format!("{}{}", hub.currency, format_number(hub.low_24h, 3)),
        high: format!("{}{}", hub.currency, format_number(hub.high_24h, 3)),
        expanded,
        chart: expanded.then(|| chart_view(hub)),
    }
}

fn chart_view(hub: &MetalData) -> ChartView {
    ChartView {
        title: format!("{} History", hub.name),
        points: hub
            .history
            .iter()
            .map(|p| ChartPoint {
                date: p.date.clone(),
                label: weekday_label(&p.date),
                price: p.price,
            })
            .collect(),
        sparkline: sparkline(&hub.history.iter().map(|p| p.price).collect::<Vec<_>>()),
    }
}

fn forecast_view(pred: &MetalPrediction) -> ForecastView {
    let positive = pred.change_percent >= 0.0;
    let (band_left_pct, band_right_pct) = confidence_band(pred);
    ForecastView {
        metal: pred.metal.clone(),
        timeframe_label: format!("{} Forecast", pred.timeframe),
        change: format!("{} {}%", arrow(positive), format_number(pred.change_percent.abs(), 3)),
        positive,
        predicted: format!("${}", format_number(pred.predicted_price, 3)),
        low: format!("${}", format_number(pred.low_bound, 3)),
        high: format!("${}", format_number(pred.high_bound, 3)),
        band_left_pct,
        band_right_pct,
        bounds_ordered: pred.bounds_ordered(),
        reasoning: pred.reasoning.clone(),
    }
}

/// The band track spans 90%..110% of the predicted price. Returns the left and right
/// insets of the low..high band, in percent of the track.
fn confidence_band(pred: &MetalPrediction) -> (f64, f64) {
    let p = pred.predicted_price;
    if p <= 0.0 {
        return (0.0, 0.0);
    }
    let origin = p * 0.9;
    let span = p * 0.2;
    let left = ((pred.low_bound - origin) / span * 100.0).clamp(0.0, 100.0);
    let right = (100.0 - (pred.high_bound - origin) / span * 100.0).clamp(0.0, 100.0);
    (left, right)
}

fn arrow(positive: bool) -> &'static str {
    if positive {
        "▲"
    } else {
        "▼"
    }
}

pub fn format_countdown(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Thousands-grouped number with at most `max_fraction_digits` decimals, trailing zeros
/// dropped.
pub fn format_number(value: f64, max_fraction_digits: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let fixed = format!("{:.*}", max_fraction_digits, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (fixed.as_str(), ""),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let nonzero = !int_part.trim_start_matches('0').is_empty() || !frac_part.is_empty();
    let negative = value < 0.0 && nonzero;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn weekday_label(date: &str) -> String {
    NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d")
        .map(|d| d.weekday().to_string())
        .unwrap_or_else(|_| date.to_string())
}

pub fn sparkline(prices: &[f64]) -> String {
    let Some(min) = prices.iter().copied().reduce(f64::min) else {
        return String::new();
    };
    let max = prices.iter().copied().fold(min, f64::max);
    let span = max - min;
    prices
        .iter()
        .map(|p| {
            if span <= 0.0 {
                SPARK_LEVELS[SPARK_LEVELS.len() / 2]
            } else {
                let idx = ((p - min) / span * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
                SPARK_LEVELS[idx.min(SPARK_LEVELS.len() - 1)]
            }
        })
        .collect()
}

/// Plain-text rendering for terminals.
pub fn render_text(view: &DashboardView) -> String {
    let mut out = String::new();

    if view.loading_screen {
        let _ = writeln!(out, "SYNCHRONIZING GLOBAL HUBS");
        let _ = writeln!(out, "{}", HUB_TAGS.join("  "));
        return out;
    }

    let mut ticker: Vec<String> = view
        .fx
        .iter()
        .map(|q| format!("{} {}", q.pair, q.value))
        .collect();
    ticker.push(format!("SYNC IN {}", view.sync_in));
    let _ = writeln!(out, "FX HUB INDEX | {}", ticker.join(" | "));
    let _ = writeln!(
        out,
        "LUMINA GLOBAL HUBS{}  UTC {}",
        if view.loading { "  [syncing]" } else { "" },
        view.utc_clock
    );

    if let Some(error) = &view.error {
        let _ = writeln!(out, "\n!! {}", error.to_uppercase());
    }

    for section in &view.sections {
        let _ = writeln!(out, "\n== {} ==", section.title.to_uppercase());
        for card in &section.cards {
            let _ = writeln!(
                out,
                "[{}] {} {:<6} {}{} {}  {}  {}  L:{} H:{}  range {:.0}%",
                card.index,
                card.region,
                card.symbol,
                card.currency,
                card.price,
                card.unit_label,
                card.change,
                card.volatility,
                card.low,
                card.high,
                card.range_progress
            );
            if let Some(chart) = &card.chart {
                let labels: Vec<String> = chart
                    .points
                    .iter()
                    .map(|p| format!("{} {}", p.label, format_number(p.price, 2)))
                    .collect();
                let _ = writeln!(out, "    {} (5D) {}", chart.title, chart.sparkline);
                let _ = writeln!(out, "    {}", labels.join("  "));
            }
        }
    }

    if !view.forecasts.is_empty() {
        let _ = writeln!(out, "\n== AI PRICE FORECASTING ==");
        for f in &view.forecasts {
            let _ = writeln!(
                out,
                "{} | {}: {} ({})  range {} - {}{}",
                f.timeframe_label,
                f.metal,
                f.predicted,
                f.change,
                f.low,
                f.high,
                if f.bounds_ordered { "" } else { "  [bounds inconsistent]" }
            );
            if !f.reasoning.is_empty() {
                let _ = writeln!(out, "    Reasoning: {}", f.reasoning);
            }
        }
    }

    if let Some(analysis) = &view.analysis {
        let _ = writeln!(out, "\n== STRATEGIC ANALYSIS [{}] ==", analysis.sentiment);
        let _ = writeln!(out, "\"{}\"", analysis.headline);
        for p in &analysis.paragraphs {
            let _ = writeln!(out, "\n{p}");
        }
        if !analysis.drivers.is_empty() {
            let _ = writeln!(out, "\nArbitrage drivers:");
            for d in &analysis.drivers {
                let _ = writeln!(out, "  * {d}");
            }
        }
        if !analysis.sources.is_empty() {
            let _ = writeln!(out, "\nGrounded feeds:");
            for s in &analysis.sources {
                let _ = writeln!(out, "  - {} <{}>", s.title, s.uri);
            }
        }
    }

    if !view.chat.messages.is_empty() || view.chat.loading {
        let _ = writeln!(out, "\n== ANALYST CHAT ({}) ==", view.chat.mode);
        for m in &view.chat.messages {
            let who = match m.role {
                ChatRole::User => "you",
                ChatRole::Assistant if m.is_thinking => "analyst (thinking)",
                ChatRole::Assistant => "analyst",
            };
            let _ = writeln!(out, "{who}> {}", m.content);
            for s in m.sources.iter().flatten() {
                let _ = writeln!(out, "    [{}] {}", s.title, s.uri);
            }
        }
        if view.chat.loading {
            let _ = writeln!(out, "analyst> ...");
        }
    }

    out
}
