use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bullion_core::dashboard::Dashboard;
use bullion_core::domain::chat::{ChatMessage, ChatMode};
use bullion_core::refresh::RefreshController;
use bullion_core::render::{render_text, ChatView, DashboardView};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = bullion_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let dashboard = Dashboard::from_settings(&settings).inspect_err(|e| {
        sentry_anyhow::capture_anyhow(e);
    })?;
    let controller = RefreshController::start(dashboard.clone());

    let app = router(AppState { dashboard });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    controller.stop();

    if let Err(e) = served {
        let err = anyhow::Error::new(e);
        sentry_anyhow::capture_anyhow(&err);
        return Err(err);
    }
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard.txt", get(get_dashboard_text))
        .route("/refresh", post(post_refresh))
        .route("/chat", get(get_chat).post(post_chat))
        .route("/chat/mode", put(put_chat_mode))
        .route("/cards/:index/toggle", post(post_card_toggle))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    dashboard: Arc<Dashboard>,
}

impl AppState {
    async fn view(&self) -> DashboardView {
        self.dashboard
            .with_state(|s| DashboardView::build(s, chrono::Utc::now()))
            .await
    }
}

async fn get_dashboard(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.view().await)
}

async fn get_dashboard_text(State(state): State<AppState>) -> String {
    render_text(&state.view().await)
}

async fn post_refresh(State(state): State<AppState>) -> StatusCode {
    let _ = state.dashboard.refresh().await;
    StatusCode::ACCEPTED
}

async fn get_chat(State(state): State<AppState>) -> Json<ChatView> {
    Json(state.view().await.chat)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default)]
    mode: Option<ChatMode>,
}

async fn post_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatMessage>, StatusCode> {
    state
        .dashboard
        .ask_with_mode(&req.query, req.mode)
        .await
        .map(Json)
        .ok_or(StatusCode::BAD_REQUEST)
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: ChatMode,
}

async fn put_chat_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> StatusCode {
    state.dashboard.set_chat_mode(req.mode).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct CardToggled {
    name: String,
    expanded: bool,
}

async fn post_card_toggle(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<CardToggled>, StatusCode> {
    let name = state
        .dashboard
        .toggle_card_at(index)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    let expanded = state.dashboard.with_state(|s| s.is_expanded(&name)).await;
    Ok(Json(CardToggled { name, expanded }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &bullion_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullion_core::chat::{ChatBackend, ChatReply};
    use bullion_core::domain::market::{
        FxRates, MarketSnapshot, MarketSummary, Metal, MetalData, Region, Sentiment, Volatility,
    };
    use bullion_core::market::MarketDataSource;

    struct OneHub;

    #[async_trait::async_trait]
    impl MarketDataSource for OneHub {
        async fn fetch_snapshot(&self) -> anyhow::Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                hubs: vec![MetalData {
                    region: Region::Usa,
                    metal: Metal::Gold,
                    symbol: "XAU".to_string(),
                    name: "USA Gold".to_string(),
                    current_price: 2350.0,
                    change_24h: 0.4,
                    high_24h: 2360.0,
                    low_24h: 2330.0,
                    volatility: Volatility::Low,
                    history: Vec::new(),
                    currency: "$".to_string(),
                    unit: "oz".to_string(),
                }],
                summary: MarketSummary {
                    headline: "Gold firm".to_string(),
                    analysis: String::new(),
                    sentiment: Sentiment::Bullish,
                    drivers: Vec::new(),
                    sources: Vec::new(),
                    fx: FxRates::default(),
                    predictions: Vec::new(),
                },
                fetched_at: chrono::Utc::now(),
            })
        }
    }

    struct EchoMode;

    #[async_trait::async_trait]
    impl ChatBackend for EchoMode {
        async fn ask(&self, query: &str, mode: ChatMode, _: &str) -> anyhow::Result<ChatReply> {
            Ok(ChatReply {
                text: format!("{query} ({mode})"),
                sources: None,
            })
        }
    }

    async fn synced_state() -> AppState {
        let dashboard = Dashboard::new(Arc::new(OneHub), Arc::new(EchoMode), 600);
        dashboard.refresh().await.unwrap().await.unwrap();
        AppState { dashboard }
    }

    fn chat(query: &str, mode: Option<ChatMode>) -> Json<ChatRequest> {
        Json(ChatRequest {
            query: query.to_string(),
            mode,
        })
    }

    #[tokio::test]
    async fn router_builds() {
        let _ = router(synced_state().await);
    }

    #[tokio::test]
    async fn post_chat_uses_requested_mode() {
        let state = synced_state().await;
        let thinking = chat("outlook?", Some(ChatMode::Thinking));
        let Json(reply) = post_chat(State(state.clone()), thinking).await.unwrap();
        assert_eq!(reply.content, "outlook? (thinking)");
        assert!(reply.is_thinking);

        // Without a mode the last one sticks.
        let Json(reply) = post_chat(State(state.clone()), chat("and now?", None))
            .await
            .unwrap();
        assert_eq!(reply.content, "and now? (thinking)");

        let Json(view) = get_chat(State(state)).await;
        assert_eq!(view.mode, ChatMode::Thinking);
        assert_eq!(view.messages.len(), 4);
    }

    #[tokio::test]
    async fn blank_chat_is_rejected() {
        let err = post_chat(State(synced_state().await), chat("  ", Some(ChatMode::Fast)))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_mode_changes_default_mode() {
        let state = synced_state().await;
        let status = put_chat_mode(
            State(state.clone()),
            Json(ModeRequest {
                mode: ChatMode::Grounded,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let Json(reply) = post_chat(State(state), chat("news?", None)).await.unwrap();
        assert_eq!(reply.content, "news? (grounded)");
    }

    #[tokio::test]
    async fn card_toggle_by_index() {
        let state = synced_state().await;
        let Json(toggled) = post_card_toggle(State(state.clone()), Path(0)).await.unwrap();
        assert_eq!(toggled.name, "USA Gold");
        assert!(toggled.expanded);

        let Json(view) = get_dashboard(State(state.clone())).await;
        let chart = view.sections[0].cards[0].chart.as_ref().unwrap();
        assert_eq!(chart.title, "USA Gold History");

        let err = post_card_toggle(State(state), Path(1)).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_text_and_refresh() {
        let state = synced_state().await;
        let text = get_dashboard_text(State(state.clone())).await;
        assert!(text.contains("USA MARKET"));
        assert!(text.contains("SYNC IN 10:00"));
        assert_eq!(post_refresh(State(state)).await, StatusCode::ACCEPTED);
        assert_eq!(healthz().await, "ok");
    }
}
