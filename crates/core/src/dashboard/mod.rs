pub mod event;
pub mod reducer;
pub mod state;

use crate::chat::{ChatBackend, ChatClient};
use crate::config::Settings;
use crate::domain::chat::{ChatMessage, ChatMode, ChatRole};
use crate::llm::gemini::GeminiClient;
use crate::llm::{LlmClient, Models};
use crate::market::{MarketDataClient, MarketDataSource};
use event::{Command, DashboardEvent};
use state::DashboardState;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The single view-state container of a running dashboard.
///
/// Every mutation is an event applied by [`reducer::reduce`] under the write lock, so a
/// reader sees either the previous snapshot or the new one, never a mix. Outbound calls
/// run outside the lock and report back through events.
pub struct Dashboard {
    state: RwLock<DashboardState>,
    market: Arc<dyn MarketDataSource>,
    chat: Arc<dyn ChatBackend>,
    revision: watch::Sender<u64>,
}

impl Dashboard {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        chat: Arc<dyn ChatBackend>,
        refresh_interval_secs: u32,
    ) -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            state: RwLock::new(DashboardState::new(refresh_interval_secs)),
            market,
            chat,
            revision,
        })
    }

    /// Gemini-backed dashboard with models taken from the environment.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<Self>> {
        let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::from_settings(settings)?);
        let models = Models::from_env();
        tracing::info!(
            fast = %models.fast,
            search = %models.search,
            thinking = %models.thinking,
            refresh_interval_secs = settings.refresh_interval_secs,
            "dashboard configured"
        );
        Ok(Self::new(
            Arc::new(MarketDataClient::new(llm.clone(), models.clone())),
            Arc::new(ChatClient::new(llm, models)),
            settings.refresh_interval_secs,
        ))
    }

    /// Bumped after every applied event.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn state(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub async fn with_state<R>(&self, f: impl FnOnce(&DashboardState) -> R) -> R {
        let guard = self.state.read().await;
        f(&guard)
    }

    async fn apply(&self, ev: DashboardEvent) -> Command {
        let cmd = {
            let mut state = self.state.write().await;
            reducer::reduce(&mut state, ev)
        };
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
        cmd
    }

    /// One timer tick. Returns the spawned sync when the countdown rolled over.
    pub async fn tick(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let cmd = self.apply(DashboardEvent::Tick).await;
        self.spawn_fetch(cmd)
    }

    /// Immediate sync (mount or manual refresh); resets the countdown.
    pub async fn refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let cmd = self.apply(DashboardEvent::RefreshRequested).await;
        self.spawn_fetch(cmd)
    }

    fn spawn_fetch(self: &Arc<Self>, cmd: Command) -> Option<JoinHandle<()>> {
        let Command::StartFetch { seq } = cmd else {
            return None;
        };
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run_fetch(seq).await }))
    }

    async fn run_fetch(&self, seq: u64) {
        tracing::info!(seq, "market sync started");
        let ev = match self.market.fetch_snapshot().await {
            Ok(snapshot) => {
                tracing::info!(seq, hubs = snapshot.hubs.len(), "market sync succeeded");
                DashboardEvent::FetchSucceeded { seq, snapshot }
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(seq, error = %error, "market sync failed");
                DashboardEvent::FetchFailed { seq, error }
            }
        };
        self.apply(ev).await;
    }

    pub async fn set_chat_mode(&self, mode: ChatMode) {
        self.apply(DashboardEvent::ChatModeChanged { mode }).await;
    }

    pub async fn toggle_card(&self, name: impl Into<String>) {
        self.apply(DashboardEvent::CardToggled { name: name.into() })
            .await;
    }

    /// Toggles the card at `index` in display order. Returns its name, or `None` when the
    /// current snapshot has no such card.
    pub async fn toggle_card_at(&self, index: usize) -> Option<String> {
        let name = self
            .with_state(|s| {
                let snapshot = s.snapshot.as_ref()?;
                crate::render::cards_in_display_order(snapshot)
                    .nth(index)
                    .map(|h| h.name.clone())
            })
            .await?;
        self.toggle_card(name.clone()).await;
        Some(name)
    }

    /// Appends the user message and waits for the matching assistant message.
    /// Returns `None` for a blank query.
    pub async fn ask(&self, query: &str) -> Option<ChatMessage> {
        self.ask_with_mode(query, None).await
    }

    /// Like [`Dashboard::ask`], switching to `mode` in the same state update that
    /// records the message, so the request always runs in the mode it asked for.
    pub async fn ask_with_mode(&self, query: &str, mode: Option<ChatMode>) -> Option<ChatMessage> {
        let request_id = Uuid::new_v4();
        let cmd = self
            .apply(DashboardEvent::ChatSent {
                request_id,
                query: query.to_string(),
                mode,
            })
            .await;
        let Command::StartChat {
            request_id,
            query,
            mode,
            market_context,
        } = cmd
        else {
            return None;
        };

        tracing::info!(%request_id, %mode, "chat request sent");
        let ev = match self.chat.ask(&query, mode, &market_context).await {
            Ok(reply) => DashboardEvent::ChatResolved {
                request_id,
                mode,
                reply,
            },
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(%request_id, %mode, error = %error, "chat request failed");
                DashboardEvent::ChatFailed {
                    request_id,
                    mode,
                    error,
                }
            }
        };
        self.apply(ev).await;

        self.with_state(|s| {
            s.transcript
                .iter()
                .rev()
                .find(|m| m.request_id == request_id && m.role == ChatRole::Assistant)
                .cloned()
        })
        .await
    }

    /// Fire-and-forget variant of [`Dashboard::ask`]; replies land in the transcript in
    /// arrival order.
    pub fn send_chat(self: &Arc<Self>, query: impl Into<String>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let query = query.into();
        tokio::spawn(async move {
            let _ = this.ask(&query).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatReply;
    use crate::domain::market::{FxRates, MarketSnapshot, MarketSummary, Sentiment};
    use state::SYNC_ERROR_TEXT;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct ToggleSource {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MarketDataSource for ToggleSource {
        async fn fetch_snapshot(&self) -> anyhow::Result<MarketSnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("backend unavailable");
            }
            Ok(MarketSnapshot {
                hubs: Vec::new(),
                summary: MarketSummary {
                    headline: format!("sync {n}"),
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

    /// Answers after a delay proportional to the query length.
    struct SlowChat;

    #[async_trait::async_trait]
    impl ChatBackend for SlowChat {
        async fn ask(&self, query: &str, _: ChatMode, ctx: &str) -> anyhow::Result<ChatReply> {
            tokio::time::sleep(Duration::from_millis(10 * query.len() as u64)).await;
            if query == "fail" {
                anyhow::bail!("connection reset");
            }
            Ok(ChatReply {
                text: format!("re: {query} | {ctx}"),
                sources: None,
            })
        }
    }

    fn dashboard(fail: bool) -> (Arc<Dashboard>, Arc<ToggleSource>) {
        let source = Arc::new(ToggleSource {
            fail: AtomicBool::new(fail),
            calls: AtomicUsize::new(0),
        });
        (Dashboard::new(source.clone(), Arc::new(SlowChat), 600), source)
    }

    #[tokio::test]
    async fn failed_refresh_keeps_data_and_sets_banner() {
        let (dash, source) = dashboard(false);
        dash.refresh().await.unwrap().await.unwrap();
        assert_eq!(
            dash.state().await.snapshot.unwrap().summary.headline,
            "sync 0"
        );

        source.fail.store(true, Ordering::SeqCst);
        dash.refresh().await.unwrap().await.unwrap();
        let state = dash.state().await;
        assert_eq!(state.snapshot.as_ref().unwrap().summary.headline, "sync 0");
        assert_eq!(state.error.as_deref(), Some(SYNC_ERROR_TEXT));
        assert!(!state.is_loading());

        // Next sync recovers.
        source.fail.store(false, Ordering::SeqCst);
        dash.refresh().await.unwrap().await.unwrap();
        let state = dash.state().await;
        assert!(state.error.is_none());
        assert_eq!(state.snapshot.as_ref().unwrap().summary.headline, "sync 2");
    }

    #[tokio::test]
    async fn ask_returns_paired_reply_with_market_context() {
        let (dash, _) = dashboard(false);
        dash.refresh().await.unwrap().await.unwrap();

        let reply = dash.ask("gold?").await.unwrap();
        assert_eq!(reply.role, ChatRole::Assistant);
        assert!(reply.content.starts_with("re: gold? | Sentiment Bullish"));

        let state = dash.state().await;
        assert_eq!(state.transcript.len(), 2);
        assert_eq!(state.transcript[0].role, ChatRole::User);
        assert_eq!(state.transcript[0].request_id, reply.request_id);
    }

    #[tokio::test]
    async fn chat_failure_yields_single_fallback() {
        let (dash, _) = dashboard(false);
        let reply = dash.ask("fail").await.unwrap();
        assert_eq!(reply.content, crate::chat::CONNECTION_ERROR_TEXT);
        assert_eq!(dash.state().await.transcript.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_chats_append_in_arrival_order() {
        let (dash, _) = dashboard(false);
        let slow = dash.send_chat("a much longer question");
        tokio::task::yield_now().await;
        let fast = dash.send_chat("quick");
        slow.await.unwrap();
        fast.await.unwrap();

        let transcript = dash.state().await.transcript;
        assert_eq!(transcript.len(), 4);
        assert!(transcript[..2].iter().all(|m| m.role == ChatRole::User));
        let user_id = |content: &str| {
            transcript[..2]
                .iter()
                .find(|m| m.content == content)
                .map(|m| m.request_id)
                .unwrap()
        };
        assert!(transcript[2].content.starts_with("re: quick"));
        assert_eq!(transcript[2].request_id, user_id("quick"));
        assert!(transcript[3].content.starts_with("re: a much longer question"));
        assert_eq!(transcript[3].request_id, user_id("a much longer question"));
    }

    /// Replies with the mode the backend was asked to use.
    struct ModeEcho;

    #[async_trait::async_trait]
    impl ChatBackend for ModeEcho {
        async fn ask(&self, query: &str, mode: ChatMode, _: &str) -> anyhow::Result<ChatReply> {
            tokio::task::yield_now().await;
            Ok(ChatReply {
                text: format!("{query}:{mode}"),
                sources: None,
            })
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_requests_keep_their_own_mode() {
        let source = Arc::new(ToggleSource {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        let dash = Dashboard::new(source, Arc::new(ModeEcho), 600);

        let mut handles = Vec::new();
        for (query, mode) in [
            ("a", ChatMode::Thinking),
            ("b", ChatMode::Fast),
            ("c", ChatMode::Grounded),
            ("d", ChatMode::Thinking),
        ] {
            let dash = dash.clone();
            handles.push(tokio::spawn(async move {
                (mode, dash.ask_with_mode(query, Some(mode)).await.unwrap())
            }));
        }

        for handle in handles {
            let (mode, reply) = handle.await.unwrap();
            assert!(reply.content.ends_with(&format!(":{mode}")), "{}", reply.content);
            assert_eq!(reply.is_thinking, mode == ChatMode::Thinking);
        }
    }

    #[tokio::test]
    async fn revision_advances_on_every_event() {
        let (dash, _) = dashboard(false);
        let rx = dash.subscribe();
        let before = *rx.borrow();
        let _ = dash.tick().await;
        dash.set_chat_mode(ChatMode::Grounded).await;
        assert_eq!(*rx.borrow(), before + 2);
        assert_eq!(dash.state().await.chat_mode, ChatMode::Grounded);
    }

    #[tokio::test]
    async fn missing_api_key_surfaces_as_sync_banner() {
        let settings = Settings {
            gemini_api_key: None,
            sentry_dsn: None,
            refresh_interval_secs: 600,
        };
        let dash = Dashboard::from_settings(&settings).unwrap();
        dash.refresh().await.unwrap().await.unwrap();

        let state = dash.state().await;
        assert!(state.snapshot.is_none());
        assert_eq!(state.error.as_deref(), Some(SYNC_ERROR_TEXT));

        let reply = dash.ask("gold?").await.unwrap();
        assert_eq!(reply.content, crate::chat::CONNECTION_ERROR_TEXT);
    }

    #[tokio::test]
    async fn toggle_card_at_requires_snapshot() {
        let (dash, _) = dashboard(false);
        assert!(dash.toggle_card_at(0).await.is_none());
    }
}
