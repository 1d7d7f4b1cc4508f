use crate::chat::ChatReply;
use crate::domain::chat::ChatMode;
use crate::domain::market::MarketSnapshot;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    /// One second elapsed on the refresh timer.
    Tick,
    /// Mount or manual refresh.
    RefreshRequested,
    FetchSucceeded {
        seq: u64,
        snapshot: MarketSnapshot,
    },
    FetchFailed {
        seq: u64,
        error: String,
    },
    /// `mode` switches the chat mode for this request and the ones after it.
    ChatSent {
        request_id: Uuid,
        query: String,
        mode: Option<ChatMode>,
    },
    ChatResolved {
        request_id: Uuid,
        mode: ChatMode,
        reply: ChatReply,
    },
    ChatFailed {
        request_id: Uuid,
        mode: ChatMode,
        error: String,
    },
    ChatModeChanged {
        mode: ChatMode,
    },
    CardToggled {
        name: String,
    },
}

/// Side effect requested by the reducer; carried out by `Dashboard`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    None,
    StartFetch {
        seq: u64,
    },
    StartChat {
        request_id: Uuid,
        query: String,
        mode: ChatMode,
        market_context: String,
    },
}
