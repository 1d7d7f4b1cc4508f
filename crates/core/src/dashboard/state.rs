use crate::domain::chat::{ChatMessage, ChatMode};
use crate::domain::market::MarketSnapshot;
use crate::refresh::Countdown;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

pub const SYNC_ERROR_TEXT: &str = "Global Hub Sync Error. Market data may be delayed.";

/// Everything the presentation layer renders. Mutated only by `reducer::reduce`.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub snapshot: Option<MarketSnapshot>,
    pub error: Option<String>,
    pub countdown: Countdown,
    pub fetches_in_flight: usize,
    pub transcript: Vec<ChatMessage>,
    pub pending_chats: Vec<Uuid>,
    pub chat_mode: ChatMode,
    /// Names of hub cards whose history chart is open.
    pub expanded_cards: BTreeSet<String>,

    #[serde(skip)]
    pub(crate) last_issued_seq: u64,
    #[serde(skip)]
    pub(crate) last_applied_seq: u64,
}

impl DashboardState {
    pub fn new(refresh_interval_secs: u32) -> Self {
        Self {
            snapshot: None,
            error: None,
            countdown: Countdown::new(refresh_interval_secs),
            fetches_in_flight: 0,
            transcript: Vec::new(),
            pending_chats: Vec::new(),
            chat_mode: ChatMode::default(),
            expanded_cards: BTreeSet::new(),
            last_issued_seq: 0,
            last_applied_seq: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.fetches_in_flight > 0
    }

    pub fn is_chat_loading(&self) -> bool {
        !self.pending_chats.is_empty()
    }

    pub fn is_expanded(&self, card_name: &str) -> bool {
        self.expanded_cards.contains(card_name)
    }
}
