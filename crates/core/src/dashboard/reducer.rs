use super::event::{Command, DashboardEvent};
use super::state::{DashboardState, SYNC_ERROR_TEXT};
use crate::chat::{market_context, CONNECTION_ERROR_TEXT};
use crate::domain::chat::ChatMessage;

pub fn reduce(state: &mut DashboardState, ev: DashboardEvent) -> Command {
    match ev {
        DashboardEvent::Tick => {
            if state.countdown.tick() {
                start_fetch(state)
            } else {
                Command::None
            }
        }
        DashboardEvent::RefreshRequested => {
            state.countdown.reset();
            start_fetch(state)
        }
        DashboardEvent::FetchSucceeded { seq, snapshot } => {
            state.fetches_in_flight = state.fetches_in_flight.saturating_sub(1);
            if seq <= state.last_applied_seq {
                tracing::debug!(
                    seq,
                    applied = state.last_applied_seq,
                    "dropping stale market snapshot"
                );
                return Command::None;
            }
            state.last_applied_seq = seq;
            state.snapshot = Some(snapshot);
            state.error = None;
            state.countdown.reset();
            Command::None
        }
        DashboardEvent::FetchFailed { seq, error } => {
            state.fetches_in_flight = state.fetches_in_flight.saturating_sub(1);
            if seq <= state.last_applied_seq {
                tracing::debug!(seq, error = %error, "ignoring failure of a superseded sync");
                return Command::None;
            }
            // Prior snapshot stays on screen.
            state.error = Some(SYNC_ERROR_TEXT.to_string());
            Command::None
        }
        DashboardEvent::ChatSent {
            request_id,
            query,
            mode,
        } => {
            let query = query.trim().to_string();
            if query.is_empty() {
                return Command::None;
            }
            if let Some(mode) = mode {
                state.chat_mode = mode;
            }
            state.transcript.push(ChatMessage::user(request_id, query.clone()));
            state.pending_chats.push(request_id);
            Command::StartChat {
                request_id,
                query,
                mode: state.chat_mode,
                market_context: market_context(state.snapshot.as_ref()),
            }
        }
        DashboardEvent::ChatResolved {
            request_id,
            mode,
            reply,
        } => {
            if take_pending(state, request_id) {
                state.transcript.push(ChatMessage::assistant(
                    request_id,
                    reply.text,
                    mode,
                    reply.sources,
                ));
            }
            Command::None
        }
        DashboardEvent::ChatFailed {
            request_id,
            mode,
            error,
        } => {
            if take_pending(state, request_id) {
                tracing::debug!(%request_id, error = %error, "chat reply replaced by fallback");
                state.transcript.push(ChatMessage::assistant(
                    request_id,
                    CONNECTION_ERROR_TEXT,
                    mode,
                    None,
                ));
            }
            Command::None
        }
        DashboardEvent::ChatModeChanged { mode } => {
            state.chat_mode = mode;
            Command::None
        }
        DashboardEvent::CardToggled { name } => {
            if !state.expanded_cards.remove(&name) {
                state.expanded_cards.insert(name);
            }
            Command::None
        }
    }
}

fn start_fetch(state: &mut DashboardState) -> Command {
    state.last_issued_seq += 1;
    state.fetches_in_flight += 1;
    Command::StartFetch {
        seq: state.last_issued_seq,
    }
}

/// Each request resolves at most once.
fn take_pending(state: &mut DashboardState, request_id: uuid::Uuid) -> bool {
    match state.pending_chats.iter().position(|id| *id == request_id) {
        Some(idx) => {
            state.pending_chats.remove(idx);
            true
        }
        None => {
            tracing::warn!(%request_id, "reply for unknown or already answered chat request");
            false
        }
    }
}
