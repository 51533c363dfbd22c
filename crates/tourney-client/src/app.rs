// Application state and main event loop.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use tourney_core::dispatch::reduce;
use tourney_core::model::TournamentState;
use tourney_core::protocol::TournamentMessage;
use tourney_core::status::{CompetitorState, LoginIdentity, StatusCache};

use crate::feed::FeedEvent;

// ---------------------------------------------------------------------------
// Channel payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Updates pushed to whatever is presenting the client's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatusUpdate {
    Connection(ConnectionStatus),
    Competitor(CompetitorState),
    TournamentFinished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Track a different account's status from now on.
    SwitchLogin(LoginIdentity),
    Quit,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub tournament: Arc<TournamentState>,
    pub login: LoginIdentity,
    pub connection_status: ConnectionStatus,
    status_cache: StatusCache,
    last_status: Option<CompetitorState>,
    pub messages_applied: u64,
}

impl AppState {
    pub fn new(login: LoginIdentity) -> Self {
        AppState {
            tournament: Arc::new(TournamentState::default()),
            login,
            connection_status: ConnectionStatus::Disconnected,
            status_cache: StatusCache::new(),
            last_status: None,
            messages_applied: 0,
        }
    }

    /// Fold one message into the tournament. The previous state is replaced
    /// only after the reducer succeeds.
    pub fn apply(&mut self, message: TournamentMessage) -> anyhow::Result<()> {
        let kind = message.kind();
        let next = reduce(&self.tournament, message)
            .with_context(|| format!("failed to apply {kind}"))?;
        self.tournament = Arc::new(next);
        self.messages_applied += 1;
        Ok(())
    }

    /// The competitor status for the current login and tournament state.
    pub fn competitor_status(&mut self) -> CompetitorState {
        self.status_cache.get(&self.tournament, &self.login)
    }

    /// Returns the new status if it differs from the last one reported.
    fn take_status_change(&mut self) -> Option<CompetitorState> {
        let status = self.competitor_status();
        if self.last_status.as_ref() == Some(&status) {
            return None;
        }
        info!(
            "Competitor status for {}: {:?} (division {:?}, round {})",
            self.login.username, status.status, status.division, status.current_round
        );
        self.last_status = Some(status.clone());
        Some(status)
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. Feed events (decoded server messages)
/// 2. User commands
///
/// Pushes status updates through `status_tx`. Returns an error if a message
/// cannot be decoded or applied; the tournament state is not trustworthy
/// after that.
pub async fn run(
    mut feed_rx: mpsc::Receiver<FeedEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    status_tx: mpsc::Sender<StatusUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started for {}", state.login.full_id());
    publish_status(&mut state, &status_tx).await;

    loop {
        tokio::select! {
            // --- Feed events ---
            event = feed_rx.recv() => {
                match event {
                    Some(event) => {
                        if let Err(e) = handle_feed_event(&mut state, event, &status_tx).await {
                            error!("Stopping event loop: {e:#}");
                            return Err(e);
                        }
                    }
                    None => {
                        info!("Feed channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(UserCommand::SwitchLogin(login)) => {
                        info!("Switching login to {}", login.full_id());
                        state.login = login;
                        publish_status(&mut state, &status_tx).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    info!(
        "Application event loop stopped after {} messages",
        state.messages_applied
    );
    Ok(())
}

async fn handle_feed_event(
    state: &mut AppState,
    event: FeedEvent,
    status_tx: &mpsc::Sender<StatusUpdate>,
) -> anyhow::Result<()> {
    match event {
        FeedEvent::Connected { source } => {
            info!("Feed connected: {source}");
            set_connection(state, ConnectionStatus::Connected, status_tx).await;
        }
        FeedEvent::Disconnected => {
            info!("Feed disconnected");
            set_connection(state, ConnectionStatus::Disconnected, status_tx).await;
        }
        FeedEvent::Message(message) => {
            debug!("Feed message: {}", message.kind());
            let was_finished = state.tournament.finished;
            state.apply(*message)?;
            if state.tournament.finished && !was_finished {
                info!("Tournament '{}' is finished", state.tournament.metadata.name);
                let _ = status_tx.send(StatusUpdate::TournamentFinished).await;
            }
            publish_status(state, status_tx).await;
        }
        FeedEvent::Rejected(e) => {
            return Err(anyhow::Error::new(e).context("feed sent an undecodable frame"));
        }
    }
    Ok(())
}

async fn set_connection(
    state: &mut AppState,
    status: ConnectionStatus,
    status_tx: &mpsc::Sender<StatusUpdate>,
) {
    if state.connection_status != status {
        state.connection_status = status;
        let _ = status_tx.send(StatusUpdate::Connection(status)).await;
    }
}

async fn publish_status(state: &mut AppState, status_tx: &mpsc::Sender<StatusUpdate>) {
    if let Some(status) = state.take_status_change() {
        let _ = status_tx.send(StatusUpdate::Competitor(status)).await;
    }
}
