// Competitor status derivation for the logged-in user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{GameResult, TournamentState, NOT_STARTED_ROUND};
use crate::pairings::get_pairing;

/// What the logged-in user should be doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitorStatus {
    #[default]
    Pretourney,
    NotCheckedIn,
    RoundBye,
    RoundOpen,
    RoundGameFinished,
    RoundReady,
    RoundOpponentWaiting,
    RoundGameActive,
    RoundForfeitLoss,
    RoundForfeitWin,
    Posttourney,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorState {
    pub is_registered: bool,
    pub division: Option<String>,
    pub status: CompetitorStatus,
    pub current_round: i32,
}

/// Who is logged in. Players are identified in rosters by
/// `"user_id:username"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginIdentity {
    pub user_id: String,
    pub username: String,
}

impl LoginIdentity {
    pub fn new(user_id: &str, username: &str) -> Self {
        LoginIdentity {
            user_id: user_id.to_string(),
            username: username.to_string(),
        }
    }

    pub fn full_id(&self) -> String {
        format!("{}:{}", self.user_id, self.username)
    }
}

/// Derive the user's status. Rules are checked in priority order and the
/// first match wins.
pub fn competitor_status(state: &TournamentState, login: &LoginIdentity) -> CompetitorState {
    let full_id = login.full_id();
    let Some(division) = state.division_of(&full_id) else {
        return CompetitorState {
            is_registered: false,
            division: None,
            status: CompetitorStatus::Pretourney,
            current_round: NOT_STARTED_ROUND,
        };
    };

    let registered = |status| CompetitorState {
        is_registered: true,
        division: Some(division.division_id.clone()),
        status,
        current_round: division.current_round,
    };

    let checked_in = division.player(&full_id).is_some_and(|p| p.checked_in);
    if state.metadata.checkins_open && !state.started && !checked_in {
        return registered(CompetitorStatus::NotCheckedIn);
    }

    let pairing = u32::try_from(division.current_round)
        .ok()
        .and_then(|round| get_pairing(division, round, &full_id));
    let Some(pairing) = pairing else {
        return registered(CompetitorStatus::Pretourney);
    };

    if pairing.is_self_pairing() {
        match pairing.outcomes[0] {
            GameResult::Bye => return registered(CompetitorStatus::RoundBye),
            GameResult::ForfeitLoss => return registered(CompetitorStatus::RoundForfeitLoss),
            GameResult::ForfeitWin => return registered(CompetitorStatus::RoundForfeitWin),
            _ => {}
        }
    }

    if pairing
        .games
        .first()
        .is_some_and(|g| g.game_end_reason.has_ended())
    {
        return registered(if division.is_last_round() {
            CompetitorStatus::Posttourney
        } else {
            CompetitorStatus::RoundGameFinished
        });
    }

    if state.active_games.iter().any(|g| g.involves(&login.username)) {
        return registered(CompetitorStatus::RoundGameActive);
    }

    let Some(slot) = pairing.slot_of(&full_id) else {
        return registered(CompetitorStatus::Pretourney);
    };
    let me_ready = !pairing.ready_states[slot].is_empty();
    let opponent_ready = !pairing.ready_states[1 - slot].is_empty();
    let status = match (me_ready, opponent_ready) {
        (true, false) => CompetitorStatus::RoundReady,
        (false, true) => CompetitorStatus::RoundOpponentWaiting,
        (false, false) => CompetitorStatus::RoundOpen,
        (true, true) => CompetitorStatus::Pretourney,
    };
    registered(status)
}

/// Memoizes [`competitor_status`] for the most recent state and login.
/// States are compared by pointer, so a cache hit costs no traversal.
#[derive(Debug, Default)]
pub struct StatusCache {
    last: Option<(Arc<TournamentState>, LoginIdentity, CompetitorState)>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, state: &Arc<TournamentState>, login: &LoginIdentity) -> CompetitorState {
        if let Some((cached_state, cached_login, status)) = &self.last {
            if Arc::ptr_eq(cached_state, state) && cached_login == login {
                return status.clone();
            }
        }
        let status = competitor_status(state, login);
        self.last = Some((Arc::clone(state), login.clone(), status.clone()));
        status
    }

    /// Whether `get` would answer from the cache.
    pub fn is_cached(&self, state: &Arc<TournamentState>, login: &LoginIdentity) -> bool {
        self.last
            .as_ref()
            .is_some_and(|(s, l, _)| Arc::ptr_eq(s, state) && l == login)
    }
}
