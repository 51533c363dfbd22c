// Message dispatcher: folds one server message into a new tournament state.
//
// The state machine has two phases. Until the first snapshot arrives only
// the messages on the pre-snapshot allow-list are applied; everything else
// is dropped silently because the divisions it refers to do not exist yet.
// The first snapshot sets `initialized_from_xhr`, which is never cleared.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::controls::{overlay_round_controls, validate_round_controls, RoundControlError};
use crate::model::{
    build_player_index_map, ActiveGame, Division, GameSummary, SinglePairing, StreamKind,
    TournamentState, READY,
};
use crate::pairings::{delete_pairings, empty_grid, expand_pairings, reduce_pairings, PairingError};
use crate::protocol::{
    DivisionControlsSet, MonitoringStreamUpdate, PairingsDeleted, PairingsSet, PlayerCheckin,
    PlayersChanged, ReadyToggled, ReducedMetadata, RoundControlsSet, RoundStarted, Snapshot,
    TournamentMessage,
};
use crate::snapshot::normalize_division;
use crate::standings::reduce_standings;

/// Number of finished legacy games kept in `finished_games`.
pub const MAX_FINISHED_GAMES: usize = 100;

/// A message that cannot be applied without corrupting the model. These are
/// protocol violations; callers are expected to stop rather than continue
/// from a state they cannot trust.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no division named `{0}`")]
    UnknownDivision(String),

    /// Once pairings exist, players may only be appended. `position` is the
    /// first roster index whose player differs from the previous roster.
    #[error("division `{division}` roster changed at position {position} after the tournament started ({before} -> {after} players)")]
    RosterReorderedAfterStart {
        division: String,
        position: usize,
        before: usize,
        after: usize,
    },

    #[error("invalid pairings for division `{division}`: {source}")]
    Pairing {
        division: String,
        source: PairingError,
    },

    #[error("invalid round controls for division `{division}`: {source}")]
    RoundControls {
        division: String,
        source: RoundControlError,
    },
}

/// Apply one message, returning the next state. `state` itself is never
/// modified, so readers holding it keep a consistent view.
pub fn reduce(
    state: &TournamentState,
    message: TournamentMessage,
) -> Result<TournamentState, DispatchError> {
    if !state.initialized_from_xhr && !message.allowed_before_snapshot() {
        return Ok(state.clone());
    }
    debug!("Applying {}", message.kind());

    let mut next = state.clone();
    match message {
        TournamentMessage::DivisionsSnapshot(snapshot) => apply_snapshot(&mut next, snapshot)?,
        TournamentMessage::MetadataSet(set) => {
            next.metadata = Arc::new(set.metadata);
            next.directors = Arc::new(set.directors);
        }
        TournamentMessage::ReducedMetadataSet(reduced) => apply_reduced_metadata(&mut next, reduced),
        TournamentMessage::DivisionAdded(added) => {
            let fresh = Arc::new(Division::new(&added.id, &added.division));
            match Arc::make_mut(&mut next.divisions).insert(added.division.clone(), fresh) {
                Some(old) if !old.players.is_empty() => warn!(
                    "Division {} re-added; dropped its {} players and pairings",
                    added.division,
                    old.players.len()
                ),
                Some(_) => debug!("Division {} re-added while empty", added.division),
                None => info!("Division added: {}", added.division),
            }
        }
        TournamentMessage::DivisionRemoved(removed) => {
            if Arc::make_mut(&mut next.divisions)
                .remove(&removed.division)
                .is_none()
            {
                return Err(DispatchError::UnknownDivision(removed.division));
            }
            info!("Division removed: {}", removed.division);
        }
        TournamentMessage::RoundControlsSet(set) => set_round_controls(&mut next, set)?,
        TournamentMessage::DivisionControlsSet(set) => set_division_controls(&mut next, set)?,
        TournamentMessage::PairingsSet(set) => set_pairings(&mut next, set)?,
        TournamentMessage::PairingsDeleted(deleted) => remove_pairings(&mut next, deleted)?,
        TournamentMessage::PlayersChanged(changed) => change_players(&mut next, changed)?,
        TournamentMessage::RoundStarted(started) => start_round(&mut next, started)?,
        TournamentMessage::ReadyToggled(toggled) => toggle_ready(&mut next, toggled)?,
        TournamentMessage::PlayerCheckin(checkin) => check_in(&mut next, checkin)?,
        TournamentMessage::TournamentFinished(finished) => {
            if finished.tournament_id == next.metadata.id {
                info!("Tournament {} finished", finished.tournament_id);
                next.finished = true;
            } else {
                warn!(
                    "Ignoring finish for tournament '{}' (current: '{}')",
                    finished.tournament_id, next.metadata.id
                );
            }
        }
        TournamentMessage::ActiveGamesSet(set) => next.active_games = Arc::new(set.games),
        TournamentMessage::ActiveGameAdded(game) | TournamentMessage::LegacyGameStarted(game) => {
            add_active_game(&mut next, game)
        }
        TournamentMessage::ActiveGameRemoved(removed) => {
            remove_active_games(&mut next, |g| g.game_id == removed.game_id)
        }
        TournamentMessage::MonitoringDataSet(set) => next.monitoring_data = Arc::new(set.data),
        TournamentMessage::MonitoringStreamUpdated(update) => update_monitoring(&mut next, update),
        TournamentMessage::LegacyGameResult(summary) => record_game_result(&mut next, summary),
        TournamentMessage::LegacyRecentGamesSet(recent) => {
            next.finished_games = Arc::new(recent.games)
        }
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

fn division_ref<'a>(state: &'a TournamentState, name: &str) -> Result<&'a Division, DispatchError> {
    state
        .divisions
        .get(name)
        .map(Arc::as_ref)
        .ok_or_else(|| DispatchError::UnknownDivision(name.to_string()))
}

/// Copy-on-write access to one division. The division map and the division
/// itself are cloned only if another state still shares them.
fn division_mut<'a>(
    state: &'a mut TournamentState,
    name: &str,
) -> Result<&'a mut Division, DispatchError> {
    if !state.divisions.contains_key(name) {
        return Err(DispatchError::UnknownDivision(name.to_string()));
    }
    let divisions = Arc::make_mut(&mut state.divisions);
    divisions
        .get_mut(name)
        .map(Arc::make_mut)
        .ok_or_else(|| DispatchError::UnknownDivision(name.to_string()))
}

fn pairing_error(division: &str) -> impl FnOnce(PairingError) -> DispatchError + '_ {
    move |source| DispatchError::Pairing {
        division: division.to_string(),
        source,
    }
}

fn round_control_error(division: &str) -> impl FnOnce(RoundControlError) -> DispatchError + '_ {
    move |source| DispatchError::RoundControls {
        division: division.to_string(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn apply_snapshot(state: &mut TournamentState, snapshot: Snapshot) -> Result<(), DispatchError> {
    let mut divisions = BTreeMap::new();
    for (name, division) in &snapshot.divisions {
        let normalized = normalize_division(division).map_err(pairing_error(name))?;
        divisions.insert(name.clone(), Arc::new(normalized));
    }

    if !state.initialized_from_xhr {
        info!(
            "Initial snapshot applied: {} divisions, started={}",
            divisions.len(),
            snapshot.started
        );
    }
    state.divisions = Arc::new(divisions);
    state.started = snapshot.started;
    state.initialized_from_xhr = true;
    Ok(())
}

fn apply_reduced_metadata(state: &mut TournamentState, reduced: ReducedMetadata) {
    let metadata = Arc::make_mut(&mut state.metadata);
    metadata.name = reduced.name;
    metadata.description = reduced.description;
    metadata.kind = reduced.kind;
    metadata.slug = reduced.slug;
    if let Some(logo) = reduced.logo {
        metadata.logo = logo;
    }
    if let Some(color) = reduced.color {
        metadata.color = color;
    }
}

fn set_round_controls(state: &mut TournamentState, set: RoundControlsSet) -> Result<(), DispatchError> {
    let started = state.started;
    let name = set.division.as_str();

    let existing = division_ref(state, name)?;
    let controls = if started {
        let merged = overlay_round_controls(&existing.round_controls, &set.round_controls)
            .map_err(round_control_error(name))?;
        for (old, new) in existing.round_controls.iter().zip(&merged) {
            if !old.settings_eq(new) {
                debug!(
                    "Division {} round {} pairing changed: {:?} -> {:?}",
                    name, new.round, old.pairing_method, new.pairing_method
                );
            }
        }
        merged
    } else {
        set.round_controls
    };
    validate_round_controls(&controls).map_err(round_control_error(name))?;

    let division = division_mut(state, name)?;
    division.round_controls = controls;
    if started {
        division.pairings = reduce_pairings(
            &division.players,
            &division.player_index_map,
            &division.pairings,
            &set.pairings,
        )
        .map_err(pairing_error(name))?;
        division.standings_by_round =
            reduce_standings(&division.standings_by_round, &set.standings_by_round);
    } else {
        let grid = empty_grid(division.num_rounds(), division.players.len());
        division.pairings = reduce_pairings(
            &division.players,
            &division.player_index_map,
            &grid,
            &set.pairings,
        )
        .map_err(pairing_error(name))?;
        division.standings_by_round = set.standings_by_round;
    }
    Ok(())
}

fn set_division_controls(
    state: &mut TournamentState,
    set: DivisionControlsSet,
) -> Result<(), DispatchError> {
    let division = division_mut(state, &set.division)?;
    division.division_controls = set.controls;
    division.standings_by_round =
        reduce_standings(&division.standings_by_round, &set.standings_by_round);
    Ok(())
}

fn set_pairings(state: &mut TournamentState, set: PairingsSet) -> Result<(), DispatchError> {
    let name = set.division.as_str();
    let division = division_mut(state, name)?;
    division.pairings = reduce_pairings(
        &division.players,
        &division.player_index_map,
        &division.pairings,
        &set.pairings,
    )
    .map_err(pairing_error(name))?;
    division.standings_by_round =
        reduce_standings(&division.standings_by_round, &set.standings_by_round);

    let ended: HashSet<&str> = set
        .pairings
        .iter()
        .flat_map(|p| &p.games)
        .filter(|g| g.game_end_reason.has_ended())
        .map(|g| g.id.as_str())
        .collect();
    if !ended.is_empty() {
        remove_active_games(state, |g| ended.contains(g.game_id.as_str()));
    }
    Ok(())
}

fn remove_pairings(state: &mut TournamentState, deleted: PairingsDeleted) -> Result<(), DispatchError> {
    let name = deleted.division.as_str();
    let division = division_mut(state, name)?;
    division.pairings = delete_pairings(&division.pairings, deleted.round).map_err(pairing_error(name))?;
    Ok(())
}

fn change_players(state: &mut TournamentState, changed: PlayersChanged) -> Result<(), DispatchError> {
    let started = state.started;
    let name = changed.division.as_str();
    let division = division_mut(state, name)?;

    let before = division.players.len();
    let after = changed.players.len();
    if started {
        let mismatch = division.players.iter().enumerate().position(|(i, p)| {
            changed.players.get(i).map(|q| q.id.as_str()) != Some(p.id.as_str())
        });
        if let Some(position) = mismatch {
            return Err(DispatchError::RosterReorderedAfterStart {
                division: changed.division.clone(),
                position,
                before,
                after,
            });
        }
    }

    division.player_index_map = build_player_index_map(&changed.players);
    division.players = changed.players;
    if started {
        if after > before {
            debug!("Division {} grew by {} players mid-tournament", name, after - before);
            division.pairings = expand_pairings(&division.pairings, after - before);
        }
    } else {
        division.pairings = empty_grid(division.num_rounds(), after);
        division.standings_by_round.clear();
    }

    division.pairings = reduce_pairings(
        &division.players,
        &division.player_index_map,
        &division.pairings,
        &changed.pairings,
    )
    .map_err(pairing_error(name))?;
    division.standings_by_round =
        reduce_standings(&division.standings_by_round, &changed.standings_by_round);
    Ok(())
}

fn start_round(state: &mut TournamentState, started: RoundStarted) -> Result<(), DispatchError> {
    if started.tournament_id != state.metadata.id {
        warn!(
            "Ignoring round start for tournament '{}' (current: '{}')",
            started.tournament_id, state.metadata.id
        );
        return Ok(());
    }
    let Ok(round) = i32::try_from(started.round) else {
        warn!(
            "Ignoring round start for division {}: round {} out of range",
            started.division, started.round
        );
        return Ok(());
    };
    let division = division_mut(state, &started.division)?;
    division.current_round = round;
    info!("Division {} started round {}", started.division, started.round);
    state.started = true;
    Ok(())
}

fn toggle_ready(state: &mut TournamentState, toggled: ReadyToggled) -> Result<(), DispatchError> {
    let name = toggled.division.as_str();
    let division = division_ref(state, name)?;

    if i32::try_from(toggled.round).ok() != Some(division.current_round) {
        error!(
            "Ready toggle for round {} in division {} but current round is {}",
            toggled.round, name, division.current_round
        );
        return Ok(());
    }
    let round = toggled.round as usize;
    let stale = division.player_index(&toggled.player_id).and_then(|idx| {
        division
            .pairings
            .get(round)
            .and_then(|r| r.slots.get(idx))
            .cloned()
            .flatten()
    });
    let Some(stale) = stale else {
        error!(
            "Ready toggle for {} in division {}: no pairing in round {}",
            toggled.player_id, name, toggled.round
        );
        return Ok(());
    };
    let Some(slot) = stale.slot_of(&toggled.player_id) else {
        error!(
            "Ready toggle for {} in division {}: player not in their own pairing",
            toggled.player_id, name
        );
        return Ok(());
    };

    let mut updated = SinglePairing::clone(&stale);
    updated.ready_states[slot] = if toggled.unready {
        String::new()
    } else {
        READY.to_string()
    };
    let updated = Arc::new(updated);

    let division = division_mut(state, name)?;
    let slots = &mut Arc::make_mut(&mut division.pairings[round]).slots;
    for cell in slots.iter_mut() {
        if cell.as_ref().is_some_and(|p| Arc::ptr_eq(p, &stale)) {
            *cell = Some(Arc::clone(&updated));
        }
    }
    Ok(())
}

fn check_in(state: &mut TournamentState, checkin: PlayerCheckin) -> Result<(), DispatchError> {
    if !state.divisions.contains_key(&checkin.division) && !state.initialized_from_xhr {
        debug!("Check-in for {} before divisions are loaded", checkin.player.id);
        return Ok(());
    }
    let division = division_ref(state, &checkin.division)?;
    let Some(idx) = division.player_index(&checkin.player.id) else {
        warn!(
            "Check-in for unknown player {} in division {}",
            checkin.player.id, checkin.division
        );
        return Ok(());
    };
    let division = division_mut(state, &checkin.division)?;
    division.players[idx].checked_in = checkin.player.checked_in;
    Ok(())
}

fn add_active_game(state: &mut TournamentState, game: ActiveGame) {
    let games = Arc::make_mut(&mut state.active_games);
    games.retain(|g| g.game_id != game.game_id);
    games.push(game);
}

fn remove_active_games(state: &mut TournamentState, ended: impl Fn(&ActiveGame) -> bool) {
    if state.active_games.iter().any(&ended) {
        Arc::make_mut(&mut state.active_games).retain(|g| !ended(g));
    }
}

fn update_monitoring(state: &mut TournamentState, update: MonitoringStreamUpdate) {
    let entry = Arc::make_mut(&mut state.monitoring_data)
        .entry(update.user_id)
        .or_default();
    entry.username = update.username;
    let stream = match update.stream {
        StreamKind::Camera => &mut entry.camera,
        StreamKind::Screenshot => &mut entry.screenshot,
    };
    stream.stream_key = update.stream_key;
    stream.status = update.status;
}

fn record_game_result(state: &mut TournamentState, summary: GameSummary) {
    remove_active_games(state, |g| g.game_id == summary.game_id);
    let games = Arc::make_mut(&mut state.finished_games);
    games.insert(0, summary);
    games.truncate(MAX_FINISHED_GAMES);
}
