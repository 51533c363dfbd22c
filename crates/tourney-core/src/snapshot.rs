// Bulk snapshot normalization.

use crate::model::{build_player_index_map, Division};
use crate::pairings::{empty_grid, write_pairing, PairingError};
use crate::protocol::DivisionSnapshot;

/// Build a normalized division from a bulk snapshot.
///
/// The grid gets one round per round control, each sized to the roster, and
/// every pairing in the snapshot is written into both of its slots. The
/// snapshot is trusted to be internally consistent, so no stale opponents
/// are cleared.
pub fn normalize_division(snapshot: &DivisionSnapshot) -> Result<Division, PairingError> {
    let players = snapshot.players.clone();
    let mut pairings = empty_grid(snapshot.round_controls.len(), players.len());
    for pairing in snapshot.pairing_map.values() {
        write_pairing(&mut pairings, &players, pairing)?;
    }

    Ok(Division {
        tournament_id: snapshot.id.clone(),
        division_id: snapshot.division.clone(),
        player_index_map: build_player_index_map(&players),
        players,
        pairings,
        standings_by_round: snapshot.standings_by_round.clone(),
        division_controls: snapshot.controls.clone(),
        round_controls: snapshot.round_controls.clone(),
        current_round: snapshot.current_round,
    })
}
