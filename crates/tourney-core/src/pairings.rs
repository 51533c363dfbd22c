// Pairing grid reconciliation.
//
// The grid holds, for every round, one slot per player index. Both slots of a
// pairing point at the same `Arc<SinglePairing>`, and a player never sits in
// two live pairings of the same round.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{Division, PairingGrid, PairingSlot, Person, RoundPairings, SinglePairing};
use crate::protocol::Pairing;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("pairing for round {round} but the division has {num_rounds} rounds")]
    RoundOutOfRange { round: u32, num_rounds: usize },

    #[error("pairing references player index {index} but the division has {num_players} players")]
    PlayerIndexOutOfRange { index: usize, num_players: usize },
}

/// A grid of `num_rounds` rounds with `num_players` empty slots each.
pub fn empty_grid(num_rounds: usize, num_players: usize) -> PairingGrid {
    (0..num_rounds)
        .map(|_| Arc::new(RoundPairings::empty(num_players)))
        .collect()
}

/// Index of the opponent currently recorded for `player_idx` in one round.
///
/// Returns the player's own index for a self-pairing and `None` when the
/// slot is empty.
pub fn find_opponent_idx(
    slots: &[PairingSlot],
    player_idx: usize,
    player_index_map: &HashMap<String, usize>,
) -> Option<usize> {
    let pairing = slots.get(player_idx)?.as_ref()?;
    match pairing
        .players
        .iter()
        .find(|p| player_index_map.get(&p.id) != Some(&player_idx))
    {
        Some(opponent) => player_index_map.get(&opponent.id).copied(),
        None => Some(player_idx),
    }
}

/// Merge incoming pairings into the grid, returning a new grid.
///
/// Any pairing a player was previously in for the same round is cleared from
/// both of its slots before the new pairing is written, so stale opponents
/// end up unpaired rather than double-booked. Rounds that no incoming pairing
/// touches are shared with `grid`.
pub fn reduce_pairings(
    players: &[Person],
    player_index_map: &HashMap<String, usize>,
    grid: &PairingGrid,
    new_pairings: &[Pairing],
) -> Result<PairingGrid, PairingError> {
    let mut next = grid.clone();
    for pairing in new_pairings {
        check_bounds(&next, players.len(), pairing)?;
        let [a, b] = pairing.players;
        let slots = &mut Arc::make_mut(&mut next[pairing.round as usize]).slots;
        for (me, counterpart) in [(a, b), (b, a)] {
            let Some(old_opponent) = find_opponent_idx(slots, me, player_index_map) else {
                continue;
            };
            if old_opponent != counterpart {
                clear_pairing(slots, me, old_opponent);
            }
        }
        place(slots, players, pairing);
    }
    Ok(next)
}

/// Write a pairing into both of its slots without touching any other slot.
///
/// Used for snapshots, which are internally consistent and need no
/// stale-opponent clearing.
pub fn write_pairing(
    grid: &mut PairingGrid,
    players: &[Person],
    pairing: &Pairing,
) -> Result<(), PairingError> {
    check_bounds(grid, players.len(), pairing)?;
    let slots = &mut Arc::make_mut(&mut grid[pairing.round as usize]).slots;
    place(slots, players, pairing);
    Ok(())
}

/// Empty every slot of one round.
pub fn delete_pairings(grid: &PairingGrid, round: u32) -> Result<PairingGrid, PairingError> {
    let idx = round as usize;
    let Some(existing) = grid.get(idx) else {
        return Err(PairingError::RoundOutOfRange {
            round,
            num_rounds: grid.len(),
        });
    };
    let mut next = grid.clone();
    next[idx] = Arc::new(RoundPairings::empty(existing.slots.len()));
    Ok(next)
}

/// Deep-copy the grid so that nothing in the result aliases `grid`.
///
/// Symmetry survives the copy: the two slots of one pairing point at the
/// same new allocation.
pub fn copy_pairings(grid: &PairingGrid) -> PairingGrid {
    grid.iter()
        .map(|round| {
            let mut copies: HashMap<*const SinglePairing, Arc<SinglePairing>> = HashMap::new();
            let slots = round
                .slots
                .iter()
                .map(|slot| {
                    slot.as_ref().map(|pairing| {
                        copies
                            .entry(Arc::as_ptr(pairing))
                            .or_insert_with(|| Arc::new(SinglePairing::clone(pairing)))
                            .clone()
                    })
                })
                .collect();
            Arc::new(RoundPairings { slots })
        })
        .collect()
}

/// Append `added` empty slots to every round. Existing indices are kept.
pub fn expand_pairings(grid: &PairingGrid, added: usize) -> PairingGrid {
    grid.iter()
        .map(|round| {
            let mut slots = round.slots.clone();
            slots.resize(slots.len() + added, None);
            Arc::new(RoundPairings { slots })
        })
        .collect()
}

/// The pairing a player is in for a given round, if any.
pub fn get_pairing(division: &Division, round: u32, player_id: &str) -> Option<Arc<SinglePairing>> {
    let idx = division.player_index(player_id)?;
    division
        .pairings
        .get(round as usize)?
        .slots
        .get(idx)?
        .clone()
}

fn check_bounds(grid: &PairingGrid, num_players: usize, pairing: &Pairing) -> Result<(), PairingError> {
    let round = pairing.round as usize;
    if round >= grid.len() {
        return Err(PairingError::RoundOutOfRange {
            round: pairing.round,
            num_rounds: grid.len(),
        });
    }
    let slot_count = grid[round].slots.len();
    if let Some(&index) = pairing.players.iter().find(|&&i| i >= num_players.min(slot_count)) {
        return Err(PairingError::PlayerIndexOutOfRange { index, num_players });
    }
    Ok(())
}

fn clear_pairing(slots: &mut [PairingSlot], player_idx: usize, opponent_idx: usize) {
    let stale = slots[player_idx].take();
    let opponent_holds_stale = match (&stale, &slots[opponent_idx]) {
        (Some(s), Some(o)) => Arc::ptr_eq(s, o),
        _ => false,
    };
    if opponent_holds_stale {
        slots[opponent_idx] = None;
    }
}

fn place(slots: &mut [PairingSlot], players: &[Person], pairing: &Pairing) {
    let [a, b] = pairing.players;
    let single = Arc::new(SinglePairing {
        players: [players[a].clone(), players[b].clone()],
        outcomes: pairing.outcomes,
        ready_states: pairing.ready_states.clone(),
        games: pairing.games.clone(),
    });
    slots[a] = Some(Arc::clone(&single));
    slots[b] = Some(single);
}
