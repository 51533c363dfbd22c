// Integration tests for tournament reconciliation.
//
// These drive the public API with wire-format JSON messages, the same way
// the client feeds them, and check the resulting state and the logged-in
// competitor's status after each step.

use std::sync::Arc;

use serde_json::{json, Value};

use tourney_core::dispatch::{reduce, DispatchError};
use tourney_core::model::{Division, TournamentState, READY};
use tourney_core::pairings::{find_opponent_idx, get_pairing};
use tourney_core::protocol::TournamentMessage;
use tourney_core::status::{competitor_status, CompetitorStatus, LoginIdentity, StatusCache};

// ===========================================================================
// Test helpers
// ===========================================================================

fn message(value: Value) -> TournamentMessage {
    serde_json::from_value(value).expect("fixture message should parse")
}

fn apply(state: &TournamentState, value: Value) -> TournamentState {
    reduce(state, message(value)).expect("message should apply")
}

fn ann() -> LoginIdentity {
    LoginIdentity::new("u1", "ann")
}

fn bob() -> LoginIdentity {
    LoginIdentity::new("u2", "bob")
}

fn status_of(state: &TournamentState, login: &LoginIdentity) -> CompetitorStatus {
    competitor_status(state, login).status
}

fn person(id: &str, checked_in: bool) -> Value {
    json!({"id": id, "rating": 1500, "checkedIn": checked_in})
}

fn round_controls(n: u32) -> Value {
    Value::Array(
        (0..n)
            .map(|round| json!({"round": round, "pairingMethod": "ROUND_ROBIN", "gamesPerRound": 1}))
            .collect(),
    )
}

fn metadata_set() -> Value {
    json!({
        "type": "METADATA_SET",
        "payload": {
            "metadata": {"id": "t1", "name": "Spring Open", "type": "STANDARD", "checkinsOpen": true},
            "directors": ["d1:director"]
        }
    })
}

/// Two divisions, not started. CSW does not yet include ann.
fn snapshot() -> Value {
    json!({
        "type": "DIVISIONS_SNAPSHOT",
        "payload": {
            "started": false,
            "divisions": {
                "CSW": {
                    "id": "t1",
                    "division": "CSW",
                    "players": [person("u2:bob", true), person("u3:cat", true), person("u4:dan", true)],
                    "roundControls": round_controls(3),
                    "currentRound": -1
                },
                "NWL": {
                    "id": "t1",
                    "division": "NWL",
                    "players": [person("u5:eve", true), person("u6:fay", true)],
                    "roundControls": round_controls(2),
                    "currentRound": -1
                }
            }
        }
    })
}

/// Every non-empty slot's opponent points back at it with the same pairing.
fn assert_symmetric(division: &Division) {
    for round in &division.pairings {
        for (idx, slot) in round.slots.iter().enumerate() {
            let Some(pairing) = slot else { continue };
            let opp = find_opponent_idx(&round.slots, idx, &division.player_index_map)
                .expect("paired player must have an opponent");
            let back = round.slots[opp].as_ref().expect("opponent slot must be filled");
            assert!(Arc::ptr_eq(pairing, back));
        }
    }
}

fn assert_shape(division: &Division) {
    assert_eq!(division.pairings.len(), division.round_controls.len());
    for round in &division.pairings {
        assert_eq!(round.slots.len(), division.players.len());
    }
}

// ===========================================================================
// End-to-end scenario
// ===========================================================================

#[test]
fn checkin_through_ready_scenario() {
    let state = TournamentState::default();
    assert_eq!(status_of(&state, &ann()), CompetitorStatus::Pretourney);

    // Not on the allow-list, dropped before the snapshot.
    let state = apply(
        &state,
        json!({"type": "PAIRINGS_SET", "payload": {"division": "CSW", "pairings": [{"players": [0, 1], "round": 0}]}}),
    );
    assert!(state.divisions.is_empty());

    let state = apply(&state, metadata_set());
    let state = apply(&state, snapshot());
    assert!(state.initialized_from_xhr);
    assert_eq!(state.divisions.len(), 2);
    let cs = competitor_status(&state, &ann());
    assert!(!cs.is_registered);
    assert_eq!(cs.status, CompetitorStatus::Pretourney);

    // ann registers but has not checked in.
    let state = apply(
        &state,
        json!({
            "type": "PLAYERS_CHANGED",
            "payload": {
                "division": "CSW",
                "players": [person("u2:bob", true), person("u3:cat", true), person("u4:dan", true), person("u1:ann", false)]
            }
        }),
    );
    let cs = competitor_status(&state, &ann());
    assert!(cs.is_registered);
    assert_eq!(cs.division.as_deref(), Some("CSW"));
    assert_eq!(cs.status, CompetitorStatus::NotCheckedIn);

    let state = apply(
        &state,
        json!({"type": "PLAYER_CHECKIN", "payload": {"division": "CSW", "player": person("u1:ann", true)}}),
    );
    assert_eq!(status_of(&state, &ann()), CompetitorStatus::Pretourney);

    let state = apply(
        &state,
        json!({"type": "ROUND_STARTED", "payload": {"tournamentId": "t1", "division": "CSW", "round": 0}}),
    );
    assert!(state.started);
    let state = apply(
        &state,
        json!({
            "type": "PAIRINGS_SET",
            "payload": {
                "division": "CSW",
                "pairings": [
                    {"players": [3, 0], "round": 0},
                    {"players": [1, 2], "round": 0}
                ]
            }
        }),
    );
    assert_eq!(status_of(&state, &ann()), CompetitorStatus::RoundOpen);
    assert_eq!(status_of(&state, &bob()), CompetitorStatus::RoundOpen);

    let state = apply(
        &state,
        json!({"type": "READY_TOGGLED", "payload": {"division": "CSW", "round": 0, "playerId": "u1:ann"}}),
    );
    assert_eq!(status_of(&state, &ann()), CompetitorStatus::RoundReady);
    assert_eq!(status_of(&state, &bob()), CompetitorStatus::RoundOpponentWaiting);
    let csw = state.division("CSW").unwrap();
    let pairing = get_pairing(csw, 0, "u1:ann").unwrap();
    assert_eq!(pairing.ready_states, [READY.to_string(), String::new()]);

    let state = apply(
        &state,
        json!({
            "type": "ACTIVE_GAME_ADDED",
            "payload": {
                "gameId": "g1",
                "players": [{"username": "ann", "rating": "1500"}, {"username": "bob", "rating": "1500"}],
                "division": "CSW",
                "round": 0
            }
        }),
    );
    assert_eq!(status_of(&state, &ann()), CompetitorStatus::RoundGameActive);

    let state = apply(
        &state,
        json!({
            "type": "PAIRINGS_SET",
            "payload": {
                "division": "CSW",
                "pairings": [{
                    "players": [3, 0],
                    "round": 0,
                    "outcomes": ["WIN", "LOSS"],
                    "games": [{"scores": [451, 390], "results": ["WIN", "LOSS"], "gameEndReason": "STANDARD", "id": "g1"}]
                }],
                "standingsByRound": {"0": {"standings": [{"playerId": "u1:ann", "wins": 1}]}}
            }
        }),
    );
    assert!(state.active_games.is_empty());
    assert_eq!(status_of(&state, &ann()), CompetitorStatus::RoundGameFinished);

    let csw = state.division("CSW").unwrap();
    assert_shape(csw);
    assert_symmetric(csw);
    assert_eq!(csw.standings_by_round[&0].standings[0].player_id, "u1:ann");
}

// ===========================================================================
// Properties
// ===========================================================================

#[test]
fn replaying_the_same_feed_is_deterministic() {
    let feed = [
        metadata_set(),
        snapshot(),
        json!({"type": "ROUND_STARTED", "payload": {"tournamentId": "t1", "division": "NWL", "round": 0}}),
        json!({"type": "PAIRINGS_SET", "payload": {"division": "NWL", "pairings": [{"players": [0, 1], "round": 0}]}}),
        json!({"type": "PAIRINGS_SET", "payload": {"division": "NWL", "pairings": [{"players": [0, 0], "round": 1, "outcomes": ["BYE", "BYE"]}]}}),
    ];
    let run = || {
        feed.iter()
            .fold(TournamentState::default(), |s, m| apply(&s, m.clone()))
    };
    let a = run();
    let b = run();
    assert_eq!(a, b);
    let nwl = a.division("NWL").unwrap();
    assert_shape(nwl);
    assert_symmetric(nwl);
}

#[test]
fn repairing_clears_stale_opponents_and_keeps_symmetry() {
    let state = apply(&apply(&TournamentState::default(), metadata_set()), snapshot());
    let state = apply(
        &state,
        json!({"type": "ROUND_STARTED", "payload": {"tournamentId": "t1", "division": "CSW", "round": 0}}),
    );
    let state = apply(
        &state,
        json!({"type": "PAIRINGS_SET", "payload": {"division": "CSW", "pairings": [{"players": [0, 1], "round": 0}, {"players": [2, 2], "round": 0, "outcomes": ["BYE", "BYE"]}]}}),
    );
    // Director repairs: bob vs dan, cat gets the bye.
    let state = apply(
        &state,
        json!({"type": "PAIRINGS_SET", "payload": {"division": "CSW", "pairings": [{"players": [0, 2], "round": 0}, {"players": [1, 1], "round": 0, "outcomes": ["BYE", "BYE"]}]}}),
    );
    let csw = state.division("CSW").unwrap();
    assert_symmetric(csw);
    let cat = get_pairing(csw, 0, "u3:cat").unwrap();
    assert!(cat.is_self_pairing());
    let bob = get_pairing(csw, 0, "u2:bob").unwrap();
    assert_eq!(bob.players[1].id, "u4:dan");
}

#[test]
fn roster_growth_mid_tournament_preserves_existing_pairings() {
    let state = apply(&apply(&TournamentState::default(), metadata_set()), snapshot());
    let state = apply(
        &state,
        json!({"type": "ROUND_STARTED", "payload": {"tournamentId": "t1", "division": "CSW", "round": 0}}),
    );
    let state = apply(
        &state,
        json!({"type": "PAIRINGS_SET", "payload": {"division": "CSW", "pairings": [{"players": [0, 1], "round": 0}]}}),
    );
    let before = state.division("CSW").unwrap().clone();
    let state = apply(
        &state,
        json!({
            "type": "PLAYERS_CHANGED",
            "payload": {
                "division": "CSW",
                "players": [person("u2:bob", true), person("u3:cat", true), person("u4:dan", true), person("u1:ann", true)],
                "pairings": [{"players": [2, 3], "round": 0}]
            }
        }),
    );
    let csw = state.division("CSW").unwrap();
    assert_shape(csw);
    assert_symmetric(csw);
    assert_eq!(csw.pairings[0].slots[0], before.pairings[0].slots[0]);
    assert_eq!(
        get_pairing(csw, 0, "u1:ann").unwrap().players[0].id,
        "u4:dan"
    );
}

#[test]
fn deleting_a_round_restores_empty_slots() {
    let state = apply(&apply(&TournamentState::default(), metadata_set()), snapshot());
    let untouched = state.division("NWL").unwrap().pairings[1].clone();
    let state = apply(
        &state,
        json!({"type": "ROUND_STARTED", "payload": {"tournamentId": "t1", "division": "NWL", "round": 0}}),
    );
    let state = apply(
        &state,
        json!({"type": "PAIRINGS_SET", "payload": {"division": "NWL", "pairings": [{"players": [0, 1], "round": 1}]}}),
    );
    let state = apply(
        &state,
        json!({"type": "PAIRINGS_DELETED", "payload": {"division": "NWL", "round": 1}}),
    );
    assert_eq!(state.division("NWL").unwrap().pairings[1], untouched);
}

#[test]
fn cop_schedule_in_first_half_is_rejected() {
    let state = apply(&apply(&TournamentState::default(), metadata_set()), snapshot());
    let err = reduce(
        &state,
        message(json!({
            "type": "ROUND_CONTROLS_SET",
            "payload": {
                "division": "CSW",
                "roundControls": [
                    {"round": 0, "pairingMethod": "ROUND_ROBIN"},
                    {"round": 1, "pairingMethod": "COP"},
                    {"round": 2, "pairingMethod": "COP"},
                    {"round": 3, "pairingMethod": "COP"}
                ]
            }
        })),
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::RoundControls { .. }));
}

#[test]
fn unknown_division_after_snapshot_is_fatal() {
    let state = apply(&TournamentState::default(), snapshot());
    let err = reduce(
        &state,
        message(json!({"type": "PAIRINGS_DELETED", "payload": {"division": "OSPD", "round": 0}})),
    )
    .unwrap_err();
    assert_eq!(err, DispatchError::UnknownDivision("OSPD".into()));
}

#[test]
fn status_cache_follows_state_changes() {
    let mut cache = StatusCache::new();
    let state = Arc::new(apply(&apply(&TournamentState::default(), metadata_set()), snapshot()));
    assert_eq!(cache.get(&state, &bob()).status, CompetitorStatus::Pretourney);

    let next = Arc::new(apply(
        &state,
        json!({"type": "ROUND_STARTED", "payload": {"tournamentId": "t1", "division": "CSW", "round": 0}}),
    ));
    let next = Arc::new(apply(
        &next,
        json!({"type": "PAIRINGS_SET", "payload": {"division": "CSW", "pairings": [{"players": [0, 1], "round": 0}]}}),
    ));
    assert!(!cache.is_cached(&next, &bob()));
    assert_eq!(cache.get(&next, &bob()).status, CompetitorStatus::RoundOpen);
    assert!(cache.is_cached(&next, &bob()));
}
