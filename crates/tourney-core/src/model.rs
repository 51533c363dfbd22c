// Entity model: players, pairings, round controls, standings, divisions and
// the aggregate tournament state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Ready-state marker written into a pairing slot when that player is ready.
pub const READY: &str = "ready";

/// `current_round` value of a division whose first round has not started.
pub const NOT_STARTED_ROUND: i32 = -1;

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// A registered competitor within one division.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Composite identifier, `"uuid:username"`.
    pub id: String,
    #[serde(default)]
    pub rating: i32,
    #[serde(default)]
    pub checked_in: bool,
    #[serde(default)]
    pub suspended: bool,
}

impl Person {
    /// The user id half of the composite id.
    pub fn user_id(&self) -> &str {
        self.id.split_once(':').map(|(uid, _)| uid).unwrap_or(&self.id)
    }

    /// The username half of the composite id. Falls back to the whole id
    /// when the id carries no separator.
    pub fn username(&self) -> &str {
        self.id.split_once(':').map(|(_, name)| name).unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Games and pairings
// ---------------------------------------------------------------------------

/// Per-player result of a pairing or a single game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameResult {
    #[default]
    NoResult,
    Win,
    Loss,
    Draw,
    Bye,
    ForfeitWin,
    ForfeitLoss,
    Aborted,
    Void,
}

/// Why a game ended. `None` means the game has not ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEndReason {
    #[default]
    None,
    Time,
    Standard,
    ConsecutiveZeroes,
    Resigned,
    Aborted,
    TripleChallenge,
    Cancelled,
    ForceForfeit,
}

impl GameEndReason {
    pub fn has_ended(self) -> bool {
        self != GameEndReason::None
    }
}

/// One game played within a pairing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(default)]
    pub scores: Vec<i32>,
    #[serde(default)]
    pub results: Vec<GameResult>,
    #[serde(default)]
    pub game_end_reason: GameEndReason,
    #[serde(default)]
    pub id: String,
}

/// A reconciled pairing. Always two player slots; a self-pairing (both slots
/// holding the same person) represents a bye or forfeit. `outcomes` and
/// `ready_states` are indexed in parallel with `players`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinglePairing {
    pub players: [Person; 2],
    pub outcomes: [GameResult; 2],
    pub ready_states: [String; 2],
    pub games: Vec<Game>,
}

impl SinglePairing {
    pub fn is_self_pairing(&self) -> bool {
        self.players[0].id == self.players[1].id
    }

    /// Slot (0 or 1) occupied by the given player id.
    pub fn slot_of(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }
}

/// One grid cell: the pairing a player is in, or nothing.
pub type PairingSlot = Option<Arc<SinglePairing>>;

/// All pairings of one round, one slot per player index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundPairings {
    pub slots: Vec<PairingSlot>,
}

impl RoundPairings {
    pub fn empty(num_players: usize) -> Self {
        RoundPairings {
            slots: vec![None; num_players],
        }
    }
}

/// Per-round pairing grid; index = round. Rounds are shared between
/// successive states until one of them is written.
pub type PairingGrid = Vec<Arc<RoundPairings>>;

// ---------------------------------------------------------------------------
// Round controls
// ---------------------------------------------------------------------------

/// How the server pairs a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairingMethod {
    #[default]
    Random,
    RoundRobin,
    KingOfTheHill,
    Elimination,
    Factor,
    InitialFontes,
    Swiss,
    Quickpair,
    Manual,
    TeamRoundRobin,
    InterleavedRoundRobin,
    Cop,
}

impl PairingMethod {
    fn uses_factor(self) -> bool {
        matches!(self, PairingMethod::Factor | PairingMethod::InitialFontes)
    }

    fn uses_repeat_weights(self) -> bool {
        matches!(
            self,
            PairingMethod::Swiss
                | PairingMethod::Factor
                | PairingMethod::KingOfTheHill
                | PairingMethod::Quickpair
                | PairingMethod::Cop
        )
    }
}

/// Pairing-method configuration for one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundControl {
    /// Zero-indexed round this control applies to.
    pub round: u32,
    pub pairing_method: PairingMethod,
    pub games_per_round: u32,
    pub factor: u32,
    pub max_repeats: u32,
    pub allow_over_max_repeats: bool,
    pub repeat_relative_weight: u32,
    pub win_difference_relative_weight: u32,
    // COP-only settings.
    pub gibson_spreads: Vec<i32>,
    pub hopefulness_thresholds: Vec<f64>,
    pub place_prizes: u32,
    pub control_loss_activation_round: u32,
    pub division_sims: u32,
    pub control_loss_sims: u32,
    pub control_loss_threshold: f64,
}

impl RoundControl {
    /// Compare two controls on the fields that matter for their pairing
    /// method. The `round` field is not a setting and is never compared.
    pub fn settings_eq(&self, other: &RoundControl) -> bool {
        if self.pairing_method != other.pairing_method
            || self.games_per_round != other.games_per_round
        {
            return false;
        }
        let method = self.pairing_method;
        if method.uses_factor() && self.factor != other.factor {
            return false;
        }
        if method.uses_repeat_weights()
            && (self.max_repeats != other.max_repeats
                || self.allow_over_max_repeats != other.allow_over_max_repeats
                || self.repeat_relative_weight != other.repeat_relative_weight
                || self.win_difference_relative_weight != other.win_difference_relative_weight)
        {
            return false;
        }
        if method == PairingMethod::Cop {
            return self.gibson_spreads == other.gibson_spreads
                && self.hopefulness_thresholds == other.hopefulness_thresholds
                && self.place_prizes == other.place_prizes
                && self.control_loss_activation_round == other.control_loss_activation_round
                && self.division_sims == other.division_sims
                && self.control_loss_sims == other.control_loss_sims
                && self.control_loss_threshold == other.control_loss_threshold;
        }
        true
    }
}

/// Division-wide pairing and scoring settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DivisionControls {
    pub gibsonize: bool,
    pub gibson_spread: i32,
    pub minimum_placement: u32,
    pub maximum_bye_placement: u32,
    pub suspended_result: GameResult,
    pub suspended_spread: i32,
    pub auto_start: bool,
    pub spread_cap: u32,
}

// ---------------------------------------------------------------------------
// Standings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerStanding {
    pub player_id: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub spread: i32,
    pub gibsonized: bool,
}

/// Standings after one round, ordered by rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Standings {
    pub standings: Vec<PlayerStanding>,
}

pub type StandingsByRound = BTreeMap<u32, Standings>;

// ---------------------------------------------------------------------------
// Division
// ---------------------------------------------------------------------------

/// An independently paired and scored sub-bracket of a tournament.
///
/// `pairings.len() == round_controls.len()` and every round has one slot per
/// player; `player_index_map` is the inverse of `players`.
#[derive(Debug, Clone, PartialEq)]
pub struct Division {
    pub tournament_id: String,
    pub division_id: String,
    /// Players in seed order.
    pub players: Vec<Person>,
    pub player_index_map: HashMap<String, usize>,
    pub pairings: PairingGrid,
    pub standings_by_round: StandingsByRound,
    pub division_controls: DivisionControls,
    pub round_controls: Vec<RoundControl>,
    /// Zero-indexed; `NOT_STARTED_ROUND` before the first round.
    pub current_round: i32,
}

impl Division {
    /// An empty division with no players and no rounds.
    pub fn new(tournament_id: &str, division_id: &str) -> Self {
        Division {
            tournament_id: tournament_id.to_string(),
            division_id: division_id.to_string(),
            players: Vec::new(),
            player_index_map: HashMap::new(),
            pairings: Vec::new(),
            standings_by_round: BTreeMap::new(),
            division_controls: DivisionControls::default(),
            round_controls: Vec::new(),
            current_round: NOT_STARTED_ROUND,
        }
    }

    pub fn num_rounds(&self) -> usize {
        self.round_controls.len()
    }

    pub fn player_index(&self, player_id: &str) -> Option<usize> {
        self.player_index_map.get(player_id).copied()
    }

    pub fn player(&self, player_id: &str) -> Option<&Person> {
        self.player_index(player_id).and_then(|idx| self.players.get(idx))
    }

    /// Whether the division's current round is its final one.
    pub fn is_last_round(&self) -> bool {
        self.num_rounds() > 0 && self.current_round == self.num_rounds() as i32 - 1
    }
}

/// Map each player id to its position in `players`.
pub fn build_player_index_map(players: &[Person]) -> HashMap<String, usize> {
    players
        .iter()
        .enumerate()
        .map(|(idx, p)| (p.id.clone(), idx))
        .collect()
}

// ---------------------------------------------------------------------------
// Tournament-level records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentType {
    #[default]
    Standard,
    Club,
    Child,
    Legacy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TournamentMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: TournamentType,
    pub logo: String,
    pub color: String,
    pub private_analysis: bool,
    pub irl_mode: bool,
    pub checkins_open: bool,
    pub registration_open: bool,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivePlayer {
    pub username: String,
    pub rating: String,
}

/// A game currently being played in the tournament.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveGame {
    pub game_id: String,
    pub players: Vec<ActivePlayer>,
    pub ttl: u64,
    pub division: Option<String>,
    pub round: Option<u32>,
}

impl ActiveGame {
    pub fn involves(&self, username: &str) -> bool {
        self.players.iter().any(|p| p.username == username)
    }
}

/// A finished game as reported by legacy club tournaments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSummary {
    pub game_id: String,
    pub players: Vec<String>,
    pub scores: Vec<i32>,
    pub end_reason: GameEndReason,
    /// Index into `players` of the winner, `None` for a tie.
    pub winner: Option<usize>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    #[default]
    NotStarted,
    Pending,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamKind {
    Camera,
    Screenshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringStream {
    pub stream_key: String,
    pub status: StreamStatus,
}

/// Proctoring streams registered by one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringData {
    pub username: String,
    pub camera: MonitoringStream,
    pub screenshot: MonitoringStream,
}

// ---------------------------------------------------------------------------
// Aggregate state
// ---------------------------------------------------------------------------

/// The complete client-side view of one tournament.
///
/// Cloning is cheap: every collection sits behind an `Arc` and is only
/// copied when a reducer writes to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TournamentState {
    pub metadata: Arc<TournamentMetadata>,
    pub directors: Arc<Vec<String>>,
    pub started: bool,
    pub finished: bool,
    pub divisions: Arc<BTreeMap<String, Arc<Division>>>,
    pub active_games: Arc<Vec<ActiveGame>>,
    /// Set by the first full snapshot and never cleared afterwards.
    pub initialized_from_xhr: bool,
    /// Keyed by user id.
    pub monitoring_data: Arc<BTreeMap<String, MonitoringData>>,
    /// Most recent first.
    pub finished_games: Arc<Vec<GameSummary>>,
}

impl TournamentState {
    pub fn division(&self, name: &str) -> Option<&Arc<Division>> {
        self.divisions.get(name)
    }

    /// The division whose roster contains the given composite player id.
    pub fn division_of(&self, player_id: &str) -> Option<&Arc<Division>> {
        self.divisions
            .values()
            .find(|d| d.player_index_map.contains_key(player_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cop_control(round: u32) -> RoundControl {
        RoundControl {
            round,
            pairing_method: PairingMethod::Cop,
            games_per_round: 1,
            gibson_spreads: vec![250, 200],
            hopefulness_thresholds: vec![0.1, 0.1],
            place_prizes: 3,
            division_sims: 100_000,
            control_loss_sims: 10_000,
            control_loss_threshold: 0.25,
            ..Default::default()
        }
    }

    #[test]
    fn person_id_splits_into_user_id_and_username() {
        let p = Person {
            id: "abc123:cesar".into(),
            ..Default::default()
        };
        assert_eq!(p.user_id(), "abc123");
        assert_eq!(p.username(), "cesar");
    }

    #[test]
    fn person_id_without_separator_is_its_own_username() {
        let p = Person {
            id: "cesar".into(),
            ..Default::default()
        };
        assert_eq!(p.username(), "cesar");
        assert_eq!(p.user_id(), "cesar");
    }

    #[test]
    fn settings_eq_ignores_round_index() {
        assert!(cop_control(5).settings_eq(&cop_control(6)));
    }

    #[test]
    fn settings_eq_ignores_cop_fields_for_random() {
        let a = RoundControl {
            pairing_method: PairingMethod::Random,
            division_sims: 10,
            factor: 3,
            ..Default::default()
        };
        let b = RoundControl {
            pairing_method: PairingMethod::Random,
            division_sims: 99,
            factor: 8,
            ..Default::default()
        };
        assert!(a.settings_eq(&b));
    }

    #[test]
    fn settings_eq_compares_factor_for_factor_pairing() {
        let a = RoundControl {
            pairing_method: PairingMethod::Factor,
            factor: 3,
            ..Default::default()
        };
        let b = RoundControl { factor: 4, ..a.clone() };
        assert!(!a.settings_eq(&b));
    }

    #[test]
    fn settings_eq_compares_repeat_weights_for_swiss() {
        let a = RoundControl {
            pairing_method: PairingMethod::Swiss,
            max_repeats: 1,
            ..Default::default()
        };
        let b = RoundControl { max_repeats: 2, ..a.clone() };
        assert!(!a.settings_eq(&b));
    }

    #[test]
    fn settings_eq_compares_cop_fields_for_cop() {
        let a = cop_control(7);
        let b = RoundControl {
            control_loss_threshold: 0.5,
            ..cop_control(7)
        };
        assert!(!a.settings_eq(&b));
    }

    #[test]
    fn different_methods_are_never_equal() {
        let a = RoundControl {
            pairing_method: PairingMethod::Swiss,
            ..Default::default()
        };
        let b = RoundControl {
            pairing_method: PairingMethod::KingOfTheHill,
            ..Default::default()
        };
        assert!(!a.settings_eq(&b));
    }

    #[test]
    fn last_round_detection() {
        let mut d = Division::new("t1", "A");
        assert!(!d.is_last_round());
        d.round_controls = vec![RoundControl::default(); 3];
        d.current_round = 2;
        assert!(d.is_last_round());
        d.current_round = 1;
        assert!(!d.is_last_round());
    }

    #[test]
    fn round_control_deserializes_with_missing_fields() {
        let rc: RoundControl =
            serde_json::from_str(r#"{"round":3,"pairingMethod":"SWISS"}"#).unwrap();
        assert_eq!(rc.round, 3);
        assert_eq!(rc.pairing_method, PairingMethod::Swiss);
        assert_eq!(rc.max_repeats, 0);
    }
}
