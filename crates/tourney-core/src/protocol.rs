// Message schema shared with the server.
//
// Every frame is a JSON object `{"type": "...", "payload": {...}}`. The set of
// message kinds is closed; an unknown `type` fails to deserialize.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    ActiveGame, DivisionControls, Game, GameResult, GameSummary, MonitoringData, Person,
    RoundControl, StandingsByRound, StreamKind, StreamStatus, TournamentMetadata, TournamentType,
};

/// A pairing as sent by the server: player slots are indices into the
/// division's player list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    pub players: [usize; 2],
    pub round: u32,
    #[serde(default)]
    pub outcomes: [GameResult; 2],
    #[serde(default)]
    pub ready_states: [String; 2],
    #[serde(default)]
    pub games: Vec<Game>,
}

/// Full bulk state of one division.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DivisionSnapshot {
    /// Tournament id.
    pub id: String,
    pub division: String,
    pub players: Vec<Person>,
    pub standings_by_round: StandingsByRound,
    pub pairing_map: BTreeMap<String, Pairing>,
    pub controls: DivisionControls,
    pub round_controls: Vec<RoundControl>,
    pub current_round: i32,
}

/// Full bulk state of every division in the tournament.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub started: bool,
    pub divisions: BTreeMap<String, DivisionSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataSet {
    pub metadata: TournamentMetadata,
    pub directors: Vec<String>,
}

/// The subset of metadata club and child tournaments broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReducedMetadata {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TournamentType,
    pub slug: String,
    pub logo: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionRef {
    pub id: String,
    pub division: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundControlsSet {
    pub division: String,
    pub round_controls: Vec<RoundControl>,
    pub pairings: Vec<Pairing>,
    pub standings_by_round: StandingsByRound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DivisionControlsSet {
    pub division: String,
    pub controls: DivisionControls,
    pub standings_by_round: StandingsByRound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PairingsSet {
    pub division: String,
    pub pairings: Vec<Pairing>,
    pub standings_by_round: StandingsByRound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingsDeleted {
    pub division: String,
    pub round: u32,
}

/// The division's complete new roster, plus any pairings and standings the
/// server recomputed as a consequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayersChanged {
    pub division: String,
    pub players: Vec<Person>,
    pub pairings: Vec<Pairing>,
    pub standings_by_round: StandingsByRound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStarted {
    pub tournament_id: String,
    pub division: String,
    pub round: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyToggled {
    pub division: String,
    pub round: u32,
    pub player_id: String,
    #[serde(default)]
    pub unready: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCheckin {
    pub division: String,
    pub player: Person,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentFinished {
    pub tournament_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveGamesSet {
    pub games: Vec<ActiveGame>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGameRemoved {
    pub game_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringDataSet {
    /// Keyed by user id.
    pub data: BTreeMap<String, MonitoringData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStreamUpdate {
    pub user_id: String,
    pub username: String,
    pub stream: StreamKind,
    #[serde(default)]
    pub stream_key: String,
    pub status: StreamStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentGames {
    pub games: Vec<GameSummary>,
}

/// Every message the server can send about a tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentMessage {
    DivisionsSnapshot(Snapshot),
    MetadataSet(MetadataSet),
    ReducedMetadataSet(ReducedMetadata),
    DivisionAdded(DivisionRef),
    DivisionRemoved(DivisionRef),
    RoundControlsSet(RoundControlsSet),
    DivisionControlsSet(DivisionControlsSet),
    PairingsSet(PairingsSet),
    PairingsDeleted(PairingsDeleted),
    PlayersChanged(PlayersChanged),
    RoundStarted(RoundStarted),
    ReadyToggled(ReadyToggled),
    PlayerCheckin(PlayerCheckin),
    TournamentFinished(TournamentFinished),
    ActiveGamesSet(ActiveGamesSet),
    ActiveGameAdded(ActiveGame),
    ActiveGameRemoved(ActiveGameRemoved),
    MonitoringDataSet(MonitoringDataSet),
    MonitoringStreamUpdated(MonitoringStreamUpdate),
    LegacyGameStarted(ActiveGame),
    LegacyGameResult(GameSummary),
    LegacyRecentGamesSet(RecentGames),
}

impl TournamentMessage {
    /// Every wire `type` the client understands.
    pub const KINDS: [&'static str; 22] = [
        "DIVISIONS_SNAPSHOT",
        "METADATA_SET",
        "REDUCED_METADATA_SET",
        "DIVISION_ADDED",
        "DIVISION_REMOVED",
        "ROUND_CONTROLS_SET",
        "DIVISION_CONTROLS_SET",
        "PAIRINGS_SET",
        "PAIRINGS_DELETED",
        "PLAYERS_CHANGED",
        "ROUND_STARTED",
        "READY_TOGGLED",
        "PLAYER_CHECKIN",
        "TOURNAMENT_FINISHED",
        "ACTIVE_GAMES_SET",
        "ACTIVE_GAME_ADDED",
        "ACTIVE_GAME_REMOVED",
        "MONITORING_DATA_SET",
        "MONITORING_STREAM_UPDATED",
        "LEGACY_GAME_STARTED",
        "LEGACY_GAME_RESULT",
        "LEGACY_RECENT_GAMES_SET",
    ];

    /// Short name for logging; matches the wire `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            TournamentMessage::DivisionsSnapshot(_) => "DIVISIONS_SNAPSHOT",
            TournamentMessage::MetadataSet(_) => "METADATA_SET",
            TournamentMessage::ReducedMetadataSet(_) => "REDUCED_METADATA_SET",
            TournamentMessage::DivisionAdded(_) => "DIVISION_ADDED",
            TournamentMessage::DivisionRemoved(_) => "DIVISION_REMOVED",
            TournamentMessage::RoundControlsSet(_) => "ROUND_CONTROLS_SET",
            TournamentMessage::DivisionControlsSet(_) => "DIVISION_CONTROLS_SET",
            TournamentMessage::PairingsSet(_) => "PAIRINGS_SET",
            TournamentMessage::PairingsDeleted(_) => "PAIRINGS_DELETED",
            TournamentMessage::PlayersChanged(_) => "PLAYERS_CHANGED",
            TournamentMessage::RoundStarted(_) => "ROUND_STARTED",
            TournamentMessage::ReadyToggled(_) => "READY_TOGGLED",
            TournamentMessage::PlayerCheckin(_) => "PLAYER_CHECKIN",
            TournamentMessage::TournamentFinished(_) => "TOURNAMENT_FINISHED",
            TournamentMessage::ActiveGamesSet(_) => "ACTIVE_GAMES_SET",
            TournamentMessage::ActiveGameAdded(_) => "ACTIVE_GAME_ADDED",
            TournamentMessage::ActiveGameRemoved(_) => "ACTIVE_GAME_REMOVED",
            TournamentMessage::MonitoringDataSet(_) => "MONITORING_DATA_SET",
            TournamentMessage::MonitoringStreamUpdated(_) => "MONITORING_STREAM_UPDATED",
            TournamentMessage::LegacyGameStarted(_) => "LEGACY_GAME_STARTED",
            TournamentMessage::LegacyGameResult(_) => "LEGACY_GAME_RESULT",
            TournamentMessage::LegacyRecentGamesSet(_) => "LEGACY_RECENT_GAMES_SET",
        }
    }

    /// Whether this message may be applied before the first snapshot.
    pub fn allowed_before_snapshot(&self) -> bool {
        matches!(
            self,
            TournamentMessage::DivisionsSnapshot(_)
                | TournamentMessage::MetadataSet(_)
                | TournamentMessage::ReducedMetadataSet(_)
                | TournamentMessage::ActiveGamesSet(_)
                | TournamentMessage::ActiveGameAdded(_)
                | TournamentMessage::ActiveGameRemoved(_)
                | TournamentMessage::PlayerCheckin(_)
                | TournamentMessage::LegacyGameStarted(_)
                | TournamentMessage::LegacyGameResult(_)
                | TournamentMessage::LegacyRecentGamesSet(_)
        )
    }
}
