// Library root: tournament state model and the reducers that reconcile it
// against the server's message stream.

pub mod controls;
pub mod dispatch;
pub mod model;
pub mod pairings;
pub mod protocol;
pub mod snapshot;
pub mod standings;
pub mod status;

pub use dispatch::{reduce, DispatchError};
pub use model::TournamentState;
pub use protocol::TournamentMessage;
pub use status::{competitor_status, CompetitorState, CompetitorStatus, LoginIdentity, StatusCache};
