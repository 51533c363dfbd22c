// Round-keyed standings merge.

use crate::model::StandingsByRound;

/// Right-biased merge: every round in `incoming` replaces the same round in
/// `existing` wholesale; rounds absent from `incoming` are kept.
pub fn reduce_standings(existing: &StandingsByRound, incoming: &StandingsByRound) -> StandingsByRound {
    let mut merged = existing.clone();
    merged.extend(incoming.iter().map(|(round, s)| (*round, s.clone())));
    merged
}
