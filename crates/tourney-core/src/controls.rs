// Round control overlay and validation.

use thiserror::Error;

use crate::model::{PairingMethod, RoundControl};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundControlError {
    #[error("round control for round {round} but the division has {num_rounds} rounds")]
    RoundOutOfRange { round: u32, num_rounds: usize },

    #[error("COP must be assigned to one contiguous range of rounds, found {ranges}")]
    CopNotContiguous { ranges: usize },

    #[error("COP range starts at round {begin_round} but may only start after round {halfway}")]
    CopStartsTooEarly { begin_round: usize, halfway: usize },
}

/// Check that COP, if used at all, covers a single contiguous range whose
/// first (1-indexed) round is strictly after the halfway point.
pub fn validate_round_controls(controls: &[RoundControl]) -> Result<(), RoundControlError> {
    let mut cop_runs: Vec<(usize, usize)> = Vec::new();
    for (idx, control) in controls.iter().enumerate() {
        if control.pairing_method != PairingMethod::Cop {
            continue;
        }
        match cop_runs.last_mut() {
            Some((_, last)) if *last + 1 == idx => *last = idx,
            _ => cop_runs.push((idx, idx)),
        }
    }

    match cop_runs.as_slice() {
        [] => Ok(()),
        [(first, _)] => {
            let begin_round = first + 1;
            let halfway = controls.len().div_ceil(2);
            if begin_round <= halfway {
                Err(RoundControlError::CopStartsTooEarly {
                    begin_round,
                    halfway,
                })
            } else {
                Ok(())
            }
        }
        runs => Err(RoundControlError::CopNotContiguous { ranges: runs.len() }),
    }
}

/// Replace only the rounds named by `updates` (via their `round` field),
/// keeping every other round's control.
pub fn overlay_round_controls(
    existing: &[RoundControl],
    updates: &[RoundControl],
) -> Result<Vec<RoundControl>, RoundControlError> {
    let mut merged = existing.to_vec();
    for update in updates {
        let slot = merged
            .get_mut(update.round as usize)
            .ok_or(RoundControlError::RoundOutOfRange {
                round: update.round,
                num_rounds: existing.len(),
            })?;
        *slot = update.clone();
    }
    Ok(merged)
}
