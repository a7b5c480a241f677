// Snake-order generation and turn ownership.

use super::state::DraftError;
use super::TeamId;

/// Generate the full pick order for a snake draft.
///
/// Round 1 follows `draft_order` as given; every even round reverses it, so
/// the team picking last in an odd round picks first in the next one. The
/// result has length `draft_order.len() * total_rounds`.
///
/// Errors on an empty team list or zero rounds: there is no meaningful
/// order for either.
pub fn snake_order(draft_order: &[TeamId], total_rounds: u32) -> Result<Vec<TeamId>, DraftError> {
    if draft_order.is_empty() {
        return Err(DraftError::InvalidOrder("draft order is empty".into()));
    }
    if total_rounds == 0 {
        return Err(DraftError::InvalidOrder("total_rounds must be at least 1".into()));
    }

    let mut sequence = Vec::with_capacity(draft_order.len() * total_rounds as usize);
    for round in 1..=total_rounds {
        if round % 2 == 1 {
            sequence.extend(draft_order.iter().cloned());
        } else {
            sequence.extend(draft_order.iter().rev().cloned());
        }
    }
    Ok(sequence)
}

/// The team entitled to pick at (`round`, `pick`), both 1-indexed.
///
/// Odd rounds read `draft_order` forward (`order[pick-1]`); even rounds read
/// it backward (`order[len - pick]`). This is the canonical owner formula --
/// the full sequence from [`snake_order`] never needs to be materialized to
/// answer "whose turn is it".
///
/// Returns `None` when `pick` is 0 or exceeds the team count.
pub fn turn_owner(draft_order: &[TeamId], round: u32, pick: u32) -> Option<&TeamId> {
    let count = draft_order.len() as u32;
    if pick == 0 || pick > count {
        return None;
    }
    let idx = if round % 2 == 1 {
        pick - 1
    } else {
        count - pick
    };
    draft_order.get(idx as usize)
}

/// Zero-based index of (`round`, `pick`) in the full pick sequence.
pub fn overall_index(team_count: usize, round: u32, pick: u32) -> usize {
    (round as usize - 1) * team_count + (pick as usize - 1)
}
