// Client-side draft projection: a snapshot kept current by applying the
// room's event stream, with duplicate and gap detection.

use thiserror::Error;

use crate::draft::state::{Draft, DraftStatus, PickRecord};
use crate::protocol::DraftEvent;

/// The event stream skipped ahead of the local projection: at least one
/// pick-bearing event was missed. The caller must refetch a snapshot and
/// [`ClientSyncAdapter::resync`] rather than guess at the missing picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event stream gap: expected pick index {expected}, event implies {observed}")]
pub struct SyncGap {
    pub expected: usize,
    pub observed: usize,
}

/// What applying one event did to the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A pick-bearing event advanced the projection by one turn.
    Advanced,
    /// The event was already reflected (snapshot overlap or redelivery).
    Duplicate,
    /// A status-only event was folded in.
    Status,
}

/// Reconciles one subscriber's local view with the authoritative stream.
///
/// Seeded from a full snapshot, then fed the live events in arrival order.
/// Events whose implied pick index is already covered by the snapshot are
/// ignored, the expected next index is applied, and anything beyond it is
/// a [`SyncGap`]. This makes reconnection and duplicate delivery safe
/// without any server-side replay.
#[derive(Debug, Clone)]
pub struct ClientSyncAdapter {
    local: Draft,
}

impl ClientSyncAdapter {
    pub fn from_snapshot(snapshot: Draft) -> Self {
        ClientSyncAdapter { local: snapshot }
    }

    /// The current local projection.
    pub fn draft(&self) -> &Draft {
        &self.local
    }

    /// Replace the projection with a freshly fetched snapshot (gap
    /// recovery, or reconnect).
    pub fn resync(&mut self, snapshot: Draft) {
        self.local = snapshot;
    }

    /// Fold one event into the projection.
    pub fn apply(&mut self, event: &DraftEvent) -> Result<Applied, SyncGap> {
        match event {
            DraftEvent::DraftWaiting {
                start_time,
                next_pick_time,
            } => {
                if self.local.status > DraftStatus::Waiting {
                    return Ok(Applied::Duplicate);
                }
                self.local.status = DraftStatus::Waiting;
                self.local.start_time = Some(*start_time);
                self.local.next_pick_time = Some(*next_pick_time);
                Ok(Applied::Status)
            }
            DraftEvent::DraftStarted { next_pick_time, .. } => {
                if self.local.status >= DraftStatus::Started {
                    return Ok(Applied::Duplicate);
                }
                self.enter_started();
                self.local.next_pick_time = Some(*next_pick_time);
                Ok(Applied::Status)
            }
            DraftEvent::PlayerDrafted {
                team_id,
                player_id,
                next_pick_time,
                ..
            } => self.apply_pick(event, team_id.clone(), Some(player_id.clone()), *next_pick_time),
            DraftEvent::TurnSkipped {
                team_id,
                next_pick_time,
                ..
            } => self.apply_pick(event, team_id.clone(), None, *next_pick_time),
            DraftEvent::DraftEnded => {
                if self.local.status == DraftStatus::Completed {
                    return Ok(Applied::Duplicate);
                }
                self.local.status = DraftStatus::Completed;
                self.local.next_pick_time = None;
                Ok(Applied::Status)
            }
        }
    }

    /// Apply a pick-bearing event (selection or skip -- both advance the
    /// turn identically) against the expected-index rule.
    fn apply_pick(
        &mut self,
        event: &DraftEvent,
        team_id: String,
        player_id: Option<String>,
        next_pick_time: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Applied, SyncGap> {
        let observed = event
            .implied_index(self.local.team_count())
            .expect("pick-bearing event always has an implied index");
        let expected = self.local.pick_list.len();

        if observed < expected {
            return Ok(Applied::Duplicate);
        }
        if observed > expected {
            return Err(SyncGap { expected, observed });
        }

        // A pick event implies the draft is running even if the
        // `draft_started` event was missed.
        if self.local.status < DraftStatus::Started {
            self.enter_started();
        } else if self.local.status == DraftStatus::Completed {
            // Completed with a matching index can't happen on a consistent
            // stream; treat it as a gap so the caller resnapshots.
            return Err(SyncGap { expected, observed });
        }

        let (round, pick) = match event {
            DraftEvent::PlayerDrafted { round, pick, .. }
            | DraftEvent::TurnSkipped { round, pick, .. } => (*round, *pick),
            _ => unreachable!("apply_pick only sees pick-bearing events"),
        };
        let record = PickRecord {
            round,
            pick,
            overall: observed as u32,
            team_id,
            player_id,
        };
        self.local.apply_resolved(record, next_pick_time);
        Ok(Applied::Advanced)
    }

    fn enter_started(&mut self) {
        self.local.status = DraftStatus::Started;
        self.local.current_round = 1;
        self.local.current_pick = 1;
    }
}
