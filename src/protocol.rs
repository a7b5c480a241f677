// Wire protocol: events fanned out to draft rooms and the client-facing
// command/reply messages carried over the WebSocket transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::state::{Draft, DraftError};
use crate::draft::{order, PlayerId, TeamId};

/// A state transition of one draft, broadcast to every subscriber of its
/// room in commit order. Events are never retracted; a subscriber that
/// misses one refetches a snapshot instead of asking for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftEvent {
    /// Start countdown armed (scheduled → waiting).
    DraftWaiting {
        start_time: DateTime<Utc>,
        next_pick_time: DateTime<Utc>,
    },
    /// The draft opened at round 1, pick 1.
    DraftStarted {
        next_drafter: TeamId,
        next_pick_time: DateTime<Utc>,
    },
    /// A pick resolved with a player selection. `next_drafter` and
    /// `next_pick_time` are absent when this was the final pick.
    PlayerDrafted {
        round: u32,
        pick: u32,
        team_id: TeamId,
        player_id: PlayerId,
        next_drafter: Option<TeamId>,
        next_pick_time: Option<DateTime<Utc>>,
    },
    /// A turn expired (or was skipped by the commissioner) unfilled.
    /// Clients advance exactly as they do for `PlayerDrafted`.
    TurnSkipped {
        round: u32,
        pick: u32,
        team_id: TeamId,
        next_drafter: Option<TeamId>,
        next_pick_time: Option<DateTime<Utc>>,
    },
    /// All rounds resolved; the draft is complete.
    DraftEnded,
}

impl DraftEvent {
    /// For pick-bearing events, the zero-based index this event occupies in
    /// the full pick sequence. Status-only events return `None`.
    pub fn implied_index(&self, team_count: usize) -> Option<usize> {
        match self {
            DraftEvent::PlayerDrafted { round, pick, .. }
            | DraftEvent::TurnSkipped { round, pick, .. } => {
                Some(order::overall_index(team_count, *round, *pick))
            }
            _ => None,
        }
    }
}

/// Commands a connected client may send over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Join a draft room and receive its event stream.
    Subscribe { draft_id: String },
    /// Fetch a full snapshot of the draft.
    GetDraft { draft_id: String },
    /// Attempt to draft a player for a team.
    RequestPick {
        draft_id: String,
        team_id: TeamId,
        player_id: PlayerId,
    },
    /// Commissioner: arm the start countdown.
    ArmDraft { draft_id: String },
    /// Commissioner: skip the current turn immediately.
    SkipTurn { draft_id: String },
}

/// Direct replies to client commands (distinct from broadcast events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    Subscribed { draft_id: String },
    Snapshot { draft: Draft },
    PickAccepted {
        draft_id: String,
        round: u32,
        pick: u32,
        team_id: TeamId,
        player_id: PlayerId,
        /// Roster slot index the player was placed into.
        slot: usize,
    },
    Armed { draft: Draft },
    Skipped { draft_id: String },
    Rejected { code: String, message: String },
}

impl ServerReply {
    /// Build the rejection reply for a state-machine error, with a stable
    /// machine-readable code alongside the human-readable message.
    pub fn rejected(err: &DraftError) -> Self {
        let code = match err {
            DraftError::NotYourTurn { .. } => "not_your_turn",
            DraftError::PlayerUnavailable { .. } => "player_unavailable",
            DraftError::RosterFull { .. } => "roster_full",
            DraftError::DraftNotStarted => "draft_not_started",
            DraftError::DraftCompleted => "draft_completed",
            DraftError::InvalidOrder(_) => "invalid_order",
            DraftError::InvalidTransition { .. } => "invalid_transition",
            DraftError::LeagueUnavailable(_) => "league_unavailable",
        };
        ServerReply::Rejected {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}
