// Authoritative draft state: status, turn position, pick history.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::order;
use super::slots::Position;
use super::{PlayerId, TeamId};

/// Rejections produced by the draft state machine. None of these mutate
/// state; every one is recoverable by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("it is not team {team_id}'s turn to pick")]
    NotYourTurn { team_id: TeamId },

    #[error("player {player_id} has already been drafted")]
    PlayerUnavailable { player_id: PlayerId },

    #[error("team {team_id} has no legal roster slot for a {position}")]
    RosterFull { team_id: TeamId, position: Position },

    #[error("draft has not started")]
    DraftNotStarted,

    #[error("draft is already complete")]
    DraftCompleted,

    #[error("invalid draft order: {0}")]
    InvalidOrder(String),

    #[error("cannot {action} a draft in the {status} state")]
    InvalidTransition {
        status: DraftStatus,
        action: &'static str,
    },

    #[error("league subsystem unavailable: {0}")]
    LeagueUnavailable(String),
}

/// Lifecycle stage of a draft. `Ord` follows the one-way progression
/// scheduled → waiting → started → completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Scheduled,
    Waiting,
    Started,
    Completed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Scheduled => "scheduled",
            DraftStatus::Waiting => "waiting",
            DraftStatus::Started => "started",
            DraftStatus::Completed => "completed",
        }
    }

    pub fn from_str_status(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(DraftStatus::Scheduled),
            "waiting" => Some(DraftStatus::Waiting),
            "started" => Some(DraftStatus::Started),
            "completed" => Some(DraftStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resolved turn. `player_id == None` records a turn that expired (or
/// was skipped by the commissioner) without a selection. Immutable once
/// appended to the pick list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRecord {
    pub round: u32,
    pub pick: u32,
    /// Zero-based position in the full pick sequence.
    pub overall: u32,
    pub team_id: TeamId,
    pub player_id: Option<PlayerId>,
}

impl PickRecord {
    pub fn is_skip(&self) -> bool {
        self.player_id.is_none()
    }
}

/// The authoritative state of one league's draft.
///
/// Owned exclusively by that draft's coordinator task; everything outside
/// the coordinator sees clones (snapshots) or events derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub league_id: String,
    /// Round-1 pick order. Fixed at creation, never mutated.
    pub draft_order: Vec<TeamId>,
    pub total_rounds: u32,
    pub status: DraftStatus,
    /// 1-indexed; meaningful only once started.
    pub current_round: u32,
    /// 1-indexed, `1..=team_count`; meaningful only once started.
    pub current_pick: u32,
    /// Append-only history of resolved turns.
    pub pick_list: Vec<PickRecord>,
    pub start_time: Option<DateTime<Utc>>,
    pub next_pick_time: Option<DateTime<Utc>>,
    pub time_per_pick_secs: u32,
}

impl Draft {
    /// Create a draft in the `Scheduled` state.
    ///
    /// `draft_order` must be non-empty and free of duplicate team ids (it is
    /// a permutation of the league's teams).
    pub fn new(
        id: impl Into<String>,
        league_id: impl Into<String>,
        draft_order: Vec<TeamId>,
        total_rounds: u32,
        time_per_pick_secs: u32,
    ) -> Result<Self, DraftError> {
        if draft_order.is_empty() {
            return Err(DraftError::InvalidOrder("draft order is empty".into()));
        }
        if total_rounds == 0 {
            return Err(DraftError::InvalidOrder("total_rounds must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for team in &draft_order {
            if !seen.insert(team) {
                return Err(DraftError::InvalidOrder(format!(
                    "team {team} appears twice in the draft order"
                )));
            }
        }
        Ok(Draft {
            id: id.into(),
            league_id: league_id.into(),
            draft_order,
            total_rounds,
            status: DraftStatus::Scheduled,
            current_round: 1,
            current_pick: 1,
            pick_list: Vec::new(),
            start_time: None,
            next_pick_time: None,
            time_per_pick_secs,
        })
    }

    pub fn team_count(&self) -> usize {
        self.draft_order.len()
    }

    /// Total number of turns in the draft.
    pub fn total_picks(&self) -> usize {
        self.team_count() * self.total_rounds as usize
    }

    /// The team entitled to the current turn, while the draft is running.
    pub fn turn_owner(&self) -> Option<&TeamId> {
        if self.status != DraftStatus::Started {
            return None;
        }
        order::turn_owner(&self.draft_order, self.current_round, self.current_pick)
    }

    /// Zero-based index of the current turn in the full pick sequence.
    pub fn current_overall(&self) -> usize {
        order::overall_index(self.team_count(), self.current_round, self.current_pick)
    }

    /// Whether a player already appears in a non-skip pick record.
    pub fn is_player_taken(&self, player_id: &str) -> bool {
        self.pick_list
            .iter()
            .any(|p| p.player_id.as_deref() == Some(player_id))
    }

    /// While started, the number of resolved picks always equals the
    /// zero-based index of the current turn.
    pub fn pick_count_consistent(&self) -> bool {
        self.status != DraftStatus::Started || self.pick_list.len() == self.current_overall()
    }

    /// Commissioner action: arm the start countdown (scheduled → waiting).
    pub fn begin_countdown(&mut self, start_time: DateTime<Utc>) -> Result<(), DraftError> {
        if self.status != DraftStatus::Scheduled {
            return Err(DraftError::InvalidTransition {
                status: self.status,
                action: "arm",
            });
        }
        self.status = DraftStatus::Waiting;
        self.start_time = Some(start_time);
        Ok(())
    }

    /// Commissioner action: move the scheduled start while the draft has
    /// not yet begun.
    pub fn reschedule(&mut self, start_time: DateTime<Utc>) -> Result<(), DraftError> {
        match self.status {
            DraftStatus::Scheduled | DraftStatus::Waiting => {
                self.start_time = Some(start_time);
                Ok(())
            }
            status => Err(DraftError::InvalidTransition {
                status,
                action: "reschedule",
            }),
        }
    }

    /// Start timer fired: open the draft at round 1, pick 1 (waiting →
    /// started). `next_pick_time` is the first turn's deadline.
    pub fn begin(&mut self, next_pick_time: DateTime<Utc>) -> Result<(), DraftError> {
        if self.status != DraftStatus::Waiting {
            return Err(DraftError::InvalidTransition {
                status: self.status,
                action: "start",
            });
        }
        self.status = DraftStatus::Started;
        self.current_round = 1;
        self.current_pick = 1;
        self.next_pick_time = Some(next_pick_time);
        Ok(())
    }

    /// Check a pick request against the current state without mutating it.
    ///
    /// Validation order: draft running, requesting team owns the turn,
    /// player not already taken. The roster-slot check happens outside this
    /// type (it needs the team's roster) between validation and commit.
    pub fn validate_pick(&self, team_id: &str, player_id: &str) -> Result<(), DraftError> {
        match self.status {
            DraftStatus::Scheduled | DraftStatus::Waiting => return Err(DraftError::DraftNotStarted),
            DraftStatus::Completed => return Err(DraftError::DraftCompleted),
            DraftStatus::Started => {}
        }
        let owner = self
            .turn_owner()
            .expect("started draft always has a turn owner");
        if owner != team_id {
            return Err(DraftError::NotYourTurn {
                team_id: team_id.to_string(),
            });
        }
        if self.is_player_taken(player_id) {
            return Err(DraftError::PlayerUnavailable {
                player_id: player_id.to_string(),
            });
        }
        Ok(())
    }

    /// Commit a validated pick: append the record and advance the turn.
    /// Returns a clone of the appended record.
    pub fn commit_pick(
        &mut self,
        team_id: TeamId,
        player_id: PlayerId,
        next_pick_time: Option<DateTime<Utc>>,
    ) -> Result<PickRecord, DraftError> {
        self.validate_pick(&team_id, &player_id)?;
        let record = PickRecord {
            round: self.current_round,
            pick: self.current_pick,
            overall: self.current_overall() as u32,
            team_id,
            player_id: Some(player_id),
        };
        self.apply_resolved(record.clone(), next_pick_time);
        Ok(record)
    }

    /// Commit a skip for the current turn (clock expiry or commissioner
    /// skip): append the sentinel record and advance the turn.
    pub fn commit_skip(
        &mut self,
        next_pick_time: Option<DateTime<Utc>>,
    ) -> Result<PickRecord, DraftError> {
        match self.status {
            DraftStatus::Scheduled | DraftStatus::Waiting => return Err(DraftError::DraftNotStarted),
            DraftStatus::Completed => return Err(DraftError::DraftCompleted),
            DraftStatus::Started => {}
        }
        let team_id = self
            .turn_owner()
            .expect("started draft always has a turn owner")
            .clone();
        let record = PickRecord {
            round: self.current_round,
            pick: self.current_pick,
            overall: self.current_overall() as u32,
            team_id,
            player_id: None,
        };
        self.apply_resolved(record.clone(), next_pick_time);
        Ok(record)
    }

    /// Append an already-resolved record and advance the turn, completing
    /// the draft when the last turn resolves.
    ///
    /// Shared by the authoritative commit paths above and by the client
    /// sync adapter, which replays server events onto a local projection.
    pub(crate) fn apply_resolved(
        &mut self,
        record: PickRecord,
        next_pick_time: Option<DateTime<Utc>>,
    ) {
        self.pick_list.push(record);
        if self.pick_list.len() >= self.total_picks() {
            self.status = DraftStatus::Completed;
            self.next_pick_time = None;
            return;
        }
        self.current_pick += 1;
        if self.current_pick > self.team_count() as u32 {
            self.current_pick = 1;
            self.current_round += 1;
        }
        self.next_pick_time = next_pick_time;
        debug_assert!(self.pick_count_consistent());
    }
}
