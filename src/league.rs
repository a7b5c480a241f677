// External collaborators: the league/team subsystem and NFL player data.
// The coordinator never touches their storage directly; everything goes
// through these traits.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::draft::slots::Position;
use crate::draft::{PlayerId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeagueError {
    #[error("team {0} not found")]
    TeamNotFound(TeamId),

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("slot {slot} out of range for team {team_id}")]
    SlotOutOfRange { team_id: TeamId, slot: usize },
}

/// A team as the league subsystem exposes it to the coordinator. The
/// roster is a fixed-length slot vector; slot indices carry the position
/// rules (see `draft::slots`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub league_id: String,
    pub name: String,
    pub roster: Vec<Option<PlayerId>>,
}

/// An NFL player as the player-data subsystem exposes it. The coordinator
/// reads `position` for validation and never mutates the player itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NflPlayer {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub nfl_team: String,
}

/// League/team operations the coordinator consumes.
#[async_trait]
pub trait LeagueService: Send + Sync {
    async fn team(&self, team_id: &str) -> Result<Team, LeagueError>;

    /// Assign (or clear) one roster slot.
    async fn set_roster_slot(
        &self,
        team_id: &str,
        slot: usize,
        player: Option<PlayerId>,
    ) -> Result<(), LeagueError>;

    /// Whether any roster in the league holds the player (draft picks and
    /// waiver pickups alike).
    async fn is_player_rostered(
        &self,
        league_id: &str,
        player_id: &str,
    ) -> Result<bool, LeagueError>;
}

/// Player-data operations the coordinator consumes.
#[async_trait]
pub trait PlayerService: Send + Sync {
    async fn player(&self, player_id: &str) -> Result<NflPlayer, LeagueError>;
}

/// In-process implementation of both services over RwLock maps. Used by
/// the demo binary and the test suites; a production deployment would wire
/// the real league subsystem in behind the same traits.
#[derive(Debug, Default)]
pub struct InMemoryLeague {
    teams: RwLock<HashMap<TeamId, Team>>,
    players: RwLock<HashMap<PlayerId, NflPlayer>>,
}

impl InMemoryLeague {
    pub fn new() -> Self {
        InMemoryLeague::default()
    }

    pub async fn register_team(&self, id: &str, league_id: &str, name: &str, slot_count: usize) {
        let team = Team {
            id: id.to_string(),
            league_id: league_id.to_string(),
            name: name.to_string(),
            roster: vec![None; slot_count],
        };
        self.teams.write().await.insert(team.id.clone(), team);
    }

    pub async fn register_player(&self, player: NflPlayer) {
        self.players.write().await.insert(player.id.clone(), player);
    }

    pub async fn register_players(&self, players: Vec<NflPlayer>) {
        let mut map = self.players.write().await;
        for player in players {
            map.insert(player.id.clone(), player);
        }
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }
}

#[async_trait]
impl LeagueService for InMemoryLeague {
    async fn team(&self, team_id: &str) -> Result<Team, LeagueError> {
        self.teams
            .read()
            .await
            .get(team_id)
            .cloned()
            .ok_or_else(|| LeagueError::TeamNotFound(team_id.to_string()))
    }

    async fn set_roster_slot(
        &self,
        team_id: &str,
        slot: usize,
        player: Option<PlayerId>,
    ) -> Result<(), LeagueError> {
        let mut teams = self.teams.write().await;
        let team = teams
            .get_mut(team_id)
            .ok_or_else(|| LeagueError::TeamNotFound(team_id.to_string()))?;
        let entry = team
            .roster
            .get_mut(slot)
            .ok_or(LeagueError::SlotOutOfRange {
                team_id: team_id.to_string(),
                slot,
            })?;
        *entry = player;
        Ok(())
    }

    async fn is_player_rostered(
        &self,
        league_id: &str,
        player_id: &str,
    ) -> Result<bool, LeagueError> {
        let teams = self.teams.read().await;
        Ok(teams.values().any(|team| {
            team.league_id == league_id
                && team
                    .roster
                    .iter()
                    .any(|slot| slot.as_deref() == Some(player_id))
        }))
    }
}

#[async_trait]
impl PlayerService for InMemoryLeague {
    async fn player(&self, player_id: &str) -> Result<NflPlayer, LeagueError> {
        self.players
            .read()
            .await
            .get(player_id)
            .cloned()
            .ok_or_else(|| LeagueError::PlayerNotFound(player_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Player pool import
// ---------------------------------------------------------------------------

/// One row of the player CSV (`id,name,position,team`).
#[derive(Debug, Deserialize)]
struct PlayerRow {
    id: String,
    name: String,
    position: String,
    team: String,
}

/// Parse a player pool from any CSV reader. Rows with an unrecognized
/// position are rejected rather than silently dropped.
pub fn players_from_reader<R: Read>(reader: R) -> anyhow::Result<Vec<NflPlayer>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut players = Vec::new();
    for (line, row) in csv_reader.deserialize::<PlayerRow>().enumerate() {
        let row = row.with_context(|| format!("malformed player row {}", line + 1))?;
        let position = Position::from_str_pos(&row.position).with_context(|| {
            format!("unknown position `{}` for player {}", row.position, row.id)
        })?;
        players.push(NflPlayer {
            id: row.id,
            name: row.name,
            position,
            nfl_team: row.team,
        });
    }
    Ok(players)
}

/// Load the player pool CSV from disk.
pub fn load_players_csv(path: &Path) -> anyhow::Result<Vec<NflPlayer>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open player file {}", path.display()))?;
    players_from_reader(file)
}
