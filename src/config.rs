// Configuration loading and parsing (draftroom.toml).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::draft::slots::SlotLayout;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file: {source}")]
    ParseError {
        #[from]
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// File structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire draftroom.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    league: LeagueSection,
    #[serde(default)]
    draft: DraftSection,
    #[serde(default)]
    websocket: WebsocketSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    data: DataSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueSection {
    pub id: String,
    pub name: String,
    pub teams: Vec<TeamEntry>,
    pub roster: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftSection {
    /// Seconds each turn owner has before an automatic skip.
    #[serde(default = "default_time_per_pick")]
    pub time_per_pick_secs: u32,
    /// Seconds between arming the draft and the first pick.
    #[serde(default = "default_countdown")]
    pub countdown_secs: u32,
    /// Shuffle the configured team list into the draft order at creation.
    #[serde(default = "default_true")]
    pub shuffle_order: bool,
}

impl Default for DraftSection {
    fn default() -> Self {
        DraftSection {
            time_per_pick_secs: default_time_per_pick(),
            countdown_secs: default_countdown(),
            shuffle_order: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebsocketSection {
    fn default() -> Self {
        WebsocketSection {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    #[serde(default = "default_players_csv")]
    pub players_csv: String,
}

impl Default for DataSection {
    fn default() -> Self {
        DataSection {
            players_csv: default_players_csv(),
        }
    }
}

fn default_time_per_pick() -> u32 {
    60
}

fn default_countdown() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    9001
}

fn default_db_path() -> String {
    "data/draftroom.db".to_string()
}

fn default_players_csv() -> String {
    "data/players.csv".to_string()
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueSection,
    pub draft: DraftSection,
    pub websocket: WebsocketSection,
    pub database: DatabaseSection,
    pub data: DataSection,
    /// Validated roster shape built from `league.roster`.
    pub slot_layout: SlotLayout,
}

/// Parse and validate a config document.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(contents)?;

    if file.league.teams.len() < 2 {
        return Err(invalid(
            "league.teams",
            format!("a draft needs at least 2 teams, found {}", file.league.teams.len()),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for team in &file.league.teams {
        if !seen.insert(team.id.as_str()) {
            return Err(invalid(
                "league.teams",
                format!("duplicate team id `{}`", team.id),
            ));
        }
    }
    if file.draft.time_per_pick_secs == 0 {
        return Err(invalid(
            "draft.time_per_pick_secs",
            "pick window must be at least 1 second",
        ));
    }

    let slot_layout = SlotLayout::from_counts(&file.league.roster)
        .map_err(|e| invalid("league.roster", e.to_string()))?;

    Ok(Config {
        league: file.league,
        draft: file.draft,
        websocket: file.websocket,
        database: file.database,
        data: file.data,
        slot_layout,
    })
}

/// Load the config file from disk.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    parse_config(&contents)
}
