// Position-to-slot rules: which roster slots a player may legally occupy.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PlayerId;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("unknown roster slot kind `{0}`")]
    UnknownSlotKind(String),

    #[error("roster layout has no slots")]
    EmptyLayout,

    #[error("position {0} has no reachable roster slot")]
    UnreachablePosition(Position),
}

/// On-field positions carried by player data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
    Defense,
    Kicker,
}

impl Position {
    /// Parse a position abbreviation as it appears in player data ("QB",
    /// "RB", "WR", "TE", "DEF"/"DST", "K").
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            "DEF" | "DST" => Some(Position::Defense),
            "K" => Some(Position::Kicker),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
            Position::Defense => "DEF",
            Position::Kicker => "K",
        }
    }

    /// All on-field positions, for layout completeness checks.
    pub fn all() -> [Position; 6] {
        [
            Position::Quarterback,
            Position::RunningBack,
            Position::WideReceiver,
            Position::TightEnd,
            Position::Defense,
            Position::Kicker,
        ]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// The designation of a single roster slot. Unlike [`Position`] this
/// includes the shared FLEX slot and the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
    Flex,
    Defense,
    Kicker,
    Bench,
}

impl SlotKind {
    /// Parse a slot-kind key from league config ("QB", "RB", "WR", "TE",
    /// "FLEX", "DEF", "K", "BN"/"BE").
    pub fn from_str_kind(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QB" => Some(SlotKind::Quarterback),
            "RB" => Some(SlotKind::RunningBack),
            "WR" => Some(SlotKind::WideReceiver),
            "TE" => Some(SlotKind::TightEnd),
            "FLEX" => Some(SlotKind::Flex),
            "DEF" | "DST" => Some(SlotKind::Defense),
            "K" => Some(SlotKind::Kicker),
            "BN" | "BE" => Some(SlotKind::Bench),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            SlotKind::Quarterback => "QB",
            SlotKind::RunningBack => "RB",
            SlotKind::WideReceiver => "WR",
            SlotKind::TightEnd => "TE",
            SlotKind::Flex => "FLEX",
            SlotKind::Defense => "DEF",
            SlotKind::Kicker => "K",
            SlotKind::Bench => "BN",
        }
    }

    /// Deterministic ordering index: starting slots first, bench last.
    pub fn sort_order(&self) -> u8 {
        match self {
            SlotKind::Quarterback => 0,
            SlotKind::RunningBack => 1,
            SlotKind::WideReceiver => 2,
            SlotKind::TightEnd => 3,
            SlotKind::Flex => 4,
            SlotKind::Defense => 5,
            SlotKind::Kicker => 6,
            SlotKind::Bench => 7,
        }
    }

    pub fn is_bench(&self) -> bool {
        matches!(self, SlotKind::Bench)
    }

    /// Whether a player of `pos` may legally occupy a slot of this kind.
    /// FLEX accepts RB/WR/TE; bench accepts anyone.
    pub fn accepts(&self, pos: Position) -> bool {
        match self {
            SlotKind::Quarterback => pos == Position::Quarterback,
            SlotKind::RunningBack => pos == Position::RunningBack,
            SlotKind::WideReceiver => pos == Position::WideReceiver,
            SlotKind::TightEnd => pos == Position::TightEnd,
            SlotKind::Flex => matches!(
                pos,
                Position::RunningBack | Position::WideReceiver | Position::TightEnd
            ),
            SlotKind::Defense => pos == Position::Defense,
            SlotKind::Kicker => pos == Position::Kicker,
            SlotKind::Bench => true,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// A league's fixed roster shape: one [`SlotKind`] per slot index.
///
/// Slot indices are the single source of truth for what a slot accepts.
/// The layout is built once from config counts, sorted into deterministic
/// order (starting slots first, bench last), and validated so that every
/// position has at least one reachable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    slots: Vec<SlotKind>,
}

impl SlotLayout {
    /// Build a layout from config counts, e.g. `{"QB": 1, "RB": 2, "WR": 2,
    /// "TE": 1, "FLEX": 1, "DEF": 1, "K": 1, "BN": 8}`.
    pub fn from_counts(counts: &HashMap<String, usize>) -> Result<Self, SlotError> {
        let mut slots = Vec::new();
        for (key, &count) in counts {
            let kind = SlotKind::from_str_kind(key)
                .ok_or_else(|| SlotError::UnknownSlotKind(key.clone()))?;
            for _ in 0..count {
                slots.push(kind);
            }
        }
        slots.sort_by_key(|s| s.sort_order());

        if slots.is_empty() {
            return Err(SlotError::EmptyLayout);
        }
        for pos in Position::all() {
            if !slots.iter().any(|s| s.accepts(pos)) {
                return Err(SlotError::UnreachablePosition(pos));
            }
        }
        Ok(SlotLayout { slots })
    }

    /// The standard 17-slot lineup: QB, RB, RB, WR, WR, TE, FLEX, DEF, K,
    /// and 8 bench spots.
    pub fn nfl_default() -> Self {
        let mut slots = vec![
            SlotKind::Quarterback,
            SlotKind::RunningBack,
            SlotKind::RunningBack,
            SlotKind::WideReceiver,
            SlotKind::WideReceiver,
            SlotKind::TightEnd,
            SlotKind::Flex,
            SlotKind::Defense,
            SlotKind::Kicker,
        ];
        slots.extend(std::iter::repeat(SlotKind::Bench).take(8));
        SlotLayout { slots }
    }

    pub fn slots(&self) -> &[SlotKind] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Every slot index a player of `pos` may occupy: dedicated slots,
    /// FLEX when eligible, and all bench indices.
    pub fn allowed_slots(&self, pos: Position) -> BTreeSet<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, kind)| kind.accepts(pos))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn can_place(&self, pos: Position, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|kind| kind.accepts(pos))
    }

    /// Whether swapping the occupants of `from` and `to` is legal.
    ///
    /// The occupant of `from` must be allowed at `to`, and `to` must be
    /// empty or hold a player allowed at `from`. An empty `from` slot or an
    /// out-of-range index is never a legal swap. This rule guarantees a
    /// swap can never strand a player in a slot its position cannot occupy.
    pub fn can_swap(&self, roster: &[Option<Position>], from: usize, to: usize) -> bool {
        if from == to || from >= roster.len() || to >= roster.len() {
            return false;
        }
        let Some(moving) = roster[from] else {
            return false;
        };
        if !self.can_place(moving, to) {
            return false;
        }
        match roster[to] {
            None => true,
            Some(other) => self.can_place(other, from),
        }
    }

    /// Find the slot a freshly drafted player lands in: the lowest-indexed
    /// empty starting slot that accepts the position, falling back to the
    /// lowest-indexed empty bench slot. `None` means the roster is full for
    /// this position.
    pub fn find_slot(&self, pos: Position, roster: &[Option<PlayerId>]) -> Option<usize> {
        let empty_accepting = |bench: bool| {
            self.slots
                .iter()
                .enumerate()
                .find(|(idx, kind)| {
                    kind.is_bench() == bench
                        && kind.accepts(pos)
                        && roster.get(*idx).is_some_and(|s| s.is_none())
                })
                .map(|(idx, _)| idx)
        };
        empty_accepting(false).or_else(|| empty_accepting(true))
    }
}
