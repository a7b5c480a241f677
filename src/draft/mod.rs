// Draft domain: pick ordering, roster slot rules, and the state machine.

pub mod order;
pub mod slots;
pub mod state;

/// Identifier of a team, assigned by the league subsystem.
pub type TeamId = String;

/// Identifier of an NFL player, assigned by the player-data subsystem.
pub type PlayerId = String;
