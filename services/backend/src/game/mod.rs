//! The hand state machine: dealing, betting rounds, side pots,
//! showdown, rake and rotation. Every transition runs in one
//! transaction with its events; the database rows are the only state.

pub mod actions;
pub mod advance;
pub mod settle;
pub mod start;
pub mod state;

pub use actions::{apply_action, fold_for_timeout, PlayerAction};
pub use start::{maybe_start_hand, start_hand};
