//! Position lifecycle: single-slot state machine with layered exit triggers.

pub mod lifecycle;
pub mod position;

pub use lifecycle::{ManageOutcome, PositionManager, TradeOutcome};
pub use position::{apply_trailing_stop, evaluate_exit, ExitTrigger, Position};
