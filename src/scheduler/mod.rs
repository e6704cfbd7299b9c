//! Midnight rollover scheduling: state machine plus host timer abstraction.

pub mod rollover;
pub mod timer;
