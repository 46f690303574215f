//! Domain layer: entities, status state machine, handoff detection

pub mod entities;
pub mod handoff;
pub mod state;
