//! Stateful layer: the engine gateway and the tracker that owns it.

pub mod engine;
pub mod mirror;
pub mod tracker;

pub use engine::{EngineError, EngineFactory, SearchEngine, UciEngine, UciEngineFactory};
pub use mirror::{MirrorError, PositionMirror};
pub use tracker::{EngineReply, GameStateTracker, StateOverrides};
