//! Viewer visibility orchestration: sessions, dirty flags, recompute.
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::{Engine, Viewer, ViewerId};

pub use sightline_los as los;
pub use sightline_map as map;
