//! Stackworld: polygonal rooms, portals and stackable blocks
//!
//! A small indoor world for first-person agents. Rooms are extruded
//! outlines joined through openings in their walls; an agent turns in
//! place, picks up blocks and stacks them on a row of spots, and is
//! rewarded for reaching a goal arrangement.

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod math;
pub mod error;
pub mod world;
pub mod game;
pub mod render;
pub mod config;

pub use config::EnvConfig;
pub use error::{WorldError, WorldResult};
