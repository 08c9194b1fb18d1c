//! World module - polygonal rooms connected through portals
//!
//! - Room outlines extruded to walls, with openings cut into them
//! - Automatic connection of facing walls, with generated connector rooms
//! - Derived render meshes and ground-level collision segments

mod geometry;
mod connect;
mod level;

pub use geometry::*;
pub use connect::*;
pub use level::*;
