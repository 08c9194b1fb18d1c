//! Error kinds for world construction and entity placement
//!
//! All of these are precondition violations detected at the call that
//! caused them. Rejected player actions (turning into a wall, picking up
//! nothing) are not errors and never show up here.

/// Errors raised while building rooms, connecting them or placing entities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    /// Malformed outline, degenerate portal span, or an edge parallel to
    /// the axis used for bound conversion.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Room topology was mutated after collision data was generated.
    #[error("room topology is frozen once static data has been generated")]
    StructuralFrozen,
    /// `connect_rooms` found no pair of walls facing each other.
    #[error("rooms {room_a} and {room_b} have no facing edges")]
    NoFacingEdges { room_a: usize, room_b: usize },
    /// Random placement ran out of attempts without finding a free spot.
    #[error("no valid position found after {attempts} attempts")]
    PlacementExhausted { attempts: u32 },
    #[error("room index {0} out of range")]
    UnknownRoom(usize),
    /// The id is stale, was never placed, or names the wrong kind of entity.
    #[error("entity id is stale or was never placed")]
    UnknownEntity,
    /// A stack link would leave one side dangling or form a loop.
    #[error("invalid stack link: {0}")]
    InvalidStack(String),
}

pub type WorldResult<T> = Result<T, WorldError>;
