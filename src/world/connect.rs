//! Room-to-room connection
//!
//! Two rooms are connected through a pair of walls that face each other.
//! Both walls get a matching portal; if the openings don't touch, a
//! rectangular connector room is generated to bridge the gap.

use serde::{Serialize, Deserialize};
use crate::error::{WorldError, WorldResult};
use crate::math::Vec3;
use super::{Level, PortalExtent, Room, RoomStyle};

/// Opposing walls must have normals at least this anti-parallel
const FACING_DOT: f32 = -0.9;

/// How far B's edge may sit behind A's wall before the pair is rejected
const ADJACENCY_TOLERANCE: f32 = 0.05;

/// Portal openings closer than this are considered coincident
const COINCIDENT_EPSILON: f32 = 0.001;

/// World-space extent of a connecting opening
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PortalBound {
    X { min: f32, max: f32 },
    Z { min: f32, max: f32 },
}

impl PortalBound {
    pub fn extent(self) -> PortalExtent {
        match self {
            PortalBound::X { min, max } => PortalExtent::X { min, max },
            PortalBound::Z { min, max } => PortalExtent::Z { min, max },
        }
    }
}

/// Find the first pair of edges `(edge_a, edge_b)` that face each other.
///
/// Pairs are scanned in edge-index order (A outer, B inner), so the result
/// is deterministic.
pub fn find_facing_edges(room_a: &Room, room_b: &Room) -> Option<(usize, usize)> {
    for idx_a in 0..room_a.num_walls() {
        let norm_a = room_a.edge_normal(idx_a);
        let (p_a, _) = room_a.edge_points(idx_a);

        for idx_b in 0..room_b.num_walls() {
            let norm_b = room_b.edge_normal(idx_b);
            if norm_a.dot(norm_b) > FACING_DOT {
                continue;
            }

            let (p_b, _) = room_b.edge_points(idx_b);
            if norm_a.dot(p_b - p_a) > ADJACENCY_TOLERANCE {
                continue;
            }

            return Some((idx_a, idx_b));
        }
    }
    None
}

/// Overlap of two edges along the dominant axis of the first
fn default_bound(room_a: &Room, edge_a: usize, room_b: &Room, edge_b: usize) -> WorldResult<PortalBound> {
    let (a0, a1) = room_a.edge_points(edge_a);
    let (b0, b1) = room_b.edge_points(edge_b);
    let dir = room_a.edge_dir(edge_a);

    let range = |p: Vec3, q: Vec3, along_x: bool| {
        if along_x { (p.x.min(q.x), p.x.max(q.x)) } else { (p.z.min(q.z), p.z.max(q.z)) }
    };

    let along_x = dir.x.abs() >= dir.z.abs();
    let (a_lo, a_hi) = range(a0, a1, along_x);
    let (b_lo, b_hi) = range(b0, b1, along_x);
    let (min, max) = (a_lo.max(b_lo), a_hi.min(b_hi));

    if !(max > min) {
        return Err(WorldError::InvalidGeometry(format!(
            "facing edges {} and {} do not overlap", edge_a, edge_b
        )));
    }

    Ok(if along_x { PortalBound::X { min, max } } else { PortalBound::Z { min, max } })
}

impl Level {
    /// Connect two rooms through their facing walls.
    ///
    /// `bound` limits the opening in world coordinates; without it the
    /// opening covers the overlap of the two walls. `max_y` defaults to each
    /// room's wall height. Returns the index of the connector room if one
    /// had to be generated.
    pub fn connect_rooms(
        &mut self,
        room_a: usize,
        room_b: usize,
        bound: Option<PortalBound>,
        max_y: Option<f32>,
    ) -> WorldResult<Option<usize>> {
        if self.is_frozen() {
            return Err(WorldError::StructuralFrozen);
        }
        if room_a == room_b {
            return Err(WorldError::InvalidGeometry(format!("cannot connect room {} to itself", room_a)));
        }

        let a = self.room(room_a)?;
        let b = self.room(room_b)?;

        let (edge_a, edge_b) = find_facing_edges(a, b)
            .ok_or(WorldError::NoFacingEdges { room_a, room_b })?;
        let bound = match bound {
            Some(bound) => bound,
            None => default_bound(a, edge_a, b, edge_b)?,
        };

        // Work on copies so a failure on B leaves A untouched
        let mut new_a = a.clone();
        let mut new_b = b.clone();
        let (start_a, end_a) = new_a.add_portal(edge_a, bound.extent(), 0.0, max_y)?;
        let (start_b, end_b) = new_b.add_portal(edge_b, bound.extent(), 0.0, max_y)?;

        let (p_a, _) = new_a.edge_points(edge_a);
        let (p_b, _) = new_b.edge_points(edge_b);
        let dir_a = new_a.edge_dir(edge_a);
        let dir_b = new_b.edge_dir(edge_b);

        let a0 = p_a + dir_a * start_a;
        let a1 = p_a + dir_a * end_a;
        let b0 = p_b + dir_b * start_b;
        let b1 = p_b + dir_b * end_b;

        // Build the connector before committing anything
        let connector = if (a0 - b1).len() < COINCIDENT_EPSILON {
            None
        } else {
            let style = RoomStyle {
                wall_height: max_y.unwrap_or(new_a.wall_height()),
                ..new_a.style().clone()
            };
            let outline = [b0.xz(), a1.xz(), a0.xz(), b1.xz()];
            let mut room = Room::new(&outline, style)?;

            let len_a = end_a - start_a;
            let len_b = end_b - start_b;
            room.add_portal(1, PortalExtent::Offsets { start: 0.0, end: len_a }, 0.0, None)?;
            room.add_portal(3, PortalExtent::Offsets { start: 0.0, end: len_b }, 0.0, None)?;
            Some(room)
        };

        log::debug!(
            "connected rooms {} (edge {}) and {} (edge {}){}",
            room_a, edge_a, room_b, edge_b,
            if connector.is_some() { " through a connector" } else { "" }
        );

        self.rooms[room_a] = new_a;
        self.rooms[room_b] = new_b;
        Ok(match connector {
            Some(room) => {
                self.rooms.push(room);
                Some(self.rooms.len() - 1)
            }
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rooms(gap: f32) -> Level {
        let mut level = Level::new();
        level.add_rect_room(0.0, 5.0, 0.0, 5.0, RoomStyle::default()).unwrap();
        level.add_rect_room(5.0 + gap, 10.0, 0.0, 5.0, RoomStyle::default()).unwrap();
        level
    }

    #[test]
    fn test_find_facing_edges() {
        let level = two_rooms(2.0);
        let (a, b) = (level.room(0).unwrap(), level.room(1).unwrap());
        // East wall of A against west wall of B
        assert_eq!(find_facing_edges(a, b), Some((0, 2)));
    }

    #[test]
    fn test_no_facing_edges_for_overlapping_rooms() {
        let mut level = Level::new();
        level.add_rect_room(0.0, 5.0, 0.0, 5.0, RoomStyle::default()).unwrap();
        // Entirely inside A: every inward normal pair fails the adjacency test
        level.add_rect_room(1.0, 2.0, 1.0, 2.0, RoomStyle::default()).unwrap();
        let err = level.connect_rooms(0, 1, None, None);
        assert_eq!(err, Err(WorldError::NoFacingEdges { room_a: 0, room_b: 1 }));
    }

    #[test]
    fn test_coincident_edges_need_no_connector() {
        let mut level = two_rooms(0.0);
        let connector = level.connect_rooms(0, 1, Some(PortalBound::Z { min: 1.0, max: 3.0 }), None).unwrap();
        assert_eq!(connector, None);
        assert_eq!(level.num_rooms(), 2);
        assert_eq!(level.room(0).unwrap().portals(0).len(), 1);
        assert_eq!(level.room(1).unwrap().portals(2).len(), 1);
    }

    #[test]
    fn test_gap_creates_connector() {
        let mut level = two_rooms(2.0);
        let connector = level.connect_rooms(0, 1, Some(PortalBound::Z { min: 1.0, max: 3.0 }), None).unwrap();
        assert_eq!(connector, Some(2));
        assert_eq!(level.num_rooms(), 3);

        let room = level.room(2).unwrap();
        // Gap of 2 times an opening of 2
        assert!((room.area() - 4.0).abs() < 1e-4);
        assert!((room.min_x() - 5.0).abs() < 1e-5 && (room.max_x() - 7.0).abs() < 1e-5);
        assert!((room.min_z() - 1.0).abs() < 1e-5 && (room.max_z() - 3.0).abs() < 1e-5);

        // Both ends of the connector are fully open
        assert_eq!(room.portals(1).len(), 1);
        assert_eq!(room.portals(3).len(), 1);
        assert!(room.portals(0).is_empty() && room.portals(2).is_empty());
        assert!(room.point_inside(Vec3::ground(6.0, 2.0)));
    }

    #[test]
    fn test_connector_walls_block_sides_only() {
        let mut level = two_rooms(2.0);
        level.connect_rooms(0, 1, Some(PortalBound::Z { min: 1.0, max: 3.0 }), None).unwrap();
        level.generate_static_data();
        let connector = level.room(2).unwrap().mesh().unwrap();
        // Two side walls remain; the portal ends have no collision
        assert_eq!(connector.segments.len(), 2);
    }

    #[test]
    fn test_default_bound_is_edge_overlap() {
        let mut level = Level::new();
        level.add_rect_room(0.0, 5.0, 0.0, 5.0, RoomStyle::default()).unwrap();
        level.add_rect_room(5.0, 10.0, 2.0, 8.0, RoomStyle::default()).unwrap();
        level.connect_rooms(0, 1, None, None).unwrap();

        let portal = level.room(0).unwrap().portals(0)[0];
        // Edge 0 of A runs from z = 5 down to z = 0; overlap is z in [2, 5]
        assert!(portal.start.abs() < 1e-5);
        assert!((portal.end - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_connect_after_freeze_fails() {
        let mut level = two_rooms(2.0);
        level.generate_static_data();
        assert_eq!(level.connect_rooms(0, 1, None, None), Err(WorldError::StructuralFrozen));
    }
}
