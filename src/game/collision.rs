//! Collision and picking queries
//!
//! Everything here works on the floor plane: entities are vertical
//! cylinders (for overlap) or infinitely tall square boxes (for picking),
//! and walls are 2D segments.

use crate::math::{point_to_segment_distance, ray_box_xz, Ray, Vec3};
use crate::world::WallSegment;
use super::components::Body;
use super::entity::EntityId;

/// What a position ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    Wall,
    Entity(EntityId),
}

/// Does a circle on the floor overlap any wall segment?
///
/// Touching (distance exactly equal to the radius) is not an overlap.
pub fn circle_intersects_segments(pos: Vec3, radius: f32, segments: &[WallSegment]) -> bool {
    segments
        .iter()
        .any(|seg| point_to_segment_distance(pos, seg.a, seg.b) < radius)
}

/// Check a circle at `pos` against walls, then against every entity except `ignore`.
///
/// Walls are tested first, so a position blocked by both reports `Wall`.
/// Among entities the first one in iteration order wins.
pub fn intersect<'a, I>(
    segments: &[WallSegment],
    entities: I,
    ignore: Option<EntityId>,
    pos: Vec3,
    radius: f32,
) -> Option<Collision>
where
    I: IntoIterator<Item = (EntityId, &'a Body)>,
{
    if circle_intersects_segments(pos, radius, segments) {
        return Some(Collision::Wall);
    }

    entities
        .into_iter()
        .filter(|(id, _)| Some(*id) != ignore)
        .find(|(_, body)| pos.distance_xz(body.pos) < radius + body.radius)
        .map(|(id, _)| Collision::Entity(id))
}

/// Entry distance of a ray into an entity's square footprint (side `2 * radius`).
pub fn ray_vs_entity_box(origin: Vec3, direction: Vec3, body: &Body) -> Option<f32> {
    ray_box_xz(&Ray::new(origin, direction), body.pos, body.radius)
}

/// All candidates hit by the ray, nearest first.
///
/// Ties keep the candidates' original order.
pub fn select_facing_entity<'a, I>(origin: Vec3, direction: Vec3, candidates: I) -> Vec<(EntityId, f32)>
where
    I: IntoIterator<Item = (EntityId, &'a Body)>,
{
    let mut hits: Vec<(EntityId, f32)> = candidates
        .into_iter()
        .filter_map(|(id, body)| ray_vs_entity_box(origin, direction, body).map(|t| (id, t)))
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_at(x: f32, z: f32, radius: f32) -> Body {
        Body { pos: Vec3::ground(x, z), dir: 0.0, radius, height: 1.0 }
    }

    fn square_walls() -> Vec<WallSegment> {
        let c = [
            Vec3::ground(0.0, 0.0),
            Vec3::ground(10.0, 0.0),
            Vec3::ground(10.0, 10.0),
            Vec3::ground(0.0, 10.0),
        ];
        (0..4).map(|i| WallSegment { a: c[i], b: c[(i + 1) % 4] }).collect()
    }

    #[test]
    fn test_circle_vs_walls() {
        let walls = square_walls();
        assert!(!circle_intersects_segments(Vec3::ground(5.0, 5.0), 1.0, &walls));
        assert!(circle_intersects_segments(Vec3::ground(0.5, 5.0), 1.0, &walls));
        // Exactly touching does not count
        assert!(!circle_intersects_segments(Vec3::ground(1.0, 5.0), 1.0, &walls));
    }

    #[test]
    fn test_intersect_reports_wall_first() {
        let walls = square_walls();
        let ids = [EntityId::new(0, 0), EntityId::new(1, 0)];
        let bodies = [body_at(0.8, 5.0, 0.5), body_at(5.0, 5.0, 0.5)];
        let entities = || ids.iter().copied().zip(bodies.iter());

        assert_eq!(
            intersect(&walls, entities(), None, Vec3::ground(0.5, 5.0), 0.6),
            Some(Collision::Wall)
        );
        assert_eq!(
            intersect(&walls, entities(), None, Vec3::ground(5.5, 5.0), 0.6),
            Some(Collision::Entity(ids[1]))
        );
        // An entity never collides with itself
        assert_eq!(intersect(&walls, entities(), Some(ids[1]), Vec3::ground(5.5, 5.0), 0.6), None);
        assert_eq!(intersect(&walls, entities(), None, Vec3::ground(8.0, 8.0), 0.6), None);
    }

    #[test]
    fn test_ray_vs_entity_box_uses_radius() {
        let body = body_at(5.0, 0.0, 0.5);
        let t = ray_vs_entity_box(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), &body).unwrap();
        assert!((t - 4.5).abs() < 1e-5);
        assert!(ray_vs_entity_box(Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.0), &body).is_none());
    }

    #[test]
    fn test_select_facing_entity_orders_by_distance() {
        let ids = [EntityId::new(0, 0), EntityId::new(1, 0), EntityId::new(2, 0), EntityId::new(3, 0)];
        let bodies = [
            body_at(8.0, 0.0, 0.3),
            body_at(2.0, 0.0, 0.3),
            body_at(5.0, 3.0, 0.3), // off to the side
            body_at(5.0, 0.0, 0.3),
        ];
        let hits = select_facing_entity(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            ids.iter().copied().zip(bodies.iter()),
        );

        let order: Vec<EntityId> = hits.iter().map(|h| h.0).collect();
        assert_eq!(order, vec![ids[1], ids[3], ids[0]]);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_select_facing_entity_keeps_stack_order() {
        // Stacked blocks share a footprint: equal distances, original order kept
        let ids = [EntityId::new(0, 0), EntityId::new(1, 0), EntityId::new(2, 0)];
        let mut bodies = [body_at(4.0, 0.0, 0.4); 3];
        for (i, b) in bodies.iter_mut().enumerate() {
            b.pos.y = i as f32 * 0.6;
        }
        let hits = select_facing_entity(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            ids.iter().copied().zip(bodies.iter()),
        );
        let order: Vec<EntityId> = hits.iter().map(|h| h.0).collect();
        assert_eq!(order, ids.to_vec());
    }
}
