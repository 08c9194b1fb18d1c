//! Rays and the slab test used for picking
//!
//! Picking is a floor-plane problem: boxes are treated as infinitely tall,
//! so only the X and Z slabs take part in the test.

use super::Vec3;

/// A 3D ray with origin and direction
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,  // Normalized
}

impl Ray {
    /// Create a new ray, normalizing the direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize()
        }
    }

    /// Get point at distance t along ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Find the intersection of a ray with a plane.
///
/// Returns the distance along the ray to the intersection point,
/// or None if the ray is parallel to the plane or intersection is behind ray origin.
pub fn ray_plane_intersection(
    ray: &Ray,
    plane_point: Vec3,
    plane_normal: Vec3,
) -> Option<f32> {
    let denom = ray.direction.dot(plane_normal);
    if denom.abs() < 0.0001 {
        return None;  // Ray parallel to plane
    }

    let t = (plane_point - ray.origin).dot(plane_normal) / denom;
    if t < 0.0 {
        return None;  // Intersection behind ray origin
    }

    Some(t)
}

/// Intersect a ray with an axis-aligned square footprint, infinite in Y.
///
/// The box is centered on `center` (x, z) with half-width `half_extent` on
/// both axes. Returns the entry distance `t_min` along the ray, which is
/// negative when the origin is already inside the box.
///
/// Returns `None` when:
/// - the ray is parallel to an axis and its origin lies outside that slab
/// - the slab intervals do not overlap (`t_min > t_max`)
/// - the box is entirely behind the origin (`t_max < 0`)
/// - the ray has no horizontal component at all
pub fn ray_box_xz(ray: &Ray, center: Vec3, half_extent: f32) -> Option<f32> {
    let origin = [ray.origin.x, ray.origin.z];
    let dir = [ray.direction.x, ray.direction.z];
    let lo = [center.x - half_extent, center.z - half_extent];
    let hi = [center.x + half_extent, center.z + half_extent];

    if dir[0] == 0.0 && dir[1] == 0.0 {
        return None;
    }

    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for axis in 0..2 {
        if dir[axis] != 0.0 {
            let t1 = (lo[axis] - origin[axis]) / dir[axis];
            let t2 = (hi[axis] - origin[axis]) / dir[axis];
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        } else if origin[axis] < lo[axis] || origin[axis] > hi[axis] {
            // Parallel to this slab and outside it
            return None;
        }
    }

    if t_min > t_max || t_max < 0.0 {
        return None;
    }

    Some(t_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        );
        let p = ray.at(5.0);
        assert!((p.x - 5.0).abs() < 0.001);
        assert!((p.y - 0.0).abs() < 0.001);
        assert!((p.z - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_ray_plane_intersection() {
        let ray = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(1.0, -1.0, 0.0));
        let t = ray_plane_intersection(&ray, Vec3::ZERO, Vec3::UP).unwrap();
        let hit = ray.at(t);
        assert!((hit.x - 2.0).abs() < 1e-5 && hit.y.abs() < 1e-5);

        // Parallel and behind
        let flat = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(ray_plane_intersection(&flat, Vec3::ZERO, Vec3::UP).is_none());
        let up = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::UP);
        assert!(ray_plane_intersection(&up, Vec3::ZERO, Vec3::UP).is_none());
    }

    #[test]
    fn test_ray_box_straight_ahead() {
        let ray = Ray::new(Vec3::ground(0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let t = ray_box_xz(&ray, Vec3::ground(5.0, 0.0), 0.5);
        assert!(t.is_some());
        let t = t.unwrap();
        assert!(t >= 0.0);
        assert!((t - 4.5).abs() < 1e-5);
    }

    #[test]
    fn test_ray_box_behind_origin() {
        let ray = Ray::new(Vec3::ground(0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        assert!(ray_box_xz(&ray, Vec3::ground(5.0, 0.0), 0.5).is_none());
    }

    #[test]
    fn test_ray_box_parallel_outside_slab() {
        // Travelling along X, but the box is off to the side in Z
        let ray = Ray::new(Vec3::ground(0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(ray_box_xz(&ray, Vec3::ground(5.0, 3.0), 0.5).is_none());

        // Travelling along Z, box off to the side in X
        let ray = Ray::new(Vec3::ground(0.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(ray_box_xz(&ray, Vec3::ground(3.0, 5.0), 0.5).is_none());
        // ...and inside the X slab it hits
        assert!(ray_box_xz(&ray, Vec3::ground(0.2, 5.0), 0.5).is_some());
    }

    #[test]
    fn test_ray_box_vertical_ray() {
        // No horizontal direction: parallel to both slabs
        let ray = Ray::new(Vec3::ground(0.0, 0.0), Vec3::UP);
        assert!(ray_box_xz(&ray, Vec3::ground(5.0, 5.0), 0.5).is_none());
    }

    #[test]
    fn test_ray_box_miss_diagonal() {
        let ray = Ray::new(Vec3::ground(0.0, 0.0), Vec3::new(1.0, 0.0, 1.0));
        assert!(ray_box_xz(&ray, Vec3::ground(5.0, -5.0), 0.5).is_none());
        assert!(ray_box_xz(&ray, Vec3::ground(5.0, 5.0), 0.5).is_some());
    }
}
