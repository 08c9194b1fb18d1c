//! Vector math for room geometry and spatial queries
//!
//! Everything lives in a right-handed, Y-up frame. Room outlines are 2D
//! footprints in the XZ plane; most collision work ignores Y entirely.

use std::ops::{Add, Mul, Neg, Sub};
use serde::{Serialize, Deserialize};

pub mod ray;

pub use ray::{Ray, ray_box_xz, ray_plane_intersection};

/// 3D Vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UP: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Point on the floor plane (y = 0)
    pub fn ground(x: f32, z: f32) -> Self {
        Self { x, y: 0.0, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn len(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn normalize(self) -> Vec3 {
        let l = self.len();
        if l == 0.0 {
            return Vec3::ZERO;
        }
        Vec3 {
            x: self.x / l,
            y: self.y / l,
            z: self.z / l,
        }
    }

    pub fn scale(self, s: f32) -> Vec3 {
        Vec3 {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    /// Drop the height component (project onto the floor plane)
    pub fn flatten(self) -> Vec3 {
        Vec3 { x: self.x, y: 0.0, z: self.z }
    }

    /// Horizontal (x, z) pair
    pub fn xz(self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }

    /// Distance between two points ignoring height
    pub fn distance_xz(self, other: Vec3) -> f32 {
        (self - other).flatten().len()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f32) -> Vec3 {
        self.scale(s)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        self.scale(-1.0)
    }
}

/// 2D Vector (outline points, texture coordinates)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Shortest distance from point P to segment AB, measured in the XZ plane.
pub fn point_to_segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    let len_sq = dx * dx + dz * dz;

    if len_sq < 1e-12 {
        // Segment is essentially a point
        return p.distance_xz(a);
    }

    // Project point onto line segment
    let t = ((p.x - a.x) * dx + (p.z - a.z) * dz) / len_sq;
    let t = t.clamp(0.0, 1.0);

    let closest_x = a.x + t * dx;
    let closest_z = a.z + t * dz;

    let dist_x = p.x - closest_x;
    let dist_z = p.z - closest_z;
    (dist_x * dist_x + dist_z * dist_z).sqrt()
}

/// Even-odd point-in-polygon test in the XZ plane. Works for any simple
/// polygon regardless of winding.
pub fn point_in_polygon_xz(p: Vec3, polygon: &[Vec3]) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.z > p.z) != (b.z > p.z) {
            let x = a.x + (p.z - a.z) / (b.z - a.z) * (b.x - a.x);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Unit facing vector for a yaw angle (radians). Angle 0 looks down +X,
/// positive angles turn toward -Z.
pub fn facing_vector(angle: f32) -> Vec3 {
    Vec3::new(angle.cos(), 0.0, -angle.sin())
}
