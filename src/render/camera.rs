//! Camera poses for the agent view and the overhead map

use crate::game::{Agent, Body};
use crate::math::{Ray, Vec3};
use crate::world::FloorExtents;

/// Margin around the floor plan in the top view, in metres
pub const TOP_VIEW_MARGIN: f32 = 1.0;

/// Perspective camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov_y: f32,
}

impl CameraPose {
    /// Eye of an agent: at camera height above its base, looking along its facing
    pub fn from_agent(body: &Body, agent: &Agent) -> Self {
        let position = body.pos + Vec3::UP * agent.cam_height;
        Self {
            position,
            target: position + body.dir_vec(),
            up: Vec3::UP,
            fov_y: agent.fov_y,
        }
    }

    /// Orthonormal (forward, right, up) basis
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);
        (forward, right, up)
    }

    /// Ray through the centre of pixel (px, py); row 0 is the top of the image
    pub fn pixel_ray(&self, px: u32, py: u32, width: u32, height: u32) -> Ray {
        let (forward, right, up) = self.basis();
        let aspect = width as f32 / height as f32;
        let tan_half = (self.fov_y.to_radians() * 0.5).tan();

        let sx = (2.0 * (px as f32 + 0.5) / width as f32 - 1.0) * aspect * tan_half;
        let sy = (1.0 - 2.0 * (py as f32 + 0.5) / height as f32) * tan_half;
        Ray::new(self.position, forward + right * sx + up * sy)
    }

    /// True if `p` falls inside the view frustum (ignoring near/far)
    pub fn sees(&self, p: Vec3, width: u32, height: u32) -> bool {
        let (forward, right, up) = self.basis();
        let d = p - self.position;
        let depth = d.dot(forward);
        if depth <= 0.0 {
            return false;
        }

        let tan_half = (self.fov_y.to_radians() * 0.5).tan();
        let aspect = width as f32 / height as f32;
        (d.dot(right) / depth).abs() <= tan_half * aspect && (d.dot(up) / depth).abs() <= tan_half
    }
}

/// Orthographic window onto the floor plan, seen from above
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopDownPose {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl TopDownPose {
    /// Frame the floor plan with a margin, then grow the short side so the
    /// window has the framebuffer's aspect ratio.
    pub fn framing(extents: FloorExtents, width: u32, height: u32) -> Self {
        let mut min_x = extents.min_x - TOP_VIEW_MARGIN;
        let mut max_x = extents.max_x + TOP_VIEW_MARGIN;
        let mut min_z = extents.min_z - TOP_VIEW_MARGIN;
        let mut max_z = extents.max_z + TOP_VIEW_MARGIN;

        let w = max_x - min_x;
        let h = max_z - min_z;
        let aspect = w / h;
        let fb_aspect = width as f32 / height as f32;

        if aspect > fb_aspect {
            let grow = w / fb_aspect - h;
            min_z -= grow / 2.0;
            max_z += grow / 2.0;
        } else if aspect < fb_aspect {
            let grow = h * fb_aspect - w;
            min_x -= grow / 2.0;
            max_x += grow / 2.0;
        }

        Self { min_x, max_x, min_z, max_z }
    }

    /// Floor point under the centre of pixel (px, py); row 0 is min z
    pub fn pixel_to_floor(&self, px: u32, py: u32, width: u32, height: u32) -> Vec3 {
        let u = (px as f32 + 0.5) / width as f32;
        let v = (py as f32 + 0.5) / height as f32;
        Vec3::ground(
            self.min_x + u * (self.max_x - self.min_x),
            self.min_z + v * (self.max_z - self.min_z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).len() < 1e-5
    }

    #[test]
    fn test_basis_facing_x() {
        let cam = CameraPose {
            position: Vec3::new(0.0, 1.0, 0.0),
            target: Vec3::new(1.0, 1.0, 0.0),
            up: Vec3::UP,
            fov_y: 60.0,
        };
        let (forward, right, up) = cam.basis();
        assert!(approx(forward, Vec3::new(1.0, 0.0, 0.0)));
        // Turning left (positive angle) goes towards -z, so right is +z
        assert!(approx(right, Vec3::new(0.0, 0.0, 1.0)));
        assert!(approx(up, Vec3::UP));

        let centre = cam.pixel_ray(1, 1, 3, 3);
        assert!(approx(centre.direction, forward));
        let top_left = cam.pixel_ray(0, 0, 3, 3);
        assert!(top_left.direction.y > 0.0 && top_left.direction.z < 0.0);
    }

    #[test]
    fn test_frustum() {
        let mut body = Body::new(0.4, 1.6);
        body.pos = Vec3::ground(0.0, 0.0);
        let cam = CameraPose::from_agent(&body, &Agent::default());
        assert!(cam.sees(Vec3::new(3.0, 1.5, 0.0), 80, 60));
        assert!(!cam.sees(Vec3::new(-3.0, 1.5, 0.0), 80, 60));
        assert!(!cam.sees(Vec3::new(1.0, 1.5, 3.0), 80, 60));
    }

    #[test]
    fn test_top_down_framing() {
        let extents = FloorExtents { min_x: 0.0, max_x: 6.0, min_z: 0.0, max_z: 6.0 };

        // 8x8 window widened to 16x8 for a 2:1 framebuffer
        let pose = TopDownPose::framing(extents, 200, 100);
        assert_eq!((pose.min_z, pose.max_z), (-1.0, 7.0));
        assert_eq!((pose.min_x, pose.max_x), (-5.0, 11.0));

        let pose = TopDownPose::framing(extents, 100, 100);
        assert_eq!(pose, TopDownPose { min_x: -1.0, max_x: 7.0, min_z: -1.0, max_z: 7.0 });
        let p = pose.pixel_to_floor(0, 99, 100, 100);
        assert!((p.x - -0.96).abs() < 1e-4 && (p.z - 6.96).abs() < 1e-4);
    }
}
