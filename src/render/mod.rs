//! Rendering
//!
//! The world never draws itself. A renderer receives a `Scene` snapshot
//! (geometry, entity bodies and the episode's sky and light parameters)
//! and produces RGB images: the agent's first-person view and an overhead
//! map of the floor plan. `RayCastRenderer` is the reference software
//! implementation; anything implementing `Renderer` can replace it.
//! `to_greyscale` turns a view into a single-channel observation.

pub mod camera;
pub mod raycast;

pub use camera::{CameraPose, TopDownPose, TOP_VIEW_MARGIN};
pub use raycast::{texture_color, RayCastRenderer};

use image::{GrayImage, Luma, RgbImage};
use crate::game::{Body, EntityId, EpisodeParams, World};
use crate::world::Level;

/// Colour the agent is drawn with on the map
pub const AGENT_COLOR: [f32; 3] = [0.85, 0.3, 0.1];

/// One entity as the renderer sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneEntity {
    pub id: EntityId,
    pub body: Body,
    /// Half the side of the square footprint
    pub half_width: f32,
    /// Final colour, bias already applied
    pub color: [f32; 3],
    pub is_agent: bool,
}

/// Everything needed to draw one frame
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    pub level: &'a Level,
    pub entities: Vec<SceneEntity>,
    pub params: EpisodeParams,
}

impl<'a> Scene<'a> {
    pub fn from_world(world: &'a World) -> Self {
        let params = world.params;
        let entities = world
            .entities()
            .map(|(id, entity)| match entity.as_block() {
                Some(block) => SceneEntity {
                    id,
                    body: entity.body,
                    half_width: block.size * 0.5,
                    color: block.color.biased_rgb(params.obj_color_bias),
                    is_agent: false,
                },
                None => SceneEntity {
                    id,
                    body: entity.body,
                    half_width: entity.body.radius,
                    color: AGENT_COLOR,
                    is_agent: true,
                },
            })
            .collect();

        Self { level: world.level(), entities, params }
    }

    /// Static data generation of the level, for geometry caches
    pub fn generation(&self) -> u64 {
        self.level.generation()
    }
}

/// Produces images of a scene
pub trait Renderer {
    /// First-person view through `camera`. Agents are not drawn.
    fn render_view(&mut self, scene: &Scene, camera: &CameraPose, width: u32, height: u32) -> RgbImage;

    /// Overhead map of the whole floor plan, agents included
    fn render_top_view(&mut self, scene: &Scene, width: u32, height: u32) -> RgbImage;

    /// Non-agent entities inside the view of `camera` that nothing occludes
    fn visible_entities(&mut self, scene: &Scene, camera: &CameraPose, width: u32, height: u32) -> Vec<EntityId>;
}

/// Luma with weights 0.30, 0.59 and 0.11
pub fn to_greyscale(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let luma = 0.30 * r as f32 + 0.59 * g as f32 + 0.11 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_greyscale_weights() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        img.put_pixel(2, 0, Rgb([0, 0, 200]));

        let grey = to_greyscale(&img);
        assert_eq!(grey.dimensions(), (3, 1));
        assert_eq!(grey.get_pixel(0, 0), &Luma([18]));
        assert_eq!(grey.get_pixel(1, 0), &Luma([255]));
        assert_eq!(grey.get_pixel(2, 0), &Luma([22]));
    }
}
