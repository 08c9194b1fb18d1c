//! Entity data
//!
//! Every entity has a `Body` (where it is, which way it faces, how much
//! floor it occupies). What it can do depends on its kind: agents carry,
//! blocks stack.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::math::{facing_vector, Vec3};
use super::entity::EntityId;

// =============================================================================
// Body
// =============================================================================

/// Position, facing and footprint shared by all entities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Position of the base (y = bottom of the entity)
    pub pos: Vec3,
    /// Facing angle in radians around Y; 0 looks down +X
    pub dir: f32,
    /// Footprint radius used for collision
    pub radius: f32,
    pub height: f32,
}

impl Body {
    pub fn new(radius: f32, height: f32) -> Self {
        Self { pos: Vec3::ZERO, dir: 0.0, radius, height }
    }

    /// Unit vector the entity faces
    pub fn dir_vec(&self) -> Vec3 {
        facing_vector(self.dir)
    }

    /// Centre of the entity's volume
    pub fn center(&self) -> Vec3 {
        self.pos + Vec3::UP * (self.height * 0.5)
    }
}

// =============================================================================
// Agent
// =============================================================================

pub mod agent {
    pub const RADIUS: f32 = 0.4;
    pub const HEIGHT: f32 = 1.6;
    pub const CAM_HEIGHT: f32 = 1.5;
    /// Vertical field of view in degrees
    pub const FOV_Y: f32 = 60.0;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Eye height above the floor
    pub cam_height: f32,
    /// Vertical field of view in degrees
    pub fov_y: f32,
    /// Block currently held
    pub carrying: Option<EntityId>,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            cam_height: agent::CAM_HEIGHT,
            fov_y: agent::FOV_Y,
            carrying: None,
        }
    }
}

// =============================================================================
// Blocks
// =============================================================================

/// Block colours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockColor {
    Red,
    Green,
    Blue,
    Purple,
    Yellow,
    Grey,
}

impl BlockColor {
    pub const ALL: [BlockColor; 6] = [
        BlockColor::Red,
        BlockColor::Green,
        BlockColor::Blue,
        BlockColor::Purple,
        BlockColor::Yellow,
        BlockColor::Grey,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlockColor::Red => "red",
            BlockColor::Green => "green",
            BlockColor::Blue => "blue",
            BlockColor::Purple => "purple",
            BlockColor::Yellow => "yellow",
            BlockColor::Grey => "grey",
        }
    }

    /// Base colour, components in 0..1
    pub fn rgb(self) -> [f32; 3] {
        match self {
            BlockColor::Red => [1.0, 0.0, 0.0],
            BlockColor::Green => [0.0, 1.0, 0.0],
            BlockColor::Blue => [0.0, 0.0, 1.0],
            BlockColor::Purple => [0.44, 0.15, 0.76],
            BlockColor::Yellow => [1.0, 1.0, 0.0],
            BlockColor::Grey => [0.39, 0.39, 0.39],
        }
    }

    /// Colour shifted per channel by a per-episode bias, clamped to 0..1
    pub fn biased_rgb(self, bias: [f32; 3]) -> [f32; 3] {
        let rgb = self.rgb();
        [0, 1, 2].map(|i| (rgb[i] + bias[i]).clamp(0.0, 1.0))
    }
}

impl fmt::Display for BlockColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlockColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockColor::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown block colour '{}'", s))
    }
}

/// A stackable cube
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub color: BlockColor,
    /// Edge length
    pub size: f32,
    /// Block resting on top of this one (`None` = this block is topmost)
    pub above: Option<EntityId>,
    /// Block this one rests on
    pub below: Option<EntityId>,
}

impl Block {
    pub fn new(color: BlockColor, size: f32) -> Self {
        Self { color, size, above: None, below: None }
    }

    /// Footprint radius: half the diagonal of the square base
    pub fn radius(&self) -> f32 {
        std::f32::consts::SQRT_2 * self.size * 0.5
    }

    pub fn is_topmost(&self) -> bool {
        self.above.is_none()
    }

    /// Body for a block of this size
    pub fn body(&self) -> Body {
        Body::new(self.radius(), self.size)
    }
}

// =============================================================================
// Entity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    Agent(Agent),
    Block(Block),
}

/// An entity stored in the world arena
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub body: Body,
    pub kind: EntityKind,
}

impl Entity {
    pub fn agent() -> Self {
        Self {
            body: Body::new(agent::RADIUS, agent::HEIGHT),
            kind: EntityKind::Agent(Agent::default()),
        }
    }

    pub fn block(color: BlockColor, size: f32) -> Self {
        let block = Block::new(color, size);
        Self { body: block.body(), kind: EntityKind::Block(block) }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match &self.kind {
            EntityKind::Block(b) => Some(b),
            EntityKind::Agent(_) => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.kind {
            EntityKind::Block(b) => Some(b),
            EntityKind::Agent(_) => None,
        }
    }

    pub fn as_agent(&self) -> Option<&Agent> {
        match &self.kind {
            EntityKind::Agent(a) => Some(a),
            EntityKind::Block(_) => None,
        }
    }

    pub fn as_agent_mut(&mut self) -> Option<&mut Agent> {
        match &mut self.kind {
            EntityKind::Agent(a) => Some(a),
            EntityKind::Block(_) => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, EntityKind::Block(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_footprint() {
        let block = Block::new(BlockColor::Red, 0.6);
        assert!((block.radius() - 0.42426).abs() < 1e-4);
        let body = block.body();
        assert_eq!(body.height, 0.6);
        assert!(block.is_topmost());
    }

    #[test]
    fn test_body_dir_vec() {
        let mut body = Body::new(1.0, 1.0);
        body.dir = std::f32::consts::PI;
        let v = body.dir_vec();
        assert!((v.x + 1.0).abs() < 1e-6 && v.z.abs() < 1e-5);
    }

    #[test]
    fn test_color_names_round_trip() {
        for color in BlockColor::ALL {
            assert_eq!(color.name().parse::<BlockColor>(), Ok(color));
        }
        assert!("magenta".parse::<BlockColor>().is_err());
    }

    #[test]
    fn test_color_bias_is_clamped() {
        assert_eq!(BlockColor::Red.biased_rgb([0.2; 3]), [1.0, 0.2, 0.2]);
        assert_eq!(BlockColor::Blue.biased_rgb([0.0, 0.1, -0.2]), [0.0, 0.1, 0.8]);
    }

    #[test]
    fn test_entity_kinds() {
        let agent = Entity::agent();
        assert!(agent.as_agent().is_some());
        assert!(!agent.is_block());
        assert_eq!(agent.body.radius, agent::RADIUS);

        let block = Entity::block(BlockColor::Grey, 0.4);
        assert_eq!(block.as_block().map(|b| b.color), Some(BlockColor::Grey));
    }
}
