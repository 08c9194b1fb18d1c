//! Game World
//!
//! The World ties the room geometry to the entities living in it:
//! - Entity arena with generational ids (invalidated on reset)
//! - Random placement against walls and other entities
//! - Agent actions: turn, pick up, drop
//! - Stack links between blocks, always updated on both sides
//!
//! Rejected actions are not errors. They return `false` and leave the
//! world untouched.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Serialize, Deserialize};
use crate::error::{WorldError, WorldResult};
use crate::math::Vec3;
use crate::world::{FloorExtents, Level};
use super::collision::{self, Collision};
use super::components::{Block, BlockColor, Body, Entity};
use super::entity::{EntityAllocator, EntityId};
use super::params::EpisodeParams;

/// Slack on the turn limits so a turn landing exactly on a bound is
/// rejected despite float rounding
const TURN_EPSILON: f32 = 1e-5;

/// Carried blocks are held this far below eye level
const CARRY_DROP: f32 = 0.3;

/// Extra margin between the agent and a carried block
const CARRY_MARGIN: f32 = 1.05;

/// A block base this close to a drop spot counts as standing on it
const SPOT_TOLERANCE: f32 = 0.05;

/// Tunables for the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    /// Turn limits in degrees, exclusive, relative to facing +X
    pub min_turn_deg: f32,
    pub max_turn_deg: f32,
    /// Random placement gives up after this many samples
    pub max_placement_attempts: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            min_turn_deg: -45.0,
            max_turn_deg: 45.0,
            max_placement_attempts: 10_000,
        }
    }
}

/// Where to put a new entity. Everything left as `None` is chosen at random.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Placement {
    /// Room to sample in; otherwise chosen proportionally to floor area
    pub room: Option<usize>,
    /// Exact position; skips all checks
    pub pos: Option<Vec3>,
    /// Facing in radians
    pub dir: Option<f32>,
    /// Restrict sampling to part of the room
    pub region: Option<FloorExtents>,
}

impl Placement {
    pub fn at(pos: Vec3, dir: f32) -> Self {
        Self { pos: Some(pos), dir: Some(dir), ..Default::default() }
    }

    pub fn in_room(room: usize) -> Self {
        Self { room: Some(room), ..Default::default() }
    }
}

/// The simulated world: rooms plus the entities inside them.
#[derive(Debug, Clone)]
pub struct World {
    level: Level,
    allocator: EntityAllocator,
    /// Indexed by `EntityId::index`
    slots: Vec<Option<Entity>>,
    /// Insertion order, used for every scan over entities
    order: Vec<EntityId>,
    agent: Option<EntityId>,
    drop_spots: Vec<Vec3>,
    pub settings: WorldSettings,
    pub params: EpisodeParams,
}

impl World {
    pub fn new(level: Level, settings: WorldSettings) -> Self {
        Self {
            level,
            allocator: EntityAllocator::new(),
            slots: Vec::new(),
            order: Vec::new(),
            agent: None,
            drop_spots: Vec::new(),
            settings,
            params: EpisodeParams::default(),
        }
    }

    /// Start a new episode: swap in fresh geometry and drop every entity.
    /// Ids handed out before the reset stop resolving.
    pub fn reset(&mut self, level: Level, params: EpisodeParams) {
        self.level = level;
        self.params = params;
        self.allocator.clear();
        self.slots.clear();
        self.order.clear();
        self.agent = None;
        self.drop_spots.clear();
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Mutable access to the geometry (fails on structural edits once frozen)
    pub fn level_mut(&mut self) -> &mut Level {
        &mut self.level
    }

    // =========================================================================
    // Entity storage
    // =========================================================================

    pub fn get(&self, id: EntityId) -> WorldResult<&Entity> {
        if !self.allocator.is_alive(id) {
            return Err(WorldError::UnknownEntity);
        }
        self.slots
            .get(id.index() as usize)
            .and_then(Option::as_ref)
            .ok_or(WorldError::UnknownEntity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> WorldResult<&mut Entity> {
        if !self.allocator.is_alive(id) {
            return Err(WorldError::UnknownEntity);
        }
        self.slots
            .get_mut(id.index() as usize)
            .and_then(Option::as_mut)
            .ok_or(WorldError::UnknownEntity)
    }

    fn block(&self, id: EntityId) -> WorldResult<&Block> {
        self.get(id)?.as_block().ok_or(WorldError::UnknownEntity)
    }

    fn block_mut(&mut self, id: EntityId) -> WorldResult<&mut Block> {
        self.get_mut(id)?.as_block_mut().ok_or(WorldError::UnknownEntity)
    }

    fn insert(&mut self, entity: Entity) -> EntityId {
        let id = self.allocator.allocate();
        let idx = id.index() as usize;
        if self.slots.len() <= idx {
            self.slots.resize(idx + 1, None);
        }
        self.slots[idx] = Some(entity);
        self.order.push(id);
        id
    }

    /// All entities in insertion order
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.order
            .iter()
            .filter_map(move |&id| self.slots.get(id.index() as usize)?.as_ref().map(|e| (id, e)))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (EntityId, &Body)> {
        self.entities().map(|(id, e)| (id, &e.body))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities().filter(|(_, e)| e.is_block())
    }

    pub fn num_entities(&self) -> usize {
        self.order.len()
    }

    pub fn agent_id(&self) -> Option<EntityId> {
        self.agent
    }

    pub fn agent(&self) -> WorldResult<&Entity> {
        self.get(self.agent.ok_or(WorldError::UnknownEntity)?)
    }

    /// Block the agent is holding, if any
    pub fn carrying(&self) -> Option<EntityId> {
        self.agent().ok()?.as_agent()?.carrying
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Add an entity to the world.
    ///
    /// With an explicit position the entity is put there as-is (facing
    /// `dir`, or random). Otherwise positions are sampled inside a room
    /// until one lies inside the outline and clears walls and entities.
    pub fn place_entity<R: Rng>(
        &mut self,
        mut entity: Entity,
        placement: &Placement,
        rng: &mut R,
    ) -> WorldResult<EntityId> {
        if self.level.num_rooms() == 0 {
            return Err(WorldError::InvalidGeometry("create rooms before placing entities".into()));
        }
        self.level.generate_static_data();

        if let Some(pos) = placement.pos {
            entity.body.pos = pos;
            entity.body.dir = placement.dir.unwrap_or_else(|| rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI));
            return Ok(self.insert(entity));
        }

        let (pos, dir) = self.sample_position(entity.body.radius, placement, rng)?;
        entity.body.pos = pos;
        entity.body.dir = dir;
        Ok(self.insert(entity))
    }

    fn sample_position<R: Rng>(
        &self,
        radius: f32,
        placement: &Placement,
        rng: &mut R,
    ) -> WorldResult<(Vec3, f32)> {
        if let Some(r) = placement.region {
            if !(r.min_x - radius <= r.max_x + radius && r.min_z - radius <= r.max_z + radius) {
                return Err(WorldError::InvalidGeometry(format!(
                    "placement region x {}..{}, z {}..{} is empty", r.min_x, r.max_x, r.min_z, r.max_z
                )));
            }
        }

        let room_choice = match placement.room {
            Some(idx) => {
                self.level.room(idx)?;
                None
            }
            None => Some(
                WeightedIndex::new(self.level.room_weights())
                    .map_err(|e| WorldError::InvalidGeometry(format!("cannot pick a room: {}", e)))?,
            ),
        };

        let attempts = self.settings.max_placement_attempts;
        for attempt in 0..attempts {
            let room_idx = match (&room_choice, placement.room) {
                (Some(dist), _) => dist.sample(rng),
                (None, Some(idx)) => idx,
                (None, None) => 0,
            };
            let room = self.level.room(room_idx)?;

            let (lx, hx, lz, hz) = match placement.region {
                Some(r) => (r.min_x, r.max_x, r.min_z, r.max_z),
                None => (room.min_x(), room.max_x(), room.min_z(), room.max_z()),
            };
            let pos = Vec3::ground(
                rng.gen_range(lx - radius..=hx + radius),
                rng.gen_range(lz - radius..=hz + radius),
            );

            if !room.point_inside(pos) {
                continue;
            }
            if let Some(hit) = self.intersect(None, pos, radius) {
                log::trace!("placement attempt {} at {:?} blocked by {:?}", attempt, pos, hit);
                continue;
            }

            let dir = placement.dir.unwrap_or_else(|| rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI));
            return Ok((pos, dir));
        }

        log::warn!("no free position for radius {} after {} attempts", radius, attempts);
        Err(WorldError::PlacementExhausted { attempts })
    }

    /// Place the agent. `radius` and `cam_height` override the defaults.
    pub fn place_agent<R: Rng>(
        &mut self,
        placement: &Placement,
        radius: Option<f32>,
        cam_height: Option<f32>,
        rng: &mut R,
    ) -> WorldResult<EntityId> {
        if self.agent.is_some() {
            return Err(WorldError::InvalidGeometry("the world already has an agent".into()));
        }

        let mut agent = Entity::agent();
        if let Some(radius) = radius {
            agent.body.radius = radius;
        }
        if let (Some(h), Some(a)) = (cam_height, agent.as_agent_mut()) {
            a.cam_height = h;
        }

        let id = self.place_entity(agent, placement, rng)?;
        self.agent = Some(id);
        Ok(id)
    }

    /// Register a position blocks fall back to when dropped with nothing ahead
    pub fn add_drop_spot(&mut self, pos: Vec3) {
        self.drop_spots.push(pos);
    }

    pub fn drop_spots(&self) -> &[Vec3] {
        &self.drop_spots
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check a circle against walls and all entities except `ignore`
    pub fn intersect(&self, ignore: Option<EntityId>, pos: Vec3, radius: f32) -> Option<Collision> {
        collision::intersect(self.level.wall_segments(), self.bodies(), ignore, pos, radius)
    }

    /// Blocks hit by a ray, nearest first
    pub fn facing_blocks(&self, origin: Vec3, direction: Vec3) -> Vec<(EntityId, f32)> {
        collision::select_facing_entity(
            origin,
            direction,
            self.blocks().map(|(id, e)| (id, &e.body)),
        )
    }

    /// Where the agent holds a block while facing `agent_dir`
    fn carry_pos_for(&self, agent: &Entity, agent_dir: f32, block: &Body) -> Vec3 {
        let cam_height = agent.as_agent().map_or(0.0, |a| a.cam_height);
        let dist = agent.body.radius + block.radius + self.params.max_forward_step;
        let facing = crate::math::facing_vector(agent_dir);

        let mut pos = agent.body.pos + facing * (CARRY_MARGIN * dist);
        pos.y = agent.body.pos.y + (cam_height - block.height - CARRY_DROP).max(0.0);
        pos
    }

    /// Carry position of `block` for the agent's current facing
    pub fn carry_pos(&self, block: EntityId) -> WorldResult<Vec3> {
        let agent = self.agent()?;
        let body = self.get(block)?.body;
        Ok(self.carry_pos_for(agent, agent.body.dir, &body))
    }

    // =========================================================================
    // Stack links
    // =========================================================================

    /// Put `upper` on top of `lower`, setting both sides of the link
    pub fn link_stack(&mut self, lower: EntityId, upper: EntityId) -> WorldResult<()> {
        if lower == upper {
            return Err(WorldError::InvalidStack("a block cannot rest on itself".into()));
        }
        if self.block(lower)?.above.is_some() {
            return Err(WorldError::InvalidStack("lower block already has a block on top".into()));
        }
        if self.block(upper)?.below.is_some() {
            return Err(WorldError::InvalidStack("upper block already rests on a block".into()));
        }
        let mut next = self.block(lower)?.below;
        while let Some(id) = next {
            if id == upper {
                return Err(WorldError::InvalidStack("link would close a loop".into()));
            }
            next = self.block(id)?.below;
        }

        self.block_mut(lower)?.above = Some(upper);
        self.block_mut(upper)?.below = Some(lower);
        Ok(())
    }

    /// Detach `upper` from the block beneath it. Returns false if it was
    /// already free-standing.
    pub fn unlink_stack(&mut self, upper: EntityId) -> WorldResult<bool> {
        let Some(lower) = self.block(upper)?.below else {
            return Ok(false);
        };
        self.block_mut(lower)?.above = None;
        self.block_mut(upper)?.below = None;
        Ok(true)
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Turn the agent by `angle_deg` degrees (positive turns left).
    ///
    /// Rejected when the new facing leaves the turn limits, or when a
    /// carried block would hit something in its new spot.
    pub fn turn(&mut self, angle_deg: f32) -> WorldResult<bool> {
        let agent_id = self.agent.ok_or(WorldError::UnknownEntity)?;
        let agent = *self.get(agent_id)?;
        let new_dir = agent.body.dir + angle_deg.to_radians();

        let min = self.settings.min_turn_deg.to_radians();
        let max = self.settings.max_turn_deg.to_radians();
        if !(new_dir > min + TURN_EPSILON && new_dir < max - TURN_EPSILON) {
            log::debug!("turn by {:.1} deg rejected: outside limits", angle_deg);
            return Ok(false);
        }

        let carried = agent.as_agent().and_then(|a| a.carrying);
        if let Some(block_id) = carried {
            let body = self.get(block_id)?.body;
            let pos = self.carry_pos_for(&agent, new_dir, &body);
            if let Some(hit) = self.intersect(Some(block_id), pos, body.radius) {
                log::debug!("turn by {:.1} deg rejected: carried block hits {:?}", angle_deg, hit);
                return Ok(false);
            }

            let block = self.get_mut(block_id)?;
            block.body.pos = pos;
            block.body.dir = new_dir;
        }

        self.get_mut(agent_id)?.body.dir = new_dir;
        log::debug!("turned to {:.1} deg", new_dir.to_degrees());
        Ok(true)
    }

    /// Pick up the nearest topmost block straight ahead.
    pub fn pickup(&mut self) -> WorldResult<bool> {
        let agent_id = self.agent.ok_or(WorldError::UnknownEntity)?;
        let agent = *self.get(agent_id)?;
        if agent.as_agent().and_then(|a| a.carrying).is_some() {
            log::debug!("pickup ignored: hands full");
            return Ok(false);
        }

        let hits = self.facing_blocks(agent.body.pos, agent.body.dir_vec());
        let mut target = None;
        for (id, t) in hits {
            log::trace!("pickup candidate {:?} at t={:.3}", id, t);
            if self.block(id)?.is_topmost() {
                target = Some(id);
                break;
            }
        }
        let Some(block_id) = target else {
            log::debug!("pickup failed: no free block ahead");
            return Ok(false);
        };

        let body = self.get(block_id)?.body;
        let pos = self.carry_pos_for(&agent, agent.body.dir, &body);
        if let Some(hit) = self.intersect(Some(block_id), pos, body.radius) {
            log::debug!("pickup of {:?} rejected: carry position hits {:?}", block_id, hit);
            return Ok(false);
        }

        self.unlink_stack(block_id)?;
        if let Some(a) = self.get_mut(agent_id)?.as_agent_mut() {
            a.carrying = Some(block_id);
        }
        self.sync_carried()?;
        log::debug!("picked up {:?}", block_id);
        Ok(true)
    }

    /// Put the carried block down.
    ///
    /// Stacks it on the nearest topmost block ahead. With nothing ahead it
    /// goes to the drop spot closest to the facing ray (on top of whatever
    /// already stands there) with facing 0, or onto the floor where it is
    /// held if there are no drop spots.
    pub fn drop_carried(&mut self) -> WorldResult<bool> {
        let agent_id = self.agent.ok_or(WorldError::UnknownEntity)?;
        let agent = *self.get(agent_id)?;
        let Some(carried) = agent.as_agent().and_then(|a| a.carrying) else {
            log::debug!("drop ignored: nothing carried");
            return Ok(false);
        };

        let origin = agent.body.pos;
        let facing = agent.body.dir_vec();

        let mut target = None;
        for (id, _) in self.facing_blocks(origin, facing) {
            if id != carried && self.block(id)?.is_topmost() {
                target = Some(id);
                break;
            }
        }

        let (pos, dir) = match target {
            Some(lower) => {
                let lower_body = self.get(lower)?.body;
                self.link_stack(lower, carried)?;
                log::debug!("dropped {:?} onto {:?}", carried, lower);
                (lower_body.pos + Vec3::UP * lower_body.height, lower_body.dir)
            }
            None => match self.nearest_drop_spot(origin, facing) {
                Some(spot) => match self.stack_top_at(spot, Some(carried))? {
                    Some(lower) => {
                        let lower_body = self.get(lower)?.body;
                        self.link_stack(lower, carried)?;
                        log::debug!("dropped {:?} onto stack at {:?}", carried, spot);
                        (lower_body.pos + Vec3::UP * lower_body.height, 0.0)
                    }
                    None => {
                        log::debug!("dropped {:?} at spot {:?}", carried, spot);
                        (spot, 0.0)
                    }
                },
                None => {
                    let body = self.get(carried)?.body;
                    log::debug!("dropped {:?} on the floor", carried);
                    (body.pos.flatten(), body.dir)
                }
            },
        };

        let block = self.get_mut(carried)?;
        block.body.pos = pos;
        block.body.dir = dir;
        if let Some(a) = self.get_mut(agent_id)?.as_agent_mut() {
            a.carrying = None;
        }
        Ok(true)
    }

    /// Move a carried block to the agent's carry position.
    pub fn sync_carried(&mut self) -> WorldResult<()> {
        let Some(block_id) = self.carrying() else {
            return Ok(());
        };
        let pos = self.carry_pos(block_id)?;
        let dir = self.agent()?.body.dir;

        let block = self.get_mut(block_id)?;
        block.body.pos = pos;
        block.body.dir = dir;
        Ok(())
    }

    fn nearest_drop_spot(&self, origin: Vec3, facing: Vec3) -> Option<Vec3> {
        self.drop_spots
            .iter()
            .map(|&spot| (spot, facing.cross(spot - origin).len()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(spot, _)| spot)
    }

    /// Bottom block standing on a spot, skipping `ignore`
    fn stack_base_at(&self, spot: Vec3, ignore: Option<EntityId>) -> Option<EntityId> {
        self.blocks()
            .filter(|(id, _)| Some(*id) != ignore && Some(*id) != self.carrying())
            .find(|(_, e)| {
                e.as_block().is_some_and(|b| b.below.is_none())
                    && e.body.pos.distance_xz(spot) < SPOT_TOLERANCE
            })
            .map(|(id, _)| id)
    }

    /// Topmost block of the stack on a spot
    fn stack_top_at(&self, spot: Vec3, ignore: Option<EntityId>) -> WorldResult<Option<EntityId>> {
        let Some(mut top) = self.stack_base_at(spot, ignore) else {
            return Ok(None);
        };
        while let Some(above) = self.block(top)?.above {
            top = above;
        }
        Ok(Some(top))
    }

    /// Colours stacked on each drop spot, bottom to top
    pub fn stacks_at_spots(&self) -> WorldResult<Vec<Vec<BlockColor>>> {
        let mut stacks = Vec::with_capacity(self.drop_spots.len());
        for &spot in &self.drop_spots {
            let mut stack = Vec::new();
            let mut next = self.stack_base_at(spot, None);
            while let Some(id) = next {
                let block = self.block(id)?;
                stack.push(block.color);
                next = block.above;
            }
            stacks.push(stack);
        }
        Ok(stacks)
    }
}
