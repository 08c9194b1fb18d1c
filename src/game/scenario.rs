//! Block stacking problems and world builders
//!
//! A problem is a start and a goal arrangement of coloured blocks over a
//! fixed row of stack spots. Each arrangement lists the stacks in spot
//! order, each stack bottom to top.
//!
//! Tower problems use two rows of spots and only give heights. Any block
//! can stand in for any other there.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use rand::Rng;
use serde::{Serialize, Deserialize};
use crate::config::EnvConfig;
use crate::error::WorldResult;
use crate::math::Vec3;
use crate::world::{Level, LevelError, RoomStyle};
use super::components::{BlockColor, Entity};
use super::entity::EntityId;
use super::world::{Placement, World};

/// Stacks in spot order, each bottom to top
pub type Stacks = Vec<Vec<BlockColor>>;

/// Tower heights, one list per row of spots
pub type Heights = Vec<Vec<u32>>;

/// What ends a stacking episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Goal {
    /// Exact colours on every spot
    Arrangement(Stacks),
    /// Number of blocks on every spot, all rows in spot registration order
    Heights(Vec<u32>),
}

impl Goal {
    pub fn is_reached(&self, stacks: &Stacks) -> bool {
        match self {
            Goal::Arrangement(goal) => goal == stacks,
            Goal::Heights(goal) => {
                goal.len() == stacks.len() && goal.iter().zip(stacks).all(|(&h, s)| h as usize == s.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub start: Stacks,
    pub goal: Stacks,
}

impl Problem {
    fn validate(&self, id: &str) -> Result<(), String> {
        if self.start.len() != self.goal.len() {
            return Err(format!(
                "problem {}: start has {} stacks but goal has {}", id, self.start.len(), self.goal.len()
            ));
        }

        let mut start: Vec<BlockColor> = self.start.iter().flatten().copied().collect();
        let mut goal: Vec<BlockColor> = self.goal.iter().flatten().copied().collect();
        start.sort_by_key(|c| c.name());
        goal.sort_by_key(|c| c.name());
        if start != goal {
            return Err(format!("problem {}: goal uses different blocks than start", id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerProblem {
    pub start: Heights,
    pub goal: Heights,
}

impl TowerProblem {
    fn validate(&self, id: &str) -> Result<(), String> {
        if self.start.is_empty() || self.start.len() > 2 {
            return Err(format!("tower problem {}: expected one or two rows, got {}", id, self.start.len()));
        }
        let shape = |h: &Heights| h.iter().map(Vec::len).collect::<Vec<_>>();
        if shape(&self.start) != shape(&self.goal) {
            return Err(format!("tower problem {}: start and goal rows differ in size", id));
        }
        let total = |h: &Heights| h.iter().flatten().sum::<u32>();
        if total(&self.start) != total(&self.goal) {
            return Err(format!(
                "tower problem {}: start has {} blocks but goal has {}", id, total(&self.start), total(&self.goal)
            ));
        }
        Ok(())
    }

    pub fn goal(&self) -> Goal {
        Goal::Heights(self.goal.concat())
    }
}

/// Problems by identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    #[serde(default)]
    pub problems: BTreeMap<String, Problem>,
    /// Two-row problems for the tower world
    #[serde(default)]
    pub towers: BTreeMap<String, TowerProblem>,
}

impl ScenarioSet {
    /// The eight standard problems, "0" to "7", over five spots, and the
    /// eight named tower problems over two rows of five
    pub fn builtin() -> Self {
        use BlockColor::*;

        let table: [(&str, Stacks, Stacks); 8] = [
            (
                "0",
                vec![vec![Red], vec![Green], vec![Blue], vec![Purple], vec![Yellow]],
                vec![vec![Yellow], vec![Red], vec![Purple], vec![Blue], vec![Green]],
            ),
            (
                "1",
                vec![vec![Red, Green], vec![Blue], vec![Purple], vec![Yellow], vec![]],
                vec![vec![Purple], vec![Yellow], vec![Green], vec![Red], vec![Blue]],
            ),
            (
                "2",
                vec![vec![Red], vec![Green, Blue], vec![Purple], vec![Yellow], vec![]],
                vec![vec![Yellow], vec![Purple], vec![Blue], vec![Green], vec![Red]],
            ),
            (
                "3",
                vec![vec![Red, Green], vec![Blue, Purple], vec![Yellow], vec![], vec![]],
                vec![vec![Yellow, Purple], vec![Red], vec![Blue], vec![Green], vec![]],
            ),
            (
                "4",
                vec![vec![Red, Green], vec![Blue], vec![Purple], vec![Yellow], vec![]],
                vec![vec![Blue], vec![Purple], vec![Yellow], vec![Red], vec![Green]],
            ),
            (
                "5",
                vec![vec![Red], vec![Green, Blue], vec![Purple], vec![Yellow], vec![Grey]],
                vec![vec![Grey], vec![Yellow], vec![Green], vec![Blue], vec![Red, Purple]],
            ),
            (
                "6",
                vec![vec![Red, Green], vec![Blue, Purple], vec![Yellow], vec![Grey], vec![]],
                vec![vec![Grey], vec![Yellow], vec![Blue], vec![Green, Red], vec![Purple]],
            ),
            (
                "7",
                vec![vec![Red], vec![Green], vec![Blue], vec![Purple], vec![Yellow, Grey]],
                vec![vec![Grey], vec![Yellow], vec![Green], vec![Red], vec![Blue, Purple]],
            ),
        ];

        let problems = table
            .into_iter()
            .map(|(id, start, goal)| (id.to_string(), Problem { start, goal }))
            .collect();

        let towers: [(&str, [[u32; 5]; 2], [[u32; 5]; 2]); 8] = [
            ("gap", [[3, 0, 3, 0, 3], [0, 1, 0, 1, 0]], [[0, 2, 0, 2, 0], [2, 0, 3, 0, 2]]),
            ("balance", [[1, 3, 0, 2, 2], [2, 1, 1, 0, 2]], [[2, 1, 1, 1, 2], [2, 1, 1, 1, 2]]),
            ("exchange", [[2, 1, 2, 1, 2], [1, 0, 1, 0, 1]], [[1, 0, 1, 0, 1], [2, 1, 2, 1, 2]]),
            ("stairs", [[1, 2, 3, 2, 1], [0, 1, 1, 1, 0]], [[0, 0, 1, 0, 0], [3, 2, 1, 2, 3]]),
            ("bed", [[4, 2, 2, 0, 4], [3, 2, 1, 2, 0]], [[2, 2, 2, 2, 2], [2, 2, 2, 2, 2]]),
            ("towers", [[4, 0, 4, 0, 4], [0, 1, 1, 1, 0]], [[0, 0, 0, 0, 0], [3, 3, 3, 3, 3]]),
            ("foldable", [[1, 2, 3, 2, 1], [2, 0, 3, 0, 2]], [[2, 1, 2, 1, 2], [2, 1, 2, 1, 2]]),
            ("wave", [[3, 2, 3, 3, 3], [3, 0, 1, 2, 0]], [[4, 3, 2, 1, 0], [4, 3, 2, 1, 0]]),
        ];
        let towers = towers
            .into_iter()
            .map(|(id, start, goal)| {
                let rows = |h: [[u32; 5]; 2]| h.iter().map(|row| row.to_vec()).collect();
                (id.to_string(), TowerProblem { start: rows(start), goal: rows(goal) })
            })
            .collect();

        Self { problems, towers }
    }

    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.problems.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.problems.keys().map(String::as_str)
    }

    pub fn tower(&self, id: &str) -> Option<&TowerProblem> {
        self.towers.get(id)
    }

    pub fn tower_ids(&self) -> impl Iterator<Item = &str> {
        self.towers.keys().map(String::as_str)
    }

    pub fn from_ron_str(s: &str) -> Result<Self, LevelError> {
        let set: ScenarioSet = ron::from_str(s)?;
        for (id, problem) in &set.problems {
            problem.validate(id).map_err(LevelError::Validation)?;
        }
        for (id, problem) in &set.towers {
            problem.validate(id).map_err(LevelError::Validation)?;
        }
        Ok(set)
    }

    /// Load a custom problem table from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LevelError> {
        Self::from_ron_str(&fs::read_to_string(path)?)
    }
}

impl Default for ScenarioSet {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// World builders
// =============================================================================

/// Single square room used by both world kinds
pub fn square_room(size: f32) -> WorldResult<Level> {
    let mut level = Level::new();
    let style = RoomStyle::with_textures("asphalt", "brick_wall", "concrete_tiles");
    level.add_rect_room(0.0, size, 0.0, size, style)?;
    Ok(level)
}

/// World position of spot `index` in the row at `row_x`
pub fn spot_position(row_x: f32, index: usize) -> Vec3 {
    Vec3::ground(row_x, 1.0 + index as f32)
}

/// Agent at the configured start, facing the spots at plus or minus the start angle
fn place_stacking_agent<R: Rng>(world: &mut World, config: &EnvConfig, rng: &mut R) -> WorldResult<EntityId> {
    let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let dir = (sign * config.agent_start_angle_deg).to_radians();
    world.place_agent(&Placement::at(config.agent_start, dir), Some(config.agent_radius), Some(0.0), rng)
}

/// Put `stacks` on the row at `row_x`, one block height apart and linked
/// bottom to top, then register every spot of the row as a drop spot.
fn place_row<R: Rng>(
    world: &mut World,
    row_x: f32,
    stacks: &Stacks,
    config: &EnvConfig,
    rng: &mut R,
    blocks: &mut Vec<EntityId>,
) -> WorldResult<()> {
    for (spot, stack) in stacks.iter().enumerate() {
        let base = spot_position(row_x, spot);
        let mut prev: Option<EntityId> = None;

        for (height, &color) in stack.iter().enumerate() {
            let pos = base + Vec3::UP * (height as f32 * config.block_size);
            let id = world.place_entity(Entity::block(color, config.block_size), &Placement::at(pos, 0.0), rng)?;
            if let Some(lower) = prev {
                world.link_stack(lower, id)?;
            }
            blocks.push(id);
            prev = Some(id);
        }
    }

    for spot in 0..stacks.len() {
        world.add_drop_spot(spot_position(row_x, spot));
    }
    Ok(())
}

/// Fill a reset world with the agent and the start stacks of `problem`.
///
/// Blocks are placed exactly on their spots (no collision checks). Every
/// spot, occupied or not, is registered as a drop spot.
pub fn populate_blocks_world<R: Rng>(
    world: &mut World,
    problem: &Problem,
    config: &EnvConfig,
    rng: &mut R,
) -> WorldResult<Vec<EntityId>> {
    place_stacking_agent(world, config, rng)?;

    let mut blocks = Vec::new();
    place_row(world, config.stack_row_x, &problem.start, config, rng, &mut blocks)?;

    log::info!("blocks world ready: {} blocks on {} spots", blocks.len(), problem.start.len());
    Ok(blocks)
}

/// Fill a reset world with the agent and the start towers of `problem`:
/// the first row at `stack_row_x`, the second at `back_row_x`. Colours
/// cycle through the palette in placement order.
pub fn populate_tower_world<R: Rng>(
    world: &mut World,
    problem: &TowerProblem,
    config: &EnvConfig,
    rng: &mut R,
) -> WorldResult<Vec<EntityId>> {
    place_stacking_agent(world, config, rng)?;

    let mut blocks = Vec::new();
    let mut placed = 0usize;
    for (heights, row_x) in problem.start.iter().zip([config.stack_row_x, config.back_row_x]) {
        let stacks: Stacks = heights
            .iter()
            .map(|&h| {
                (0..h)
                    .map(|_| {
                        let color = BlockColor::ALL[placed % BlockColor::ALL.len()];
                        placed += 1;
                        color
                    })
                    .collect()
            })
            .collect();
        place_row(world, row_x, &stacks, config, rng, &mut blocks)?;
    }

    log::info!("tower world ready: {} blocks on {} spots", blocks.len(), world.drop_spots().len());
    Ok(blocks)
}

/// Loose boxes in front of the agent, for free-form use
pub fn populate_room_objects<R: Rng>(world: &mut World, rng: &mut R) -> WorldResult<Vec<EntityId>> {
    // Large radius keeps objects from getting too close to see
    world.place_agent(&Placement::at(Vec3::ground(5.0, 5.0), 0.0), Some(1.5), None, rng)?;

    let boxes = [
        (BlockColor::Yellow, 4.0),
        (BlockColor::Blue, 4.5),
        (BlockColor::Green, 5.0),
        (BlockColor::Purple, 5.5),
        (BlockColor::Red, 6.0),
    ];
    let mut ids = Vec::with_capacity(boxes.len());
    for (color, z) in boxes {
        ids.push(world.place_entity(Entity::block(color, 0.4), &Placement::at(Vec3::ground(8.0, z), 0.0), rng)?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::params::EpisodeParams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_builtin_problems_are_consistent() {
        let set = ScenarioSet::builtin();
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["0", "1", "2", "3", "4", "5", "6", "7"]);
        for (id, problem) in &set.problems {
            assert!(problem.validate(id).is_ok(), "problem {}", id);
            assert_eq!(problem.start.len(), 5);
        }
    }

    #[test]
    fn test_builtin_tower_problems_are_consistent() {
        let set = ScenarioSet::builtin();
        assert_eq!(
            set.tower_ids().collect::<Vec<_>>(),
            vec!["balance", "bed", "exchange", "foldable", "gap", "stairs", "towers", "wave"]
        );
        for (id, problem) in &set.towers {
            assert!(problem.validate(id).is_ok(), "tower problem {}", id);
            assert_eq!(problem.start.len(), 2);
        }
        assert_eq!(set.tower("gap").unwrap().goal[1], vec![2, 0, 3, 0, 2]);
    }

    #[test]
    fn test_goal_kinds() {
        use BlockColor::*;
        let stacks = vec![vec![Red, Blue], vec![], vec![Green]];

        assert!(Goal::Arrangement(stacks.clone()).is_reached(&stacks));
        assert!(!Goal::Arrangement(vec![vec![Blue, Red], vec![], vec![Green]]).is_reached(&stacks));

        // Heights ignore colours
        assert!(Goal::Heights(vec![2, 0, 1]).is_reached(&stacks));
        assert!(Goal::Heights(vec![2, 0, 1]).is_reached(&vec![vec![Grey, Grey], vec![], vec![Red]]));
        assert!(!Goal::Heights(vec![1, 1, 1]).is_reached(&stacks));
        assert!(!Goal::Heights(vec![2, 0]).is_reached(&stacks));
    }

    #[test]
    fn test_problem_tables_from_ron() {
        let set = ScenarioSet::from_ron_str(
            r#"(problems: {"swap": (start: [[red], [blue]], goal: [[blue], [red]])})"#,
        )
        .unwrap();
        assert_eq!(set.get("swap").unwrap().goal[0], vec![BlockColor::Blue]);

        let bad = ScenarioSet::from_ron_str(r#"(problems: {"x": (start: [[red]], goal: [[blue]])})"#);
        assert!(matches!(bad, Err(LevelError::Validation(_))));

        let towers = ScenarioSet::from_ron_str(r#"(towers: {"lift": (start: [[2, 0]], goal: [[1, 1]])})"#).unwrap();
        assert!(towers.problems.is_empty());
        assert_eq!(towers.tower("lift").unwrap().goal(), Goal::Heights(vec![1, 1]));

        let lost_block = ScenarioSet::from_ron_str(r#"(towers: {"x": (start: [[2, 0]], goal: [[1, 0]])})"#);
        assert!(matches!(lost_block, Err(LevelError::Validation(_))));
        let ragged = ScenarioSet::from_ron_str(r#"(towers: {"x": (start: [[1, 0]], goal: [[1]])})"#);
        assert!(matches!(ragged, Err(LevelError::Validation(_))));
    }

    #[test]
    fn test_populate_reproduces_start_stacks() {
        let config = EnvConfig::default();
        let set = ScenarioSet::builtin();
        let problem = set.get("3").unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let mut world = World::new(Level::new(), config.world_settings());
        world.reset(square_room(config.room_size).unwrap(), EpisodeParams::default());
        let blocks = populate_blocks_world(&mut world, problem, &config, &mut rng).unwrap();

        assert_eq!(blocks.len(), 5);
        assert_eq!(world.stacks_at_spots().unwrap(), problem.start);

        // Second block of the first stack sits one block up, on spot 0
        let body = world.get(blocks[1]).unwrap().body;
        assert_eq!(body.pos, Vec3::new(4.0, 0.6, 1.0));

        let agent = world.agent().unwrap();
        assert_eq!(agent.body.pos, Vec3::new(1.0, 0.0, 3.0));
        assert!((agent.body.dir.abs().to_degrees() - 30.0).abs() < 1e-3);
        assert_eq!(agent.body.radius, 1.0);
        assert_eq!(agent.as_agent().unwrap().cam_height, 0.0);
    }

    #[test]
    fn test_populate_tower_world() {
        let config = EnvConfig::default();
        let set = ScenarioSet::builtin();
        let problem = set.tower("bed").unwrap();
        let mut world = World::new(Level::new(), config.world_settings());
        world.reset(square_room(config.room_size).unwrap(), EpisodeParams::default());
        let blocks = populate_tower_world(&mut world, problem, &config, &mut StdRng::seed_from_u64(2)).unwrap();

        assert_eq!(blocks.len(), 20);
        assert_eq!(world.drop_spots().len(), 10);
        assert_eq!(world.drop_spots()[5], Vec3::ground(5.0, 1.0));

        let heights: Vec<u32> = world.stacks_at_spots().unwrap().iter().map(|s| s.len() as u32).collect();
        assert_eq!(heights, problem.start.concat());
        assert!(!problem.goal().is_reached(&world.stacks_at_spots().unwrap()));

        // Third block of the first back-row tower
        let body = world.get(blocks[14]).unwrap().body;
        assert_eq!(body.pos.x, 5.0);
        assert_eq!(body.pos.z, 1.0);
        assert!((body.pos.y - 1.2).abs() < 1e-5);

        // The table keeps its own copy
        assert_eq!(set.tower("bed").unwrap().start[0], vec![4, 2, 2, 0, 4]);
    }

    #[test]
    fn test_room_objects() {
        let mut world = World::new(square_room(10.0).unwrap(), Default::default());
        let boxes = populate_room_objects(&mut world, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(boxes.len(), 5);
        assert_eq!(world.agent().unwrap().body.radius, 1.5);
        assert!(world.drop_spots().is_empty());
    }
}
