//! Game layer
//!
//! Entities living in a level and the rules that move them:
//! - Entity: generational ids into the world's arena
//! - Components: bodies, the agent, stackable blocks
//! - World: placement, collision, turn/pickup/drop and stack links
//! - Params: domain randomization table
//! - Scenario: stacking and tower problems and the worlds built from them
//! - Env: episodes, rewards and observations

pub mod entity;
pub mod components;
pub mod collision;
pub mod params;
pub mod world;
pub mod scenario;
pub mod env;

// Re-export main types
pub use entity::{EntityAllocator, EntityId};
pub use components::{Agent, Block, BlockColor, Body, Entity, EntityKind};
pub use collision::Collision;
pub use params::{DomainParam, DomainParams, EpisodeParams, ParamError, ParamKind, ParamValue};
pub use world::{Placement, World, WorldSettings};
pub use scenario::{Goal, Heights, Problem, ScenarioSet, Stacks, TowerProblem};
pub use env::{Action, Env, EnvError, Observation, ResetOptions, StepInfo, StepResult};
