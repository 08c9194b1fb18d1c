//! Episode wrapper
//!
//! `Env` drives one world through episodes: `reset` builds a fresh level
//! and populates it, `step` applies one action, re-renders the agent's
//! view and scores the result.
//!
//! Two optional perturbations sit around the core loop: observations can
//! be reduced to greyscale, and the chosen action can be replaced at
//! random before it reaches the world.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use image::{GrayImage, ImageResult, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};
use crate::config::{ConfigError, EnvConfig, WorldKind};
use crate::error::WorldError;
use crate::render::{to_greyscale, CameraPose, RayCastRenderer, Renderer, Scene};
use crate::world::LevelError;
use super::components::BlockColor;
use super::entity::EntityId;
use super::params::{DomainParams, EpisodeParams, ParamError};
use super::scenario::{self, Goal, Problem, ScenarioSet, Stacks, TowerProblem};
use super::world::World;

/// Side of the room used by the loose-objects world
const ROOM_OBJECTS_SIZE: f32 = 10.0;

/// Problem used when `reset` names none
pub const DEFAULT_PROBLEM: &str = "0";

/// Tower problem used when `reset` names none
pub const DEFAULT_TOWER_PROBLEM: &str = "gap";

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("unknown problem '{0}'")]
    UnknownProblem(String),
    #[error("step called before reset")]
    NotReset,
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("parameter error: {0}")]
    Param(#[from] ParamError),
}

// =============================================================================
// Actions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    TurnLeft,
    TurnRight,
    Pickup,
    Drop,
    /// Accepted but has no effect
    Toggle,
    /// Declare the episode finished
    Done,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::TurnLeft,
        Action::TurnRight,
        Action::Pickup,
        Action::Drop,
        Action::Toggle,
        Action::Done,
    ];

    /// One-letter code used on the command line
    pub fn code(self) -> char {
        match self {
            Action::TurnLeft => 'L',
            Action::TurnRight => 'R',
            Action::Pickup => 'P',
            Action::Drop => 'D',
            Action::Toggle => 'T',
            Action::Done => 'X',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::TurnLeft => "turn_left",
            Action::TurnRight => "turn_right",
            Action::Pickup => "pickup",
            Action::Drop => "drop",
            Action::Toggle => "toggle",
            Action::Done => "done",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Accepts the one-letter code or the name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Action::ALL
            .into_iter()
            .find(|a| s.eq_ignore_ascii_case(a.name()) || (s.len() == 1 && s.eq_ignore_ascii_case(&a.code().to_string())))
            .ok_or_else(|| format!("unknown action '{}'", s))
    }
}

// =============================================================================
// Observations
// =============================================================================

/// Rendered view handed back by `reset` and `step`
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Rgb(RgbImage),
    Grey(GrayImage),
}

impl Observation {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Observation::Rgb(img) => img.dimensions(),
            Observation::Grey(img) => img.dimensions(),
        }
    }

    pub fn as_rgb(&self) -> Option<&RgbImage> {
        match self {
            Observation::Rgb(img) => Some(img),
            Observation::Grey(_) => None,
        }
    }

    pub fn as_grey(&self) -> Option<&GrayImage> {
        match self {
            Observation::Grey(img) => Some(img),
            Observation::Rgb(_) => None,
        }
    }

    /// Write the image; the format follows the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        match self {
            Observation::Rgb(img) => img.save(path),
            Observation::Grey(img) => img.save(path),
        }
    }
}

// =============================================================================
// Episode
// =============================================================================

/// Options for [`Env::reset`]
#[derive(Debug, Clone, Default)]
pub struct ResetOptions {
    /// Reseed the episode generator
    pub seed: Option<u64>,
    /// Problem id; defaults to [`DEFAULT_PROBLEM`], or
    /// [`DEFAULT_TOWER_PROBLEM`] in the tower world
    pub problem: Option<String>,
}

/// Symbolic state reported with every observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    pub step_count: u32,
    pub carrying: Option<BlockColor>,
    pub stacks: Stacks,
    /// Action that reached the world; `None` after a reset
    pub action: Option<Action>,
    /// False when the world rejected the action
    pub action_applied: bool,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// Runs episodes over a world
pub struct Env<R: Renderer = RayCastRenderer> {
    config: EnvConfig,
    scenarios: ScenarioSet,
    domain: DomainParams,
    world: World,
    renderer: R,
    rng: StdRng,
    /// Goal of the current problem; `None` in worlds without one
    goal: Option<Goal>,
    step_count: u32,
    ready: bool,
}

impl Env<RayCastRenderer> {
    pub fn new(config: EnvConfig, scenarios: ScenarioSet) -> Result<Self, EnvError> {
        Self::with_renderer(config, scenarios, RayCastRenderer::new())
    }
}

impl<R: Renderer> Env<R> {
    pub fn with_renderer(config: EnvConfig, scenarios: ScenarioSet, renderer: R) -> Result<Self, EnvError> {
        config.validate()?;
        let world = World::new(Default::default(), config.world_settings());

        Ok(Self {
            config,
            scenarios,
            domain: DomainParams::default(),
            world,
            renderer,
            rng: StdRng::from_entropy(),
            goal: None,
            step_count: 0,
            ready: false,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Goal of the current problem
    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    /// Replace the randomization table (used for subsequent resets and steps).
    /// Ranges only matter with `domain_rand`; otherwise defaults are used.
    pub fn set_domain_params(&mut self, domain: DomainParams) {
        self.domain = domain;
    }

    /// Start a new episode and return the first observation
    pub fn reset(&mut self, options: ResetOptions) -> Result<(Observation, StepInfo), EnvError> {
        if let Some(seed) = options.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        // Without randomization every value is its default, but the ranges
        // (and so max_forward_step) stay those of the full table
        let params = EpisodeParams::sample(&self.domain, self.config.domain_rand.then_some(&mut self.rng))?;

        match self.config.world {
            WorldKind::BlocksWorld => {
                let id = options.problem.as_deref().unwrap_or(DEFAULT_PROBLEM);
                let problem: Problem = self.scenarios
                    .get(id)
                    .cloned()
                    .ok_or_else(|| EnvError::UnknownProblem(id.to_string()))?;

                self.world.reset(scenario::square_room(self.config.room_size)?, params);
                scenario::populate_blocks_world(&mut self.world, &problem, &self.config, &mut self.rng)?;
                self.goal = Some(Goal::Arrangement(problem.goal));
                log::info!("reset: problem {} ({} steps max)", id, self.config.max_episode_steps);
            }
            WorldKind::Towers => {
                let id = options.problem.as_deref().unwrap_or(DEFAULT_TOWER_PROBLEM);
                let problem: TowerProblem = self.scenarios
                    .tower(id)
                    .cloned()
                    .ok_or_else(|| EnvError::UnknownProblem(id.to_string()))?;

                self.world.reset(scenario::square_room(self.config.room_size)?, params);
                scenario::populate_tower_world(&mut self.world, &problem, &self.config, &mut self.rng)?;
                self.goal = Some(problem.goal());
                log::info!("reset: tower problem {} ({} steps max)", id, self.config.max_episode_steps);
            }
            WorldKind::RoomObjects => {
                self.world.reset(scenario::square_room(ROOM_OBJECTS_SIZE)?, params);
                scenario::populate_room_objects(&mut self.world, &mut self.rng)?;
                self.goal = None;
                log::info!("reset: room objects ({} steps max)", self.config.max_episode_steps);
            }
        }

        self.step_count = 0;
        self.ready = true;
        let info = self.info(None, true)?;
        Ok((self.render_obs()?, info))
    }

    /// Apply one action. With `action_keep_prob` below 1 a different
    /// action may be executed; `StepInfo::action` tells which.
    pub fn step(&mut self, action: Action) -> Result<StepResult, EnvError> {
        if !self.ready {
            return Err(EnvError::NotReset);
        }
        self.step_count += 1;

        let action = self.perturb(action);
        let turn_step = self.domain.sample_scalar("turn_step", self.config.domain_rand.then_some(&mut self.rng))?;
        let applied = match action {
            Action::TurnLeft => self.world.turn(turn_step)?,
            Action::TurnRight => self.world.turn(-turn_step)?,
            Action::Pickup => self.world.pickup()?,
            Action::Drop => self.world.drop_carried()?,
            Action::Toggle | Action::Done => true,
        };
        self.world.sync_carried()?;
        log::debug!("step {}: {} ({})", self.step_count, action, if applied { "applied" } else { "rejected" });

        let info = self.info(Some(action), applied)?;
        let goal_reached = self.goal.as_ref().is_some_and(|g| g.is_reached(&info.stacks));

        let reward = match (&self.goal, goal_reached) {
            (_, true) => self.config.goal_reward,
            (Some(_), false) => self.config.step_penalty,
            (None, false) => 0.0,
        };
        let terminated = goal_reached || action == Action::Done;
        let truncated = self.step_count >= self.config.max_episode_steps;
        if goal_reached {
            log::info!("goal reached after {} steps", self.step_count);
        }

        Ok(StepResult {
            observation: self.render_obs()?,
            reward,
            terminated,
            truncated,
            info,
        })
    }

    /// First-person view of the agent at observation size
    pub fn render_obs(&mut self) -> Result<Observation, EnvError> {
        let camera = self.agent_camera()?;
        let scene = Scene::from_world(&self.world);
        let view = self.renderer.render_view(&scene, &camera, self.config.obs_width, self.config.obs_height);
        Ok(if self.config.greyscale {
            Observation::Grey(to_greyscale(&view))
        } else {
            Observation::Rgb(view)
        })
    }

    /// Overhead map of the current world
    pub fn render_top_view(&mut self, width: u32, height: u32) -> RgbImage {
        let scene = Scene::from_world(&self.world);
        self.renderer.render_top_view(&scene, width, height)
    }

    /// Entities the agent can currently see
    pub fn visible_entities(&mut self) -> Result<Vec<EntityId>, EnvError> {
        let camera = self.agent_camera()?;
        let scene = Scene::from_world(&self.world);
        Ok(self.renderer.visible_entities(&scene, &camera, self.config.obs_width, self.config.obs_height))
    }

    fn agent_camera(&self) -> Result<CameraPose, EnvError> {
        let agent = self.world.agent()?;
        let state = agent.as_agent().ok_or(WorldError::UnknownEntity)?;
        Ok(CameraPose::from_agent(&agent.body, state))
    }

    /// Keep `chosen` with probability `action_keep_prob`, else substitute
    fn perturb(&mut self, chosen: Action) -> Action {
        let keep = self.config.action_keep_prob;
        if keep >= 1.0 || self.rng.gen::<f32>() < keep {
            return chosen;
        }
        let substitute = match self.config.fallback_action {
            Some(action) => action,
            None => Action::ALL[self.rng.gen_range(0..Action::ALL.len())],
        };
        log::debug!("action {} replaced by {}", chosen, substitute);
        substitute
    }

    fn info(&self, action: Option<Action>, action_applied: bool) -> Result<StepInfo, EnvError> {
        let carrying = match self.world.carrying() {
            Some(id) => self.world.get(id)?.as_block().map(|b| b.color),
            None => None,
        };
        Ok(StepInfo {
            step_count: self.step_count,
            carrying,
            stacks: self.world.stacks_at_spots()?,
            action,
            action_applied,
        })
    }
}
