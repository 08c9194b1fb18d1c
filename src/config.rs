//! Environment configuration
//!
//! Loaded from RON. Every field is optional in the file; missing fields
//! keep their defaults, so an empty `()` is a valid configuration.

use std::fs;
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::game::{Action, WorldSettings};
use crate::math::Vec3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which world `reset` builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorldKind {
    /// Stacks of blocks on a row of spots, with a goal arrangement
    #[default]
    BlocksWorld,
    /// A larger room with loose boxes and no goal
    RoomObjects,
    /// Two rows of spots; the goal only fixes tower heights
    Towers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub world: WorldKind,
    /// Episode is truncated after this many steps
    pub max_episode_steps: u32,
    pub obs_width: u32,
    pub obs_height: u32,
    /// Sample scene and turn parameters instead of using defaults
    pub domain_rand: bool,

    /// Side length of the square room
    pub room_size: f32,
    /// Edge length of every block
    pub block_size: f32,
    pub agent_radius: f32,
    pub agent_start: Vec3,
    /// Initial facing; the sign is chosen at random per episode
    pub agent_start_angle_deg: f32,
    /// X coordinate of the row of stack spots
    pub stack_row_x: f32,
    /// X coordinate of the second row in the tower world
    pub back_row_x: f32,

    pub max_placement_attempts: u32,
    pub min_turn_deg: f32,
    pub max_turn_deg: f32,

    pub goal_reward: f32,
    pub step_penalty: f32,

    /// Single-channel observations
    pub greyscale: bool,
    /// Chance that the chosen action is executed as-is
    pub action_keep_prob: f32,
    /// Executed when the chosen action is dropped; random if unset
    pub fallback_action: Option<Action>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            world: WorldKind::BlocksWorld,
            max_episode_steps: 100,
            obs_width: 80,
            obs_height: 60,
            domain_rand: false,
            room_size: 6.0,
            block_size: 0.6,
            agent_radius: 1.0,
            agent_start: Vec3::new(1.0, 0.0, 3.0),
            agent_start_angle_deg: 30.0,
            stack_row_x: 4.0,
            back_row_x: 5.0,
            max_placement_attempts: 10_000,
            min_turn_deg: -45.0,
            max_turn_deg: 45.0,
            goal_reward: 5.0,
            step_penalty: -0.1,
            greyscale: false,
            action_keep_prob: 1.0,
            fallback_action: None,
        }
    }
}

impl EnvConfig {
    /// Load configuration from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        log::debug!("loading config from {}", path.display());
        Self::from_ron_str(&contents)
    }

    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        let config: EnvConfig = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.max_episode_steps == 0 {
            return invalid("max_episode_steps must be at least 1".into());
        }
        if self.obs_width == 0 || self.obs_height == 0 {
            return invalid(format!("observation size {}x{} is empty", self.obs_width, self.obs_height));
        }
        for (name, v) in [
            ("room_size", self.room_size),
            ("block_size", self.block_size),
            ("agent_radius", self.agent_radius),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return invalid(format!("{} must be positive, got {}", name, v));
            }
        }
        if !(self.min_turn_deg < self.max_turn_deg) {
            return invalid(format!(
                "turn limits {}..{} are empty", self.min_turn_deg, self.max_turn_deg
            ));
        }
        if !(0.0..=1.0).contains(&self.action_keep_prob) {
            return invalid(format!("action_keep_prob must lie in 0..1, got {}", self.action_keep_prob));
        }
        if self.max_placement_attempts == 0 {
            return invalid("max_placement_attempts must be at least 1".into());
        }
        Ok(())
    }

    pub fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            min_turn_deg: self.min_turn_deg,
            max_turn_deg: self.max_turn_deg,
            max_placement_attempts: self.max_placement_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(EnvConfig::from_ron_str("()").unwrap(), EnvConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = EnvConfig::from_ron_str("(max_episode_steps: 20, world: RoomObjects)").unwrap();
        assert_eq!(config.max_episode_steps, 20);
        assert_eq!(config.world, WorldKind::RoomObjects);
        assert_eq!(config.block_size, 0.6);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(EnvConfig::from_ron_str("(obs_width: 0)"), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            EnvConfig::from_ron_str("(min_turn_deg: 10.0, max_turn_deg: -10.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(EnvConfig::from_ron_str("(block_size: \"big\")"), Err(ConfigError::Parse(_))));
        assert!(matches!(EnvConfig::from_ron_str("(action_keep_prob: 1.5)"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_action_noise_config() {
        let config = EnvConfig::from_ron_str(
            "(world: Towers, greyscale: true, action_keep_prob: 0.9, fallback_action: Some(Toggle))",
        )
        .unwrap();
        assert_eq!(config.world, WorldKind::Towers);
        assert!(config.greyscale);
        assert_eq!(config.action_keep_prob, 0.9);
        assert_eq!(config.fallback_action, Some(Action::Toggle));
        assert_eq!(config.back_row_x, 5.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.ron");
        fs::write(&path, "(domain_rand: true, agent_start: (x: 2.0, y: 0.0, z: 2.0))").unwrap();
        let config = EnvConfig::load(&path).unwrap();
        assert!(config.domain_rand);
        assert_eq!(config.agent_start, Vec3::new(2.0, 0.0, 2.0));

        assert!(matches!(EnvConfig::load(dir.path().join("missing.ron")), Err(ConfigError::Io(_))));
    }
}
