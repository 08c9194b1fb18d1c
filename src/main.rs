//! Headless command line front end
//!
//! Usage:
//!   stackworld run --problem 3 --seed 7 --actions L,L,P,R,D --out frames/
//!   stackworld run --problem gap --config towers.ron
//!   stackworld problems
//!   stackworld level rooms.ron

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stackworld::game::{Action, Env, Observation, ResetOptions, ScenarioSet, StepInfo};
use stackworld::world::{load_level_desc, FloorExtents};
use stackworld::EnvConfig;

#[derive(Parser)]
#[command(name = "stackworld", version = stackworld::VERSION)]
#[command(about = "Block stacking in polygonal rooms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one episode with a fixed action sequence, printing a JSON line per step
    Run {
        /// Problem id
        #[arg(long, default_value = "0")]
        problem: String,
        #[arg(long)]
        seed: Option<u64>,
        /// Environment configuration (RON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Custom problem table (RON) instead of the built-in one
        #[arg(long)]
        problems: Option<PathBuf>,
        /// Comma separated actions: L, R, P, D, T, X or their names
        #[arg(long, value_delimiter = ',')]
        actions: Vec<String>,
        /// Save every observation and a final overhead map as PNG here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Side of the overhead map in pixels
        #[arg(long, default_value_t = 256)]
        map_size: u32,
    },
    /// List the problem table
    Problems {
        /// Custom problem table (RON)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Build a level description and print a summary
    Level {
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct StepRecord<'a> {
    step: u32,
    action: Option<&'a str>,
    reward: f32,
    terminated: bool,
    truncated: bool,
    info: &'a StepInfo,
}

#[derive(Serialize)]
struct RoomSummary {
    walls: usize,
    area: f32,
    portals: usize,
    wall_quads: usize,
}

#[derive(Serialize)]
struct LevelSummary {
    rooms: Vec<RoomSummary>,
    wall_segments: usize,
    extents: FloorExtents,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { problem, seed, config, problems, actions, out, map_size } => {
            run(problem, seed, config, problems, &actions, out, map_size)
        }
        Commands::Problems { file } => list_problems(file),
        Commands::Level { file } => level_summary(&file),
    }
}

fn load_scenarios(path: Option<PathBuf>) -> Result<ScenarioSet> {
    match path {
        Some(path) => ScenarioSet::load(&path)
            .with_context(|| format!("Failed to load problems from {}", path.display())),
        None => Ok(ScenarioSet::builtin()),
    }
}

fn save_png(img: &image::RgbImage, path: &Path) -> Result<()> {
    img.save(path).with_context(|| format!("Failed to write {}", path.display()))
}

fn save_obs(obs: &Observation, path: &Path) -> Result<()> {
    obs.save(path).with_context(|| format!("Failed to write {}", path.display()))
}

fn run(
    problem: String,
    seed: Option<u64>,
    config: Option<PathBuf>,
    problems: Option<PathBuf>,
    actions: &[String],
    out: Option<PathBuf>,
    map_size: u32,
) -> Result<()> {
    let config = match config {
        Some(path) => EnvConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EnvConfig::default(),
    };
    let actions = actions
        .iter()
        .map(|a| a.parse::<Action>().map_err(anyhow::Error::msg))
        .collect::<Result<Vec<_>>>()?;

    if let Some(dir) = &out {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut env = Env::new(config, load_scenarios(problems)?)?;
    let (obs, info) = env.reset(ResetOptions { seed, problem: Some(problem) })?;
    let record = StepRecord { step: 0, action: None, reward: 0.0, terminated: false, truncated: false, info: &info };
    println!("{}", serde_json::to_string(&record)?);
    if let Some(dir) = &out {
        save_obs(&obs, &dir.join("obs_0000.png"))?;
    }

    for action in actions {
        let result = env.step(action)?;
        let record = StepRecord {
            step: result.info.step_count,
            action: Some(action.name()),
            reward: result.reward,
            terminated: result.terminated,
            truncated: result.truncated,
            info: &result.info,
        };
        println!("{}", serde_json::to_string(&record)?);

        if let Some(dir) = &out {
            save_obs(&result.observation, &dir.join(format!("obs_{:04}.png", result.info.step_count)))?;
        }
        if result.terminated || result.truncated {
            break;
        }
    }

    if let Some(dir) = &out {
        save_png(&env.render_top_view(map_size, map_size), &dir.join("top.png"))?;
    }
    Ok(())
}

fn list_problems(file: Option<PathBuf>) -> Result<()> {
    #[derive(Serialize)]
    struct Entry<'a, P: Serialize> {
        id: &'a str,
        kind: &'a str,
        #[serde(flatten)]
        problem: &'a P,
    }

    let set = load_scenarios(file)?;
    for (id, problem) in &set.problems {
        println!("{}", serde_json::to_string(&Entry { id, kind: "stacks", problem })?);
    }
    for (id, problem) in &set.towers {
        println!("{}", serde_json::to_string(&Entry { id, kind: "towers", problem })?);
    }
    Ok(())
}

fn level_summary(path: &Path) -> Result<()> {
    let desc = load_level_desc(path)
        .with_context(|| format!("Failed to load level from {}", path.display()))?;
    let mut level = desc.build().context("Failed to build level")?;
    level.generate_static_data();

    let rooms = level
        .rooms()
        .iter()
        .map(|room| RoomSummary {
            walls: room.num_walls(),
            area: room.area(),
            portals: (0..room.num_walls()).map(|e| room.portals(e).len()).sum(),
            wall_quads: room.mesh().map_or(0, |m| m.walls.len()),
        })
        .collect();
    let summary = LevelSummary {
        rooms,
        wall_segments: level.wall_segments().len(),
        extents: level.extents(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
