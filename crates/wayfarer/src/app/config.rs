use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::{LoopConfig, TileCoord, Vec2, DEFAULT_MOVE_SPEED};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use super::gameplay::{ActionDescriptor, EnqueuePolicy, Topic, DEFAULT_ARRIVAL_EPSILON};

pub(crate) const CONFIG_ENV_VAR: &str = "WAYFARER_CONFIG";
pub(crate) const SCRIPT_ENV_VAR: &str = "WAYFARER_SCRIPT";
pub(crate) const MAX_TICKS_ENV_VAR: &str = "WAYFARER_MAX_TICKS";

const DEFAULT_MAP_WIDTH: u32 = 40;
const DEFAULT_MAP_HEIGHT: u32 = 30;
const DEFAULT_TILE_SIZE: f32 = 32.0;
const DEFAULT_BLOCKED_TILE_ID: u16 = 1;
const DEFAULT_PLAYER_SPAWN: TilePos = TilePos { x: 21, y: 16 };
const DEFAULT_MAX_TICKS: u64 = 900;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse '{}' at {location}: {source}", path.display())]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("{name}='{value}' is not a valid tick count")]
    EnvVar { name: &'static str, value: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TilePos {
    pub(crate) x: u32,
    pub(crate) y: u32,
}

impl From<TilePos> for TileCoord {
    fn from(value: TilePos) -> Self {
        TileCoord {
            x: value.x,
            y: value.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WorldPos {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl From<WorldPos> for Vec2 {
    fn from(value: WorldPos) -> Self {
        Vec2 {
            x: value.x,
            y: value.y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MapConfig {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) tile_size: f32,
    pub(crate) blocked_tile_id: u16,
    pub(crate) obstacles: Vec<TilePos>,
}

impl Default for MapConfig {
    fn default() -> Self {
        let wall = (12..=18).map(|y| TilePos { x: 24, y });
        let ledge = (19..=23).map(|x| TilePos { x, y: 12 });
        Self {
            width: DEFAULT_MAP_WIDTH,
            height: DEFAULT_MAP_HEIGHT,
            tile_size: DEFAULT_TILE_SIZE,
            blocked_tile_id: DEFAULT_BLOCKED_TILE_ID,
            obstacles: wall.chain(ledge).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ActorConfig {
    pub(crate) spawn_tile: TilePos,
    #[serde(default = "default_move_speed")]
    pub(crate) move_speed: f32,
}

fn default_move_speed() -> f32 {
    DEFAULT_MOVE_SPEED
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            spawn_tile: DEFAULT_PLAYER_SPAWN,
            move_speed: DEFAULT_MOVE_SPEED,
        }
    }
}

/// Scripted input for one tick of a headless run.
///
/// `{ "tick": 30, "click_world": { "x": 800.0, "y": 528.0 } }`
///
/// `request` and `cancel` are published on the bus rather than fed through
/// the input snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptStep {
    pub(crate) tick: u64,
    #[serde(default)]
    pub(crate) pointer_world: Option<WorldPos>,
    #[serde(default)]
    pub(crate) click_world: Option<WorldPos>,
    #[serde(default)]
    pub(crate) click_entity: Option<u64>,
    #[serde(default)]
    pub(crate) request: Option<ScriptRequest>,
    #[serde(default)]
    pub(crate) cancel: Option<u64>,
    #[serde(default)]
    pub(crate) quit: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptRequest {
    pub(crate) entity: u64,
    pub(crate) action: ActionDescriptor,
    #[serde(default)]
    pub(crate) policy: EnqueuePolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct GameConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_ticks: Option<u64>,
    pub(crate) realtime: bool,
    pub(crate) map: MapConfig,
    pub(crate) player: ActorConfig,
    pub(crate) npcs: Vec<ActorConfig>,
    pub(crate) arrival_epsilon: f32,
    /// Bus topics echoed to the log as they are emitted.
    pub(crate) log_topics: Vec<String>,
    pub(crate) script: Vec<ScriptStep>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let map = MapConfig::default();
        let script = default_script(map.tile_size);
        Self {
            target_tps: 60,
            max_ticks: Some(DEFAULT_MAX_TICKS),
            realtime: false,
            map,
            player: ActorConfig::default(),
            npcs: vec![
                ActorConfig {
                    spawn_tile: TilePos { x: 18, y: 20 },
                    move_speed: DEFAULT_MOVE_SPEED * 0.75,
                },
                ActorConfig {
                    spawn_tile: TilePos { x: 28, y: 8 },
                    move_speed: DEFAULT_MOVE_SPEED * 0.5,
                },
            ],
            arrival_epsilon: DEFAULT_ARRIVAL_EPSILON,
            log_topics: vec![
                Topic::ACTION_COMPLETED.to_string(),
                Topic::ACTION_FAILED.to_string(),
                Topic::SELECTION_CHANGED.to_string(),
            ],
            script,
        }
    }
}

/// Walk around the wall, get interrupted, select and deselect the player,
/// then drive the NPCs over the bus: an unreachable goal, a two-leg errand
/// and a walk that gets cancelled.
fn default_script(tile_size: f32) -> Vec<ScriptStep> {
    let tile_center = |x: u32, y: u32| WorldPos {
        x: (x as f32 + 0.5) * tile_size,
        y: (y as f32 + 0.5) * tile_size,
    };
    let step = |tick: u64| ScriptStep {
        tick,
        pointer_world: None,
        click_world: None,
        click_entity: None,
        request: None,
        cancel: None,
        quit: false,
    };
    let request = |entity: u64, x: u32, y: u32, policy: EnqueuePolicy| ScriptRequest {
        entity,
        action: ActionDescriptor::go_to(TileCoord { x, y }),
        policy,
    };
    vec![
        ScriptStep {
            click_world: Some(tile_center(28, 16)),
            ..step(30)
        },
        ScriptStep {
            click_world: Some(tile_center(21, 22)),
            ..step(90)
        },
        ScriptStep {
            click_entity: Some(0),
            ..step(300)
        },
        ScriptStep {
            click_world: Some(tile_center(5, 5)),
            ..step(330)
        },
        ScriptStep {
            click_world: Some(tile_center(30, 4)),
            ..step(360)
        },
        ScriptStep {
            request: Some(request(1, 24, 14, EnqueuePolicy::InterruptReplace)),
            ..step(400)
        },
        ScriptStep {
            request: Some(request(2, 10, 25, EnqueuePolicy::InterruptReplace)),
            ..step(420)
        },
        ScriptStep {
            request: Some(request(1, 14, 20, EnqueuePolicy::InterruptReplace)),
            ..step(440)
        },
        ScriptStep {
            request: Some(request(1, 14, 26, EnqueuePolicy::Append)),
            ..step(441)
        },
        ScriptStep {
            cancel: Some(2),
            ..step(700)
        },
    ]
}

impl GameConfig {
    /// Default config overlaid with `WAYFARER_CONFIG`, `WAYFARER_SCRIPT` and
    /// `WAYFARER_MAX_TICKS`, read through `lookup`.
    pub(crate) fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV_VAR) {
            Some(path) => Self::from_path(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(path) = lookup(SCRIPT_ENV_VAR) {
            config.script = read_json(Path::new(&path))?;
        }
        if let Some(raw) = lookup(MAX_TICKS_ENV_VAR) {
            let ticks = raw.trim().parse::<u64>().map_err(|_| ConfigError::EnvVar {
                name: MAX_TICKS_ENV_VAR,
                value: raw.clone(),
            })?;
            config.max_ticks = Some(ticks);
        }
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        Self::load(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.target_tps == 0 {
            return Err(ConfigError::invalid("target_tps", "must be greater than zero"));
        }
        if self.map.width == 0 || self.map.height == 0 {
            return Err(ConfigError::invalid("map", "width and height must be non-zero"));
        }
        if !self.map.tile_size.is_finite() || self.map.tile_size <= 0.0 {
            return Err(ConfigError::invalid(
                "map.tile_size",
                format!("expected positive finite number, got {}", self.map.tile_size),
            ));
        }
        if !self.arrival_epsilon.is_finite() || self.arrival_epsilon < 0.0 {
            return Err(ConfigError::invalid(
                "arrival_epsilon",
                format!("expected non-negative number, got {}", self.arrival_epsilon),
            ));
        }
        self.validate_actor("player", &self.player)?;
        for (index, npc) in self.npcs.iter().enumerate() {
            self.validate_actor(&format!("npcs[{index}]"), npc)?;
        }
        for (index, topic) in self.log_topics.iter().enumerate() {
            if Topic::parse(topic).is_none() {
                return Err(ConfigError::invalid(
                    format!("log_topics[{index}]"),
                    format!("unknown topic '{topic}'"),
                ));
            }
        }
        Ok(())
    }

    fn validate_actor(&self, field: &str, actor: &ActorConfig) -> Result<(), ConfigError> {
        let TilePos { x, y } = actor.spawn_tile;
        if x >= self.map.width || y >= self.map.height {
            return Err(ConfigError::invalid(
                format!("{field}.spawn_tile"),
                format!(
                    "({x}, {y}) is outside the {}x{} map",
                    self.map.width, self.map.height
                ),
            ));
        }
        if self.map.obstacles.contains(&actor.spawn_tile) {
            return Err(ConfigError::invalid(
                format!("{field}.spawn_tile"),
                format!("({x}, {y}) is an obstacle"),
            ));
        }
        if !actor.move_speed.is_finite() || actor.move_speed <= 0.0 {
            return Err(ConfigError::invalid(
                format!("{field}.move_speed"),
                format!("expected positive number, got {}", actor.move_speed),
            ));
        }
        Ok(())
    }

    pub(crate) fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            target_tps: self.target_tps,
            max_ticks: self.max_ticks,
            realtime: self.realtime,
            metrics_log_interval: Duration::from_secs(1),
            ..LoopConfig::default()
        }
    }

    pub(crate) fn parsed_log_topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.log_topics.iter().filter_map(|raw| Topic::parse(raw))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_json(&raw, path)
}

fn parse_json<T: DeserializeOwned>(raw: &str, path: &Path) -> Result<T, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(error) => {
            let location = error.path().to_string();
            let source = error.into_inner();
            Err(ConfigError::Parse {
                path: path.to_path_buf(),
                location: if location.is_empty() {
                    ".".to_string()
                } else {
                    location
                },
                source,
            })
        }
    }
}
