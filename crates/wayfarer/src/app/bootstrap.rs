use engine::Scene;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{ConfigError, GameConfig};
use super::gameplay;

pub(crate) struct AppWiring {
    pub(crate) config: GameConfig,
    pub(crate) scene: Box<dyn Scene>,
}

pub(crate) fn build_app() -> Result<AppWiring, ConfigError> {
    init_tracing();
    info!("=== Wayfarer Startup ===");

    let config = GameConfig::from_env()?;
    info!(
        map_width = config.map.width,
        map_height = config.map.height,
        tile_size = config.map.tile_size,
        npcs = config.npcs.len(),
        script_steps = config.script.len(),
        max_ticks = ?config.max_ticks,
        "config_loaded"
    );
    let scene = gameplay::build_scene(&config);

    Ok(AppWiring { config, scene })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
