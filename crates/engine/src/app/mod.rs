mod loop_runner;
mod metrics;
mod scene;

pub use loop_runner::{
    run_headless, AppError, InputSource, LoopConfig, LoopExitReason, LoopSummary,
};
pub use scene::{
    Entity, EntityId, InputSnapshot, Scene, SceneCommand, SceneVisualState, SceneWorld, TileCoord,
    Tilemap, TilemapError, Transform, Vec2, DEFAULT_MOVE_SPEED,
};
