//! World model and headless fixed-step loop shared by the game crates.
//!
//! Rendering and asset loading live outside this crate; scenes see a
//! [`SceneWorld`] of positioned entities over an optional [`Tilemap`] and are
//! stepped at a fixed rate by [`run_headless`].

pub mod app;

pub use app::{
    run_headless, AppError, Entity, EntityId, InputSnapshot, InputSource, LoopConfig,
    LoopExitReason, LoopSummary, Scene, SceneCommand, SceneVisualState, SceneWorld, TileCoord,
    Tilemap, TilemapError, Transform, Vec2, DEFAULT_MOVE_SPEED,
};
