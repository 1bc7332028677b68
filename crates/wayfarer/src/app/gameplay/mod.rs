//! Entity action system: event bus, per-entity action queues, the processor
//! that feeds them, selection, and the tile world scene that wires them up.

use engine::Scene;

use crate::app::config::GameConfig;

mod action_queue;
mod actions;
mod events;
mod nav;
mod processor;
mod scene_impl;
mod selection;
mod util;

#[cfg(test)]
mod tests;

pub(crate) use action_queue::EnqueuePolicy;
pub(crate) use actions::ActionDescriptor;
pub(crate) use events::Topic;
pub(crate) use processor::DEFAULT_ARRIVAL_EPSILON;
pub(crate) use scene_impl::WorldScene;

pub(crate) fn build_scene(config: &GameConfig) -> Box<dyn Scene> {
    Box::new(WorldScene::new(config))
}
