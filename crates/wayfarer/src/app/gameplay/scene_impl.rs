use std::collections::VecDeque;

use engine::{
    EntityId, InputSnapshot, Scene, SceneCommand, SceneWorld, TileCoord, Transform, Vec2,
};
use tracing::{debug, error, info, warn};

use super::actions::ActionDescriptor;
use super::events::{EventBus, GameEvent, SubscriptionId, Topic};
use super::nav::TileGridPathFinder;
use super::processor::ActionProcessor;
use super::selection::SelectionManager;
use super::util::build_world_tilemap;
use crate::app::config::{ActorConfig, GameConfig, MapConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClickOutcome {
    Deselected,
    MoveIssued(TileCoord),
    OutsideMap,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
struct ScheduledRequest {
    tick: u64,
    event: GameEvent,
}

/// Tile world with one player-controlled actor and a few NPCs, wired to the
/// action system through a scene-owned [`EventBus`].
pub(crate) struct WorldScene {
    map: MapConfig,
    player: ActorConfig,
    npcs: Vec<ActorConfig>,
    log_topics: Vec<Topic>,
    scheduled: VecDeque<ScheduledRequest>,
    tick: u64,
    pub(super) bus: EventBus,
    pub(super) processor: ActionProcessor,
    pub(super) selection: SelectionManager,
    pub(super) path_finder: TileGridPathFinder,
    pub(super) player_id: Option<EntityId>,
    pub(super) npc_ids: Vec<EntityId>,
    log_subscriptions: Vec<SubscriptionId>,
}

impl WorldScene {
    pub(crate) fn new(config: &GameConfig) -> Self {
        let mut scheduled = Vec::new();
        for step in &config.script {
            if let Some(request) = &step.request {
                scheduled.push(ScheduledRequest {
                    tick: step.tick,
                    event: GameEvent::ActionRequested {
                        entity_id: EntityId(request.entity),
                        descriptor: request.action.clone(),
                        policy: request.policy,
                    },
                });
            }
            if let Some(entity) = step.cancel {
                scheduled.push(ScheduledRequest {
                    tick: step.tick,
                    event: GameEvent::CancelRequested {
                        entity_id: EntityId(entity),
                    },
                });
            }
        }
        scheduled.sort_by_key(|request| request.tick);

        Self {
            map: config.map.clone(),
            player: config.player.clone(),
            npcs: config.npcs.clone(),
            log_topics: config.parsed_log_topics().collect(),
            scheduled: scheduled.into(),
            tick: 0,
            bus: EventBus::default(),
            processor: ActionProcessor::new(config.arrival_epsilon),
            selection: SelectionManager::default(),
            path_finder: TileGridPathFinder::new(vec![config.map.blocked_tile_id]),
            player_id: None,
            npc_ids: Vec::new(),
            log_subscriptions: Vec::new(),
        }
    }

    /// Map click with the selection rules applied: a click while anything is
    /// selected only deselects; otherwise the player walks to the clicked tile.
    pub(crate) fn on_map_click(
        &mut self,
        world_point: Vec2,
        world: &mut SceneWorld,
    ) -> ClickOutcome {
        if self.selection.selected().is_some() {
            self.selection.deselect(world, &mut self.bus);
            return ClickOutcome::Deselected;
        }

        let Some(tile) = world
            .tilemap()
            .and_then(|tilemap| tilemap.world_to_tile(world_point))
        else {
            debug!(x = world_point.x, y = world_point.y, "map_click_outside_map");
            return ClickOutcome::OutsideMap;
        };
        let Some(player_id) = self.player_id else {
            return ClickOutcome::Rejected;
        };

        let descriptor = ActionDescriptor::go_to(tile);
        match self.processor.process_now(
            player_id,
            &descriptor,
            world,
            &self.path_finder,
            &mut self.bus,
        ) {
            Ok(()) => ClickOutcome::MoveIssued(tile),
            Err(error) => {
                warn!(entity = %player_id, error = %error, "map_click_rejected");
                ClickOutcome::Rejected
            }
        }
    }

    /// `tick` is the zero-based index of the update in progress, matching
    /// the tick numbers used by scripted input.
    fn emit_scheduled_requests(&mut self, tick: u64) {
        while self
            .scheduled
            .front()
            .is_some_and(|request| request.tick <= tick)
        {
            let Some(request) = self.scheduled.pop_front() else {
                break;
            };
            self.bus.emit(request.event);
        }
    }

    fn update_hover_marker(&self, input: &InputSnapshot, world: &mut SceneWorld) {
        let hovered = if self.selection.selected().is_some() {
            None
        } else {
            input.pointer_world().and_then(|point| {
                world
                    .tilemap()
                    .and_then(|tilemap| tilemap.world_to_tile(point))
            })
        };
        if world.visual_state().hovered_tile != hovered {
            world.set_hovered_tile_visual(hovered);
        }
    }
}

impl Scene for WorldScene {
    fn load(&mut self, world: &mut SceneWorld) {
        match build_world_tilemap(
            self.map.width,
            self.map.height,
            self.map.tile_size,
            self.map.blocked_tile_id,
            &self
                .map
                .obstacles
                .iter()
                .copied()
                .map(TileCoord::from)
                .collect::<Vec<_>>(),
        ) {
            Ok(tilemap) => world.set_tilemap(tilemap),
            Err(err) => error!(error = %err, "tilemap_build_failed"),
        }
        self.path_finder.refresh_from_tilemap(world.tilemap());

        let mut spawned = Vec::with_capacity(self.npcs.len() + 1);
        self.player_id = spawn_actor_at(world, &self.player, "player");
        if let Some(id) = self.player_id {
            spawned.push((id, self.player.move_speed));
        }
        self.npc_ids.clear();
        for npc in &self.npcs {
            if let Some(id) = spawn_actor_at(world, npc, "npc") {
                self.npc_ids.push(id);
                spawned.push((id, npc.move_speed));
            }
        }
        world.apply_pending();

        for (id, move_speed) in spawned {
            if let Some(entity) = world.find_entity_mut(id) {
                entity.move_speed = move_speed;
            }
            self.processor.register(id);
        }

        self.processor.listen(&mut self.bus);
        self.selection.listen(&mut self.bus);
        for topic in self.log_topics.clone() {
            let id = self.bus.on(topic, move |event: &GameEvent| {
                info!(topic = %topic, event = ?event, "bus_event");
            });
            self.log_subscriptions.push(id);
        }

        info!(
            player = ?self.player_id,
            npcs = self.npc_ids.len(),
            scheduled_requests = self.scheduled.len(),
            "world_ready"
        );
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut SceneWorld,
    ) -> SceneCommand {
        let tick = self.tick;
        self.tick = self.tick.saturating_add(1);
        self.path_finder.refresh_from_tilemap(world.tilemap());

        if let Some(entity_id) = input.entity_pointer_down() {
            self.bus.emit(GameEvent::SelectRequested {
                entity_id: Some(entity_id),
            });
        } else if let Some(point) = input.map_pointer_down_world() {
            let outcome = self.on_map_click(point, world);
            debug!(outcome = ?outcome, "map_click");
        }

        self.emit_scheduled_requests(tick);
        self.selection.drain_requests(world, &mut self.bus);
        self.processor
            .drain_requests(world, &self.path_finder, &mut self.bus);
        self.processor
            .advance_all(fixed_dt_seconds, world, &self.path_finder, &mut self.bus);
        self.update_hover_marker(input, world);

        self.bus.finish_tick_rollover();
        let counts = self.bus.last_tick_counts();
        if counts.total() > 0 {
            debug!(
                tick,
                events = counts.total(),
                started = counts.count(Topic::ACTION_STARTED),
                completed = counts.count(Topic::ACTION_COMPLETED),
                "tick_events"
            );
        }
        SceneCommand::None
    }

    fn unload(&mut self, _world: &mut SceneWorld) {
        let active_actions = self.processor.active_count();
        for id in self.player_id.iter().chain(&self.npc_ids) {
            self.processor.unregister(*id, &mut self.bus);
        }
        self.processor.unlisten(&mut self.bus);
        self.selection.unlisten(&mut self.bus);
        for id in self.log_subscriptions.drain(..) {
            self.bus.off(id);
        }
        info!(ticks = self.tick, active_actions, "world_unloaded");
        self.player_id = None;
        self.npc_ids.clear();
        self.path_finder.clear();
    }

    fn debug_title(&self, world: &SceneWorld) -> Option<String> {
        let selected = self
            .selection
            .selected()
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        let player_queue = self.player_id.and_then(|id| self.processor.queue(id));
        let player_action = player_queue
            .and_then(|queue| queue.active_action())
            .map_or_else(|| "idle".to_string(), |action| action.to_string());
        let queued = player_queue.map_or(0, |queue| queue.pending_actions().count());
        let player_tile = self
            .player_id
            .and_then(|id| world.entity_tile(id))
            .map_or_else(|| "-".to_string(), |tile| tile.to_string());
        let events = self.bus.last_tick_counts().total();
        Some(format!(
            "wayfarer | selected: {selected} | player: {player_action} @ {player_tile} \
             (+{queued} queued) | events/tick: {events}"
        ))
    }
}

fn spawn_actor_at(
    world: &mut SceneWorld,
    actor: &ActorConfig,
    debug_name: &'static str,
) -> Option<EntityId> {
    let tile = TileCoord::from(actor.spawn_tile);
    let Some(position) = world
        .tilemap()
        .and_then(|tilemap| tilemap.tile_center_world(tile.x, tile.y))
    else {
        warn!(name = debug_name, tile = %tile, "spawn_outside_map");
        return None;
    };
    Some(world.spawn_actor(Transform { position }, debug_name))
}
