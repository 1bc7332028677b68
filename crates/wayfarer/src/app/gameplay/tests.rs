use engine::{EntityId, InputSnapshot, Scene, SceneWorld, TileCoord, Vec2};
use serde_json::json;

use super::action_queue::{EnqueuePolicy, QueueState};
use super::actions::{Action, ActionDescriptor, ActionError};
use super::events::{record_topics, CancelReason, FailureReason, GameEvent, Topic};
use super::nav::PathFinder;
use super::scene_impl::{ClickOutcome, WorldScene};
use crate::app::config::{ActorConfig, GameConfig, MapConfig, ScriptRequest, ScriptStep, TilePos};

const TILE: f32 = 32.0;
const DT: f32 = 1.0 / 60.0;
const PLAYER: EntityId = EntityId(0);
const NPC: EntityId = EntityId(1);

fn test_config(obstacles: &[(u32, u32)]) -> GameConfig {
    GameConfig {
        map: MapConfig {
            width: 10,
            height: 10,
            tile_size: TILE,
            blocked_tile_id: 1,
            obstacles: obstacles
                .iter()
                .map(|(x, y)| TilePos { x: *x, y: *y })
                .collect(),
        },
        player: ActorConfig {
            spawn_tile: TilePos { x: 0, y: 0 },
            move_speed: 128.0,
        },
        npcs: vec![ActorConfig {
            spawn_tile: TilePos { x: 9, y: 9 },
            move_speed: 128.0,
        }],
        log_topics: Vec::new(),
        script: Vec::new(),
        ..GameConfig::default()
    }
}

fn loaded_scene(config: &GameConfig) -> (WorldScene, SceneWorld) {
    let mut scene = WorldScene::new(config);
    let mut world = SceneWorld::default();
    scene.load(&mut world);
    world.apply_pending();
    (scene, world)
}

fn tick(scene: &mut WorldScene, world: &mut SceneWorld, input: InputSnapshot) {
    scene.update(DT, &input, world);
    world.apply_pending();
}

fn idle_ticks(scene: &mut WorldScene, world: &mut SceneWorld, count: usize) {
    for _ in 0..count {
        tick(scene, world, InputSnapshot::empty());
    }
}

fn center(x: u32, y: u32) -> Vec2 {
    Vec2 {
        x: (x as f32 + 0.5) * TILE,
        y: (y as f32 + 0.5) * TILE,
    }
}

fn map_click(x: u32, y: u32) -> InputSnapshot {
    InputSnapshot::empty().with_map_pointer_down(Some(center(x, y)))
}

fn entity_click(id: EntityId) -> InputSnapshot {
    InputSnapshot::empty().with_entity_pointer_down(Some(id))
}

fn position_of(world: &SceneWorld, id: EntityId) -> Vec2 {
    world.find_entity(id).expect("entity").transform.position
}

fn assert_vec2_close(actual: Vec2, expected: Vec2) {
    assert!(
        (actual.x - expected.x).abs() < 0.001 && (actual.y - expected.y).abs() < 0.001,
        "expected {expected:?}, got {actual:?}"
    );
}

fn script_step(tick: u64) -> ScriptStep {
    ScriptStep {
        tick,
        pointer_world: None,
        click_world: None,
        click_entity: None,
        request: None,
        cancel: None,
        quit: false,
    }
}

fn script_request(tick: u64, entity: u64, action: ActionDescriptor) -> ScriptStep {
    ScriptStep {
        request: Some(ScriptRequest {
            entity,
            action,
            policy: EnqueuePolicy::InterruptReplace,
        }),
        ..script_step(tick)
    }
}

#[test]
fn load_spawns_registered_actors_on_tile_centers() {
    let (scene, world) = loaded_scene(&test_config(&[]));

    assert_eq!(scene.player_id, Some(PLAYER));
    assert_eq!(scene.npc_ids, vec![NPC]);
    assert_vec2_close(position_of(&world, PLAYER), center(0, 0));
    assert_vec2_close(position_of(&world, NPC), center(9, 9));
    assert_eq!(world.find_entity(PLAYER).expect("player").move_speed, 128.0);
    assert!(scene.processor.queue(PLAYER).is_some());
    assert!(scene.processor.queue(NPC).is_some());
    assert!(scene.path_finder.has_mesh());
    assert_eq!(scene.bus.subscriber_count(Topic::ACTION_REQUEST), 1);
    assert_eq!(scene.bus.subscriber_count(Topic::ACTION_CANCEL), 1);
    assert_eq!(scene.bus.subscriber_count(Topic::UNIT_SELECT), 1);
}

#[test]
fn click_while_selected_deselects_and_next_click_moves_player() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    tick(&mut scene, &mut world, entity_click(PLAYER));
    assert_eq!(scene.selection.selected(), Some(PLAYER));

    tick(&mut scene, &mut world, map_click(5, 5));

    assert_eq!(scene.selection.selected(), None);
    assert!(scene.processor.queue(PLAYER).expect("queue").is_idle());
    assert_vec2_close(position_of(&world, PLAYER), center(0, 0));

    tick(&mut scene, &mut world, map_click(5, 5));

    assert_eq!(
        scene.processor.queue(PLAYER).expect("queue").active_action(),
        Some(Action::GoTo {
            target: TileCoord { x: 5, y: 5 }
        })
    );
}

#[test]
fn on_map_click_reports_outcome() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));

    assert_eq!(
        scene.on_map_click(center(3, 2), &mut world),
        ClickOutcome::MoveIssued(TileCoord { x: 3, y: 2 })
    );
    assert_eq!(
        scene.on_map_click(Vec2 { x: -40.0, y: 10.0 }, &mut world),
        ClickOutcome::OutsideMap
    );
    scene
        .selection
        .select(NPC, &mut world, &mut scene.bus)
        .expect("select");
    assert_eq!(
        scene.on_map_click(center(1, 1), &mut world),
        ClickOutcome::Deselected
    );
}

#[test]
fn second_click_interrupts_with_fresh_path_to_new_goal() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    let cancelled = record_topics(&mut scene.bus, &[Topic::ACTION_CANCELLED]);
    tick(&mut scene, &mut world, map_click(2, 0));
    idle_ticks(&mut scene, &mut world, 10);

    let from = position_of(&world, PLAYER);
    let expected = scene
        .path_finder
        .find_path(from, center(5, 5))
        .expect("path to (5, 5)");
    tick(&mut scene, &mut world, map_click(5, 5));

    let queue = scene.processor.queue(PLAYER).expect("queue");
    assert_eq!(
        queue.active_action(),
        Some(Action::GoTo {
            target: TileCoord { x: 5, y: 5 }
        })
    );
    assert_eq!(queue.remaining_waypoints(), expected.as_slice());
    assert_eq!(queue.remaining_waypoints().last(), Some(&center(5, 5)));
    assert_eq!(
        *cancelled.borrow(),
        vec![GameEvent::ActionCancelled {
            entity_id: PLAYER,
            action: Action::GoTo {
                target: TileCoord { x: 2, y: 0 }
            },
            reason: CancelReason::Interrupted,
        }]
    );
}

#[test]
fn selecting_b_while_a_selected_notifies_a_first() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    tick(&mut scene, &mut world, entity_click(PLAYER));
    let changes = record_topics(&mut scene.bus, &[Topic::SELECTION_CHANGED]);

    tick(&mut scene, &mut world, entity_click(NPC));

    assert_eq!(
        *changes.borrow(),
        vec![
            GameEvent::SelectionChanged {
                entity_id: PLAYER,
                selected: false
            },
            GameEvent::SelectionChanged {
                entity_id: NPC,
                selected: true
            },
        ]
    );
    let selected: Vec<EntityId> = world
        .entities()
        .iter()
        .filter(|entity| entity.selected)
        .map(|entity| entity.id)
        .collect();
    assert_eq!(selected, vec![NPC]);
}

#[test]
fn map_click_on_selected_actor_tile_only_deselects() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    tick(&mut scene, &mut world, entity_click(NPC));
    assert_eq!(scene.selection.selected(), Some(NPC));

    tick(&mut scene, &mut world, map_click(9, 9));

    assert_eq!(scene.selection.selected(), None);
    assert!(scene.processor.queue(PLAYER).expect("queue").is_idle());
    assert!(scene.processor.queue(NPC).expect("queue").is_idle());
}

#[test]
fn map_click_on_actor_tile_without_selection_moves_player() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));

    tick(&mut scene, &mut world, map_click(9, 9));

    assert_eq!(scene.selection.selected(), None);
    assert_eq!(
        scene.processor.queue(PLAYER).expect("queue").active_action(),
        Some(Action::GoTo {
            target: TileCoord { x: 9, y: 9 }
        })
    );
}

#[test]
fn selection_does_not_cancel_movement() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    tick(&mut scene, &mut world, map_click(6, 0));
    tick(&mut scene, &mut world, entity_click(PLAYER));
    tick(&mut scene, &mut world, entity_click(NPC));

    assert!(matches!(
        scene.processor.queue(PLAYER).expect("queue").state(),
        QueueState::Executing(_)
    ));
}

#[test]
fn unreachable_click_fails_once_and_never_executes() {
    let enclosure = [(4, 5), (6, 5), (5, 4), (5, 6)];
    let (mut scene, mut world) = loaded_scene(&test_config(&enclosure));
    let log = record_topics(
        &mut scene.bus,
        &[Topic::ACTION_STARTED, Topic::ACTION_FAILED],
    );

    tick(&mut scene, &mut world, map_click(5, 5));
    assert!(scene.processor.queue(PLAYER).expect("queue").is_idle());
    idle_ticks(&mut scene, &mut world, 30);

    assert_eq!(
        *log.borrow(),
        vec![GameEvent::ActionFailed {
            entity_id: PLAYER,
            action: Action::GoTo {
                target: TileCoord { x: 5, y: 5 }
            },
            reason: FailureReason::NoPath,
        }]
    );
    assert_vec2_close(position_of(&world, PLAYER), center(0, 0));
}

#[test]
fn walking_to_goal_completes_exactly_once() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[(1, 0)]));
    let completed = record_topics(&mut scene.bus, &[Topic::ACTION_COMPLETED]);

    tick(&mut scene, &mut world, map_click(3, 0));
    idle_ticks(&mut scene, &mut world, 120);
    assert_vec2_close(position_of(&world, PLAYER), center(3, 0));
    assert_eq!(world.entity_tile(PLAYER), Some(TileCoord { x: 3, y: 0 }));

    idle_ticks(&mut scene, &mut world, 30);
    assert_eq!(completed.borrow().len(), 1);
    assert!(scene.processor.queue(PLAYER).expect("queue").is_idle());
}

#[test]
fn scripted_bus_requests_reach_the_processor() {
    let mut config = test_config(&[]);
    config.script = vec![
        script_request(0, NPC.0, ActionDescriptor::go_to(TileCoord { x: 7, y: 9 })),
        script_request(1, 99, ActionDescriptor::go_to(TileCoord { x: 1, y: 1 })),
        script_request(
            1,
            PLAYER.0,
            serde_json::from_value(json!({ "type": "fly", "args": [] })).expect("descriptor"),
        ),
    ];
    let (mut scene, mut world) = loaded_scene(&config);
    let rejected = record_topics(&mut scene.bus, &[Topic::ACTION_REJECTED]);

    tick(&mut scene, &mut world, InputSnapshot::empty());
    assert!(!scene.processor.queue(NPC).expect("queue").is_idle());
    assert!(rejected.borrow().is_empty());

    tick(&mut scene, &mut world, InputSnapshot::empty());
    let rejected = rejected.borrow();
    assert_eq!(rejected.len(), 2);
    assert_eq!(
        rejected[0],
        GameEvent::ActionRejected {
            entity_id: EntityId(99),
            error: ActionError::UnknownEntity(EntityId(99)),
        }
    );
    assert!(matches!(
        &rejected[1],
        GameEvent::ActionRejected {
            entity_id: PLAYER,
            error: ActionError::InvalidAction { .. },
        }
    ));
}

#[test]
fn scripted_append_and_cancel_reach_the_queue() {
    let mut config = test_config(&[]);
    config.script = vec![
        script_request(0, NPC.0, ActionDescriptor::go_to(TileCoord { x: 7, y: 9 })),
        ScriptStep {
            request: Some(ScriptRequest {
                entity: NPC.0,
                action: ActionDescriptor::go_to(TileCoord { x: 7, y: 5 }),
                policy: EnqueuePolicy::Append,
            }),
            ..script_step(0)
        },
        ScriptStep {
            cancel: Some(NPC.0),
            ..script_step(1)
        },
    ];
    let (mut scene, mut world) = loaded_scene(&config);
    let cancelled = record_topics(&mut scene.bus, &[Topic::ACTION_CANCELLED]);

    tick(&mut scene, &mut world, InputSnapshot::empty());
    let queue = scene.processor.queue(NPC).expect("queue");
    assert_eq!(
        queue.active_action(),
        Some(Action::GoTo {
            target: TileCoord { x: 7, y: 9 }
        })
    );
    assert_eq!(queue.pending_actions().count(), 1);

    tick(&mut scene, &mut world, InputSnapshot::empty());
    let queue = scene.processor.queue(NPC).expect("queue");
    assert!(queue.is_idle());
    assert_eq!(queue.pending_actions().count(), 0);
    assert_eq!(
        *cancelled.borrow(),
        vec![GameEvent::ActionCancelled {
            entity_id: NPC,
            action: Action::GoTo {
                target: TileCoord { x: 7, y: 9 }
            },
            reason: CancelReason::Requested,
        }]
    );
}

#[test]
fn hover_marker_tracks_pointer_only_without_selection() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    let hover = InputSnapshot::empty().with_pointer_world(Some(center(4, 7)));

    tick(&mut scene, &mut world, hover.clone());
    assert_eq!(
        world.visual_state().hovered_tile,
        Some(TileCoord { x: 4, y: 7 })
    );

    tick(&mut scene, &mut world, entity_click(NPC));
    tick(&mut scene, &mut world, hover);
    assert_eq!(world.visual_state().hovered_tile, None);
    assert_eq!(world.visual_state().selected_actor, Some(NPC));
}

#[test]
fn tick_event_counts_roll_over_each_update() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    tick(&mut scene, &mut world, map_click(4, 0));
    assert_eq!(scene.bus.last_tick_counts().count(Topic::ACTION_STARTED), 1);

    tick(&mut scene, &mut world, InputSnapshot::empty());
    assert_eq!(scene.bus.last_tick_counts().count(Topic::ACTION_STARTED), 0);
}

#[test]
fn debug_title_summarises_selection_and_player_action() {
    let (mut scene, mut world) = loaded_scene(&test_config(&[]));
    tick(&mut scene, &mut world, map_click(3, 0));

    let title = scene.debug_title(&world).expect("title");
    assert!(title.contains("selected: none"), "{title}");
    assert!(title.contains("player: go-to (3, 0) @ (0, 0) (+0 queued)"), "{title}");

    tick(&mut scene, &mut world, entity_click(NPC));
    let title = scene.debug_title(&world).expect("title");
    assert!(title.contains("selected: 1"), "{title}");
}

#[test]
fn unload_drops_bus_listeners() {
    let mut config = test_config(&[]);
    config.log_topics = vec![Topic::ACTION_COMPLETED.to_string()];
    let (mut scene, mut world) = loaded_scene(&config);
    assert_eq!(scene.bus.subscriber_count(Topic::ACTION_COMPLETED), 1);

    scene.unload(&mut world);

    assert_eq!(scene.bus.subscriber_count(Topic::ACTION_REQUEST), 0);
    assert_eq!(scene.bus.subscriber_count(Topic::ACTION_CANCEL), 0);
    assert_eq!(scene.bus.subscriber_count(Topic::UNIT_SELECT), 0);
    assert_eq!(scene.bus.subscriber_count(Topic::ACTION_COMPLETED), 0);
    assert_eq!(scene.player_id, None);
}
