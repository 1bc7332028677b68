use std::fmt;

use thiserror::Error;

pub const DEFAULT_MOVE_SPEED: f32 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Quit,
}

/// Per-tick input as seen by a scene.
///
/// Pointer coordinates are already in world space; camera projection belongs
/// to the input layer.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    quit_requested: bool,
    pointer_world: Option<Vec2>,
    map_pointer_down_world: Option<Vec2>,
    entity_pointer_down: Option<EntityId>,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn with_quit_requested(mut self, quit_requested: bool) -> Self {
        self.quit_requested = quit_requested;
        self
    }

    pub fn with_pointer_world(mut self, pointer_world: Option<Vec2>) -> Self {
        self.pointer_world = pointer_world;
        self
    }

    pub fn with_map_pointer_down(mut self, world: Option<Vec2>) -> Self {
        self.map_pointer_down_world = world;
        if world.is_some() {
            self.pointer_world = world;
        }
        self
    }

    pub fn with_entity_pointer_down(mut self, entity: Option<EntityId>) -> Self {
        self.entity_pointer_down = entity;
        self
    }

    pub fn pointer_world(&self) -> Option<Vec2> {
        self.pointer_world
    }

    pub fn map_pointer_down_world(&self) -> Option<Vec2> {
        self.map_pointer_down_world
    }

    pub fn entity_pointer_down(&self) -> Option<EntityId> {
        self.entity_pointer_down
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Transform {
    pub position: Vec2,
}

/// Tilemap origin convention:
/// - `origin` is the world position of tile (0,0) top-left corner.
/// - Tiles are square with side `tile_size` world units.
/// - The center of tile (x,y) is `origin + ((x + 0.5), (y + 0.5)) * tile_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tilemap {
    width: u32,
    height: u32,
    origin: Vec2,
    tile_size: f32,
    tiles: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("tile size must be a positive finite number, got {0}")]
    InvalidTileSize(f32),
}

impl Tilemap {
    pub fn new(
        width: u32,
        height: u32,
        origin: Vec2,
        tile_size: f32,
        tiles: Vec<u16>,
    ) -> Result<Self, TilemapError> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(TilemapError::InvalidTileSize(tile_size));
        }
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            origin,
            tile_size,
            tiles,
        })
    }

    pub fn filled(
        width: u32,
        height: u32,
        origin: Vec2,
        tile_size: f32,
        fill: u16,
    ) -> Result<Self, TilemapError> {
        Self::new(
            width,
            height,
            origin,
            tile_size,
            vec![fill; width as usize * height as usize],
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_at(&self, x: u32, y: u32) -> Option<u16> {
        self.index_of(x, y)
            .and_then(|index| self.tiles.get(index).copied())
    }

    pub fn set_tile(&mut self, x: u32, y: u32, tile_id: u16) -> bool {
        match self.index_of(x, y) {
            Some(index) => {
                self.tiles[index] = tile_id;
                true
            }
            None => false,
        }
    }

    pub fn tile_center_world(&self, x: u32, y: u32) -> Option<Vec2> {
        self.index_of(x, y)?;
        Some(Vec2 {
            x: self.origin.x + (x as f32 + 0.5) * self.tile_size,
            y: self.origin.y + (y as f32 + 0.5) * self.tile_size,
        })
    }

    pub fn world_to_tile(&self, world: Vec2) -> Option<TileCoord> {
        let tile_x = ((world.x - self.origin.x) / self.tile_size).floor();
        let tile_y = ((world.y - self.origin.y) / self.tile_size).floor();
        if !tile_x.is_finite() || !tile_y.is_finite() || tile_x < 0.0 || tile_y < 0.0 {
            return None;
        }
        let tile_x = tile_x as u32;
        let tile_y = tile_y as u32;
        if tile_x >= self.width || tile_y >= self.height {
            return None;
        }
        Some(TileCoord {
            x: tile_x,
            y: tile_y,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneVisualState {
    pub selected_actor: Option<EntityId>,
    pub hovered_tile: Option<TileCoord>,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub transform: Transform,
    pub debug_name: &'static str,
    pub selectable: bool,
    pub selected: bool,
    pub move_speed: f32,
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Entity store owned by the scene host. Spawns and despawns are deferred
/// until [`SceneWorld::apply_pending`].
#[derive(Debug, Default)]
pub struct SceneWorld {
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_spawns: Vec<Entity>,
    pending_despawns: Vec<EntityId>,
    tilemap: Option<Tilemap>,
    visual_state: SceneVisualState,
}

impl SceneWorld {
    pub fn spawn(&mut self, transform: Transform, debug_name: &'static str) -> EntityId {
        self.spawn_internal(transform, debug_name, false)
    }

    /// Spawns a selectable entity that can be given actions.
    pub fn spawn_actor(&mut self, transform: Transform, debug_name: &'static str) -> EntityId {
        self.spawn_internal(transform, debug_name, true)
    }

    fn spawn_internal(
        &mut self,
        transform: Transform,
        debug_name: &'static str,
        selectable: bool,
    ) -> EntityId {
        let id = self.allocator.allocate();
        self.pending_spawns.push(Entity {
            id,
            transform,
            debug_name,
            selectable,
            selected: false,
            move_speed: DEFAULT_MOVE_SPEED,
        });
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let exists_now = self.entities.iter().any(|entity| entity.id == id);
        let pending_spawn = self.pending_spawns.iter().any(|entity| entity.id == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    pub fn apply_pending(&mut self) {
        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort_by_key(|id| id.0);
            self.pending_despawns.dedup();
            let pending = &self.pending_despawns;
            self.entities.retain(|entity| {
                pending
                    .binary_search_by_key(&entity.id.0, |id| id.0)
                    .is_err()
            });
            self.pending_spawns.retain(|entity| {
                pending
                    .binary_search_by_key(&entity.id.0, |id| id.0)
                    .is_err()
            });
            self.pending_despawns.clear();
        }

        self.entities.append(&mut self.pending_spawns);
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.visual_state = SceneVisualState::default();
    }

    pub fn set_tilemap(&mut self, tilemap: Tilemap) {
        self.tilemap = Some(tilemap);
    }

    pub fn tilemap(&self) -> Option<&Tilemap> {
        self.tilemap.as_ref()
    }

    pub fn set_selected_actor_visual(&mut self, selected: Option<EntityId>) {
        self.visual_state.selected_actor = selected;
    }

    pub fn set_hovered_tile_visual(&mut self, hovered: Option<TileCoord>) {
        self.visual_state.hovered_tile = hovered;
    }

    pub fn visual_state(&self) -> &SceneVisualState {
        &self.visual_state
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn find_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    /// Tile currently occupied by the entity, derived from its world position.
    pub fn entity_tile(&self, id: EntityId) -> Option<TileCoord> {
        let entity = self.find_entity(id)?;
        self.tilemap()?.world_to_tile(entity.transform.position)
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut SceneWorld);
    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut SceneWorld,
    ) -> SceneCommand;
    fn unload(&mut self, world: &mut SceneWorld);
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

pub(crate) struct SceneRuntime {
    scene: Box<dyn Scene>,
    world: SceneWorld,
    is_loaded: bool,
}

impl SceneRuntime {
    pub(crate) fn new(scene: Box<dyn Scene>) -> Self {
        Self {
            scene,
            world: SceneWorld::default(),
            is_loaded: false,
        }
    }

    pub(crate) fn load(&mut self) {
        if self.is_loaded {
            return;
        }
        self.scene.load(&mut self.world);
        self.is_loaded = true;
    }

    pub(crate) fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) -> SceneCommand {
        self.scene.update(fixed_dt_seconds, input, &mut self.world)
    }

    pub(crate) fn apply_pending(&mut self) {
        self.world.apply_pending();
    }

    pub(crate) fn world(&self) -> &SceneWorld {
        &self.world
    }

    pub(crate) fn debug_title(&self) -> Option<String> {
        self.scene.debug_title(&self.world)
    }

    pub(crate) fn shutdown(&mut self) {
        if self.is_loaded {
            self.scene.unload(&mut self.world);
            self.world.clear();
            self.is_loaded = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tilemap(width: u32, height: u32, origin: Vec2, tile_size: f32) -> Tilemap {
        Tilemap::filled(width, height, origin, tile_size, 0).expect("tilemap")
    }

    fn transform_at(x: f32, y: f32) -> Transform {
        Transform {
            position: Vec2 { x, y },
        }
    }

    struct CountingScene {
        loads: usize,
        unloads: usize,
    }

    impl Scene for CountingScene {
        fn load(&mut self, world: &mut SceneWorld) {
            self.loads += 1;
            world.spawn_actor(transform_at(0.0, 0.0), "actor");
        }

        fn update(
            &mut self,
            _fixed_dt_seconds: f32,
            _input: &InputSnapshot,
            _world: &mut SceneWorld,
        ) -> SceneCommand {
            SceneCommand::None
        }

        fn unload(&mut self, _world: &mut SceneWorld) {
            self.unloads += 1;
        }
    }

    #[test]
    fn tilemap_rejects_wrong_tile_count() {
        let result = Tilemap::new(2, 2, Vec2::default(), 1.0, vec![0; 3]);
        assert_eq!(
            result,
            Err(TilemapError::TileCountMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn tilemap_rejects_non_positive_tile_size() {
        let result = Tilemap::new(1, 1, Vec2::default(), 0.0, vec![0]);
        assert!(matches!(result, Err(TilemapError::InvalidTileSize(_))));
    }

    #[test]
    fn tile_center_scales_with_tile_size_and_origin() {
        let tilemap = make_tilemap(4, 4, Vec2 { x: -64.0, y: 32.0 }, 32.0);
        assert_eq!(
            tilemap.tile_center_world(1, 2),
            Some(Vec2 { x: -16.0, y: 112.0 })
        );
        assert_eq!(tilemap.tile_center_world(4, 0), None);
    }

    #[test]
    fn world_to_tile_round_trips_tile_centers_and_rejects_outside_points() {
        let tilemap = make_tilemap(5, 3, Vec2::default(), 32.0);
        for y in 0..3 {
            for x in 0..5 {
                let center = tilemap.tile_center_world(x, y).expect("center");
                assert_eq!(tilemap.world_to_tile(center), Some(TileCoord { x, y }));
            }
        }
        assert_eq!(tilemap.world_to_tile(Vec2 { x: -0.1, y: 4.0 }), None);
        assert_eq!(tilemap.world_to_tile(Vec2 { x: 160.0, y: 4.0 }), None);
        assert_eq!(tilemap.world_to_tile(Vec2 { x: 4.0, y: 96.0 }), None);
    }

    #[test]
    fn spawn_is_deferred_until_apply_pending() {
        let mut world = SceneWorld::default();
        let id = world.spawn_actor(transform_at(1.0, 1.0), "actor");
        assert!(world.find_entity(id).is_none());

        world.apply_pending();
        let entity = world.find_entity(id).expect("entity");
        assert!(entity.selectable);
        assert!(!entity.selected);
    }

    #[test]
    fn despawn_of_pending_spawn_drops_it() {
        let mut world = SceneWorld::default();
        let id = world.spawn(transform_at(0.0, 0.0), "prop");
        assert!(world.despawn(id));
        world.apply_pending();
        assert_eq!(world.entity_count(), 0);
        assert!(!world.despawn(EntityId(99)));
    }

    #[test]
    fn despawn_keeps_spawn_order_of_survivors() {
        let mut world = SceneWorld::default();
        let first = world.spawn_actor(transform_at(0.0, 0.0), "first");
        let second = world.spawn(transform_at(4.0, 0.0), "prop");
        let third = world.spawn_actor(transform_at(8.0, 0.0), "third");
        world.apply_pending();

        assert!(world.despawn(second));
        world.apply_pending();

        let ids: Vec<EntityId> = world.entities().iter().map(|entity| entity.id).collect();
        assert_eq!(ids, vec![first, third]);
        assert!(!world.find_entity(first).expect("first").selected);
    }

    #[test]
    fn entity_tile_is_derived_from_position() {
        let mut world = SceneWorld::default();
        world.set_tilemap(make_tilemap(8, 8, Vec2::default(), 32.0));
        let id = world.spawn_actor(transform_at(100.0, 40.0), "actor");
        world.apply_pending();
        assert_eq!(world.entity_tile(id), Some(TileCoord { x: 3, y: 1 }));
    }

    #[test]
    fn runtime_loads_once_and_shutdown_clears_world() {
        let mut runtime = SceneRuntime::new(Box::new(CountingScene {
            loads: 0,
            unloads: 0,
        }));
        runtime.load();
        runtime.load();
        runtime.apply_pending();
        assert_eq!(runtime.world().entity_count(), 1);

        runtime.shutdown();
        assert_eq!(runtime.world().entity_count(), 0);
        runtime.shutdown();
    }
}
