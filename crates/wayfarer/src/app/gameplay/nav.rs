use engine::{TileCoord, Tilemap, Vec2};
use thiserror::Error;
use tracing::debug;

const FNV1A_OFFSET_BASIS_64: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A_PRIME_64: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub(crate) enum NoPathError {
    #[error("no navigation mesh is loaded")]
    MeshUnavailable,
    #[error("point ({x}, {y}) is outside the map")]
    OutsideMesh { x: f32, y: f32 },
    #[error("point ({x}, {y}) is not walkable")]
    NotWalkable { x: f32, y: f32 },
    #[error("goal is unreachable from start")]
    Unreachable,
}

/// Routes between two world points over the current navigation mesh.
///
/// Implementations are pure with respect to the mesh: the same inputs on the
/// same mesh give the same waypoints. The returned waypoints exclude the start
/// point and end at the goal.
pub(crate) trait PathFinder {
    fn find_path(&self, start: Vec2, end: Vec2) -> Result<Vec<Vec2>, NoPathError>;
}

/// Waypoints of one `go-to`, consumed front to back.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NavigationPath {
    waypoints_world: Vec<Vec2>,
    next_waypoint_index: usize,
}

impl NavigationPath {
    pub(crate) fn new(waypoints_world: Vec<Vec2>) -> Self {
        Self {
            waypoints_world,
            next_waypoint_index: 0,
        }
    }

    pub(crate) fn current_waypoint(&self) -> Option<Vec2> {
        self.waypoints_world.get(self.next_waypoint_index).copied()
    }

    pub(crate) fn next_waypoint_index(&self) -> usize {
        self.next_waypoint_index
    }

    pub(crate) fn advance_waypoint(&mut self) {
        if self.next_waypoint_index < self.waypoints_world.len() {
            self.next_waypoint_index = self.next_waypoint_index.saturating_add(1);
        }
    }

    pub(crate) fn remaining(&self) -> &[Vec2] {
        let start = self.next_waypoint_index.min(self.waypoints_world.len());
        &self.waypoints_world[start..]
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.next_waypoint_index >= self.waypoints_world.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TilemapNavKey {
    width: u32,
    height: u32,
    origin_x_bits: u32,
    origin_y_bits: u32,
    tile_size_bits: u32,
    tiles_hash: u64,
}

/// Passability grid over the world tilemap, searched with 4-neighbour A*.
///
/// The grid is rebuilt only when the tilemap content changes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TileGridPathFinder {
    blocked_tile_ids: Vec<u16>,
    key: Option<TilemapNavKey>,
    width: u32,
    height: u32,
    origin: Vec2,
    tile_size: f32,
    walkable: Vec<bool>,
}

impl TileGridPathFinder {
    pub(crate) fn new(blocked_tile_ids: Vec<u16>) -> Self {
        Self {
            blocked_tile_ids,
            key: None,
            width: 0,
            height: 0,
            origin: Vec2::default(),
            tile_size: 1.0,
            walkable: Vec::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.key = None;
        self.width = 0;
        self.height = 0;
        self.origin = Vec2::default();
        self.tile_size = 1.0;
        self.walkable.clear();
    }

    /// Returns true when the grid was rebuilt.
    pub(crate) fn refresh_from_tilemap(&mut self, tilemap: Option<&Tilemap>) -> bool {
        let Some(tilemap) = tilemap else {
            let had_mesh = self.key.is_some();
            self.clear();
            return had_mesh;
        };
        let key = compute_tilemap_nav_key(tilemap);
        if self.key == Some(key) {
            return false;
        }

        let width = tilemap.width();
        let height = tilemap.height();
        let mut walkable = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let tile_id = tilemap.tile_at(x, y).unwrap_or(0);
                walkable.push(!self.blocked_tile_ids.contains(&tile_id));
            }
        }

        self.key = Some(key);
        self.width = width;
        self.height = height;
        self.origin = tilemap.origin();
        self.tile_size = tilemap.tile_size();
        self.walkable = walkable;
        debug!(
            width,
            height,
            blocked = self.walkable.iter().filter(|walkable| !**walkable).count(),
            "nav_grid_rebuilt"
        );
        true
    }

    pub(crate) fn has_mesh(&self) -> bool {
        self.key.is_some()
    }

    fn world_to_tile(&self, world: Vec2) -> Option<TileCoord> {
        self.key?;
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

    fn tile_center_world(&self, tile: TileCoord) -> Vec2 {
        Vec2 {
            x: self.origin.x + (tile.x as f32 + 0.5) * self.tile_size,
            y: self.origin.y + (tile.y as f32 + 0.5) * self.tile_size,
        }
    }

    pub(crate) fn is_walkable(&self, tile: TileCoord) -> bool {
        self.index_of(tile)
            .and_then(|index| self.walkable.get(index))
            .copied()
            .unwrap_or(false)
    }

    fn index_of(&self, tile: TileCoord) -> Option<usize> {
        if tile.x >= self.width || tile.y >= self.height {
            return None;
        }
        Some(tile.y as usize * self.width as usize + tile.x as usize)
    }

    fn resolve_walkable_tile(&self, world: Vec2) -> Result<TileCoord, NoPathError> {
        let tile = self.world_to_tile(world).ok_or(NoPathError::OutsideMesh {
            x: world.x,
            y: world.y,
        })?;
        if !self.is_walkable(tile) {
            return Err(NoPathError::NotWalkable {
                x: world.x,
                y: world.y,
            });
        }
        Ok(tile)
    }

    fn find_path_tiles(&self, start: TileCoord, goal: TileCoord) -> Option<Vec<TileCoord>> {
        let start_index = self.index_of(start)?;
        let goal_index = self.index_of(goal)?;
        if !self.is_walkable(start) || !self.is_walkable(goal) {
            return None;
        }

        if start == goal {
            return Some(vec![start]);
        }

        let node_count = self.width as usize * self.height as usize;
        let mut closed = vec![false; node_count];
        let mut best_g = vec![u32::MAX; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = Vec::new();
        let mut next_insertion = 0u64;

        let start_h = manhattan_distance(start, goal);
        open.push(OpenNode {
            coord: start,
            h_cost: start_h,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion = next_insertion.saturating_add(1);
        best_g[start_index] = 0;

        while !open.is_empty() {
            let best_index = pick_best_open_node_index(&open);
            let current = open.swap_remove(best_index);
            let Some(current_index) = self.index_of(current.coord) else {
                continue;
            };
            if closed[current_index] {
                continue;
            }
            closed[current_index] = true;

            if current.coord == goal {
                return reconstruct_tile_path(&parent, self.width, start_index, goal_index);
            }

            let current_g = best_g[current_index];
            for neighbor in self.neighbors(current.coord).into_iter().flatten() {
                let Some(neighbor_index) = self.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !self.is_walkable(neighbor) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(1);
                if tentative_g >= best_g[neighbor_index] {
                    continue;
                }

                best_g[neighbor_index] = tentative_g;
                parent[neighbor_index] = Some(current_index);
                let h_cost = manhattan_distance(neighbor, goal);
                open.push(OpenNode {
                    coord: neighbor,
                    h_cost,
                    f_cost: tentative_g.saturating_add(h_cost),
                    insertion_order: next_insertion,
                });
                next_insertion = next_insertion.saturating_add(1);
            }
        }

        None
    }

    fn neighbors(&self, coord: TileCoord) -> [Option<TileCoord>; 4] {
        let south = (coord.y + 1 < self.height).then(|| TileCoord {
            x: coord.x,
            y: coord.y + 1,
        });
        let east = (coord.x + 1 < self.width).then(|| TileCoord {
            x: coord.x + 1,
            y: coord.y,
        });
        let north = (coord.y > 0).then(|| TileCoord {
            x: coord.x,
            y: coord.y - 1,
        });
        let west = (coord.x > 0).then(|| TileCoord {
            x: coord.x - 1,
            y: coord.y,
        });
        [south, east, north, west]
    }
}

impl PathFinder for TileGridPathFinder {
    fn find_path(&self, start: Vec2, end: Vec2) -> Result<Vec<Vec2>, NoPathError> {
        if !self.has_mesh() {
            return Err(NoPathError::MeshUnavailable);
        }
        let start_tile = self.resolve_walkable_tile(start)?;
        let goal_tile = self.resolve_walkable_tile(end)?;

        let tile_path = self
            .find_path_tiles(start_tile, goal_tile)
            .ok_or(NoPathError::Unreachable)?;

        if tile_path.len() == 1 {
            return Ok(vec![self.tile_center_world(goal_tile)]);
        }
        Ok(tile_path
            .iter()
            .skip(1)
            .map(|tile| self.tile_center_world(*tile))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    coord: TileCoord,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, u32, u32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.coord.y,
        node.coord.x,
        node.insertion_order,
    )
}

fn reconstruct_tile_path(
    parent: &[Option<usize>],
    width: u32,
    start_index: usize,
    goal_index: usize,
) -> Option<Vec<TileCoord>> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        cursor = parent.get(cursor).and_then(|value| *value)?;
        indices.push(cursor);
    }
    indices.reverse();
    Some(
        indices
            .into_iter()
            .map(|index| TileCoord {
                x: (index as u32) % width,
                y: (index as u32) / width,
            })
            .collect(),
    )
}

fn manhattan_distance(a: TileCoord, b: TileCoord) -> u32 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}

fn compute_tilemap_nav_key(tilemap: &Tilemap) -> TilemapNavKey {
    let mut tiles_hash = FNV1A_OFFSET_BASIS_64;
    for y in 0..tilemap.height() {
        for x in 0..tilemap.width() {
            let tile_id = tilemap.tile_at(x, y).unwrap_or(0);
            tiles_hash = fnv1a_update_u16(tiles_hash, tile_id);
        }
    }
    TilemapNavKey {
        width: tilemap.width(),
        height: tilemap.height(),
        origin_x_bits: tilemap.origin().x.to_bits(),
        origin_y_bits: tilemap.origin().y.to_bits(),
        tile_size_bits: tilemap.tile_size().to_bits(),
        tiles_hash,
    }
}

fn fnv1a_update_u16(mut hash: u64, value: u16) -> u64 {
    for byte in value.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV1A_PRIME_64);
    }
    hash
}
