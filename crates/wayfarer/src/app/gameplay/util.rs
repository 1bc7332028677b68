use engine::{TileCoord, Tilemap, TilemapError, Vec2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepResult {
    pub(crate) position: Vec2,
    pub(crate) arrived: bool,
    pub(crate) distance_used: f32,
}

/// Moves `current` toward `target` by at most `max_step`.
///
/// Within `arrival_threshold` of the target counts as arrival and snaps onto
/// it without spending budget. A step that ends inside the threshold also
/// snaps, spending the whole step.
pub(crate) fn step_toward(
    current: Vec2,
    target: Vec2,
    max_step: f32,
    arrival_threshold: f32,
) -> StepResult {
    let dx = target.x - current.x;
    let dy = target.y - current.y;
    let distance_sq = dx * dx + dy * dy;
    let threshold_sq = arrival_threshold * arrival_threshold;
    if distance_sq <= threshold_sq {
        return StepResult {
            position: target,
            arrived: true,
            distance_used: 0.0,
        };
    }

    let distance = distance_sq.sqrt();
    let max_step = max_step.max(0.0);
    if max_step >= distance {
        return StepResult {
            position: target,
            arrived: true,
            distance_used: distance,
        };
    }

    let remaining = distance - max_step;
    if remaining <= arrival_threshold {
        return StepResult {
            position: target,
            arrived: true,
            distance_used: max_step,
        };
    }

    let inv_distance = distance.recip();
    StepResult {
        position: Vec2 {
            x: current.x + dx * inv_distance * max_step,
            y: current.y + dy * inv_distance * max_step,
        },
        arrived: false,
        distance_used: max_step,
    }
}

/// Ground tilemap with `blocked_tile_id` written at each obstacle tile.
///
/// Obstacles outside the map are skipped.
pub(crate) fn build_world_tilemap(
    width: u32,
    height: u32,
    tile_size: f32,
    blocked_tile_id: u16,
    obstacles: &[TileCoord],
) -> Result<Tilemap, TilemapError> {
    let mut tilemap = Tilemap::filled(width, height, Vec2::default(), tile_size, 0)?;
    for obstacle in obstacles {
        tilemap.set_tile(obstacle.x, obstacle.y, blocked_tile_id);
    }
    Ok(tilemap)
}
