use std::collections::BTreeMap;
use std::process::ExitCode;

use engine::{run_headless, EntityId, InputSnapshot, InputSource, Vec2};
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::config::ScriptStep;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let mut input = ScriptedInput::new(&app.config.script);
    match run_headless(app.config.loop_config(), app.scene, &mut input) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks_run,
                exit_reason = ?summary.exit_reason,
                "run_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TickInput {
    pointer_world: Option<Vec2>,
    click_world: Option<Vec2>,
    click_entity: Option<EntityId>,
    quit: bool,
}

/// Replays pointer and click steps from the config script. The last pointer
/// position sticks between steps; `request` and `cancel` steps are handled by
/// the scene.
pub(crate) struct ScriptedInput {
    steps: BTreeMap<u64, TickInput>,
    pointer_world: Option<Vec2>,
}

impl ScriptedInput {
    pub(crate) fn new(script: &[ScriptStep]) -> Self {
        let mut steps: BTreeMap<u64, TickInput> = BTreeMap::new();
        for step in script {
            let entry = steps.entry(step.tick).or_default();
            if let Some(pointer) = step.pointer_world {
                entry.pointer_world = Some(pointer.into());
            }
            if let Some(click) = step.click_world {
                entry.click_world = Some(click.into());
            }
            if let Some(entity) = step.click_entity {
                entry.click_entity = Some(EntityId(entity));
            }
            entry.quit |= step.quit;
        }
        Self {
            steps,
            pointer_world: None,
        }
    }
}

impl InputSource for ScriptedInput {
    fn snapshot_for_tick(&mut self, tick: u64) -> InputSnapshot {
        let Some(step) = self.steps.remove(&tick) else {
            return InputSnapshot::empty().with_pointer_world(self.pointer_world);
        };
        if let Some(pointer) = step.pointer_world.or(step.click_world) {
            self.pointer_world = Some(pointer);
        }
        InputSnapshot::empty()
            .with_pointer_world(self.pointer_world)
            .with_map_pointer_down(step.click_world)
            .with_entity_pointer_down(step.click_entity)
            .with_quit_requested(step.quit)
    }
}
