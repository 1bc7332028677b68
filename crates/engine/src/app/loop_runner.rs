use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::metrics::MetricsAccumulator;
use super::scene::SceneRuntime;
use super::{InputSnapshot, Scene, SceneCommand};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many simulation ticks; `None` runs until the scene quits.
    pub max_ticks: Option<u64>,
    /// Pace frames against the wall clock. When false every frame advances
    /// exactly one fixed step, which keeps headless runs deterministic.
    pub realtime: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: None,
            realtime: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid loop config: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExitReason {
    SceneQuit,
    InputQuit,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks_run: u64,
    pub exit_reason: LoopExitReason,
}

/// Supplies the input snapshot for each simulation tick.
pub trait InputSource {
    fn snapshot_for_tick(&mut self, tick: u64) -> InputSnapshot;
}

impl<F> InputSource for F
where
    F: FnMut(u64) -> InputSnapshot,
{
    fn snapshot_for_tick(&mut self, tick: u64) -> InputSnapshot {
        self(tick)
    }
}

pub fn run_headless(
    config: LoopConfig,
    scene: Box<dyn Scene>,
    input: &mut dyn InputSource,
) -> Result<LoopSummary, AppError> {
    validate_config(&config)?;

    let fixed_dt = Duration::from_secs_f64(1.0 / config.target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let max_frame_delta = normalize_non_zero_duration(config.max_frame_delta, fixed_dt);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));

    let mut runtime = SceneRuntime::new(scene);
    runtime.load();
    runtime.apply_pending();
    info!(entity_count = runtime.world().entity_count(), "scene_loaded");
    info!(
        target_tps = config.target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame = config.max_ticks_per_frame,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut ticks_run = 0u64;
    let mut last_title: Option<String> = None;

    let exit_reason = 'frames: loop {
        let frame_dt = if config.realtime {
            thread::sleep(fixed_dt);
            let now = Instant::now();
            let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
            last_frame_instant = now;
            clamp_frame_delta(raw_frame_dt, max_frame_delta)
        } else {
            fixed_dt
        };
        accumulator = accumulator.saturating_add(frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, config.max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            if config.max_ticks.is_some_and(|limit| ticks_run >= limit) {
                break 'frames LoopExitReason::TickLimit;
            }

            let input_snapshot = input.snapshot_for_tick(ticks_run);
            if input_snapshot.quit_requested() {
                info!(tick = ticks_run, reason = "input", "shutdown_requested");
                break 'frames LoopExitReason::InputQuit;
            }

            let tick_start = Instant::now();
            let command = runtime.update(fixed_dt_seconds, &input_snapshot);
            runtime.apply_pending();
            metrics_accumulator.record_tick(tick_start.elapsed());
            ticks_run = ticks_run.saturating_add(1);

            if command == SceneCommand::Quit {
                info!(tick = ticks_run, reason = "scene", "shutdown_requested");
                break 'frames LoopExitReason::SceneQuit;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = config.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }

        let next_title = runtime.debug_title();
        if next_title != last_title {
            if let Some(title) = &next_title {
                debug!(title = %title, "scene_title");
            }
            last_title = next_title;
        }

        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(Instant::now()) {
            info!(
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                total_ticks = snapshot.total_ticks,
                entity_count = runtime.world().entity_count(),
                "loop_metrics"
            );
        }
    };

    runtime.shutdown();
    info!(ticks_run, exit_reason = ?exit_reason, "shutdown");
    Ok(LoopSummary {
        ticks_run,
        exit_reason,
    })
}

fn validate_config(config: &LoopConfig) -> Result<(), AppError> {
    if config.target_tps == 0 {
        return Err(AppError::InvalidConfig {
            field: "target_tps",
            reason: "must be greater than zero",
        });
    }
    if config.max_ticks_per_frame == 0 {
        return Err(AppError::InvalidConfig {
            field: "max_ticks_per_frame",
            reason: "must be greater than zero",
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::app::SceneWorld;

    struct TickCountingScene {
        ticks: Rc<Cell<u64>>,
        quit_after: Option<u64>,
    }

    impl Scene for TickCountingScene {
        fn load(&mut self, _world: &mut SceneWorld) {}

        fn update(
            &mut self,
            _fixed_dt_seconds: f32,
            _input: &InputSnapshot,
            _world: &mut SceneWorld,
        ) -> SceneCommand {
            self.ticks.set(self.ticks.get() + 1);
            match self.quit_after {
                Some(limit) if self.ticks.get() >= limit => SceneCommand::Quit,
                _ => SceneCommand::None,
            }
        }

        fn unload(&mut self, _world: &mut SceneWorld) {}
    }

    fn counting_scene(quit_after: Option<u64>) -> (Box<dyn Scene>, Rc<Cell<u64>>) {
        let ticks = Rc::new(Cell::new(0));
        (
            Box::new(TickCountingScene {
                ticks: Rc::clone(&ticks),
                quit_after,
            }),
            ticks,
        )
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn headless_run_stops_at_tick_limit() {
        let (scene, ticks) = counting_scene(None);
        let config = LoopConfig {
            max_ticks: Some(12),
            ..LoopConfig::default()
        };
        let mut input = |_tick: u64| InputSnapshot::empty();

        let summary = run_headless(config, scene, &mut input).expect("run");

        assert_eq!(summary.ticks_run, 12);
        assert_eq!(summary.exit_reason, LoopExitReason::TickLimit);
        assert_eq!(ticks.get(), 12);
    }

    #[test]
    fn headless_run_stops_when_scene_quits() {
        let (scene, ticks) = counting_scene(Some(3));
        let mut input = |_tick: u64| InputSnapshot::empty();

        let summary = run_headless(LoopConfig::default(), scene, &mut input).expect("run");

        assert_eq!(summary.exit_reason, LoopExitReason::SceneQuit);
        assert_eq!(summary.ticks_run, 3);
        assert_eq!(ticks.get(), 3);
    }

    #[test]
    fn quit_input_stops_before_update() {
        let (scene, ticks) = counting_scene(None);
        let mut input = |tick: u64| InputSnapshot::empty().with_quit_requested(tick == 2);

        let summary = run_headless(LoopConfig::default(), scene, &mut input).expect("run");

        assert_eq!(summary.exit_reason, LoopExitReason::InputQuit);
        assert_eq!(summary.ticks_run, 2);
        assert_eq!(ticks.get(), 2);
    }

    #[test]
    fn zero_tps_is_rejected() {
        let (scene, _ticks) = counting_scene(None);
        let config = LoopConfig {
            target_tps: 0,
            ..LoopConfig::default()
        };
        let mut input = |_tick: u64| InputSnapshot::empty();

        let error = run_headless(config, scene, &mut input).expect_err("invalid config");
        assert!(matches!(
            error,
            AppError::InvalidConfig {
                field: "target_tps",
                ..
            }
        ));
    }
}
