use std::collections::VecDeque;

use engine::{EntityId, Tilemap, Vec2};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::actions::Action;
use super::events::{CancelReason, EventBus, FailureReason, GameEvent};
use super::nav::{NavigationPath, NoPathError, PathFinder};
use super::util::step_toward;

/// Collaborators a queue needs while starting or advancing an action.
pub(crate) struct ActionContext<'a> {
    pub(crate) path_finder: &'a dyn PathFinder,
    pub(crate) tilemap: Option<&'a Tilemap>,
    pub(crate) arrival_epsilon: f32,
    pub(crate) events: &'a mut EventBus,
}

/// Position and speed of the entity that owns the queue, copied in for one
/// operation and written back by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Mover {
    pub(crate) position: Vec2,
    pub(crate) move_speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ActionProgress {
    GoTo(NavigationPath),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveAction {
    action: Action,
    progress: ActionProgress,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum QueueState {
    #[default]
    Idle,
    Executing(ActiveAction),
}

/// How a request joins a busy queue. Spelled `"interrupt-replace"` or
/// `"append"` in requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum EnqueuePolicy {
    /// Drop whatever is running or pending and start the new action now.
    #[default]
    InterruptReplace,
    /// Run after the active action and anything already pending.
    Append,
}

/// Per-entity command queue: at most one executing action plus pending
/// follow-ups in insertion order.
///
/// Pending actions are only ever held while something is executing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActionQueue {
    entity_id: EntityId,
    state: QueueState,
    pending: VecDeque<Action>,
}

impl ActionQueue {
    pub(crate) fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            state: QueueState::Idle,
            pending: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &QueueState {
        &self.state
    }

    pub(crate) fn is_idle(&self) -> bool {
        matches!(self.state, QueueState::Idle)
    }

    pub(crate) fn active_action(&self) -> Option<Action> {
        match &self.state {
            QueueState::Idle => None,
            QueueState::Executing(active) => Some(active.action),
        }
    }

    pub(crate) fn pending_actions(&self) -> impl Iterator<Item = &Action> {
        self.pending.iter()
    }

    pub(crate) fn remaining_waypoints(&self) -> &[Vec2] {
        match &self.state {
            QueueState::Executing(ActiveAction {
                progress: ActionProgress::GoTo(path),
                ..
            }) => path.remaining(),
            QueueState::Idle => &[],
        }
    }

    #[cfg(test)]
    pub(crate) fn next_waypoint(&self) -> Option<Vec2> {
        self.remaining_waypoints().first().copied()
    }

    pub(crate) fn submit(
        &mut self,
        action: Action,
        policy: EnqueuePolicy,
        mover: &mut Mover,
        ctx: &mut ActionContext<'_>,
    ) {
        match policy {
            EnqueuePolicy::InterruptReplace => self.enqueue(action, mover, ctx),
            EnqueuePolicy::Append => self.append(action, mover, ctx),
        }
    }

    /// Interrupt-replace: the running action (and anything pending) is
    /// discarded and `action` starts immediately.
    pub(crate) fn enqueue(
        &mut self,
        action: Action,
        mover: &mut Mover,
        ctx: &mut ActionContext<'_>,
    ) {
        let dropped_pending = self.pending.len();
        self.pending.clear();
        if let QueueState::Executing(previous) = std::mem::take(&mut self.state) {
            debug!(
                entity = %self.entity_id,
                action = previous.action.kind().as_token(),
                reason = CancelReason::Interrupted.as_token(),
                dropped_pending,
                "action_cancelled"
            );
            ctx.events.emit(GameEvent::ActionCancelled {
                entity_id: self.entity_id,
                action: previous.action,
                reason: CancelReason::Interrupted,
            });
        }
        self.start(action, mover, ctx);
    }

    /// FIFO: starts immediately when idle, otherwise waits behind the
    /// running and already pending actions.
    pub(crate) fn append(
        &mut self,
        action: Action,
        mover: &mut Mover,
        ctx: &mut ActionContext<'_>,
    ) {
        if self.is_idle() {
            self.start(action, mover, ctx);
        } else {
            self.pending.push_back(action);
        }
    }

    /// Forces the queue back to `Idle`. Returns whether an action was running.
    pub(crate) fn cancel(&mut self, events: &mut EventBus) -> bool {
        self.pending.clear();
        let QueueState::Executing(previous) = std::mem::take(&mut self.state) else {
            return false;
        };
        info!(
            entity = %self.entity_id,
            action = previous.action.kind().as_token(),
            reason = CancelReason::Requested.as_token(),
            "action_cancelled"
        );
        events.emit(GameEvent::ActionCancelled {
            entity_id: self.entity_id,
            action: previous.action,
            reason: CancelReason::Requested,
        });
        true
    }

    /// Moves the owner along the active path by `move_speed * dt_seconds`.
    ///
    /// Budget left over after reaching a waypoint carries on toward the next
    /// one. No-op while idle.
    pub(crate) fn advance(
        &mut self,
        dt_seconds: f32,
        mover: &mut Mover,
        ctx: &mut ActionContext<'_>,
    ) {
        let entity_id = self.entity_id;
        let QueueState::Executing(active) = &mut self.state else {
            return;
        };

        let mut budget = mover.move_speed.max(0.0) * dt_seconds.max(0.0);
        match &mut active.progress {
            ActionProgress::GoTo(path) => {
                while let Some(waypoint) = path.current_waypoint() {
                    let step = step_toward(mover.position, waypoint, budget, ctx.arrival_epsilon);
                    mover.position = step.position;
                    budget = (budget - step.distance_used).max(0.0);
                    if !step.arrived {
                        break;
                    }
                    let waypoint_index = path.next_waypoint_index();
                    path.advance_waypoint();
                    ctx.events.emit(GameEvent::WaypointReached {
                        entity_id,
                        waypoint_index,
                        position: waypoint,
                    });
                }
                if !path.is_complete() {
                    return;
                }
            }
        }

        self.finish_active(mover, ctx);
    }

    fn finish_active(&mut self, mover: &mut Mover, ctx: &mut ActionContext<'_>) {
        let QueueState::Executing(finished) = std::mem::take(&mut self.state) else {
            return;
        };
        info!(
            entity = %self.entity_id,
            action = finished.action.kind().as_token(),
            x = mover.position.x,
            y = mover.position.y,
            "action_completed"
        );
        ctx.events.emit(GameEvent::ActionCompleted {
            entity_id: self.entity_id,
            action: finished.action,
        });
        self.start_next_pending(mover, ctx);
    }

    fn start_next_pending(&mut self, mover: &mut Mover, ctx: &mut ActionContext<'_>) {
        while self.is_idle() {
            let Some(next) = self.pending.pop_front() else {
                return;
            };
            self.start(next, mover, ctx);
        }
    }

    fn start(&mut self, action: Action, mover: &mut Mover, ctx: &mut ActionContext<'_>) {
        debug_assert!(self.is_idle());
        match action {
            Action::GoTo { target } => {
                let waypoints = ctx
                    .tilemap
                    .ok_or(NoPathError::MeshUnavailable)
                    .and_then(|tilemap| {
                        tilemap
                            .tile_center_world(target.x, target.y)
                            .ok_or(NoPathError::OutsideMesh {
                                x: target.x as f32,
                                y: target.y as f32,
                            })
                    })
                    .and_then(|goal| ctx.path_finder.find_path(mover.position, goal));

                let waypoints = match waypoints {
                    Ok(waypoints) => waypoints,
                    Err(error) => {
                        warn!(
                            entity = %self.entity_id,
                            tile = %target,
                            reason = FailureReason::NoPath.as_token(),
                            error = %error,
                            "action_failed"
                        );
                        ctx.events.emit(GameEvent::ActionFailed {
                            entity_id: self.entity_id,
                            action,
                            reason: FailureReason::NoPath,
                        });
                        return;
                    }
                };

                info!(
                    entity = %self.entity_id,
                    tile = %target,
                    waypoints = waypoints.len(),
                    "action_started"
                );
                self.state = QueueState::Executing(ActiveAction {
                    action,
                    progress: ActionProgress::GoTo(NavigationPath::new(waypoints)),
                });
                ctx.events.emit(GameEvent::ActionStarted {
                    entity_id: self.entity_id,
                    action,
                });
                if self.remaining_waypoints().is_empty() {
                    self.finish_active(mover, ctx);
                }
            }
        }
    }
}
