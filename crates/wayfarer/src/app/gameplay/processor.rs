use std::collections::BTreeMap;

use engine::{EntityId, SceneWorld};
use tracing::{debug, warn};

use super::action_queue::{ActionContext, ActionQueue, EnqueuePolicy, Mover};
use super::actions::{Action, ActionDescriptor, ActionError};
use super::events::{EventBus, GameEvent, Inbox, SubscriptionId, Topic};
use super::nav::PathFinder;

pub(crate) const DEFAULT_ARRIVAL_EPSILON: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
enum BusRequest {
    Act {
        entity_id: EntityId,
        descriptor: ActionDescriptor,
        policy: EnqueuePolicy,
    },
    Cancel {
        entity_id: EntityId,
    },
}

/// Routes validated commands to per-entity [`ActionQueue`]s and steps them
/// each tick.
///
/// Requests reach it either directly through [`ActionProcessor::process_now`]
/// or over the bus (`action.request`, `action.cancel`) once
/// [`ActionProcessor::listen`] has bound its listeners. Bus requests are only
/// queued by the listener; they touch queue state at the next
/// [`ActionProcessor::drain_requests`], so callers that emit and then inspect
/// a queue must drain in between.
pub(crate) struct ActionProcessor {
    queues: BTreeMap<EntityId, ActionQueue>,
    requests: Inbox<BusRequest>,
    listeners: Vec<SubscriptionId>,
    arrival_epsilon: f32,
}

impl ActionProcessor {
    pub(crate) fn new(arrival_epsilon: f32) -> Self {
        Self {
            queues: BTreeMap::new(),
            requests: Inbox::default(),
            listeners: Vec::new(),
            arrival_epsilon,
        }
    }

    pub(crate) fn listen(&mut self, bus: &mut EventBus) {
        if !self.listeners.is_empty() {
            return;
        }
        for topic in [Topic::ACTION_REQUEST, Topic::ACTION_CANCEL] {
            let requests = self.requests.clone();
            let id = bus.on(topic, move |event: &GameEvent| match event {
                GameEvent::ActionRequested {
                    entity_id,
                    descriptor,
                    policy,
                } => requests.push(BusRequest::Act {
                    entity_id: *entity_id,
                    descriptor: descriptor.clone(),
                    policy: *policy,
                }),
                GameEvent::CancelRequested { entity_id } => requests.push(BusRequest::Cancel {
                    entity_id: *entity_id,
                }),
                _ => {}
            });
            self.listeners.push(id);
        }
    }

    pub(crate) fn unlisten(&mut self, bus: &mut EventBus) {
        for id in self.listeners.drain(..) {
            bus.off(id);
        }
    }

    pub(crate) fn register(&mut self, entity_id: EntityId) {
        self.queues
            .entry(entity_id)
            .or_insert_with(|| ActionQueue::new(entity_id));
    }

    /// Drops the entity's queue, cancelling whatever it was running.
    pub(crate) fn unregister(&mut self, entity_id: EntityId, events: &mut EventBus) -> bool {
        match self.queues.remove(&entity_id) {
            Some(mut queue) => {
                queue.cancel(events);
                true
            }
            None => false,
        }
    }

    pub(crate) fn queue(&self, entity_id: EntityId) -> Option<&ActionQueue> {
        self.queues.get(&entity_id)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.queues.values().filter(|queue| !queue.is_idle()).count()
    }

    /// Validates and enqueues with interrupt-replace.
    ///
    /// Entity checks run before descriptor checks, so a bad descriptor for an
    /// unknown entity reports `UnknownEntity`.
    pub(crate) fn process_now(
        &mut self,
        entity_id: EntityId,
        descriptor: &ActionDescriptor,
        world: &mut SceneWorld,
        path_finder: &dyn PathFinder,
        events: &mut EventBus,
    ) -> Result<(), ActionError> {
        self.process_now_with(
            entity_id,
            descriptor,
            EnqueuePolicy::InterruptReplace,
            world,
            path_finder,
            events,
        )
    }

    pub(crate) fn process_now_with(
        &mut self,
        entity_id: EntityId,
        descriptor: &ActionDescriptor,
        policy: EnqueuePolicy,
        world: &mut SceneWorld,
        path_finder: &dyn PathFinder,
        events: &mut EventBus,
    ) -> Result<(), ActionError> {
        let Some(queue) = self.queues.get_mut(&entity_id) else {
            return Err(ActionError::UnknownEntity(entity_id));
        };
        let Some(entity) = world.find_entity(entity_id) else {
            return Err(ActionError::UnknownEntity(entity_id));
        };
        let action = Action::try_from(descriptor)?;
        debug!(
            entity = %entity_id,
            action = action.kind().as_token(),
            policy = ?policy,
            "action_accepted"
        );

        let mut mover = Mover {
            position: entity.transform.position,
            move_speed: entity.move_speed,
        };
        let mut ctx = ActionContext {
            path_finder,
            tilemap: world.tilemap(),
            arrival_epsilon: self.arrival_epsilon,
            events,
        };
        queue.submit(action, policy, &mut mover, &mut ctx);
        write_back_position(world, entity_id, mover);
        Ok(())
    }

    /// Handles every bus request received since the last drain, in arrival
    /// order. Failures are logged and republished as `action.rejected`.
    pub(crate) fn drain_requests(
        &mut self,
        world: &mut SceneWorld,
        path_finder: &dyn PathFinder,
        events: &mut EventBus,
    ) -> usize {
        let mut handled = 0usize;
        while let Some(request) = self.requests.pop() {
            handled += 1;
            match request {
                BusRequest::Act {
                    entity_id,
                    descriptor,
                    policy,
                } => {
                    let result = self.process_now_with(
                        entity_id,
                        &descriptor,
                        policy,
                        world,
                        path_finder,
                        events,
                    );
                    if let Err(error) = result {
                        warn!(
                            entity = %entity_id,
                            kind = %descriptor.kind,
                            error = %error,
                            "action_request_rejected"
                        );
                        events.emit(GameEvent::ActionRejected { entity_id, error });
                    }
                }
                BusRequest::Cancel { entity_id } => {
                    if let Err(error) = self.cancel(entity_id, events) {
                        warn!(entity = %entity_id, error = %error, "cancel_request_rejected");
                        events.emit(GameEvent::ActionRejected { entity_id, error });
                    }
                }
            }
        }
        handled
    }

    #[cfg(test)]
    pub(crate) fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Cancels whatever the entity is running. `Ok(false)` when it was idle.
    pub(crate) fn cancel(
        &mut self,
        entity_id: EntityId,
        events: &mut EventBus,
    ) -> Result<bool, ActionError> {
        let queue = self
            .queues
            .get_mut(&entity_id)
            .ok_or(ActionError::UnknownEntity(entity_id))?;
        Ok(queue.cancel(events))
    }

    /// Steps every queue by `dt_seconds`. Queues whose entity has left the
    /// world are cancelled and left idle.
    pub(crate) fn advance_all(
        &mut self,
        dt_seconds: f32,
        world: &mut SceneWorld,
        path_finder: &dyn PathFinder,
        events: &mut EventBus,
    ) {
        for (entity_id, queue) in &mut self.queues {
            if queue.is_idle() {
                continue;
            }
            let Some(entity) = world.find_entity(*entity_id) else {
                warn!(entity = %entity_id, "action_owner_missing");
                queue.cancel(events);
                continue;
            };
            let mut mover = Mover {
                position: entity.transform.position,
                move_speed: entity.move_speed,
            };
            let mut ctx = ActionContext {
                path_finder,
                tilemap: world.tilemap(),
                arrival_epsilon: self.arrival_epsilon,
                events: &mut *events,
            };
            queue.advance(dt_seconds, &mut mover, &mut ctx);
            write_back_position(world, *entity_id, mover);
        }
    }
}

fn write_back_position(world: &mut SceneWorld, entity_id: EntityId, mover: Mover) {
    if let Some(entity) = world.find_entity_mut(entity_id) {
        entity.transform.position = mover.position;
    }
}
