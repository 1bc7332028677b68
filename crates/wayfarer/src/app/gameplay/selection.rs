use engine::{EntityId, SceneWorld};
use tracing::{info, warn};

use super::actions::ActionError;
use super::events::{EventBus, GameEvent, Inbox, SubscriptionId, Topic};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum SelectionState {
    #[default]
    NoSelection,
    Selected(EntityId),
}

/// Tracks the single selected entity and notifies holders as it moves.
///
/// Selection is independent of movement: nothing here touches action queues.
#[derive(Default)]
pub(crate) struct SelectionManager {
    state: SelectionState,
    requests: Inbox<Option<EntityId>>,
    listener: Option<SubscriptionId>,
}

impl SelectionManager {
    pub(crate) fn state(&self) -> SelectionState {
        self.state
    }

    pub(crate) fn selected(&self) -> Option<EntityId> {
        match self.state {
            SelectionState::NoSelection => None,
            SelectionState::Selected(id) => Some(id),
        }
    }

    pub(crate) fn listen(&mut self, bus: &mut EventBus) {
        if self.listener.is_some() {
            return;
        }
        let requests = self.requests.clone();
        let id = bus.on(Topic::UNIT_SELECT, move |event: &GameEvent| {
            if let GameEvent::SelectRequested { entity_id } = event {
                requests.push(*entity_id);
            }
        });
        self.listener = Some(id);
    }

    pub(crate) fn unlisten(&mut self, bus: &mut EventBus) {
        if let Some(id) = self.listener.take() {
            bus.off(id);
        }
    }

    /// Returns whether the selection changed. The previous holder is always
    /// notified before the new one.
    pub(crate) fn select(
        &mut self,
        entity_id: EntityId,
        world: &mut SceneWorld,
        events: &mut EventBus,
    ) -> Result<bool, ActionError> {
        if self.state == SelectionState::Selected(entity_id) {
            return Ok(false);
        }
        let entity = world
            .find_entity(entity_id)
            .ok_or(ActionError::UnknownEntity(entity_id))?;
        if !entity.selectable {
            return Err(ActionError::NotSelectable(entity_id));
        }

        self.release_current(world, events);
        if let Some(entity) = world.find_entity_mut(entity_id) {
            entity.selected = true;
        }
        world.set_selected_actor_visual(Some(entity_id));
        self.state = SelectionState::Selected(entity_id);
        info!(entity = %entity_id, "entity_selected");
        events.emit(GameEvent::SelectionChanged {
            entity_id,
            selected: true,
        });
        Ok(true)
    }

    pub(crate) fn deselect(&mut self, world: &mut SceneWorld, events: &mut EventBus) -> bool {
        let released = self.release_current(world, events);
        if released {
            world.set_selected_actor_visual(None);
        }
        released
    }

    /// Applies every `unit.select` received since the last drain.
    pub(crate) fn drain_requests(&mut self, world: &mut SceneWorld, events: &mut EventBus) {
        while let Some(request) = self.requests.pop() {
            let Some(entity_id) = request else {
                self.deselect(world, events);
                continue;
            };
            if let Err(error) = self.select(entity_id, world, events) {
                warn!(entity = %entity_id, error = %error, "select_request_rejected");
                events.emit(GameEvent::ActionRejected { entity_id, error });
            }
        }
    }

    fn release_current(&mut self, world: &mut SceneWorld, events: &mut EventBus) -> bool {
        let SelectionState::Selected(previous) = std::mem::take(&mut self.state) else {
            return false;
        };
        if let Some(entity) = world.find_entity_mut(previous) {
            entity.selected = false;
        }
        info!(entity = %previous, "entity_deselected");
        events.emit(GameEvent::SelectionChanged {
            entity_id: previous,
            selected: false,
        });
        true
    }
}
