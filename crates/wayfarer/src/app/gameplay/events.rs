use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use engine::{EntityId, Vec2};

use super::action_queue::EnqueuePolicy;
use super::actions::{Action, ActionDescriptor, ActionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Topic(&'static str);

impl Topic {
    pub(crate) const ACTION_REQUEST: Topic = Topic("action.request");
    pub(crate) const ACTION_CANCEL: Topic = Topic("action.cancel");
    pub(crate) const ACTION_STARTED: Topic = Topic("action.started");
    pub(crate) const ACTION_WAYPOINT: Topic = Topic("action.waypoint");
    pub(crate) const ACTION_COMPLETED: Topic = Topic("action.completed");
    pub(crate) const ACTION_CANCELLED: Topic = Topic("action.cancelled");
    pub(crate) const ACTION_FAILED: Topic = Topic("action.failed");
    pub(crate) const ACTION_REJECTED: Topic = Topic("action.rejected");
    pub(crate) const UNIT_SELECT: Topic = Topic("unit.select");
    pub(crate) const SELECTION_CHANGED: Topic = Topic("selection.changed");

    pub(crate) const ALL: [Topic; 10] = [
        Topic::ACTION_REQUEST,
        Topic::ACTION_CANCEL,
        Topic::ACTION_STARTED,
        Topic::ACTION_WAYPOINT,
        Topic::ACTION_COMPLETED,
        Topic::ACTION_CANCELLED,
        Topic::ACTION_FAILED,
        Topic::ACTION_REJECTED,
        Topic::UNIT_SELECT,
        Topic::SELECTION_CHANGED,
    ];

    pub(crate) fn parse(raw: &str) -> Option<Topic> {
        Self::ALL.into_iter().find(|topic| topic.0 == raw)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelReason {
    /// A newer command replaced the action.
    Interrupted,
    /// `cancel` was called explicitly.
    Requested,
}

impl CancelReason {
    pub(crate) fn as_token(self) -> &'static str {
        match self {
            Self::Interrupted => "interrupted",
            Self::Requested => "requested",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureReason {
    NoPath,
}

impl FailureReason {
    pub(crate) fn as_token(self) -> &'static str {
        match self {
            Self::NoPath => "no-path",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GameEvent {
    ActionRequested {
        entity_id: EntityId,
        descriptor: ActionDescriptor,
        policy: EnqueuePolicy,
    },
    CancelRequested {
        entity_id: EntityId,
    },
    ActionStarted {
        entity_id: EntityId,
        action: Action,
    },
    WaypointReached {
        entity_id: EntityId,
        waypoint_index: usize,
        position: Vec2,
    },
    ActionCompleted {
        entity_id: EntityId,
        action: Action,
    },
    ActionCancelled {
        entity_id: EntityId,
        action: Action,
        reason: CancelReason,
    },
    ActionFailed {
        entity_id: EntityId,
        action: Action,
        reason: FailureReason,
    },
    ActionRejected {
        entity_id: EntityId,
        error: ActionError,
    },
    /// `None` asks for a deselect.
    SelectRequested {
        entity_id: Option<EntityId>,
    },
    SelectionChanged {
        entity_id: EntityId,
        selected: bool,
    },
}

impl GameEvent {
    pub(crate) fn topic(&self) -> Topic {
        match self {
            Self::ActionRequested { .. } => Topic::ACTION_REQUEST,
            Self::CancelRequested { .. } => Topic::ACTION_CANCEL,
            Self::ActionStarted { .. } => Topic::ACTION_STARTED,
            Self::WaypointReached { .. } => Topic::ACTION_WAYPOINT,
            Self::ActionCompleted { .. } => Topic::ACTION_COMPLETED,
            Self::ActionCancelled { .. } => Topic::ACTION_CANCELLED,
            Self::ActionFailed { .. } => Topic::ACTION_FAILED,
            Self::ActionRejected { .. } => Topic::ACTION_REJECTED,
            Self::SelectRequested { .. } => Topic::UNIT_SELECT,
            Self::SelectionChanged { .. } => Topic::SELECTION_CHANGED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SubscriptionId(u64);

pub(crate) type EventHandler = Box<dyn FnMut(&GameEvent)>;

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    handler: EventHandler,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EventCounts {
    total: u32,
    by_topic: BTreeMap<Topic, u32>,
}

impl EventCounts {
    fn record(&mut self, topic: Topic) {
        self.total = self.total.saturating_add(1);
        let count = self.by_topic.entry(topic).or_insert(0);
        *count = count.saturating_add(1);
    }

    pub(crate) fn total(&self) -> u32 {
        self.total
    }

    pub(crate) fn count(&self, topic: Topic) -> u32 {
        self.by_topic.get(&topic).copied().unwrap_or(0)
    }
}

/// Synchronous topic-keyed publish/subscribe channel.
///
/// `emit` runs every handler subscribed to the event's topic, in
/// subscription order, before returning. Handlers receive only the event, so
/// they cannot subscribe, unsubscribe or re-emit while a dispatch is running.
/// Subscriptions live until [`EventBus::off`] is called.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Subscriber>,
    next_subscription_id: u64,
    current_tick_counts: EventCounts,
    last_tick_counts: EventCounts,
}

impl EventBus {
    pub(crate) fn on(
        &mut self,
        topic: Topic,
        handler: impl FnMut(&GameEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id);
        self.next_subscription_id = self.next_subscription_id.saturating_add(1);
        self.subscribers.push(Subscriber {
            id,
            topic,
            handler: Box::new(handler),
        });
        id
    }

    pub(crate) fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    /// Delivers `event` and returns how many handlers saw it.
    pub(crate) fn emit(&mut self, event: GameEvent) -> usize {
        let topic = event.topic();
        self.current_tick_counts.record(topic);
        let mut delivered = 0usize;
        for subscriber in self
            .subscribers
            .iter_mut()
            .filter(|subscriber| subscriber.topic == topic)
        {
            (subscriber.handler)(&event);
            delivered += 1;
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .iter()
            .filter(|subscriber| subscriber.topic == topic)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn current_tick_counts(&self) -> &EventCounts {
        &self.current_tick_counts
    }

    pub(crate) fn finish_tick_rollover(&mut self) {
        self.last_tick_counts = std::mem::take(&mut self.current_tick_counts);
    }

    pub(crate) fn last_tick_counts(&self) -> &EventCounts {
        &self.last_tick_counts
    }
}

/// Shared FIFO that a bus handler fills and its owner drains after `emit`.
pub(crate) struct Inbox<T> {
    items: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Default for Inbox<T> {
    fn default() -> Self {
        Self {
            items: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl<T> Clone for Inbox<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<T> Inbox<T> {
    pub(crate) fn push(&self, item: T) {
        self.items.borrow_mut().push_back(item);
    }

    pub(crate) fn pop(&self) -> Option<T> {
        self.items.borrow_mut().pop_front()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.borrow().len()
    }
}

#[cfg(test)]
pub(crate) fn record_topics(bus: &mut EventBus, topics: &[Topic]) -> Rc<RefCell<Vec<GameEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for topic in topics {
        let sink = Rc::clone(&log);
        bus.on(*topic, move |event: &GameEvent| {
            sink.borrow_mut().push(event.clone())
        });
    }
    log
}
