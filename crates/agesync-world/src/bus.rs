use std::collections::{HashMap, HashSet, VecDeque};

use agesync_events::{
    EventOrigin, InstanceId, ObjectKey, RegionId, ResponderId, TimerId, Topic, WorldEvent,
};
use tracing::debug;

/// Filter a script instance registers with to receive broadcast events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Subscribe to all broadcast events
    All,
    /// Every event of a topic
    Topic(Topic),
    /// Enter/exit signals of one region sensor
    Region(RegionId),
    /// Clicks on one activator
    Activator(ObjectKey),
    /// Stage changes of one multistage behavior
    MultiStage(ObjectKey),
}

impl EventFilter {
    /// Check if this filter matches the given event
    pub fn matches(&self, event: &WorldEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Topic(topic) => event.topic() == *topic,
            EventFilter::Region(wanted) => matches!(
                event,
                WorldEvent::RegionEnter { region, .. } | WorldEvent::RegionExit { region, .. }
                    if region == wanted
            ),
            EventFilter::Activator(wanted) => {
                matches!(event, WorldEvent::Picked { activator, .. } if activator == wanted)
            }
            EventFilter::MultiStage(wanted) => {
                matches!(event, WorldEvent::MultiStageStep { behavior, .. } if behavior == wanted)
            }
        }
    }
}

/// Key that identifies one logical occurrence of a raw engine signal.
///
/// `scope` is the originating region; keys are forgotten when that region
/// starts a new open/close cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub scope: String,
    pub occurrence: String,
}

impl DedupeKey {
    pub fn new(scope: impl Into<String>, occurrence: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            occurrence: occurrence.into(),
        }
    }

    /// Natural key for region signals: one enter and one exit per avatar
    /// per cycle. Other events have no natural duplicate key.
    pub fn for_event(event: &WorldEvent) -> Option<Self> {
        match event {
            WorldEvent::RegionEnter { region, avatar } => {
                Some(Self::new(region.as_str(), format!("enter:{}", avatar.0)))
            }
            WorldEvent::RegionExit { region, avatar } => {
                Some(Self::new(region.as_str(), format!("exit:{}", avatar.0)))
            }
            _ => None,
        }
    }

    /// The key that closes this one's cycle for the same avatar
    fn counterpart(&self) -> Option<Self> {
        if let Some(rest) = self.occurrence.strip_prefix("enter:") {
            Some(Self::new(self.scope.clone(), format!("exit:{}", rest)))
        } else {
            self.occurrence
                .strip_prefix("exit:")
                .map(|rest| Self::new(self.scope.clone(), format!("enter:{}", rest)))
        }
    }
}

/// One event queued for one script instance
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: InstanceId,
    pub event: WorldEvent,
    pub origin: EventOrigin,
    pub sequence: u64,
}

/// Per-client event queue feeding script instances.
///
/// A single FIFO queue gives per-subscriber, per-topic ordering for free.
#[derive(Debug, Default)]
pub struct NotificationBus {
    subscriptions: Vec<(InstanceId, EventFilter)>,
    queue: VecDeque<Delivery>,
    seen: HashMap<String, HashSet<DedupeKey>>,
    /// Responder runs awaiting completion: ticket -> requesting instance
    awaiting: HashMap<u64, (InstanceId, ResponderId)>,
    next_sequence: u64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest; idempotent per (instance, filter)
    pub fn subscribe(&mut self, instance: &InstanceId, filter: EventFilter) {
        let exists = self
            .subscriptions
            .iter()
            .any(|(i, f)| i == instance && *f == filter);
        if !exists {
            self.subscriptions.push((instance.clone(), filter));
        }
    }

    pub fn unsubscribe_all(&mut self, instance: &InstanceId) {
        self.subscriptions.retain(|(i, _)| i != instance);
        self.queue.retain(|d| &d.target != instance);
        self.awaiting.retain(|_, (i, _)| i != instance);
    }

    /// Deliver to every instance whose filters match. Returns the number of
    /// deliveries queued.
    pub fn publish(&mut self, event: WorldEvent, origin: EventOrigin) -> usize {
        let mut targets: Vec<InstanceId> = Vec::new();
        for (instance, filter) in &self.subscriptions {
            if filter.matches(&event) && !targets.contains(instance) {
                targets.push(instance.clone());
            }
        }

        let count = targets.len();
        for target in targets {
            self.enqueue(target, event.clone(), origin);
        }
        count
    }

    /// Like `publish`, but duplicate raw signals for an occurrence already
    /// delivered in the current cycle are collapsed.
    ///
    /// Returns false when the event was a duplicate.
    pub fn publish_once(&mut self, event: WorldEvent, key: DedupeKey, origin: EventOrigin) -> bool {
        let seen = self.seen.entry(key.scope.clone()).or_default();
        if seen.contains(&key) {
            debug!(
                target: "bus",
                "Collapsed duplicate signal {}/{}",
                key.scope,
                key.occurrence
            );
            return false;
        }

        // An enter closes the previous exit for the same avatar and vice versa
        if let Some(counterpart) = key.counterpart() {
            seen.remove(&counterpart);
        }
        seen.insert(key);

        self.publish(event, origin);
        true
    }

    /// Start a new open/close cycle for `scope`, forgetting its dedupe keys
    pub fn begin_cycle(&mut self, scope: &str) {
        if self.seen.remove(scope).is_some() {
            debug!(target: "bus", "New signal cycle for {}", scope);
        }
    }

    /// Deliver directly to one instance, bypassing filters
    pub fn publish_to(&mut self, target: &InstanceId, event: WorldEvent) {
        self.enqueue(target.clone(), event, EventOrigin::Local);
    }

    /// Remember which instance is waiting on a responder run
    pub fn expect_completion(&mut self, ticket: u64, instance: &InstanceId, responder: &ResponderId) {
        self.awaiting
            .insert(ticket, (instance.clone(), responder.clone()));
    }

    /// Route a responder completion to the instance that started it.
    ///
    /// Completions for unknown or already-completed tickets are dropped.
    pub fn complete_responder(&mut self, ticket: u64) -> bool {
        match self.awaiting.remove(&ticket) {
            Some((instance, responder)) => {
                self.publish_to(&instance, WorldEvent::ResponderCompleted { responder, ticket });
                true
            }
            None => {
                debug!(target: "bus", "Ignoring completion for unknown ticket {}", ticket);
                false
            }
        }
    }

    pub fn is_awaiting(&self, ticket: u64) -> bool {
        self.awaiting.contains_key(&ticket)
    }

    /// Drop queued firings of a cancelled timer. Returns how many were dropped.
    pub fn cancel_timer(&mut self, timer: TimerId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|d| {
            !matches!(&d.event, WorldEvent::TimerFired { timer: t, .. } if *t == timer)
        });
        before - self.queue.len()
    }

    pub fn pop(&mut self) -> Option<Delivery> {
        self.queue.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn enqueue(&mut self, target: InstanceId, event: WorldEvent, origin: EventOrigin) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push_back(Delivery {
            target,
            event,
            origin,
            sequence,
        });
    }
}
