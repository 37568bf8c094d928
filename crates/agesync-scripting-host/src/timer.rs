use std::collections::HashMap;
use std::time::{Duration, Instant};

use agesync_events::{InstanceId, TimerId};

/// Type of timer
#[derive(Debug, Clone)]
enum TimerType {
    /// One-shot timer that fires once and is removed
    OneShot { fire_at: Instant },
    /// Recurring timer that fires repeatedly at an interval
    Recurring {
        interval: Duration,
        next_fire: Instant,
    },
}

/// A timer with metadata
#[derive(Debug, Clone)]
struct Timer {
    owner: InstanceId,
    name: String,
    timer_type: TimerType,
}

/// A timer that expired during `tick`
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub owner: InstanceId,
    pub name: String,
}

/// Per-client timers for script instances. Timers never cross clients: a
/// new owner resumes from shared variables, not from another client's
/// timers.
pub struct TimerManager {
    timers: HashMap<TimerId, Timer>,
    next_id: u64,
}

impl TimerManager {
    /// Create a new timer manager
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Schedule a one-shot timer that fires `delay` after `now`
    pub fn schedule_timer(
        &mut self,
        owner: &InstanceId,
        now: Instant,
        delay: Duration,
        name: String,
    ) -> TimerId {
        self.insert(
            owner,
            name,
            TimerType::OneShot {
                fire_at: now + delay,
            },
        )
    }

    /// Schedule a recurring timer that fires repeatedly at an interval
    pub fn schedule_recurring(
        &mut self,
        owner: &InstanceId,
        now: Instant,
        interval: Duration,
        name: String,
    ) -> TimerId {
        self.insert(
            owner,
            name,
            TimerType::Recurring {
                interval,
                next_fire: now + interval,
            },
        )
    }

    /// Cancel a timer. Cancelling an unknown or expired timer is a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    /// Drop every timer owned by an instance, e.g. on unload
    pub fn cancel_owned_by(&mut self, owner: &InstanceId) -> Vec<TimerId> {
        let ids: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| &t.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.timers.remove(id);
        }
        ids
    }

    /// Process timers and return the ones that fired, in id order
    pub fn tick(&mut self, now: Instant) -> Vec<FiredTimer> {
        let mut fired = Vec::new();
        let mut to_remove = Vec::new();

        for (id, timer) in self.timers.iter_mut() {
            match &mut timer.timer_type {
                TimerType::OneShot { fire_at } => {
                    if now >= *fire_at {
                        fired.push(FiredTimer {
                            id: *id,
                            owner: timer.owner.clone(),
                            name: timer.name.clone(),
                        });
                        to_remove.push(*id);
                    }
                }
                TimerType::Recurring {
                    interval,
                    next_fire,
                } => {
                    if now >= *next_fire {
                        fired.push(FiredTimer {
                            id: *id,
                            owner: timer.owner.clone(),
                            name: timer.name.clone(),
                        });
                        *next_fire = now + *interval;
                    }
                }
            }
        }

        // Remove one-shot timers that have fired
        for id in to_remove {
            self.timers.remove(&id);
        }

        fired.sort_by_key(|f| f.id.0);
        fired
    }

    /// Get the number of active timers
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    fn insert(&mut self, owner: &InstanceId, name: String, timer_type: TimerType) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(
            id,
            Timer {
                owner: owner.clone(),
                name,
                timer_type,
            },
        );
        id
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> InstanceId {
        InstanceId::new("gate")
    }

    #[test]
    fn test_one_shot_timer() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let id = manager.schedule_timer(&owner(), start, Duration::from_millis(50), "settle".into());

        assert!(manager.tick(start).is_empty());

        let fired = manager.tick(start + Duration::from_millis(60));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, id);
        assert_eq!(fired[0].owner, owner());
        assert_eq!(fired[0].name, "settle");

        // Should be removed after firing
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_recurring_timer() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let id = manager.schedule_recurring(&owner(), start, Duration::from_millis(50), "pulse".into());

        assert!(manager.tick(start).is_empty());

        let fired = manager.tick(start + Duration::from_millis(60));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, id);
        assert_eq!(manager.active_count(), 1);

        let fired = manager.tick(start + Duration::from_millis(120));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_cancel_timer() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        let id = manager.schedule_timer(&owner(), start, Duration::from_secs(10), "settle".into());

        assert!(manager.cancel_timer(id));
        assert_eq!(manager.active_count(), 0);
        assert!(!manager.cancel_timer(id)); // Already removed
        assert!(manager.tick(start + Duration::from_secs(11)).is_empty());
    }

    #[test]
    fn test_cancel_owned_by() {
        let mut manager = TimerManager::new();
        let start = Instant::now();
        manager.schedule_timer(&owner(), start, Duration::from_secs(1), "a".into());
        manager.schedule_timer(&InstanceId::new("lock"), start, Duration::from_secs(1), "b".into());

        assert_eq!(manager.cancel_owned_by(&owner()).len(), 1);
        assert_eq!(manager.active_count(), 1);
    }
}
