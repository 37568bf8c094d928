use std::time::{Duration, Instant};

use agesync_events::{ClientId, EventOrigin, InstanceId, ObjectKey, WorldEvent};
use agesync_world::{ClientWorld, DedupeKey, ReplicationMessage};
use tracing::{debug, error, info, warn};

use super::context::{HostServices, ScriptContext};
use super::timer::TimerManager;
use super::Script;

/// Default tick rate for scripts (50ms = 20Hz)
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on deliveries handled in one pass, so scripts that keep
/// re-triggering each other cannot stall the client
const MAX_DELIVERIES_PER_PASS: usize = 10_000;

/// Runs one client's script instances and dispatches events to them
pub struct ScriptRunner {
    /// This client's replica of the world instance
    world: ClientWorld,
    /// All registered script instances
    scripts: Vec<Box<dyn Script>>,
    /// Timer manager shared across all scripts
    timer_manager: TimerManager,
    /// Last time scripts were ticked
    last_tick: Instant,
    /// Interval between ticks (default 50ms for 20Hz)
    tick_interval: Duration,
    /// Panics caught since the last `take_faults`
    faults: Vec<(InstanceId, String)>,
}

impl ScriptRunner {
    /// Create a new script runner with default tick rate (20Hz)
    pub fn new(client_id: ClientId) -> Self {
        Self::new_with_tick_rate(client_id, DEFAULT_TICK_INTERVAL)
    }

    /// Create a new script runner with custom tick rate
    pub fn new_with_tick_rate(client_id: ClientId, tick_interval: Duration) -> Self {
        Self {
            world: ClientWorld::new(client_id),
            scripts: Vec::new(),
            timer_manager: TimerManager::new(),
            last_tick: Instant::now(),
            tick_interval,
            faults: Vec::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.world.client_id
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ClientWorld {
        &mut self.world
    }

    /// Register a script instance, subscribe its filters and load it
    pub fn register_script(&mut self, script: Box<dyn Script>, services: &mut HostServices<'_>) {
        debug!(target: "scripting", "Registering script: {} ({})", script.name(), script.id());

        if self.scripts.iter().any(|s| s.id() == script.id()) {
            warn!(target: "scripting", "Script {} already registered, ignoring", script.id());
            return;
        }

        for descriptor in script.declared_variables() {
            self.world.declare(descriptor, Some(&*services.chronicle));
        }

        for filter in script.subscribed_events() {
            self.world.bus.subscribe(script.id(), filter.clone());
        }

        self.scripts.push(script);
        let index = self.scripts.len() - 1;
        let now = Instant::now();
        self.dispatch(index, EventOrigin::Local, now, services, |script, ctx| {
            script.on_load(ctx)
        });
        self.process_pending(services, now);
    }

    /// Get the number of registered scripts
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Get the IDs of all registered scripts
    pub fn script_ids(&self) -> Vec<&str> {
        self.scripts.iter().map(|s| s.id().as_str()).collect()
    }

    /// Borrow a registered script as its concrete type
    pub fn script<T: Script>(&self, id: &str) -> Option<&T> {
        self.scripts
            .iter()
            .find(|s| s.id().as_str() == id)
            .and_then(|s| s.as_any().downcast_ref::<T>())
    }

    /// Unload all scripts
    pub fn unload_scripts(&mut self, services: &mut HostServices<'_>) {
        let count = self.scripts.len();

        if count == 0 {
            return;
        }

        debug!(target: "scripting", "Unloading {} script(s)", count);

        let now = Instant::now();
        for index in 0..count {
            self.dispatch(index, EventOrigin::Local, now, services, |script, ctx| {
                script.on_unload(ctx)
            });
        }

        for script in &self.scripts {
            self.timer_manager.cancel_owned_by(script.id());
            self.world.bus.unsubscribe_all(script.id());
            self.world.sdl.unsubscribe_all(script.id());
        }
        self.scripts.clear();
    }

    /// Deliver a raw engine signal. Returns false if it was collapsed as a
    /// duplicate of one already delivered this cycle.
    pub fn handle_event(
        &mut self,
        event: WorldEvent,
        origin: EventOrigin,
        services: &mut HostServices<'_>,
        now: Instant,
    ) -> bool {
        let delivered = match DedupeKey::for_event(&event) {
            Some(key) => self.world.bus.publish_once(event, key, origin),
            None => {
                self.world.bus.publish(event, origin);
                true
            }
        };
        self.process_pending(services, now);
        delivered
    }

    /// Report that a responder run finished
    pub fn complete_responder(
        &mut self,
        ticket: u64,
        services: &mut HostServices<'_>,
        now: Instant,
    ) -> bool {
        let routed = self.world.bus.complete_responder(ticket);
        self.process_pending(services, now);
        routed
    }

    /// Apply a message relayed from another client
    pub fn apply_replication(
        &mut self,
        message: &ReplicationMessage,
        services: &mut HostServices<'_>,
        now: Instant,
    ) {
        self.world.apply(message);
        self.process_pending(services, now);
    }

    pub fn observe_join(&mut self, client: ClientId) {
        debug!(target: "ownership", "{} observed join of {}", self.client_id(), client);
        self.world.ownership.observe_join(client);
    }

    /// Forget a disconnected client and offer its objects to the scripts
    /// governed by them. Returns the vacated objects.
    pub fn observe_leave(
        &mut self,
        client: ClientId,
        services: &mut HostServices<'_>,
        now: Instant,
    ) -> Vec<ObjectKey> {
        let vacated = self.world.ownership.observe_leave(client);

        for object in &vacated {
            for index in 0..self.scripts.len() {
                if !self.scripts[index].governing_objects().contains(object) {
                    continue;
                }
                self.dispatch(index, EventOrigin::Local, now, services, |script, ctx| {
                    script.on_ownership_vacated(object, ctx)
                });
            }
            if self.world.is_owner(object) {
                info!(target: "ownership", "{} took over {} after {} left", self.client_id(), object, client);
            }
        }

        self.process_pending(services, now);
        vacated
    }

    /// Script panics caught since the last call
    pub fn take_faults(&mut self) -> Vec<(InstanceId, String)> {
        std::mem::take(&mut self.faults)
    }

    /// Messages to relay to the other clients
    pub fn take_outgoing(&mut self) -> Vec<ReplicationMessage> {
        self.world.take_outgoing()
    }

    /// Fire expired timers and tick scripts if enough time has elapsed
    pub fn tick(&mut self, now: Instant, services: &mut HostServices<'_>) {
        // Tick timers FIRST so their events are queued before on_tick
        let fired = self.timer_manager.tick(now);
        if !fired.is_empty() {
            debug!(target: "scripting", "Timers fired: {:?}", fired);
        }
        for timer in fired {
            self.world.bus.publish_to(
                &timer.owner,
                WorldEvent::TimerFired {
                    timer: timer.id,
                    name: timer.name,
                },
            );
        }
        self.process_pending(services, now);

        self.tick_scripts(now, services);
        self.process_pending(services, now);
    }

    /// Drain the notification queue. Returns how many deliveries ran.
    pub fn process_pending(&mut self, services: &mut HostServices<'_>, now: Instant) -> usize {
        let mut delivered = 0;

        while delivered < MAX_DELIVERIES_PER_PASS {
            let Some(delivery) = self.world.bus.pop() else {
                break;
            };

            let Some(index) = self.scripts.iter().position(|s| s.id() == &delivery.target) else {
                debug!(target: "scripting", "No script {} for {:?}", delivery.target, delivery.event);
                continue;
            };

            self.dispatch(index, delivery.origin, now, services, |script, ctx| {
                script.on_event(&delivery.event, ctx)
            });
            delivered += 1;
        }

        if !self.world.bus.is_empty() {
            warn!(
                target: "scripting",
                "Delivery limit reached, deferring {} event(s)",
                self.world.bus.pending()
            );
        }

        delivered
    }

    /// Tick all scripts if enough time has elapsed
    fn tick_scripts(&mut self, now: Instant, services: &mut HostServices<'_>) {
        let elapsed = now.saturating_duration_since(self.last_tick);

        if elapsed < self.tick_interval {
            return; // Not time to tick yet
        }

        // Update last tick time
        self.last_tick = now;

        for index in 0..self.scripts.len() {
            self.dispatch(index, EventOrigin::Local, now, services, |script, ctx| {
                script.on_tick(ctx, elapsed)
            });
        }
    }

    /// Run one callback on one script, isolating panics
    fn dispatch<F>(
        &mut self,
        index: usize,
        origin: EventOrigin,
        now: Instant,
        services: &mut HostServices<'_>,
        f: F,
    ) where
        F: FnOnce(&mut dyn Script, &mut ScriptContext<'_>),
    {
        let script = &mut self.scripts[index];
        let mut ctx = ScriptContext::new(
            script.id().clone(),
            &mut self.world,
            &mut self.timer_manager,
            services,
            origin,
            now,
        );

        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f(&mut **script, &mut ctx);
        })) {
            Ok(_) => {}
            Err(e) => {
                let message = e
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| e.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(target: "scripting",
                    "Script {} ({}) panicked: {}",
                    script.name(),
                    script.id(),
                    message
                );
                self.faults.push((script.id().clone(), message));
            }
        }
    }
}
