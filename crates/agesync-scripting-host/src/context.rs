use std::time::{Duration, Instant};

use agesync_events::{
    ClientId, EventOrigin, InstanceId, ObjectKey, ResponderId, SdlValue, TimerId, WorldEvent,
};
use agesync_world::services::{
    AvatarServices, ChronicleStore, ResponderGateway, ResponderParams, ResponderRequest,
};
use agesync_world::{ClientWorld, DedupeKey, EventFilter, SdlError, ServiceError};

use super::timer::TimerManager;

/// Engine-facing services a runner hands to its scripts.
///
/// The session owns the concrete implementations and lends them for the
/// duration of one dispatch.
pub struct HostServices<'s> {
    pub responders: &'s mut dyn ResponderGateway,
    pub avatar: &'s mut dyn AvatarServices,
    pub chronicle: &'s mut dyn ChronicleStore,
}

impl<'s> HostServices<'s> {
    pub fn new(
        responders: &'s mut dyn ResponderGateway,
        avatar: &'s mut dyn AvatarServices,
        chronicle: &'s mut dyn ChronicleStore,
    ) -> Self {
        Self {
            responders,
            avatar,
            chronicle,
        }
    }
}

/// Context provided to a script instance for one callback
pub struct ScriptContext<'a> {
    instance: InstanceId,
    world: &'a mut ClientWorld,
    timers: &'a mut TimerManager,
    responders: &'a mut dyn ResponderGateway,
    avatar: &'a mut dyn AvatarServices,
    chronicle: &'a mut dyn ChronicleStore,
    /// Where the event being handled was raised
    origin: EventOrigin,
    /// Timestamp when the current event occurred
    event_time: Instant,
}

impl<'a> ScriptContext<'a> {
    pub(crate) fn new(
        instance: InstanceId,
        world: &'a mut ClientWorld,
        timers: &'a mut TimerManager,
        services: &'a mut HostServices<'_>,
        origin: EventOrigin,
        event_time: Instant,
    ) -> Self {
        Self {
            instance,
            world,
            timers,
            responders: &mut *services.responders,
            avatar: &mut *services.avatar,
            chronicle: &mut *services.chronicle,
            origin,
            event_time,
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    pub fn client_id(&self) -> ClientId {
        self.world.client_id
    }

    pub fn origin(&self) -> EventOrigin {
        self.origin
    }

    /// True when the signal being handled was raised on this client
    pub fn is_local_origin(&self) -> bool {
        self.origin == EventOrigin::Local
    }

    /// Get the timestamp when the current event occurred
    pub fn event_time(&self) -> Instant {
        self.event_time
    }

    // ===== Shared variables =====

    pub fn read(&self, name: &str) -> Option<&SdlValue> {
        self.world.read(name)
    }

    pub fn read_bool(&self, name: &str) -> Option<bool> {
        self.world.read(name).and_then(SdlValue::first_bool)
    }

    pub fn read_int(&self, name: &str) -> Option<i64> {
        self.world.read(name).and_then(SdlValue::first_int)
    }

    pub fn write(&mut self, name: &str, value: SdlValue, tag: &str) -> Result<u64, SdlError> {
        self.world.write(name, value, tag)
    }

    /// Receive a `VariableChanged` for every committed change of `name`
    pub fn subscribe_variable(&mut self, name: &str) -> Result<bool, SdlError> {
        self.world.subscribe(name, &self.instance)
    }

    /// Persist a variable's current value to the chronicle
    pub fn export(&mut self, name: &str) -> Result<bool, SdlError> {
        self.world.sdl.export(name, &mut *self.chronicle)
    }

    // ===== Ownership =====

    pub fn is_owner(&self, object: &ObjectKey) -> bool {
        self.world.is_owner(object)
    }

    pub fn acquire_if_vacant(&mut self, object: &ObjectKey) -> bool {
        self.world.acquire_if_vacant(object)
    }

    pub fn release(&mut self, object: &ObjectKey) {
        self.world.ownership.release(object)
    }

    // ===== Notifications =====

    pub fn subscribe(&mut self, filter: EventFilter) {
        self.world.bus.subscribe(&self.instance, filter);
    }

    /// Forget delivered region signals so the next enter/exit is fresh
    pub fn begin_signal_cycle(&mut self, scope: &str) {
        self.world.bus.begin_cycle(scope);
    }

    /// Broadcast an event to every matching subscriber on this client
    pub fn publish(&mut self, event: WorldEvent) -> usize {
        self.world.bus.publish(event, EventOrigin::Local)
    }

    pub fn publish_once(&mut self, event: WorldEvent, key: DedupeKey) -> bool {
        self.world.bus.publish_once(event, key, EventOrigin::Local)
    }

    // ===== Engine services =====

    /// Run a responder. Its completion is routed back to this instance as
    /// `ResponderCompleted` carrying the returned ticket.
    pub fn run_responder(
        &mut self,
        responder: &ResponderId,
        params: ResponderParams,
        net_propagate: bool,
    ) -> Result<u64, ServiceError> {
        let ticket = self.responders.run(ResponderRequest {
            responder: responder.clone(),
            params,
            net_propagate,
        })?;
        self.world
            .bus
            .expect_completion(ticket, &self.instance, responder);
        Ok(ticket)
    }

    pub fn avatar(&mut self) -> &mut dyn AvatarServices {
        &mut *self.avatar
    }

    // ===== Timer Methods =====

    /// Schedule a one-shot timer that fires after a delay
    pub fn schedule_timer(&mut self, delay: Duration, name: impl Into<String>) -> TimerId {
        self.timers
            .schedule_timer(&self.instance, self.event_time, delay, name.into())
    }

    /// Schedule a recurring timer that fires repeatedly at an interval
    pub fn schedule_recurring(&mut self, interval: Duration, name: impl Into<String>) -> TimerId {
        self.timers
            .schedule_recurring(&self.instance, self.event_time, interval, name.into())
    }

    /// Cancel a timer, including a firing that is already queued
    pub fn cancel_timer(&mut self, timer_id: TimerId) -> bool {
        let active = self.timers.cancel_timer(timer_id);
        let queued = self.world.bus.cancel_timer(timer_id);
        active || queued > 0
    }
}
