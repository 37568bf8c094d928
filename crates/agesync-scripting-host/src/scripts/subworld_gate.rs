use std::any::Any;
use std::collections::HashMap;
use std::time::Duration;

use agesync_events::{AvatarId, InstanceId, ObjectKey, SdlValue, TimerId, WorldEvent};
use agesync_world::config::GateConfig;
use agesync_world::{EventFilter, ServiceError, VariableDescriptor};
use tracing::{debug, error, info, warn};

use crate::context::ScriptContext;
use crate::Script;

/// Where an avatar is relative to the gate's subworld
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvatarLocation {
    #[default]
    Outside,
    Entering,
    Inside,
    Exiting,
}

/// Moves local avatars into and out of a subworld when they cross the
/// gate's region sensors.
///
/// One transition is allowed per gate-open signal: the first crossing
/// disarms the gate, and it re-arms only when the gate variable is set
/// open again after that transition has settled.
pub struct SubworldGate {
    id: InstanceId,
    config: GateConfig,
    filters: Vec<EventFilter>,
    governing: Vec<ObjectKey>,
    gate_open: bool,
    can_transition: bool,
    /// A gate-open arrived mid-transition; honour it once settled
    rearm_on_settle: bool,
    locations: HashMap<AvatarId, AvatarLocation>,
    settling: HashMap<TimerId, AvatarId>,
}

impl SubworldGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            id: InstanceId::new(config.id.clone()),
            filters: vec![
                EventFilter::Region(config.enter_region.clone()),
                EventFilter::Region(config.exit_region.clone()),
            ],
            governing: vec![config.object.clone()],
            config,
            gate_open: false,
            can_transition: false,
            rearm_on_settle: false,
            locations: HashMap::new(),
            settling: HashMap::new(),
        }
    }

    pub fn can_transition(&self) -> bool {
        self.can_transition
    }

    pub fn is_open(&self) -> bool {
        self.gate_open
    }

    pub fn location(&self, avatar: AvatarId) -> AvatarLocation {
        self.locations.get(&avatar).copied().unwrap_or_default()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn set_gate(&mut self, open: bool, ctx: &mut ScriptContext<'_>) {
        self.gate_open = open;
        ctx.begin_signal_cycle(self.config.enter_region.as_str());
        ctx.begin_signal_cycle(self.config.exit_region.as_str());

        for region in [&self.config.enter_region, &self.config.exit_region] {
            if let Err(e) = ctx.avatar().set_region_enabled(region, open) {
                warn!(target: "subworld", "{}: cannot toggle sensor {}: {}", self.id, region, e);
            }
        }

        if open {
            if self.settling.is_empty() {
                self.can_transition = true;
            } else {
                debug!(target: "subworld", "{}: opened mid-transition, re-arming after settle", self.id);
                self.rearm_on_settle = true;
            }
            debug!(target: "subworld", "{}: gate open", self.id);
        } else {
            self.can_transition = false;
            self.rearm_on_settle = false;
            for region in &self.config.exclusion_regions {
                if let Err(e) = ctx.avatar().clear_exclusion(region) {
                    warn!(target: "subworld", "{}: cannot clear exclusion {}: {}", self.id, region, e);
                }
            }
            debug!(target: "subworld", "{}: gate closed", self.id);
        }
    }

    /// Local avatar crossed the entry sensor
    fn on_region_enter(&mut self, avatar: AvatarId, ctx: &mut ScriptContext<'_>) {
        if !self.can_transition {
            debug!(target: "subworld", "{}: entry by {} discarded, gate not armed", self.id, avatar);
            return;
        }
        if self.location(avatar) != AvatarLocation::Outside {
            debug!(target: "subworld", "{}: {} is not outside, ignoring entry", self.id, avatar);
            return;
        }

        self.can_transition = false;
        if let Err(e) = ctx.avatar().enter_subworld(avatar, &self.config.subworld) {
            self.abort(avatar, AvatarLocation::Outside, "enter", e);
            return;
        }
        if let Some(camera) = self.config.camera.clone() {
            if let Err(e) = ctx.avatar().push_camera(avatar, &camera) {
                if let Err(undo) = ctx.avatar().exit_subworld(avatar) {
                    error!(target: "subworld", "{}: cannot detach {} after failed entry: {}", self.id, avatar, undo);
                }
                self.abort(avatar, AvatarLocation::Outside, "enter", e);
                return;
            }
        }

        self.locations.insert(avatar, AvatarLocation::Entering);
        self.settle(avatar, ctx);
    }

    /// Local avatar crossed the exit sensor
    fn on_region_exit(&mut self, avatar: AvatarId, ctx: &mut ScriptContext<'_>) {
        if !self.can_transition {
            debug!(target: "subworld", "{}: exit by {} discarded, gate not armed", self.id, avatar);
            return;
        }
        if self.location(avatar) != AvatarLocation::Inside {
            debug!(target: "subworld", "{}: {} is not inside, ignoring exit", self.id, avatar);
            return;
        }

        self.can_transition = false;
        if let Err(e) = ctx.avatar().exit_subworld(avatar) {
            self.abort(avatar, AvatarLocation::Inside, "exit", e);
            return;
        }
        if let Some(point) = self.config.exit_point.clone() {
            if let Err(e) = ctx.avatar().warp(avatar, &point) {
                if let Err(undo) = ctx.avatar().enter_subworld(avatar, &self.config.subworld) {
                    error!(target: "subworld", "{}: cannot re-attach {} after failed exit: {}", self.id, avatar, undo);
                }
                self.abort(avatar, AvatarLocation::Inside, "exit", e);
                return;
            }
        }
        if let Some(camera) = &self.config.camera {
            if let Err(e) = ctx.avatar().pop_camera(avatar, camera) {
                warn!(target: "subworld", "{}: {}", self.id, e);
            }
        }

        self.locations.insert(avatar, AvatarLocation::Exiting);
        self.settle(avatar, ctx);
    }

    /// Roll back a transition that could not start
    fn abort(&mut self, avatar: AvatarId, prior: AvatarLocation, direction: &str, e: ServiceError) {
        let fault = e.fault().map_or_else(|| "Rejected".to_string(), |f| f.to_string());
        error!(
            target: "subworld",
            "{}: {} of {} aborted ({}): {}",
            self.id,
            direction,
            avatar,
            fault,
            e
        );
        self.locations.insert(avatar, prior);
        self.can_transition = self.gate_open;
    }

    fn settle(&mut self, avatar: AvatarId, ctx: &mut ScriptContext<'_>) {
        if self.config.settle_ms == 0 {
            self.finish(avatar);
            return;
        }
        let timer = ctx.schedule_timer(
            Duration::from_millis(self.config.settle_ms),
            format!("{}.settle", self.id),
        );
        self.settling.insert(timer, avatar);
    }

    fn finish(&mut self, avatar: AvatarId) {
        let next = match self.location(avatar) {
            AvatarLocation::Entering => AvatarLocation::Inside,
            AvatarLocation::Exiting => AvatarLocation::Outside,
            other => other,
        };
        self.locations.insert(avatar, next);
        info!(target: "subworld", "{}: {} now {:?}", self.id, avatar, next);

        if self.rearm_on_settle && self.settling.is_empty() && self.gate_open {
            self.rearm_on_settle = false;
            self.can_transition = true;
        }
    }
}

impl Script for SubworldGate {
    fn id(&self) -> &InstanceId {
        &self.id
    }

    fn name(&self) -> &'static str {
        "subworld_gate"
    }

    fn description(&self) -> &'static str {
        "Attaches avatars to a subworld while the gate is open"
    }

    fn declared_variables(&self) -> Vec<VariableDescriptor> {
        vec![VariableDescriptor::new(
            self.config.gate_variable.clone(),
            SdlValue::bool(false),
            self.config.object.clone(),
        )]
    }

    fn on_load(&mut self, ctx: &mut ScriptContext<'_>) {
        if let Err(e) = ctx.subscribe_variable(&self.config.gate_variable) {
            warn!(target: "subworld", "{}: {}", self.id, e);
        }
        ctx.acquire_if_vacant(&self.config.object);

        let open = ctx.read_bool(&self.config.gate_variable).unwrap_or(false);
        self.set_gate(open, ctx);
        info!(target: "subworld", "{}: loaded, gate {}", self.id, if open { "open" } else { "closed" });
    }

    fn on_unload(&mut self, ctx: &mut ScriptContext<'_>) {
        for timer in self.settling.keys() {
            ctx.cancel_timer(*timer);
        }
        self.settling.clear();
        ctx.release(&self.config.object);
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &self.filters
    }

    fn governing_objects(&self) -> &[ObjectKey] {
        &self.governing
    }

    fn on_event(&mut self, event: &WorldEvent, ctx: &mut ScriptContext<'_>) {
        match event {
            WorldEvent::VariableChanged { name, value, .. } if *name == self.config.gate_variable => {
                match value.first_bool() {
                    Some(open) => self.set_gate(open, ctx),
                    None => warn!(target: "subworld", "{}: gate variable is not a bool: {}", self.id, value),
                }
            }
            WorldEvent::RegionEnter { region, avatar } => {
                if !ctx.is_local_origin() {
                    debug!(target: "subworld", "{}: ignoring remote crossing of {} by {}", self.id, region, avatar);
                    return;
                }
                if *region == self.config.enter_region {
                    self.on_region_enter(*avatar, ctx);
                } else if *region == self.config.exit_region {
                    self.on_region_exit(*avatar, ctx);
                }
            }
            WorldEvent::TimerFired { timer, .. } => {
                if let Some(avatar) = self.settling.remove(timer) {
                    self.finish(avatar);
                }
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
