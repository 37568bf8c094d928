use std::collections::HashMap;

use agesync_events::{ClientId, InstanceId, ObjectKey, SdlValue, WorldEvent};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::bus::NotificationBus;
use crate::error::SdlError;
use crate::ownership::OwnershipArbiter;
use crate::services::ChronicleStore;

bitflags! {
    /// Visibility of a shared variable
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VariableFlags: u8 {
        /// Kept on this client only
        const INTERNAL = 0b01;
        /// Sent to every client in the world instance
        const REPLICATED = 0b10;
    }
}

impl Default for VariableFlags {
    fn default() -> Self {
        VariableFlags::REPLICATED
    }
}

/// Shape and governance of a shared variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub name: String,
    pub default: SdlValue,
    pub flags: VariableFlags,
    /// Object whose ownership token gates writes to this variable
    pub governing: ObjectKey,
    /// Chronicle entry used to seed the default across restarts
    pub chronicle_key: Option<String>,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, default: SdlValue, governing: ObjectKey) -> Self {
        Self {
            name: name.into(),
            default,
            flags: VariableFlags::default(),
            governing,
            chronicle_key: None,
        }
    }

    pub fn with_flags(mut self, flags: VariableFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_chronicle(mut self, key: impl Into<String>) -> Self {
        self.chronicle_key = Some(key.into());
        self
    }
}

/// A committed write as it travels between clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableUpdate {
    pub name: String,
    pub value: SdlValue,
    pub tag: String,
    pub writer: ClientId,
    /// Per-variable commit counter; receivers drop anything not newer
    pub sequence: u64,
}

#[derive(Debug)]
struct Variable {
    descriptor: VariableDescriptor,
    value: SdlValue,
    tag: String,
    writer: Option<ClientId>,
    sequence: u64,
    subscribers: Vec<InstanceId>,
}

impl Variable {
    fn notify(&self, bus: &mut NotificationBus, writer: ClientId) {
        for subscriber in &self.subscribers {
            bus.publish_to(
                subscriber,
                WorldEvent::VariableChanged {
                    name: self.descriptor.name.clone(),
                    value: self.value.clone(),
                    tag: self.tag.clone(),
                    writer,
                },
            );
        }
    }
}

/// One client's replica of the world instance's shared variables
#[derive(Debug)]
pub struct SdlStore {
    client_id: ClientId,
    variables: HashMap<String, Variable>,
    outbox: Vec<VariableUpdate>,
}

impl SdlStore {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            variables: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    /// Create a variable with its default value. Declaring an existing name
    /// is a no-op; a shape disagreement keeps the first declaration.
    ///
    /// With a chronicle, a parseable entry under `chronicle_key` replaces the
    /// default. Absent or malformed entries fall back to the default.
    pub fn declare(&mut self, descriptor: VariableDescriptor, chronicle: Option<&dyn ChronicleStore>) {
        if let Some(existing) = self.variables.get(&descriptor.name) {
            if existing.descriptor.default.arity() != descriptor.default.arity() {
                warn!(
                    target: "sdl",
                    "Variable '{}' redeclared with arity {} (was {}), keeping original",
                    descriptor.name,
                    descriptor.default.arity(),
                    existing.descriptor.default.arity()
                );
            }
            return;
        }

        let mut value = descriptor.default.clone();
        if let (Some(key), Some(chronicle)) = (&descriptor.chronicle_key, chronicle) {
            match chronicle.read_entry(key).map(|raw| parse_chronicle_value(&raw)) {
                Some(Some(seeded)) if shape_matches(&descriptor.default, &seeded) => {
                    debug!(target: "sdl", "Seeded '{}' from chronicle '{}': {}", descriptor.name, key, seeded);
                    value = seeded;
                }
                Some(_) => {
                    warn!(target: "sdl", "Chronicle entry '{}' does not fit '{}', using default", key, descriptor.name);
                }
                None => {
                    trace!(target: "sdl", "No chronicle entry '{}'", key);
                }
            }
        }

        debug!(target: "sdl", "Declared '{}' = {} (governed by {})", descriptor.name, value, descriptor.governing);
        self.variables.insert(
            descriptor.name.clone(),
            Variable {
                descriptor,
                value,
                tag: String::new(),
                writer: None,
                sequence: 0,
                subscribers: Vec::new(),
            },
        );
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Last locally known value. Never blocks.
    pub fn read(&self, name: &str) -> Option<&SdlValue> {
        self.variables.get(name).map(|v| &v.value)
    }

    /// Tag attached to the most recent write
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(|v| v.tag.as_str())
    }

    pub fn sequence(&self, name: &str) -> Option<u64> {
        self.variables.get(name).map(|v| v.sequence)
    }

    pub fn descriptor(&self, name: &str) -> Option<&VariableDescriptor> {
        self.variables.get(name).map(|v| &v.descriptor)
    }

    /// Register for change delivery. Returns true if newly subscribed.
    pub fn subscribe(&mut self, name: &str, instance: &InstanceId) -> Result<bool, SdlError> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| SdlError::UnknownVariable {
                name: name.to_string(),
            })?;

        if variable.subscribers.contains(instance) {
            return Ok(false);
        }
        variable.subscribers.push(instance.clone());
        Ok(true)
    }

    pub fn unsubscribe_all(&mut self, instance: &InstanceId) {
        for variable in self.variables.values_mut() {
            variable.subscribers.retain(|s| s != instance);
        }
    }

    /// Commit a write if this client owns the governing object.
    ///
    /// On success every subscriber is notified once and replicated
    /// variables are queued for the other clients. Returns the commit
    /// sequence.
    pub fn write(
        &mut self,
        name: &str,
        value: SdlValue,
        tag: &str,
        arbiter: &OwnershipArbiter,
        bus: &mut NotificationBus,
    ) -> Result<u64, SdlError> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| SdlError::UnknownVariable {
                name: name.to_string(),
            })?;

        check_shape(name, &variable.descriptor.default, &value)?;

        if !arbiter.is_owner(&variable.descriptor.governing) {
            let err = SdlError::NotOwner {
                name: name.to_string(),
                object: variable.descriptor.governing.clone(),
                client: self.client_id,
            };
            warn!(target: "sdl", "{}", err);
            return Err(err);
        }

        variable.sequence += 1;
        variable.value = value;
        variable.tag = tag.to_string();
        variable.writer = Some(self.client_id);
        debug!(
            target: "sdl",
            "{} committed '{}' = {} [{}] seq {}",
            self.client_id,
            name,
            variable.value,
            tag,
            variable.sequence
        );

        variable.notify(bus, self.client_id);

        if variable.descriptor.flags.contains(VariableFlags::REPLICATED) {
            self.outbox.push(VariableUpdate {
                name: name.to_string(),
                value: variable.value.clone(),
                tag: variable.tag.clone(),
                writer: self.client_id,
                sequence: variable.sequence,
            });
        }

        Ok(variable.sequence)
    }

    /// Apply a write committed by another client.
    ///
    /// Returns false for duplicates, stale sequences and updates that do
    /// not fit the local declaration.
    pub fn apply_remote(&mut self, update: &VariableUpdate, bus: &mut NotificationBus) -> bool {
        let Some(variable) = self.variables.get_mut(&update.name) else {
            warn!(target: "sdl", "Update for undeclared variable '{}' ignored", update.name);
            return false;
        };

        if update.sequence <= variable.sequence {
            trace!(
                target: "sdl",
                "Dropping '{}' seq {} (have {})",
                update.name,
                update.sequence,
                variable.sequence
            );
            return false;
        }

        if let Err(err) = check_shape(&update.name, &variable.descriptor.default, &update.value) {
            warn!(target: "sdl", "Replicated update rejected: {}", err);
            return false;
        }

        variable.sequence = update.sequence;
        variable.value = update.value.clone();
        variable.tag = update.tag.clone();
        variable.writer = Some(update.writer);
        variable.notify(bus, update.writer);
        true
    }

    /// Every replicated variable that has been written at least once
    pub fn snapshot(&self) -> Vec<VariableUpdate> {
        let mut updates: Vec<VariableUpdate> = self
            .variables
            .values()
            .filter(|v| v.sequence > 0 && v.descriptor.flags.contains(VariableFlags::REPLICATED))
            .map(|v| VariableUpdate {
                name: v.descriptor.name.clone(),
                value: v.value.clone(),
                tag: v.tag.clone(),
                writer: v.writer.unwrap_or(self.client_id),
                sequence: v.sequence,
            })
            .collect();
        updates.sort_by(|a, b| a.name.cmp(&b.name));
        updates
    }

    pub fn take_outbox(&mut self) -> Vec<VariableUpdate> {
        std::mem::take(&mut self.outbox)
    }

    /// Persist the current value under the variable's chronicle key.
    /// Returns false if the variable has no chronicle key.
    pub fn export(&self, name: &str, chronicle: &mut dyn ChronicleStore) -> Result<bool, SdlError> {
        let variable = self
            .variables
            .get(name)
            .ok_or_else(|| SdlError::UnknownVariable {
                name: name.to_string(),
            })?;

        let Some(key) = &variable.descriptor.chronicle_key else {
            return Ok(false);
        };
        chronicle.write_entry(key, format_chronicle_value(&variable.value));
        Ok(true)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

fn check_shape(name: &str, declared: &SdlValue, value: &SdlValue) -> Result<(), SdlError> {
    if declared.arity() != value.arity() {
        return Err(SdlError::ArityMismatch {
            name: name.to_string(),
            expected: declared.arity(),
            actual: value.arity(),
        });
    }

    for (index, (expected, actual)) in declared.kinds().zip(value.kinds()).enumerate() {
        if expected != actual {
            return Err(SdlError::KindMismatch {
                name: name.to_string(),
                index,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

fn shape_matches(declared: &SdlValue, value: &SdlValue) -> bool {
    check_shape("", declared, value).is_ok()
}

/// Chronicle entries are plain strings: comma separated scalars
fn parse_chronicle_value(raw: &str) -> Option<SdlValue> {
    use agesync_events::SdlScalar;

    raw.split(',')
        .map(str::trim)
        .map(|part| match part {
            "true" => Some(SdlScalar::Bool(true)),
            "false" => Some(SdlScalar::Bool(false)),
            _ => part
                .parse::<i64>()
                .map(SdlScalar::Int)
                .ok()
                .or_else(|| part.parse::<f64>().ok().map(SdlScalar::Float)),
        })
        .collect::<Option<Vec<_>>>()
        .map(SdlValue)
}

fn format_chronicle_value(value: &SdlValue) -> String {
    value
        .0
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryChronicle;
    use agesync_events::SdlScalar;

    fn setup() -> (SdlStore, OwnershipArbiter, NotificationBus) {
        let client = ClientId(1);
        let mut store = SdlStore::new(client);
        store.declare(
            VariableDescriptor::new("solved", SdlValue::bool(false), "lock".into()),
            None,
        );
        (store, OwnershipArbiter::new(client), NotificationBus::new())
    }

    #[test]
    fn test_write_requires_ownership() {
        let (mut store, mut arbiter, mut bus) = setup();

        let err = store
            .write("solved", SdlValue::bool(true), "", &arbiter, &mut bus)
            .unwrap_err();
        assert!(err.is_not_owner());
        assert_eq!(store.read("solved"), Some(&SdlValue::bool(false)));
        assert!(store.take_outbox().is_empty());

        assert!(arbiter.acquire_if_vacant(&"lock".into()));
        let seq = store
            .write("solved", SdlValue::bool(true), "solved", &arbiter, &mut bus)
            .unwrap();
        assert_eq!(seq, 1);
        assert_eq!(store.read("solved"), Some(&SdlValue::bool(true)));
        assert_eq!(store.tag("solved"), Some("solved"));
        assert_eq!(store.take_outbox().len(), 1);
    }

    #[test]
    fn test_shape_checked_before_ownership() {
        let (mut store, mut arbiter, mut bus) = setup();
        arbiter.acquire_if_vacant(&"lock".into());

        let err = store
            .write("solved", SdlValue::ints([1, 2]), "", &arbiter, &mut bus)
            .unwrap_err();
        assert!(matches!(err, SdlError::ArityMismatch { expected: 1, actual: 2, .. }));

        let err = store
            .write("solved", SdlValue::int(1), "", &arbiter, &mut bus)
            .unwrap_err();
        assert!(matches!(err, SdlError::KindMismatch { index: 0, .. }));

        let err = store
            .write("missing", SdlValue::int(1), "", &arbiter, &mut bus)
            .unwrap_err();
        assert!(matches!(err, SdlError::UnknownVariable { .. }));
    }

    #[test]
    fn test_subscribers_notified_once_per_write() {
        let (mut store, mut arbiter, mut bus) = setup();
        arbiter.acquire_if_vacant(&"lock".into());
        let door = InstanceId::new("door");

        assert!(store.subscribe("solved", &door).unwrap());
        assert!(!store.subscribe("solved", &door).unwrap());

        store
            .write("solved", SdlValue::bool(true), "solved", &arbiter, &mut bus)
            .unwrap();
        assert_eq!(bus.pending(), 1);
        let delivery = bus.pop().unwrap();
        assert_eq!(delivery.target, door);
        assert_eq!(
            delivery.event,
            WorldEvent::VariableChanged {
                name: "solved".into(),
                value: SdlValue::bool(true),
                tag: "solved".into(),
                writer: ClientId(1),
            }
        );
    }

    #[test]
    fn test_apply_remote_drops_stale_and_duplicates() {
        let (mut store, _, mut bus) = setup();
        let door = InstanceId::new("door");
        store.subscribe("solved", &door).unwrap();

        let update = VariableUpdate {
            name: "solved".into(),
            value: SdlValue::bool(true),
            tag: "solved".into(),
            writer: ClientId(2),
            sequence: 2,
        };
        assert!(store.apply_remote(&update, &mut bus));
        assert!(!store.apply_remote(&update, &mut bus));

        let stale = VariableUpdate {
            sequence: 1,
            value: SdlValue::bool(false),
            ..update.clone()
        };
        assert!(!store.apply_remote(&stale, &mut bus));
        assert_eq!(store.read("solved"), Some(&SdlValue::bool(true)));
        assert_eq!(bus.pending(), 1);
        // Remote writes are never re-sent
        assert!(store.take_outbox().is_empty());
    }

    #[test]
    fn test_internal_variables_stay_local() {
        let client = ClientId(1);
        let mut store = SdlStore::new(client);
        let mut arbiter = OwnershipArbiter::new(client);
        let mut bus = NotificationBus::new();
        store.declare(
            VariableDescriptor::new("cursor", SdlValue::int(0), "lock".into())
                .with_flags(VariableFlags::INTERNAL),
            None,
        );
        arbiter.acquire_if_vacant(&"lock".into());
        store
            .write("cursor", SdlValue::int(3), "", &arbiter, &mut bus)
            .unwrap();
        assert!(store.take_outbox().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_chronicle_seed_and_export() {
        let mut chronicle = MemoryChronicle::default();
        chronicle.write_entry("GearRideOpen", "true".into());
        chronicle.write_entry("BadShape", "1,2".into());

        let client = ClientId(1);
        let mut store = SdlStore::new(client);
        store.declare(
            VariableDescriptor::new("gateOpen", SdlValue::bool(false), "gate".into())
                .with_chronicle("GearRideOpen"),
            Some(&chronicle),
        );
        store.declare(
            VariableDescriptor::new("other", SdlValue::bool(false), "gate".into())
                .with_chronicle("BadShape"),
            Some(&chronicle),
        );
        assert_eq!(store.read("gateOpen"), Some(&SdlValue::bool(true)));
        assert_eq!(store.read("other"), Some(&SdlValue::bool(false)));

        let mut out = MemoryChronicle::default();
        assert!(store.export("gateOpen", &mut out).unwrap());
        assert_eq!(out.read_entry("GearRideOpen").as_deref(), Some("true"));
    }

    #[test]
    fn test_parse_chronicle_value() {
        assert_eq!(
            parse_chronicle_value("1, 2.5,false"),
            Some(SdlValue(vec![
                SdlScalar::Int(1),
                SdlScalar::Float(2.5),
                SdlScalar::Bool(false)
            ]))
        );
        assert_eq!(parse_chronicle_value("yes"), None);
    }
}
