//! In-memory collaborators for the simulation harness and tests.
use std::collections::{HashMap, HashSet};

use agesync_events::{AvatarId, ObjectKey, RegionId};
use tracing::debug;

use super::{AvatarServices, ChronicleStore, ResponderGateway, ResponderRequest};
use crate::error::ServiceError;

#[derive(Debug, Default, Clone)]
pub struct MemoryChronicle {
    entries: HashMap<String, String>,
}

impl ChronicleStore for MemoryChronicle {
    fn read_entry(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }

    fn write_entry(&mut self, name: &str, value: String) {
        self.entries.insert(name.to_string(), value);
    }
}

/// Records responder runs so the harness can complete them later
#[derive(Debug, Default)]
pub struct RecordingResponders {
    /// When set, runs of responders outside this set fail
    known: Option<HashSet<String>>,
    next_ticket: u64,
    pending: Vec<(u64, ResponderRequest)>,
    history: Vec<ResponderRequest>,
}

impl RecordingResponders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the named responders resolve
    pub fn with_known<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Runs that have not been completed yet, oldest first
    pub fn take_pending(&mut self) -> Vec<(u64, ResponderRequest)> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Every request ever run
    pub fn history(&self) -> &[ResponderRequest] {
        &self.history
    }
}

impl ResponderGateway for RecordingResponders {
    fn run(&mut self, request: ResponderRequest) -> Result<u64, ServiceError> {
        if let Some(known) = &self.known {
            if !known.contains(request.responder.as_str()) {
                return Err(ServiceError::unresolvable(&request.responder, "run responder"));
            }
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        debug!(target: "services", "Responder {} running as ticket {}", request.responder, ticket);
        self.history.push(request.clone());
        self.pending.push((ticket, request));
        Ok(ticket)
    }
}

/// One call made against the avatar services
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarCall {
    EnterSubworld(AvatarId, ObjectKey),
    ExitSubworld(AvatarId),
    Warp(AvatarId, ObjectKey),
    PushCamera(AvatarId, ObjectKey),
    PopCamera(AvatarId, ObjectKey),
    RegionEnabled(RegionId, bool),
    ClearExclusion(RegionId),
}

/// Records avatar service calls; objects listed as missing fail to resolve
#[derive(Debug, Default)]
pub struct RecordingAvatar {
    missing: HashSet<ObjectKey>,
    calls: Vec<AvatarCall>,
}

impl RecordingAvatar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make lookups of `object` fail as if the scene reference were gone
    pub fn with_missing(mut self, object: impl Into<ObjectKey>) -> Self {
        self.missing.insert(object.into());
        self
    }

    pub fn calls(&self) -> &[AvatarCall] {
        &self.calls
    }

    pub fn count(&self, pred: impl Fn(&AvatarCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn resolve(&self, object: &ObjectKey, operation: &'static str) -> Result<(), ServiceError> {
        if self.missing.contains(object) {
            Err(ServiceError::unresolvable(object, operation))
        } else {
            Ok(())
        }
    }
}

impl AvatarServices for RecordingAvatar {
    fn enter_subworld(&mut self, avatar: AvatarId, subworld: &ObjectKey) -> Result<(), ServiceError> {
        self.resolve(subworld, "enter_subworld")?;
        self.calls.push(AvatarCall::EnterSubworld(avatar, subworld.clone()));
        Ok(())
    }

    fn exit_subworld(&mut self, avatar: AvatarId) -> Result<(), ServiceError> {
        self.calls.push(AvatarCall::ExitSubworld(avatar));
        Ok(())
    }

    fn warp(&mut self, avatar: AvatarId, target: &ObjectKey) -> Result<(), ServiceError> {
        self.resolve(target, "warp")?;
        self.calls.push(AvatarCall::Warp(avatar, target.clone()));
        Ok(())
    }

    fn push_camera(&mut self, avatar: AvatarId, camera: &ObjectKey) -> Result<(), ServiceError> {
        self.resolve(camera, "push_camera")?;
        self.calls.push(AvatarCall::PushCamera(avatar, camera.clone()));
        Ok(())
    }

    fn pop_camera(&mut self, avatar: AvatarId, camera: &ObjectKey) -> Result<(), ServiceError> {
        self.calls.push(AvatarCall::PopCamera(avatar, camera.clone()));
        Ok(())
    }

    fn set_region_enabled(&mut self, region: &RegionId, enabled: bool) -> Result<(), ServiceError> {
        self.calls.push(AvatarCall::RegionEnabled(region.clone(), enabled));
        Ok(())
    }

    fn clear_exclusion(&mut self, region: &RegionId) -> Result<(), ServiceError> {
        self.calls.push(AvatarCall::ClearExclusion(region.clone()));
        Ok(())
    }
}
