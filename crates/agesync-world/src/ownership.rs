use std::collections::HashMap;

use agesync_events::{ClientId, ObjectKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Ownership changes this client has made and must announce to the others
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipNotice {
    Claimed { object: ObjectKey, client: ClientId },
    Released { object: ObjectKey, client: ClientId },
}

/// Client-local cache of who holds the single-writer token for each object.
///
/// Leader selection is first-present-wins: a vacant object may only be
/// claimed by the earliest-joined client that is still connected. Every
/// client sees the same membership order, so at most one of them can
/// succeed at `acquire_if_vacant` for a given vacancy.
#[derive(Debug)]
pub struct OwnershipArbiter {
    local: ClientId,
    /// Connected clients in join order
    members: Vec<ClientId>,
    holders: HashMap<ObjectKey, ClientId>,
    outbox: Vec<OwnershipNotice>,
}

impl OwnershipArbiter {
    pub fn new(local: ClientId) -> Self {
        Self {
            local,
            members: vec![local],
            holders: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn local_client(&self) -> ClientId {
        self.local
    }

    /// Answered from the local cache, never blocks
    pub fn is_owner(&self, object: &ObjectKey) -> bool {
        self.holders.get(object) == Some(&self.local)
    }

    pub fn holder(&self, object: &ObjectKey) -> Option<ClientId> {
        self.holders.get(object).copied()
    }

    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    /// The client entitled to claim vacant objects right now
    pub fn leader(&self) -> Option<ClientId> {
        self.members.first().copied()
    }

    /// Claim `object` if nobody holds it and this client is the leader.
    ///
    /// Returns true if this client holds the token afterwards.
    pub fn acquire_if_vacant(&mut self, object: &ObjectKey) -> bool {
        if let Some(holder) = self.holders.get(object) {
            return *holder == self.local;
        }

        if self.leader() != Some(self.local) {
            debug!(
                target: "ownership",
                "{} is vacant but {} is not the earliest client (leader: {:?})",
                object,
                self.local,
                self.leader()
            );
            return false;
        }

        info!(target: "ownership", "{} claimed {}", self.local, object);
        self.holders.insert(object.clone(), self.local);
        self.outbox.push(OwnershipNotice::Claimed {
            object: object.clone(),
            client: self.local,
        });
        true
    }

    /// Give up the token for `object`. No-op if we do not hold it.
    pub fn release(&mut self, object: &ObjectKey) {
        if !self.is_owner(object) {
            debug!(target: "ownership", "{} released {} without holding it", self.local, object);
            return;
        }

        self.holders.remove(object);
        info!(target: "ownership", "{} released {}", self.local, object);
        self.outbox.push(OwnershipNotice::Released {
            object: object.clone(),
            client: self.local,
        });
    }

    /// Record a newly connected client at the end of the join order
    pub fn observe_join(&mut self, client: ClientId) {
        if !self.members.contains(&client) {
            self.members.push(client);
        }
    }

    /// Drop a disconnected client and every token it held.
    ///
    /// Returns the objects that became vacant.
    pub fn observe_leave(&mut self, client: ClientId) -> Vec<ObjectKey> {
        self.members.retain(|c| *c != client);

        let mut vacated: Vec<ObjectKey> = self
            .holders
            .iter()
            .filter(|(_, holder)| **holder == client)
            .map(|(object, _)| object.clone())
            .collect();
        vacated.sort();

        for object in &vacated {
            self.holders.remove(object);
            debug!(target: "ownership", "{} vacated by disconnect of {}", object, client);
        }

        vacated
    }

    /// Apply an ownership notice announced by another client
    pub fn apply_notice(&mut self, notice: &OwnershipNotice) {
        match notice {
            OwnershipNotice::Claimed { object, client } => {
                match self.holders.get(object) {
                    Some(existing) if existing == client => {}
                    Some(existing) => {
                        // Only possible while membership views disagree; the
                        // earlier-joined claimant wins on every client.
                        let keep_existing = self.join_rank(*existing) <= self.join_rank(*client);
                        warn!(
                            target: "ownership",
                            "Conflicting claims for {}: {} vs {}, keeping {}",
                            object,
                            existing,
                            client,
                            if keep_existing { existing } else { client }
                        );
                        if !keep_existing {
                            self.holders.insert(object.clone(), *client);
                        }
                    }
                    None => {
                        self.holders.insert(object.clone(), *client);
                    }
                }
            }
            OwnershipNotice::Released { object, client } => {
                if self.holders.get(object) == Some(client) {
                    self.holders.remove(object);
                }
            }
        }
    }

    /// Replace the cache with a snapshot received on join
    pub fn load_snapshot(&mut self, members: &[ClientId], holders: &[(ObjectKey, ClientId)]) {
        self.members = members.to_vec();
        if !self.members.contains(&self.local) {
            self.members.push(self.local);
        }
        self.holders = holders.iter().cloned().collect();
    }

    pub fn holders(&self) -> Vec<(ObjectKey, ClientId)> {
        let mut holders: Vec<_> = self
            .holders
            .iter()
            .map(|(object, client)| (object.clone(), *client))
            .collect();
        holders.sort();
        holders
    }

    pub fn take_outbox(&mut self) -> Vec<OwnershipNotice> {
        std::mem::take(&mut self.outbox)
    }

    fn join_rank(&self, client: ClientId) -> usize {
        self.members
            .iter()
            .position(|c| *c == client)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(name)
    }

    #[test]
    fn test_first_present_wins() {
        let mut a = OwnershipArbiter::new(ClientId(1));
        let mut b = OwnershipArbiter::new(ClientId(2));
        b.load_snapshot(&[ClientId(1), ClientId(2)], &[]);
        a.observe_join(ClientId(2));

        assert!(!b.acquire_if_vacant(&key("lock")));
        assert!(a.acquire_if_vacant(&key("lock")));
        assert!(a.is_owner(&key("lock")));

        for notice in a.take_outbox() {
            b.apply_notice(&notice);
        }
        assert_eq!(b.holder(&key("lock")), Some(ClientId(1)));
        assert!(!b.is_owner(&key("lock")));
    }

    #[test]
    fn test_acquire_is_idempotent_for_holder() {
        let mut a = OwnershipArbiter::new(ClientId(1));
        assert!(a.acquire_if_vacant(&key("gate")));
        assert!(a.acquire_if_vacant(&key("gate")));
        assert_eq!(a.take_outbox().len(), 1);
    }

    #[test]
    fn test_leave_vacates_tokens() {
        let mut b = OwnershipArbiter::new(ClientId(2));
        b.load_snapshot(
            &[ClientId(1), ClientId(2), ClientId(3)],
            &[(key("lock"), ClientId(1)), (key("gate"), ClientId(3))],
        );

        let vacated = b.observe_leave(ClientId(1));
        assert_eq!(vacated, vec![key("lock")]);
        assert_eq!(b.holder(&key("lock")), None);
        assert_eq!(b.holder(&key("gate")), Some(ClientId(3)));
        assert_eq!(b.leader(), Some(ClientId(2)));
        assert!(b.acquire_if_vacant(&key("lock")));
    }

    #[test]
    fn test_release_only_by_holder() {
        let mut a = OwnershipArbiter::new(ClientId(1));
        a.release(&key("lock"));
        assert!(a.take_outbox().is_empty());

        a.acquire_if_vacant(&key("lock"));
        a.take_outbox();
        a.release(&key("lock"));
        assert_eq!(
            a.take_outbox(),
            vec![OwnershipNotice::Released {
                object: key("lock"),
                client: ClientId(1)
            }]
        );
        assert_eq!(a.holder(&key("lock")), None);
    }

    #[test]
    fn test_conflicting_claim_keeps_earlier_client() {
        let mut c = OwnershipArbiter::new(ClientId(3));
        c.load_snapshot(&[ClientId(1), ClientId(2), ClientId(3)], &[]);

        c.apply_notice(&OwnershipNotice::Claimed {
            object: key("lock"),
            client: ClientId(2),
        });
        c.apply_notice(&OwnershipNotice::Claimed {
            object: key("lock"),
            client: ClientId(1),
        });
        assert_eq!(c.holder(&key("lock")), Some(ClientId(1)));

        c.apply_notice(&OwnershipNotice::Claimed {
            object: key("lock"),
            client: ClientId(2),
        });
        assert_eq!(c.holder(&key("lock")), Some(ClientId(1)));
    }
}
