use std::time::Instant;

use agesync_events::ClientId;
use agesync_world::{ReplicationMessage, WorldSnapshot};
use tracing::warn;

use crate::script_runner::ScriptRunner;

/// One client as seen by an in-process relay
pub trait ReplicaPeer {
    fn peer_id(&self) -> ClientId;

    fn runner(&self) -> &ScriptRunner;

    /// Drain messages this client wants sent to everyone else
    fn take_outgoing(&mut self) -> Vec<ReplicationMessage>;

    /// Apply a message sent by another client
    fn apply(&mut self, message: &ReplicationMessage, now: Instant);

    fn observe_join(&mut self, client: ClientId);
}

/// Outcome of relaying until quiet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: usize,
    pub rounds: usize,
    /// False if the round limit was hit with messages still flowing
    pub quiet: bool,
}

/// Tell every connected peer about `client` and return the snapshot it
/// should load from. The earliest peer's view is authoritative.
pub fn prepare_join<P: ReplicaPeer>(peers: &mut [P], client: ClientId) -> Option<WorldSnapshot> {
    for peer in peers.iter_mut() {
        peer.observe_join(client);
    }
    peers.first().map(|peer| peer.runner().world().snapshot())
}

/// Deliver every peer's outgoing replication to all other peers, round after
/// round, until nobody has anything left to send.
pub fn relay_until_quiet<P: ReplicaPeer>(peers: &mut [P], now: Instant, max_rounds: usize) -> RelayStats {
    let mut stats = RelayStats {
        delivered: 0,
        rounds: 0,
        quiet: false,
    };

    while stats.rounds < max_rounds {
        let batches: Vec<_> = peers
            .iter_mut()
            .map(|peer| (peer.peer_id(), peer.take_outgoing()))
            .filter(|(_, messages)| !messages.is_empty())
            .collect();
        if batches.is_empty() {
            stats.quiet = true;
            return stats;
        }

        for (from, messages) in batches {
            for peer in peers.iter_mut().filter(|p| p.peer_id() != from) {
                for message in &messages {
                    peer.apply(message, now);
                    stats.delivered += 1;
                }
            }
        }
        stats.rounds += 1;
    }

    warn!(
        target: "replication",
        "Replication still active after {} rounds",
        max_rounds
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostServices;
    use agesync_events::SdlValue;
    use agesync_world::services::{MemoryChronicle, RecordingAvatar, RecordingResponders};
    use agesync_world::VariableDescriptor;

    struct Peer {
        runner: ScriptRunner,
        responders: RecordingResponders,
        avatar: RecordingAvatar,
        chronicle: MemoryChronicle,
    }

    impl Peer {
        fn new(id: u32) -> Self {
            let mut runner = ScriptRunner::new(ClientId(id));
            runner.world_mut().declare(
                VariableDescriptor::new("lamp", SdlValue::bool(false), "lampBrain".into()),
                None,
            );
            Self {
                runner,
                responders: RecordingResponders::new(),
                avatar: RecordingAvatar::new(),
                chronicle: MemoryChronicle::default(),
            }
        }
    }

    impl ReplicaPeer for Peer {
        fn peer_id(&self) -> ClientId {
            self.runner.client_id()
        }

        fn runner(&self) -> &ScriptRunner {
            &self.runner
        }

        fn take_outgoing(&mut self) -> Vec<ReplicationMessage> {
            self.runner.take_outgoing()
        }

        fn apply(&mut self, message: &ReplicationMessage, now: Instant) {
            let mut services =
                HostServices::new(&mut self.responders, &mut self.avatar, &mut self.chronicle);
            self.runner.apply_replication(message, &mut services, now);
        }

        fn observe_join(&mut self, client: ClientId) {
            self.runner.observe_join(client);
        }
    }

    #[test]
    fn test_relay_reaches_every_peer() {
        let mut peers = vec![Peer::new(1)];
        for id in 2..=3 {
            let snapshot = prepare_join(&mut peers, ClientId(id)).unwrap();
            let mut joiner = Peer::new(id);
            joiner.runner.world_mut().load_membership(&snapshot);
            peers.push(joiner);
        }
        assert!(peers[0].runner.world_mut().acquire_if_vacant(&"lampBrain".into()));
        peers[0]
            .runner
            .world_mut()
            .write("lamp", SdlValue::bool(true), "test")
            .unwrap();

        let stats = relay_until_quiet(&mut peers, Instant::now(), 8);
        assert!(stats.quiet);
        assert!(stats.delivered >= 4);
        for peer in &peers {
            assert_eq!(peer.runner.world().read("lamp"), Some(&SdlValue::bool(true)));
        }

        let idle = relay_until_quiet(&mut peers, Instant::now(), 8);
        assert_eq!(idle, RelayStats { delivered: 0, rounds: 0, quiet: true });
    }

    #[test]
    fn test_prepare_join_uses_earliest_snapshot() {
        let mut peers: Vec<Peer> = Vec::new();
        assert!(prepare_join(&mut peers, ClientId(1)).is_none());

        let mut peers = vec![Peer::new(1)];
        let snapshot = prepare_join(&mut peers, ClientId(2)).unwrap();
        assert_eq!(snapshot.members, vec![ClientId(1), ClientId(2)]);
    }
}
