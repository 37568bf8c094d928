mod common;

use agesync_events::{ClientId, SdlValue};
use agesync_scripting_host::{ComboLock, PuzzlePhase};
use agesync_world::services::RecordingResponders;
use common::Cluster;

const INSTANT_LOCK: &str = r#"
[[variables]]
name = "doorOpen"
default = [false]
object = "lockBrain"
chronicle = "DoorOpen"

[[puzzles]]
id = "lock"
object = "lockBrain"
buttons = ["b0", "b1", "b2", "b3", "b4", "b5", "b6", "b7", "b8", "b9"]
solution = [3, 2, 5, 0]
mode = "exact"
solved_responder = "respOpen"
solved_variable = "doorOpen"
"#;

const SLIDING_LOCK: &str = r#"
[[puzzles]]
id = "lock"
object = "lockBrain"
buttons = ["b0", "b1", "b2", "b3", "b4", "b5", "b6", "b7", "b8", "b9"]
solution = [3, 2, 5, 0]
mode = "sliding"
"#;

const RESPONDER_LOCK: &str = r#"
[[puzzles]]
id = "lock"
object = "lockBrain"
buttons = ["b0", "b1", "b2", "b3", "b4", "b5", "b6", "b7", "b8", "b9"]
solution = [3, 2, 5, 0]
press_responder = "respPush"
solved_responder = "respOpen"
"#;

fn press_seq(cluster: &mut Cluster, from: usize, buttons: &[u32]) {
    for button in buttons {
        cluster.pick(from, &format!("b{}", button));
        cluster.finish_responders();
    }
}

fn lock(cluster: &Cluster, client: usize) -> &ComboLock {
    cluster.clients[client].runner.script::<ComboLock>("lock").unwrap()
}

#[test]
fn test_exact_sequence_solves() {
    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);

    press_seq(&mut cluster, 0, &[3, 2, 5, 0]);

    let client = &cluster.clients[0];
    assert_eq!(client.read_bool("lock.solved"), Some(true));
    assert_eq!(client.read_int("lock.numCorrect"), Some(4));
    assert_eq!(client.read_bool("doorOpen"), Some(true));
    assert_eq!(lock(&cluster, 0).phase(), PuzzlePhase::Solved);

    let solved_runs: Vec<_> = client
        .responders
        .history()
        .iter()
        .filter(|r| r.responder.as_str() == "respOpen")
        .collect();
    assert_eq!(solved_runs.len(), 1);
    assert!(solved_runs[0].net_propagate);
    assert!(!solved_runs[0].params.fast_forward);
}

#[test]
fn test_solved_mirror_is_exported_to_chronicle() {
    use agesync_world::services::ChronicleStore;

    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);
    press_seq(&mut cluster, 0, &[3, 2, 5, 0]);

    assert_eq!(
        cluster.clients[0].chronicle.read_entry("DoorOpen"),
        Some("true".to_string())
    );
}

#[test]
fn test_exact_wrong_press_resets() {
    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);

    press_seq(&mut cluster, 0, &[3, 2]);
    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(2));

    press_seq(&mut cluster, 0, &[9]);
    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(0));

    press_seq(&mut cluster, 0, &[0]);
    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(0));
    assert_eq!(cluster.clients[0].read_bool("lock.solved"), Some(false));
}

#[test]
fn test_sliding_sequence_solves() {
    let mut cluster = Cluster::from_toml(SLIDING_LOCK);
    cluster.join(1);

    press_seq(&mut cluster, 0, &[9, 3, 2, 5, 0]);

    assert_eq!(cluster.clients[0].read_bool("lock.solved"), Some(true));
    assert_eq!(
        cluster.clients[0].runner.world().read("lock.attempt"),
        Some(&SdlValue::ints([3, 2, 5, 0]))
    );
}

#[test]
fn test_press_while_solved_unsolves() {
    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);
    press_seq(&mut cluster, 0, &[3, 2, 5, 0]);

    press_seq(&mut cluster, 0, &[3]);

    let client = &cluster.clients[0];
    assert_eq!(client.read_bool("lock.solved"), Some(false));
    assert_eq!(client.read_int("lock.numCorrect"), Some(0));
    assert_eq!(client.read_bool("doorOpen"), Some(false));
    assert_eq!(lock(&cluster, 0).phase(), PuzzlePhase::Idle);
}

#[test]
fn test_press_responder_locks_input() {
    let mut cluster = Cluster::from_toml(RESPONDER_LOCK);
    cluster.join(1);

    cluster.pick(0, "b3");
    assert!(lock(&cluster, 0).state().locked);

    // Ignored: the first press is still playing
    cluster.pick(0, "b2");
    assert_eq!(cluster.clients[0].responders.pending_count(), 1);
    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(0));

    cluster.finish_responders();
    assert!(!lock(&cluster, 0).state().locked);
    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(1));
}

#[test]
fn test_unresolvable_press_responder_aborts_press() {
    let mut cluster = Cluster::from_toml(RESPONDER_LOCK);
    cluster.join_with(
        1,
        RecordingResponders::with_known(["respOpen"]),
        Default::default(),
    );

    cluster.pick(0, "b3");

    assert!(!lock(&cluster, 0).state().locked);
    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(0));
}

#[test]
fn test_only_owner_commits() {
    let mut cluster = Cluster::from_toml(RESPONDER_LOCK);
    cluster.join(1);
    cluster.join(2);

    // The second client presses; both play the responder, the first commits
    press_seq(&mut cluster, 1, &[3, 2]);

    for client in &cluster.clients {
        assert_eq!(client.read_int("lock.numCorrect"), Some(2));
    }
    assert!(cluster.clients[0].runner.world().is_owner(&"lockBrain".into()));
    assert!(!cluster.clients[1].runner.world().is_owner(&"lockBrain".into()));
    assert_eq!(
        cluster.clients[1].runner.world().sdl.sequence("lock.numCorrect"),
        Some(2)
    );
    assert_eq!(lock(&cluster, 1).phase(), PuzzlePhase::Locked(2));
}

#[test]
fn test_new_owner_continues_after_disconnect() {
    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);
    cluster.join(2);
    press_seq(&mut cluster, 0, &[3, 2]);

    cluster.leave(0);
    assert!(cluster.clients[0].runner.world().is_owner(&"lockBrain".into()));

    press_seq(&mut cluster, 0, &[5, 0]);
    assert_eq!(cluster.clients[0].read_bool("lock.solved"), Some(true));
    assert_eq!(cluster.clients[0].id(), ClientId(2));
}

#[test]
fn test_late_joiner_fast_forwards_solved_state() {
    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);
    press_seq(&mut cluster, 0, &[3, 2, 5, 0]);

    let late = cluster.join(2);

    let client = &cluster.clients[late];
    assert_eq!(client.read_bool("lock.solved"), Some(true));
    assert_eq!(lock(&cluster, late).phase(), PuzzlePhase::Solved);
    let run = client.responders.history().last().unwrap();
    assert_eq!(run.responder.as_str(), "respOpen");
    assert!(run.params.fast_forward);
    assert!(!run.net_propagate);
}

#[test]
fn test_out_of_range_progress_is_clamped() {
    let mut cluster = Cluster::from_toml(INSTANT_LOCK);
    cluster.join(1);
    cluster.write(0, "lock.numCorrect", SdlValue::int(7));

    press_seq(&mut cluster, 0, &[3]);

    assert_eq!(cluster.clients[0].read_int("lock.numCorrect"), Some(1));
    assert_eq!(cluster.clients[0].read_bool("lock.solved"), Some(false));
}
