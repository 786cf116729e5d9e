//! Initial Load Tests
//!
//! A replica filled from a master's initial load holds the same contents,
//! with group members resolved to the leaderboards it holds itself.

mod common;

use std::io::{self, Cursor, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{add_column, kw2017, Cluster};
use regatta_replication::leaderboard::{
    Leaderboard, RacingEventReplicable, RacingEventService, RacingEventServiceOperation as Op,
    RACING_EVENT_SERVICE_ID,
};
use regatta_replication::replication::ReplicationConfig;

fn kiel_week(master: &RacingEventReplicable) {
    kw2017(master);
    for op in [
        Op::CreateFlexibleLeaderboard {
            leaderboard: "KW2016".into(),
            display_name: None,
        },
        Op::CreateLeaderboardGroup {
            group: "Kieler Woche".into(),
            leaderboards: vec!["KW2016".into(), "KW2017".into()],
        },
    ] {
        master.apply(op).unwrap();
    }
    master.state().start_tracking("KW2017 R4");
}

fn initial_load(master: &RacingEventReplicable) -> Vec<u8> {
    let mut load = Vec::new();
    master.serialize_for_initial_replication(&mut load).unwrap();
    load
}

fn replica() -> RacingEventReplicable {
    let config = ReplicationConfig::replica(RACING_EVENT_SERVICE_ID, "master:8888", None);
    RacingEventReplicable::from_config(&config, Arc::new(RacingEventService::new())).unwrap()
}

#[test]
fn test_loaded_replica_matches_master() {
    let cluster = Cluster::new(1, kiel_week);
    let state = cluster.replica(0).replicable.state();

    assert!(cluster.converged());
    assert_eq!(
        state.group_members("Kieler Woche").unwrap(),
        vec!["KW2016", "KW2017"]
    );
    assert_eq!(
        cluster.replica(0).replicable.last_received_sequence(),
        cluster.master.replicable.last_sequence()
    );
}

#[test]
fn test_group_members_are_the_replica_leaderboards() {
    let cluster = Cluster::new(1, kiel_week);
    let state = cluster.replica(0).replicable.state();

    let group = state.group("Kieler Woche").unwrap();
    assert!(group.contains(&state.leaderboard("KW2016").unwrap()));
    assert!(group.contains(&state.leaderboard("KW2017").unwrap()));

    // edits through the service show up in the group
    cluster.master.apply(add_column("KW2017", "R4", 3));
    let member = group.leaderboards[1].read().unwrap();
    assert_eq!(member.column_names(), vec!["R1", "R2", "R3", "R4"]);
}

#[test]
fn test_trackers_stay_local() {
    let cluster = Cluster::new(1, kiel_week);
    assert_eq!(
        cluster.master.replicable.state().active_trackers(),
        vec!["KW2017 R4"]
    );
    assert!(cluster.replica(0).replicable.state().active_trackers().is_empty());
}

#[test]
fn test_load_replaces_previous_contents() {
    let master = RacingEventReplicable::new(RACING_EVENT_SERVICE_ID, RacingEventService::new());
    kiel_week(&master);
    let replica = replica();
    replica
        .state()
        .add_leaderboard(Leaderboard::new("stale", None))
        .unwrap();

    replica
        .initially_fill_from(&mut initial_load(&master).as_slice())
        .unwrap();

    assert_eq!(replica.state().leaderboard_names(), vec!["KW2016", "KW2017"]);
    assert_eq!(replica.metrics().initial_loads, 1);
}

/// Reader that signals when first read and then waits to be released.
struct HeldReader {
    inner: Cursor<Vec<u8>>,
    entered: Option<Sender<()>>,
    release: Receiver<()>,
}

impl Read for HeldReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(entered) = self.entered.take() {
            let _ = entered.send(());
            let _ = self.release.recv();
        }
        self.inner.read(buf)
    }
}

/// A load in progress on one thread is invisible to another thread
/// loading a different replicable.
#[test]
fn test_concurrent_loads_do_not_share_flags() {
    let master = RacingEventReplicable::new(RACING_EVENT_SERVICE_ID, RacingEventService::new());
    kiel_week(&master);
    let load = initial_load(&master);

    let first = Arc::new(replica());
    let second = replica();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    let loading = {
        let first = first.clone();
        let mut reader = HeldReader {
            inner: Cursor::new(load.clone()),
            entered: Some(entered_tx),
            release: release_rx,
        };
        thread::spawn(move || {
            first.initially_fill_from(&mut reader).unwrap();
        })
    };

    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(!first.is_currently_filling_from_initial_load());
    second.initially_fill_from(&mut load.as_slice()).unwrap();
    assert!(!second.is_currently_filling_from_initial_load());

    release_tx.send(()).unwrap();
    loading.join().unwrap();
    assert_eq!(first.state().snapshot(), second.state().snapshot());
    assert_eq!(first.state().snapshot(), master.state().snapshot());
}

#[test]
fn test_load_for_other_service_halts_replica() {
    let other = RacingEventReplicable::new("tracked-races", RacingEventService::new());
    let replica = replica();

    let err = replica
        .initially_fill_from(&mut initial_load(&other).as_slice())
        .unwrap_err();
    assert!(!err.is_fatal());
    assert!(replica.replication_state().is_halted());
}
