//! Replication Protocol Tests
//!
//! Master and replicas exchange real frames through their registries:
//! - Replicas apply locally and the echo of their own operation is suppressed
//! - Submissions queued while the master is unreachable keep their order
//! - A failing listener does not keep others from being notified
//! - Replication flags are scoped to the applying thread

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::{add_column, kw2017, remove_column, rename_column, Cluster};
use regatta_replication::leaderboard::{
    RacingEventReplicable, RacingEventService, RacingEventServiceOperation as Op,
    RACING_EVENT_SERVICE_ID,
};
use regatta_replication::operation::{Envelope, IdWrapper, OperationId};
use regatta_replication::replication::{
    HaltReason, OperationExecutionListener, ReplicatedOperation, ReplicationConfig,
    ReplicationErrorKind, TransportError,
};

// =============================================================================
// Echo suppression
// =============================================================================

/// A replica's own operation comes back from the master and is not re-applied.
#[test]
fn test_own_echo_is_suppressed() {
    let cluster = Cluster::new(2, kw2017);
    let origin = cluster.replica(0);

    origin.apply(add_column("KW2017", "R4", 3));

    assert_eq!(cluster.master.columns("KW2017"), vec!["R1", "R2", "R3", "R4"]);
    assert!(cluster.converged());
    assert_eq!(origin.replicable.metrics().echoes_suppressed, 1);
    assert_eq!(origin.replicable.pending_len(), 0);
    // the other replica applied it as a regular master operation
    assert_eq!(cluster.replica(1).replicable.metrics().echoes_suppressed, 0);
}

/// Nested operations emitted by a composite carry the composite's id.
#[test]
fn test_nested_echoes_are_suppressed() {
    let cluster = Cluster::new(1, |_| {});
    let replica = cluster.replica(0);

    replica.apply(Op::CreateFlexibleLeaderboardWithColumns {
        leaderboard: "KW2018".into(),
        display_name: None,
        columns: vec!["R1".into(), "R2".into()],
    });

    assert_eq!(cluster.master.columns("KW2018"), vec!["R1", "R2"]);
    assert!(cluster.converged());
    // one creation and two column additions came back
    assert_eq!(replica.replicable.metrics().echoes_suppressed, 3);
    assert_eq!(replica.replicable.last_received_sequence(), cluster.master.replicable.last_sequence());
}

/// An operation applied with a caller-supplied id echoes under that id.
#[test]
fn test_wrapped_application_keeps_caller_id() {
    struct Ids(Mutex<Vec<Option<OperationId>>>);
    impl OperationExecutionListener<Op> for Ids {
        fn executed(
            &self,
            _replicable_id: &str,
            operation: &ReplicatedOperation<Op>,
        ) -> Result<(), TransportError> {
            self.0.lock().unwrap().push(operation.envelope.id());
            Ok(())
        }
    }

    let cluster = Cluster::new(1, kw2017);
    let ids = Arc::new(Ids(Mutex::new(Vec::new())));
    cluster
        .master
        .replicable
        .add_operation_execution_listener(ids.clone());

    let id = OperationId::new();
    cluster
        .replica(0)
        .replicable
        .apply_wrapped(IdWrapper::new(id, add_column("KW2017", "R4", 3)))
        .unwrap();

    assert_eq!(*ids.0.lock().unwrap(), vec![Some(id)]);
    assert_eq!(cluster.replica(0).replicable.metrics().echoes_suppressed, 1);
}

// =============================================================================
// Ordering under failure
// =============================================================================

/// Submissions made while the master is unreachable arrive in order.
#[test]
fn test_queued_submissions_keep_order() {
    let cluster = Cluster::new(1, kw2017);
    let replica = cluster.replica(0);
    replica.set_online(false);

    replica.apply(add_column("KW2017", "R4", 3));
    replica.apply(rename_column("KW2017", "R4", "Final"));
    replica.apply(Op::move_column_up("KW2017", "Final", 3).unwrap());
    assert_eq!(replica.replicable.queued_for_sending(), 3);
    assert_eq!(cluster.master.columns("KW2017"), vec!["R1", "R2", "R3"]);

    // first retry still fails and keeps everything
    let outcome = replica.replicable.retry_pending();
    assert_eq!(outcome.sent, 0);
    assert_eq!(replica.replicable.queued_for_sending(), 3);

    replica.set_online(true);
    let outcome = replica.replicable.retry_pending();
    assert_eq!(outcome.sent, 3);
    assert_eq!(
        cluster.master.columns("KW2017"),
        vec!["R1", "R2", "Final", "R3"]
    );
    assert!(cluster.converged());
    assert_eq!(replica.replicable.pending_len(), 0);
}

/// Concurrent edits by a disconnected replica are rebased once it is back.
#[test]
fn test_offline_edits_rebased_over_master_operations() {
    let cluster = Cluster::new(1, kw2017);
    let replica = cluster.replica(0);
    replica.set_online(false);

    replica.apply(add_column("KW2017", "R4", 3));
    replica.apply(remove_column("KW2017", "R1", 0));
    cluster
        .master
        .apply(add_column("KW2017", "R0", 0));
    cluster
        .master
        .apply(rename_column("KW2017", "R2", "Race2"));
    assert_eq!(replica.columns("KW2017"), vec!["R0", "Race2", "R3", "R4"]);

    replica.set_online(true);
    replica.replicable.retry_pending();

    assert_eq!(cluster.master.columns("KW2017"), vec!["R0", "Race2", "R3", "R4"]);
    assert!(cluster.converged());
}

/// The retry worker delivers queued submissions on its own.
#[test]
fn test_retry_worker_drains_queue() {
    let cluster = Cluster::new(1, kw2017);
    let replica = cluster.replica(0);
    replica.set_online(false);
    replica.apply(add_column("KW2017", "R4", 3));

    let worker = replica.replicable.spawn_retry_worker();
    replica.set_online(true);

    let deadline = Instant::now() + Duration::from_secs(10);
    while replica.replicable.queued_for_sending() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    worker.stop();

    assert_eq!(replica.replicable.queued_for_sending(), 0);
    assert!(cluster.converged());
}

// =============================================================================
// Listener isolation
// =============================================================================

struct Unreachable(AtomicUsize);

impl OperationExecutionListener<Op> for Unreachable {
    fn executed(
        &self,
        _replicable_id: &str,
        _operation: &ReplicatedOperation<Op>,
    ) -> Result<(), TransportError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Unavailable("replica:9999".into()))
    }
}

/// A failing listener is counted and logged; the next one is still notified.
#[test]
fn test_failing_listener_does_not_block_others() {
    let master = RacingEventReplicable::new(RACING_EVENT_SERVICE_ID, RacingEventService::new());
    let broken = Arc::new(Unreachable(AtomicUsize::new(0)));
    let counting = Arc::new(Counting(AtomicUsize::new(0)));
    master.add_operation_execution_listener(broken.clone());
    master.add_operation_execution_listener(counting.clone());

    master
        .apply(Op::CreateFlexibleLeaderboard {
            leaderboard: "KW2017".into(),
            display_name: None,
        })
        .unwrap();

    assert_eq!(broken.0.load(Ordering::SeqCst), 1);
    assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    assert_eq!(master.metrics().listener_failures, 1);
    assert!(master.state().leaderboard("KW2017").is_some());
}

/// Fan-out reaches replicas subscribed before and after a failing listener.
#[test]
fn test_replicas_receive_despite_failing_listener() {
    let cluster = Cluster::new(2, kw2017);
    let broken = Arc::new(Unreachable(AtomicUsize::new(0)));
    cluster
        .master
        .replicable
        .add_operation_execution_listener(broken.clone());

    cluster.master.apply(remove_column("KW2017", "R2", 1));
    cluster.replica(1).apply(add_column("KW2017", "R4", 2));

    assert_eq!(broken.0.load(Ordering::SeqCst), 2);
    assert!(cluster.converged());
    assert_eq!(cluster.master.columns("KW2017"), vec!["R1", "R3", "R4"]);
}

struct Counting(AtomicUsize);

impl OperationExecutionListener<Op> for Counting {
    fn executed(
        &self,
        _replicable_id: &str,
        _operation: &ReplicatedOperation<Op>,
    ) -> Result<(), TransportError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Flag scoping
// =============================================================================

/// Blocks inside fan-out until released, reporting the flags it saw.
struct Gate {
    replicable: Mutex<Option<Arc<RacingEventReplicable>>>,
    entered: Mutex<mpsc::Sender<bool>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl OperationExecutionListener<Op> for Gate {
    fn executed(
        &self,
        _replicable_id: &str,
        _operation: &ReplicatedOperation<Op>,
    ) -> Result<(), TransportError> {
        let applying = self
            .replicable
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.is_currently_applying_operation_received_from_master())
            .unwrap_or(false);
        self.entered.lock().unwrap().send(applying).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        Ok(())
    }
}

/// The applying thread sees its flag; another thread does not.
#[test]
fn test_flags_are_thread_local() {
    let master = Arc::new(RacingEventReplicable::new(
        RACING_EVENT_SERVICE_ID,
        RacingEventService::new(),
    ));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate = Arc::new(Gate {
        replicable: Mutex::new(Some(master.clone())),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    master.add_operation_execution_listener(gate.clone());

    let applying = {
        let master = master.clone();
        thread::spawn(move || {
            master
                .apply(Op::CreateFlexibleLeaderboard {
                    leaderboard: "KW2017".into(),
                    display_name: None,
                })
                .unwrap();
        })
    };

    let seen_inside = entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(seen_inside);
    assert!(!master.is_currently_applying_operation_received_from_master());
    assert!(!master.is_currently_filling_from_initial_load());

    release_tx.send(()).unwrap();
    applying.join().unwrap();
    assert!(!master.is_currently_applying_operation_received_from_master());
    gate.replicable.lock().unwrap().take();
}

// =============================================================================
// Halting
// =============================================================================

/// A sequence gap halts the replica until it is cleared and reloaded.
#[test]
fn test_gap_halts_until_cleared() {
    let cluster = Cluster::new(1, kw2017);
    let replica = &cluster.replica(0).replicable;
    let skipped = ReplicatedOperation {
        sequence: replica.last_received_sequence() + 2,
        envelope: Envelope::Plain(add_column("KW2017", "R9", 0)),
    };

    let err = replica.apply_received_replicated(skipped).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(
        replica.replication_state().halt_reason(),
        Some(HaltReason::SequenceGap)
    );
    assert_eq!(
        replica.apply(add_column("KW2017", "R4", 3)).unwrap_err().kind,
        ReplicationErrorKind::Halted
    );

    replica.clear_replica_state();
    assert!(replica.is_replica());
    let mut load = Vec::new();
    cluster
        .master
        .replicable
        .serialize_for_initial_replication(&mut load)
        .unwrap();
    replica.initially_fill_from(&mut load.as_slice()).unwrap();
    assert!(cluster.converged());
}

/// Operations received while loading are applied after the load.
#[test]
fn test_inbound_held_while_suspended() {
    let cluster = Cluster::new(1, kw2017);
    let replica = &cluster.replica(0).replicable;
    replica.suspend_inbound();

    cluster.master.apply(add_column("KW2017", "R4", 3));
    cluster.master.apply(remove_column("KW2017", "R1", 0));
    assert_eq!(replica.inbound_queued_len(), 2);
    assert_eq!(cluster.replica(0).columns("KW2017"), vec!["R1", "R2", "R3"]);

    assert_eq!(replica.resume_inbound().unwrap(), 2);
    assert!(cluster.converged());
}

/// A configured replica starts out following its master.
#[test]
fn test_replica_from_config_follows_master() {
    let config = ReplicationConfig::replica(RACING_EVENT_SERVICE_ID, "master:8888", None);
    let replica =
        RacingEventReplicable::from_config(&config, Arc::new(RacingEventService::new())).unwrap();
    assert!(replica.is_replica());
    assert_eq!(
        replica.master_descriptor().unwrap().replica_id,
        config.replica_id.unwrap()
    );

    replica
        .stopped_replicating_from(&replica.master_descriptor().unwrap())
        .unwrap();
    assert!(!replica.is_replica());
}

#[test]
fn test_master_forgets_detached_replica() {
    let cluster = Cluster::new(2, kw2017);
    let (a, b) = (cluster.replica(0), cluster.replica(1));
    let replica_id = |node: &common::Node| node.replicable.master_descriptor().unwrap().replica_id;

    a.apply(add_column("KW2017", "R4", 3));
    b.apply(rename_column("KW2017", "R1", "Race1"));
    assert_eq!(cluster.master.replicable.tracked_origins(), 2);

    assert_eq!(cluster.master.registry.replica_detached(&replica_id(a)), 1);
    assert_eq!(cluster.master.registry.replica_detached(&replica_id(a)), 0);
    assert_eq!(cluster.master.replicable.tracked_origins(), 1);

    // submissions after detaching are rebased from scratch
    a.apply(remove_column("KW2017", "R2", 1));
    assert_eq!(cluster.master.replicable.tracked_origins(), 2);
    assert_eq!(cluster.master.columns("KW2017"), vec!["Race1", "R3", "R4"]);
    assert!(cluster.converged());
}
