//! In-process master/replica cluster wired through the frame codec.
//!
//! Each node has its own registry. The master fans out through a
//! `FramingListener` per replica; replicas submit through a
//! `FramingSender` whose link to the master can be cut.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regatta_replication::leaderboard::{
    RacingEventReplicable, RacingEventService, RacingEventServiceOperation as Op,
    RACING_EVENT_SERVICE_ID,
};
use regatta_replication::replication::{
    FrameTransport, FramingListener, FramingSender, MasterDescriptor, RegistryInbox,
    ReplicableRegistry, ReplicationConfig, TransportError,
};

/// Transport that fails while its link is down.
pub struct Link {
    inbox: RegistryInbox,
    up: Arc<AtomicBool>,
}

impl FrameTransport for Link {
    fn deliver(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("master".into()));
        }
        self.inbox.deliver(frame)
    }
}

pub struct Node {
    pub registry: Arc<ReplicableRegistry>,
    pub replicable: Arc<RacingEventReplicable>,
    /// Whether submissions of this node reach the master
    pub link: Arc<AtomicBool>,
}

impl Node {
    pub fn set_online(&self, online: bool) {
        self.link.store(online, Ordering::SeqCst);
    }

    pub fn apply(&self, op: Op) {
        self.replicable.apply(op).unwrap();
    }

    pub fn columns(&self, leaderboard: &str) -> Vec<String> {
        self.replicable
            .state()
            .column_names(leaderboard)
            .unwrap_or_default()
    }
}

pub struct Cluster {
    pub master: Node,
    pub replicas: Vec<Node>,
}

impl Cluster {
    /// Master prepared by `setup`, then `replicas` replicas subscribed and
    /// filled from its initial load.
    pub fn new(replicas: usize, setup: impl FnOnce(&RacingEventReplicable)) -> Self {
        let master = node(Arc::new(RacingEventReplicable::new(
            RACING_EVENT_SERVICE_ID,
            RacingEventService::new(),
        )));
        setup(&master.replicable);

        let replicas = (0..replicas)
            .map(|_| {
                let config = ReplicationConfig::replica(RACING_EVENT_SERVICE_ID, "master:8888", None);
                let replicable = RacingEventReplicable::from_config(
                    &config,
                    Arc::new(RacingEventService::new()),
                )
                .unwrap();
                subscribe(&master, node(Arc::new(replicable)))
            })
            .collect();

        Self { master, replicas }
    }

    pub fn replica(&self, index: usize) -> &Node {
        &self.replicas[index]
    }

    /// Whether every replica holds exactly the master's contents.
    pub fn converged(&self) -> bool {
        let expected = self.master.replicable.state().snapshot();
        self.replicas
            .iter()
            .all(|r| r.replicable.state().snapshot() == expected)
    }
}

fn node(replicable: Arc<RacingEventReplicable>) -> Node {
    let registry = Arc::new(ReplicableRegistry::new());
    registry.register(replicable.clone()).unwrap();
    Node {
        registry,
        replicable,
        link: Arc::new(AtomicBool::new(true)),
    }
}

fn subscribe(master: &Node, replica: Node) -> Node {
    replica.replicable.set_sender(Arc::new(FramingSender::new(Link {
        inbox: RegistryInbox::submissions(master.registry.clone()),
        up: replica.link.clone(),
    })));

    let mut load = Vec::new();
    master
        .replicable
        .serialize_for_initial_replication(&mut load)
        .unwrap();
    replica
        .registry
        .initially_fill(RACING_EVENT_SERVICE_ID, &mut load.as_slice())
        .unwrap();

    master
        .replicable
        .add_operation_execution_listener(Arc::new(FramingListener::new(
            RegistryInbox::operations(replica.registry.clone()),
        )));
    replica
}

/// Master-side setup for the 2017 Kiel Week leaderboard.
pub fn kw2017(master: &RacingEventReplicable) {
    master
        .apply(Op::CreateFlexibleLeaderboardWithColumns {
            leaderboard: "KW2017".into(),
            display_name: Some("Kieler Woche 2017".into()),
            columns: vec!["R1".into(), "R2".into(), "R3".into()],
        })
        .unwrap();
}

pub fn add_column(leaderboard: &str, column: &str, index: usize) -> Op {
    Op::AddColumnToLeaderboard {
        leaderboard: leaderboard.into(),
        column: column.into(),
        medal_race: false,
        index,
    }
}

pub fn remove_column(leaderboard: &str, column: &str, index: usize) -> Op {
    Op::RemoveLeaderboardColumn {
        leaderboard: leaderboard.into(),
        column: column.into(),
        index,
    }
}

pub fn rename_column(leaderboard: &str, old_name: &str, new_name: &str) -> Op {
    Op::RenameLeaderboardColumn {
        leaderboard: leaderboard.into(),
        old_name: old_name.into(),
        new_name: new_name.into(),
    }
}

pub fn descriptor() -> MasterDescriptor {
    MasterDescriptor::generated("master:8888")
}
