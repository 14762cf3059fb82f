//! Failover End-to-End Tests
//!
//! Three nodes behind three proxies:
//!
//! | node | id | address  | initial role |
//! |------|----|----------|--------------|
//! | pg01 | 1  | 10.0.0.1 | primary      |
//! | pg02 | 2  | 10.0.0.2 | sync         |
//! | pg03 | 3  | 10.0.0.3 | async        |
//!
//! The CRM and the proxies run against a simulated command executor. The
//! poller mirrors the primary address into an in-memory store, which is what
//! the coordinator waits on.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pgswitch::crm::{
    command_line, ClusterManager, ClusterRole, CommandExecutor, Crm, CrmError, CrmResult,
    DEFAULT_RESOURCE,
};
use pgswitch::failover::{
    AgentClient, AgentErrorCode, FailoverAgent, FailoverCoordinator, FailoverError,
    FailoverOptions, Peer, StoreLocker,
};
use pgswitch::observability::{Event, Logger};
use pgswitch::poller::{ClusterStatePoller, PollerOptions, ResolveAddress, WatchedAttribute};
use pgswitch::proxy::{ProxyCommands, ScriptedProxy};
use pgswitch::shutdown::{self, Shutdown};
use pgswitch::store::{CoordinationStore, MemoryStore, StoreUpdater};
use pgswitch::subscriber::EventSubscriber;

const NODES: [(&str, &str, &str); 3] = [
    ("1", "pg01", "10.0.0.1"),
    ("2", "pg02", "10.0.0.2"),
    ("3", "pg03", "10.0.0.3"),
];

const PRIMARY_KEY: &str = "/master";
const LOCK_NAME: &str = "/failover/lock";

// =============================================================================
// Simulated cluster
// =============================================================================

struct Roles {
    primary: usize,
    sync: usize,
}

/// Answers cibadmin, corosync-cfgtool, crm and proxyctl like a live cluster
struct SimulatedCluster {
    roles: Mutex<Roles>,
    calls: Mutex<Vec<String>>,
    slow_proxy: Option<&'static str>,
}

impl SimulatedCluster {
    fn new(slow_proxy: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            roles: Mutex::new(Roles { primary: 0, sync: 1 }),
            calls: Mutex::new(Vec::new()),
            slow_proxy,
        })
    }

    fn primary(&self) -> &'static str {
        NODES[self.roles.lock().unwrap().primary].1
    }

    /// Proxy and resource commands in call order
    fn actions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("proxyctl") || c.starts_with("crm resource"))
            .cloned()
            .collect()
    }

    fn cib(&self) -> String {
        let roles = self.roles.lock().unwrap();
        let nodes: String = NODES
            .iter()
            .enumerate()
            .map(|(index, (id, uname, _))| {
                let status = if index == roles.primary {
                    "LATEST"
                } else if index == roles.sync {
                    "STREAMING|SYNC"
                } else {
                    "STREAMING|POTENTIAL"
                };
                format!(
                    r#"<node id="{id}" uname="{uname}"><instance_attributes id="nodes-{id}"><nvpair id="nodes-{id}-status" name="pgsql-data-status" value="{status}"/></instance_attributes></node>"#
                )
            })
            .collect();

        format!(r#"<cib have-quorum="1"><configuration><nodes>{nodes}</nodes></configuration></cib>"#)
    }

    fn migrate(&self, to: &str) -> CrmResult<()> {
        let mut roles = self.roles.lock().unwrap();
        let target = NODES
            .iter()
            .position(|(_, uname, _)| *uname == to)
            .ok_or_else(|| failure(&format!("no node {}", to)))?;
        roles.sync = roles.primary;
        roles.primary = target;
        Ok(())
    }
}

fn failure(message: &str) -> CrmError {
    CrmError::Command {
        command: "simulated".into(),
        message: message.into(),
    }
}

#[async_trait]
impl CommandExecutor for SimulatedCluster {
    async fn combined_output(&self, program: &str, args: &[&str]) -> CrmResult<Vec<u8>> {
        self.calls.lock().unwrap().push(command_line(program, args));

        let output = match (program, args) {
            ("cibadmin", _) => self.cib(),
            ("corosync-cfgtool", ["-a", id]) => NODES
                .iter()
                .find(|(node_id, _, _)| node_id == id)
                .map(|(_, _, address)| format!("{}\n", address))
                .ok_or_else(|| failure("unknown node id"))?,
            ("crm", ["resource", "migrate", _, to]) => {
                self.migrate(to)?;
                String::new()
            }
            ("crm", ["resource", "unmigrate", _]) => String::new(),
            ("proxyctl", ["pause", name]) => {
                if self.slow_proxy == Some(*name) {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                String::new()
            }
            ("proxyctl", _) => String::new(),
            _ => return Err(failure("unexpected command")),
        };

        Ok(output.into_bytes())
    }
}

// =============================================================================
// Fixture
// =============================================================================

struct Fixture {
    cluster: Arc<SimulatedCluster>,
    store: Arc<MemoryStore>,
    coordinator: FailoverCoordinator,
    trigger: shutdown::ShutdownTrigger,
}

fn proxy_commands(name: &str) -> ProxyCommands {
    ProxyCommands {
        pause: vec!["proxyctl".into(), "pause".into(), name.into()],
        resume: vec!["proxyctl".into(), "resume".into(), name.into()],
        reload: vec!["proxyctl".into(), "reload".into(), name.into()],
        generate_config: vec!["proxyctl".into(), "route".into(), name.into(), "{host}".into()],
    }
}

/// Start the primary mirror and build a coordinator over three agents
async fn fixture(slow_proxy: Option<&'static str>, pause_timeout: Duration, logger: Logger) -> Fixture {
    let cluster = SimulatedCluster::new(slow_proxy);
    let store = Arc::new(MemoryStore::new());
    let crm: Arc<dyn ClusterManager> = Arc::new(Crm::with_executor(cluster.clone(), DEFAULT_RESOURCE));
    let (trigger, shutdown) = shutdown::channel();

    start_mirror(&crm, &store, &logger, shutdown);
    wait_for_value(&store, "10.0.0.1").await;

    let peers = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let proxy = Arc::new(ScriptedProxy::new(cluster.clone(), proxy_commands(name)));
            let agent: Arc<dyn AgentClient> = Arc::new(FailoverAgent::new(
                proxy,
                Arc::clone(&crm),
                ClusterRole::SyncStandby.selector().unwrap(),
                logger.with_component(format!("agent-{}", name)),
            ));
            Peer::new(name, agent)
        })
        .collect();

    let options = FailoverOptions {
        primary_key: PRIMARY_KEY.into(),
        pause_timeout,
        pause_expiry: Duration::from_secs(10),
        ..FailoverOptions::default()
    };

    let locker = Arc::new(StoreLocker::new(
        store.clone(),
        LOCK_NAME,
        Duration::from_secs(60),
    ));
    let coordinator = FailoverCoordinator::new(
        store.clone(),
        peers,
        locker,
        options,
        logger.with_component("coordinator"),
    );

    Fixture {
        cluster,
        store,
        coordinator,
        trigger,
    }
}

/// Poller -> subscriber -> store updater, keeping `/master` at the primary address
fn start_mirror(crm: &Arc<dyn ClusterManager>, store: &Arc<MemoryStore>, logger: &Logger, shutdown: Shutdown) {
    let poller = ClusterStatePoller::new(
        Arc::clone(crm),
        PollerOptions {
            poll_interval: Duration::from_millis(500),
            get_timeout: Duration::from_millis(250),
            node_expiry: Duration::from_secs(30),
        },
        logger.with_component("poller"),
    )
    .watch(WatchedAttribute::new(
        PRIMARY_KEY,
        ClusterRole::Primary.selector().unwrap(),
        "id",
    ))
    .with_transform(Arc::new(ResolveAddress::new(Arc::clone(crm))));

    let mut subscriber = EventSubscriber::new(
        store.clone(),
        "/",
        Duration::from_millis(100),
        logger.with_component("subscriber"),
    );
    subscriber.add_handler(
        PRIMARY_KEY,
        "store-updater",
        Arc::new(StoreUpdater::new(
            store.clone(),
            PRIMARY_KEY,
            Duration::from_secs(1),
            logger.with_component("updater"),
        )),
    );

    let changes = poller.start(shutdown.clone());
    tokio::spawn(async move { subscriber.consume(changes, shutdown).await });
}

async fn wait_for_value(store: &MemoryStore, expected: &str) {
    for _ in 0..100 {
        if let Some(current) = store.get(PRIMARY_KEY).await.unwrap() {
            if current.value == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{} never became {}", PRIMARY_KEY, expected);
}

fn position(actions: &[String], action: &str) -> usize {
    actions
        .iter()
        .position(|a| a == action)
        .unwrap_or_else(|| panic!("{} not in {:?}", action, actions))
}

// =============================================================================
// Scenarios
// =============================================================================

/// The primary moves from pg01 to pg02 with every proxy paused around it.
#[tokio::test(start_paused = true)]
async fn test_failover_moves_primary_to_sync() {
    let (logger, capture) = Logger::memory("test");
    let fixture = fixture(None, Duration::from_secs(2), logger).await;

    fixture.coordinator.run(Shutdown::never()).await.unwrap();

    assert_eq!(fixture.cluster.primary(), "pg02");
    assert_eq!(
        fixture.store.get(PRIMARY_KEY).await.unwrap().unwrap().value,
        "10.0.0.2"
    );
    assert!(!fixture.store.is_locked(LOCK_NAME));

    let actions = fixture.cluster.actions();
    let migrate = position(&actions, "crm resource migrate msPostgresql pg02");
    let unmigrate = position(&actions, "crm resource unmigrate msPostgresql");

    for name in ["a", "b", "c"] {
        let pause = position(&actions, &format!("proxyctl pause {}", name));
        let resume = position(&actions, &format!("proxyctl resume {}", name));
        assert!(pause < migrate, "{} paused after migrate: {:?}", name, actions);
        assert!(migrate < resume, "{} resumed before migrate: {:?}", name, actions);
        assert!(resume < unmigrate, "{} resumed after unmigrate: {:?}", name, actions);
    }

    assert!(capture.contains_event(Event::PrimaryObserved));
    assert!(capture.contains_event(Event::FailoverComplete));
    assert!(!capture.contains_event(Event::CleanupError));

    fixture.trigger.trigger();
}

/// A proxy that cannot pause in time aborts the run before migration, and
/// traffic still resumes everywhere.
#[tokio::test(start_paused = true)]
async fn test_slow_pause_aborts_and_resumes_everyone() {
    let (logger, capture) = Logger::memory("test");
    let fixture = fixture(Some("b"), Duration::from_secs(2), logger).await;

    let err = fixture.coordinator.run(Shutdown::never()).await.unwrap_err();

    match &err {
        FailoverError::Pause(batch) => {
            assert_eq!(batch.failed, 1);
            assert_eq!(batch.total, 3);
            assert_eq!(batch.first.code, AgentErrorCode::DeadlineExceeded);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.agent_code(), Some(AgentErrorCode::DeadlineExceeded));

    let actions = fixture.cluster.actions();
    for name in ["a", "b", "c"] {
        position(&actions, &format!("proxyctl resume {}", name));
    }
    assert!(actions.iter().all(|a| !a.starts_with("crm resource")));

    assert_eq!(fixture.cluster.primary(), "pg01");
    assert!(!fixture.store.is_locked(LOCK_NAME));
    assert!(capture.contains_event(Event::FailoverError));

    fixture.trigger.trigger();
}

/// With no time to pause, every agent refuses, nothing is migrated, traffic
/// resumes everywhere and the lock is released.
#[tokio::test(start_paused = true)]
async fn test_zero_pause_timeout_aborts_and_resumes_everyone() {
    let fixture = fixture(None, Duration::ZERO, Logger::discard()).await;

    let err = fixture.coordinator.run(Shutdown::never()).await.unwrap_err();

    match &err {
        FailoverError::Pause(batch) => {
            assert_eq!(batch.failed, 3);
            assert_eq!(batch.first.code, AgentErrorCode::DeadlineExceeded);
        }
        other => panic!("unexpected error {:?}", other),
    }

    let actions = fixture.cluster.actions();
    for name in ["a", "b", "c"] {
        position(&actions, &format!("proxyctl resume {}", name));
        assert!(!actions.contains(&format!("proxyctl pause {}", name)));
    }
    assert!(actions.iter().all(|a| !a.starts_with("crm resource")));
    assert_eq!(fixture.cluster.primary(), "pg01");
    assert!(!fixture.store.is_locked(LOCK_NAME));

    fixture.trigger.trigger();
}

/// A second coordinator blocks on the lock while the first one holds it.
#[tokio::test(start_paused = true)]
async fn test_concurrent_failover_blocks_on_lock() {
    let fixture = fixture(None, Duration::from_secs(2), Logger::discard()).await;
    let held = fixture
        .store
        .lock(LOCK_NAME, Duration::from_secs(60))
        .await
        .unwrap();

    let err = fixture.coordinator.run(Shutdown::never()).await.unwrap_err();
    assert!(matches!(err, FailoverError::Lock(_)));

    // Nothing was paused, so nothing needs resuming
    assert!(fixture.cluster.actions().is_empty());
    assert_eq!(fixture.cluster.primary(), "pg01");

    fixture.store.unlock(&held).await.unwrap();
    fixture.trigger.trigger();
}
