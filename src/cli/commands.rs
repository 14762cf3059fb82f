//! CLI command implementations
//!
//! `agent`, the supervisors, `failover` and `roles` read the configuration
//! file. The remaining commands are thin clients against one agent and take
//! no configuration.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::write_response;
use crate::crm::{ClusterManager, ClusterRole, CommandExecutor, Crm, CrmResult, SystemExecutor};
use crate::failover::{
    AgentClient, FailoverAgent, FailoverCoordinator, HttpAgentClient, PauseRequest, Peer,
    StoreLocker,
};
use crate::http_server::HttpServer;
use crate::observability::{Event, Logger};
use crate::poller::{ClusterStatePoller, ResolveAddress, WatchedAttribute};
use crate::proxy::{HostChanger, Proxy, ScriptedProxy};
use crate::shutdown::{self, Shutdown};
use crate::store::{CoordinationStore, EtcdStore, StoreUpdater};
use crate::streams::{dedupe_filter, key_stream, revision_filter};
use crate::subscriber::EventSubscriber;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        match cmd {
            Command::Agent { config } => agent(&config).await,
            Command::SuperviseCluster { config } => supervise_cluster(&config).await,
            Command::SuperviseProxy { config } => supervise_proxy(&config).await,
            Command::Failover { config } => failover(&config).await,
            Command::Roles { config } => roles(&config).await,
            Command::Health { endpoint } => {
                print(HttpAgentClient::new(endpoint).health_check().await?)
            }
            Command::Pause {
                endpoint,
                timeout,
                expiry,
            } => print(
                HttpAgentClient::new(endpoint)
                    .pause(PauseRequest { timeout, expiry })
                    .await?,
            ),
            Command::Resume { endpoint } => print(HttpAgentClient::new(endpoint).resume().await?),
            Command::Migrate { endpoint } => print(HttpAgentClient::new(endpoint).migrate().await?),
            Command::Unmigrate { endpoint } => {
                print(HttpAgentClient::new(endpoint).unmigrate().await?)
            }
        }
    })
}

fn print<T: Serialize>(response: T) -> CliResult<()> {
    write_response(serde_json::to_value(response)?)
}

/// Triggered by ctrl-c
fn shutdown_on_ctrl_c() -> Shutdown {
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.trigger();
        }
    });
    shutdown
}

fn etcd_store(config: &Config, logger: &Logger) -> Arc<dyn CoordinationStore> {
    Arc::new(EtcdStore::new(
        config.store.endpoint.clone(),
        config.store_timeout(),
        logger.with_component("store"),
    ))
}

/// Serve the failover agent until ctrl-c
pub async fn agent(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let logger = Logger::new("agent").with_level(config.log_level()?);

    let executor: Arc<dyn CommandExecutor> = Arc::new(SystemExecutor);
    let crm = Arc::new(Crm::with_executor(
        Arc::clone(&executor),
        config.crm.resource.clone(),
    ));
    let proxy = Arc::new(ScriptedProxy::new(executor, config.proxy.commands.clone()));

    let agent = Arc::new(FailoverAgent::new(
        proxy,
        crm,
        ClusterRole::SyncStandby.selector()?,
        logger.with_component("failover"),
    ));
    let server = HttpServer::with_config(config.agent.clone(), agent, logger.with_component("http"));

    server
        .start(shutdown_on_ctrl_c())
        .await
        .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
}

/// Mirror the primary's address from the CRM into the store until ctrl-c
pub async fn supervise_cluster(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let logger = Logger::new("supervise-cluster").with_level(config.log_level()?);

    let crm: Arc<dyn ClusterManager> = Arc::new(Crm::with_executor(
        Arc::new(SystemExecutor),
        config.crm.resource.clone(),
    ));
    let store = etcd_store(&config, &logger);

    mirror_primary(crm, store, &config, &logger, shutdown_on_ctrl_c()).await
}

/// Poll the CRM for the primary and write its address to the primary key.
/// Unchanged values are not rewritten.
pub async fn mirror_primary(
    crm: Arc<dyn ClusterManager>,
    store: Arc<dyn CoordinationStore>,
    config: &Config,
    logger: &Logger,
    shutdown: Shutdown,
) -> CliResult<()> {
    let key = config.store.primary_key.clone();

    let poller = ClusterStatePoller::new(
        Arc::clone(&crm),
        config.poller_options(),
        logger.with_component("poller"),
    )
    .watch(WatchedAttribute::new(
        key.clone(),
        ClusterRole::Primary.selector()?,
        "id",
    ))
    .with_transform(Arc::new(ResolveAddress::new(crm)));

    let mut subscriber = EventSubscriber::new(
        Arc::clone(&store),
        key.clone(),
        config.retry_interval(),
        logger.with_component("subscriber"),
    );
    subscriber.add_handler(
        key.clone(),
        "store-updater",
        Arc::new(StoreUpdater::new(
            store,
            key,
            config.store_timeout(),
            logger.with_component("updater"),
        )),
    );

    logger.info(Event::SuperviseStart, &[("supervisor", "cluster")]);
    subscriber
        .consume(poller.start(shutdown.clone()), shutdown)
        .await;
    logger.info(Event::SuperviseStop, &[("supervisor", "cluster")]);

    Ok(())
}

/// Keep the local proxy routed to the primary until ctrl-c
pub async fn supervise_proxy(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let logger = Logger::new("supervise-proxy").with_level(config.log_level()?);

    let proxy: Arc<dyn Proxy> = Arc::new(ScriptedProxy::new(
        Arc::new(SystemExecutor),
        config.proxy.commands.clone(),
    ));
    let store = etcd_store(&config, &logger);

    follow_primary(store, proxy, &config, &logger, shutdown_on_ctrl_c()).await
}

/// Repoint `proxy` every time the primary key takes a new value. The key is
/// watched and periodically re-read; repeats of an old revision or of the
/// current host never reach the proxy.
pub async fn follow_primary(
    store: Arc<dyn CoordinationStore>,
    proxy: Arc<dyn Proxy>,
    config: &Config,
    logger: &Logger,
    shutdown: Shutdown,
) -> CliResult<()> {
    let key = config.store.primary_key.clone();
    let stream_logger = logger.with_component("stream");

    let changes = key_stream(
        stream_logger.clone(),
        Arc::clone(&store),
        config.key_stream_options(),
        shutdown.clone(),
    );
    let changes = dedupe_filter(stream_logger.clone(), revision_filter(stream_logger, changes));

    let mut subscriber = EventSubscriber::new(
        store,
        key.clone(),
        config.retry_interval(),
        logger.with_component("subscriber"),
    );
    subscriber.add_handler(
        key,
        "host-changer",
        Arc::new(HostChanger::new(
            proxy,
            config.proxy_timeout(),
            logger.with_component("proxy"),
        )),
    );

    logger.info(Event::SuperviseStart, &[("supervisor", "proxy")]);
    subscriber.consume(changes, shutdown).await;
    logger.info(Event::SuperviseStop, &[("supervisor", "proxy")]);

    Ok(())
}

/// Fail the primary over to the synchronous standby. Ctrl-c abandons the run
/// after its cleanups.
pub async fn failover(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    if config.failover.endpoints.is_empty() {
        return Err(CliError::config_error(
            "failover.endpoints must list at least one agent",
        ));
    }
    let logger = Logger::new("failover").with_level(config.log_level()?);

    let peers = config
        .failover
        .endpoints
        .iter()
        .map(|endpoint| Peer::new(endpoint.clone(), Arc::new(HttpAgentClient::new(endpoint.clone()))))
        .collect();
    let store = etcd_store(&config, &logger);

    run_failover(store, peers, &config, &logger, shutdown_on_ctrl_c()).await
}

/// One coordinated failover, holding the lock named after the primary key
pub async fn run_failover(
    store: Arc<dyn CoordinationStore>,
    peers: Vec<Peer>,
    config: &Config,
    logger: &Logger,
    shutdown: Shutdown,
) -> CliResult<()> {
    let locker = Arc::new(StoreLocker::new(
        Arc::clone(&store),
        config.store.primary_key.clone(),
        config.lock_lease(),
    ));
    let coordinator = FailoverCoordinator::new(
        store,
        peers,
        locker,
        config.failover_options(),
        logger.with_component("coordinator"),
    );

    coordinator.run(shutdown).await?;
    Ok(())
}

/// Query the CRM once and print the node name per role
pub async fn roles(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let crm = Crm::with_executor(Arc::new(SystemExecutor), config.crm.resource.clone());

    let selectors = ClusterRole::ALL
        .iter()
        .map(|role| role.selector())
        .collect::<CrmResult<Vec<_>>>()?;
    let nodes = crm.get(&selectors).await?;

    write_response(Value::Object(role_names(nodes)))
}

fn role_names(nodes: Vec<Option<crate::crm::CrmNode>>) -> Map<String, Value> {
    ClusterRole::ALL
        .iter()
        .zip(nodes)
        .map(|(role, node)| {
            let name = node.map_or(Value::Null, |node| Value::String(node.uname().to_string()));
            (role.as_str().to_string(), name)
        })
        .collect()
}
