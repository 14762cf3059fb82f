//! # Failover Coordinator
//!
//! Client side of the failover protocol. One run:
//!
//! 1. health check every agent
//! 2. take the failover lock
//! 3. pause every proxy
//! 4. ask one agent to migrate the primary
//! 5. wait for the store to report the new primary address
//!
//! Each phase arms its cleanup before it can fail. Armed cleanups run on
//! every exit path, including shutdown and a panicking phase, in a fixed
//! order: resume traffic, remove the migration constraint, release the lock.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use super::client::AgentClient;
use super::errors::{AgentError, AgentResult, BatchError, FailoverError, FailoverResult};
use super::lock::Locker;
use super::types::{HealthStatus, MigrateResponse, PauseRequest};
use crate::observability::{Event, Logger};
use crate::shutdown::{self, Shutdown};
use crate::store::{CoordinationStore, StoreError};
use crate::streams::{key_stream, revision_filter, KeyStreamOptions};
use crate::subscriber::error_chain;

/// Slack on top of the agent-side pause timeout for the call itself
const PAUSE_ROUND_TRIP: Duration = Duration::from_secs(1);

/// Agents take seconds on the wire; partial seconds round up
fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Timeouts for one failover run
#[derive(Debug, Clone)]
pub struct FailoverOptions {
    /// Store key mirroring the primary address
    pub primary_key: String,
    pub health_check_timeout: Duration,
    pub lock_timeout: Duration,
    /// Bounds each proxy pause call
    pub pause_timeout: Duration,
    /// How long proxies stay paused before they resume on their own. Also
    /// bounds the wait for the new primary.
    pub pause_expiry: Duration,
    pub resume_timeout: Duration,
    /// Bounds the migrate and unmigrate calls themselves
    pub pacemaker_timeout: Duration,
    /// Re-read interval while waiting for the new primary
    pub primary_poll_interval: Duration,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            primary_key: "/master".to_string(),
            health_check_timeout: Duration::from_secs(2),
            lock_timeout: Duration::from_secs(5),
            pause_timeout: Duration::from_secs(5),
            pause_expiry: Duration::from_secs(25),
            resume_timeout: Duration::from_secs(5),
            pacemaker_timeout: Duration::from_secs(20),
            primary_poll_interval: Duration::from_secs(1),
        }
    }
}

/// An agent and the endpoint it is known by
#[derive(Clone)]
pub struct Peer {
    pub endpoint: String,
    pub client: Arc<dyn AgentClient>,
}

impl Peer {
    pub fn new(endpoint: impl Into<String>, client: Arc<dyn AgentClient>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

/// Cleanups armed so far in a run
#[derive(Debug, Default)]
struct Armed {
    resume: AtomicBool,
    unmigrate: AtomicBool,
    release_lock: AtomicBool,
}

impl Armed {
    fn arm(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    fn is_armed(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

/// Run `call` against every peer concurrently, each bounded by `timeout`.
/// Succeeds only if every call succeeds; otherwise reports how many failed.
pub async fn batch<F, Fut>(
    peers: &[Peer],
    operation: &'static str,
    timeout: Duration,
    logger: &Logger,
    call: F,
) -> Result<(), BatchError>
where
    F: Fn(Arc<dyn AgentClient>) -> Fut,
    Fut: Future<Output = AgentResult<()>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, peer) in peers.iter().enumerate() {
        let pending = call(Arc::clone(&peer.client));
        tasks.spawn(async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, pending).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::deadline_exceeded(format!(
                    "{} exceeded {:?}",
                    operation, timeout
                ))),
            };
            (index, started.elapsed(), result)
        });
    }

    let mut results: Vec<Option<AgentResult<()>>> = vec![None; peers.len()];
    while let Some(joined) = tasks.join_next().await {
        // A panicked call leaves its slot empty
        let Ok((index, elapsed, result)) = joined else { continue };

        let elapsed = format!("{:.3}", elapsed.as_secs_f64());
        let endpoint = peers[index].endpoint.as_str();
        match &result {
            Ok(()) => logger.info(
                Event::ClientResult,
                &[("elapsed", &elapsed), ("endpoint", endpoint), ("operation", operation)],
            ),
            Err(err) => logger.error(
                Event::ClientResult,
                &[
                    ("elapsed", &elapsed),
                    ("endpoint", endpoint),
                    ("error", &err.to_string()),
                    ("operation", operation),
                ],
            ),
        }
        results[index] = Some(result);
    }

    let mut failed = 0;
    let mut first = None;
    for result in results {
        let err = match result {
            Some(Ok(())) => continue,
            Some(Err(err)) => err,
            None => AgentError::unknown(format!("{} call aborted", operation)),
        };
        failed += 1;
        first.get_or_insert(err);
    }

    match first {
        None => Ok(()),
        Some(first) => Err(BatchError {
            operation,
            failed,
            total: peers.len(),
            first,
        }),
    }
}

/// Orchestrates a full failover across every agent
#[derive(Clone)]
pub struct FailoverCoordinator {
    store: Arc<dyn CoordinationStore>,
    peers: Vec<Peer>,
    locker: Arc<dyn Locker>,
    options: FailoverOptions,
    logger: Logger,
}

impl FailoverCoordinator {
    /// Migration is requested from the first peer
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        peers: Vec<Peer>,
        locker: Arc<dyn Locker>,
        options: FailoverOptions,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            peers,
            locker,
            options,
            logger,
        }
    }

    /// Run one failover. The run continues on its own task, so dropping the
    /// returned future does not skip cleanup; trigger `shutdown` to abandon
    /// it early.
    pub async fn run(&self, shutdown: Shutdown) -> FailoverResult<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_with_cleanup(shutdown).await })
            .await
            .unwrap_or_else(|e| Err(FailoverError::Aborted(e.to_string())))
    }

    async fn run_with_cleanup(self, shutdown: Shutdown) -> FailoverResult<()> {
        if self.peers.is_empty() {
            return Err(FailoverError::NoAgents);
        }

        let armed = Arc::new(Armed::default());
        let mut phases = tokio::spawn({
            let this = self.clone();
            let armed = Arc::clone(&armed);
            async move { this.phases(&armed).await }
        });

        let finished = tokio::select! {
            joined = &mut phases => Some(joined),
            _ = shutdown.cancelled() => None,
        };

        let result = match finished {
            Some(joined) => joined.unwrap_or_else(|e| Err(FailoverError::Aborted(e.to_string()))),
            None => {
                phases.abort();
                let _ = phases.await;
                Err(FailoverError::Cancelled)
            }
        };

        self.cleanup(&armed).await;

        match &result {
            Ok(()) => self.logger.info(Event::FailoverComplete, &[]),
            Err(err) => self
                .logger
                .error(Event::FailoverError, &[("error", &error_chain(err))]),
        }
        result
    }

    async fn phases(&self, armed: &Armed) -> FailoverResult<()> {
        self.health_check().await?;

        self.logger.info(Event::LockAcquire, &[]);
        let lock_timeout = self.options.lock_timeout;
        tokio::time::timeout(lock_timeout, self.locker.lock())
            .await
            .map_err(|_| {
                FailoverError::Lock(StoreError::Timeout(format!(
                    "lock not acquired within {:?}",
                    lock_timeout
                )))
            })?
            .map_err(FailoverError::Lock)?;
        Armed::arm(&armed.release_lock);

        // Some proxies may pause even if others fail
        Armed::arm(&armed.resume);
        self.pause().await?;

        let peer = &self.peers[0];
        self.logger
            .info(Event::ClientsMigrate, &[("endpoint", &peer.endpoint)]);
        // A failed migrate may still have applied the constraint
        Armed::arm(&armed.unmigrate);
        let migrated = tokio::time::timeout(self.options.pacemaker_timeout, peer.client.migrate())
            .await
            .unwrap_or_else(|_| Err(AgentError::deadline_exceeded("exceeded pacemaker timeout")))
            .map_err(|source| {
                self.logger.error(
                    Event::ClientResult,
                    &[
                        ("endpoint", &peer.endpoint),
                        ("error", &source.to_string()),
                        ("operation", "migrate"),
                    ],
                );
                FailoverError::Migrate {
                    endpoint: peer.endpoint.clone(),
                    source,
                }
            })?;

        self.wait_for_primary(&migrated).await
    }

    async fn health_check(&self) -> FailoverResult<()> {
        self.logger.info(Event::ClientsHealthCheck, &[]);

        batch(
            &self.peers,
            "health check",
            self.options.health_check_timeout,
            &self.logger,
            |client| async move {
                let response = client.health_check().await?;
                match response.status {
                    HealthStatus::Healthy => Ok(()),
                    status => Err(AgentError::unknown(format!(
                        "received non-healthy response: {:?}",
                        status
                    ))),
                }
            },
        )
        .await
        .map_err(FailoverError::HealthCheck)
    }

    async fn pause(&self) -> FailoverResult<()> {
        self.logger.info(Event::ClientsPause, &[]);

        let request = PauseRequest {
            timeout: whole_seconds(self.options.pause_timeout),
            expiry: whole_seconds(self.options.pause_expiry),
        };

        batch(
            &self.peers,
            "pause",
            Duration::from_secs(request.timeout) + PAUSE_ROUND_TRIP,
            &self.logger,
            move |client| async move { client.pause(request).await.map(|_| ()) },
        )
        .await
        .map_err(FailoverError::Pause)
    }

    async fn wait_for_primary(&self, migrated: &MigrateResponse) -> FailoverResult<()> {
        self.logger.info(
            Event::WaitForPrimary,
            &[
                ("address", &migrated.address),
                ("key", &self.options.primary_key),
                ("target", &migrated.migrating_to),
            ],
        );

        let (trigger, stream_shutdown) = shutdown::channel();
        let _stop_stream = trigger.into_guard();

        let changes = key_stream(
            self.logger.clone(),
            Arc::clone(&self.store),
            KeyStreamOptions {
                keys: vec![self.options.primary_key.clone()],
                poll_interval: self.options.primary_poll_interval,
                get_timeout: self.options.primary_poll_interval,
            },
            stream_shutdown,
        );
        let mut changes = revision_filter(self.logger.clone(), changes);

        let observed = async {
            while let Some(change) = changes.recv().await {
                if change.value == migrated.address {
                    return;
                }
            }
            std::future::pending::<()>().await
        };

        tokio::select! {
            _ = observed => {
                self.logger.info(
                    Event::PrimaryObserved,
                    &[("address", &migrated.address), ("target", &migrated.migrating_to)],
                );
                Ok(())
            }
            _ = tokio::time::sleep(self.options.pause_expiry) => {
                Err(FailoverError::PrimaryNotObserved {
                    target: migrated.migrating_to.clone(),
                    address: migrated.address.clone(),
                    timeout: self.options.pause_expiry,
                })
            }
        }
    }

    async fn cleanup(&self, armed: &Armed) {
        if Armed::is_armed(&armed.resume) {
            self.logger.info(Event::ClientsResume, &[]);
            let resumed = batch(
                &self.peers,
                "resume",
                self.options.resume_timeout,
                &self.logger,
                |client| async move { client.resume().await.map(|_| ()) },
            )
            .await;

            if let Err(err) = resumed {
                self.logger.error(
                    Event::CleanupError,
                    &[("action", "resume"), ("error", &error_chain(&err))],
                );
            }
        }

        if Armed::is_armed(&armed.unmigrate) {
            let peer = &self.peers[0];
            self.logger
                .info(Event::ClientsUnmigrate, &[("endpoint", &peer.endpoint)]);

            let unmigrated = tokio::time::timeout(self.options.pacemaker_timeout, peer.client.unmigrate())
                .await
                .unwrap_or_else(|_| Err(AgentError::deadline_exceeded("exceeded pacemaker timeout")));

            // Never retried: an operator has to clear the constraint
            if let Err(err) = unmigrated {
                self.logger.error(
                    Event::CleanupError,
                    &[
                        ("action", "unmigrate"),
                        ("endpoint", &peer.endpoint),
                        ("error", &err.to_string()),
                        ("msg", "manual action required to unmigrate cluster"),
                    ],
                );
            }
        }

        if Armed::is_armed(&armed.release_lock) {
            self.logger.info(Event::LockRelease, &[]);

            let released = tokio::time::timeout(self.options.lock_timeout, self.locker.unlock())
                .await
                .unwrap_or_else(|_| Err(StoreError::Timeout("lock release".into())));

            if let Err(err) = released {
                self.logger.error(
                    Event::CleanupError,
                    &[("action", "release lock"), ("error", &err.to_string())],
                );
            }
        }
    }
}
