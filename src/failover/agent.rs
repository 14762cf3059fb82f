//! # Failover Agent
//!
//! Server side of the failover protocol, one per cluster node. Drives the
//! local proxy and the cluster resource manager on behalf of a coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use super::client::AgentClient;
use super::errors::{AgentError, AgentResult};
use super::types::{
    timestamp, HealthCheckResponse, HealthStatus, MigrateResponse, PauseRequest, PauseResponse,
    ResumeResponse, UnmigrateResponse,
};
use crate::crm::{ClusterManager, Selector};
use crate::observability::{Event, Logger};
use crate::proxy::Proxy;
use crate::subscriber::error_chain;

pub struct FailoverAgent {
    proxy: Arc<dyn Proxy>,
    crm: Arc<dyn ClusterManager>,
    sync_selector: Selector,
    logger: Logger,
}

impl FailoverAgent {
    /// `sync_selector` locates the synchronous standby that `migrate` promotes
    pub fn new(
        proxy: Arc<dyn Proxy>,
        crm: Arc<dyn ClusterManager>,
        sync_selector: Selector,
        logger: Logger,
    ) -> Self {
        Self {
            proxy,
            crm,
            sync_selector,
            logger,
        }
    }

    /// Liveness only
    pub async fn health_check(&self) -> AgentResult<HealthCheckResponse> {
        Ok(HealthCheckResponse {
            status: HealthStatus::Healthy,
        })
    }

    /// Pause the proxy within `timeout` seconds. With a non-zero `expiry`,
    /// the proxy is resumed `expiry` seconds from now whether or not anyone
    /// calls resume.
    pub async fn pause(&self, request: PauseRequest) -> AgentResult<PauseResponse> {
        let started = Instant::now();
        let created_at = Utc::now();
        let deadline = started + Duration::from_secs(request.timeout);
        let expiry = Duration::from_secs(request.expiry);
        let expires_at = created_at
            + chrono::Duration::from_std(expiry)
                .map_err(|e| AgentError::unknown(format!("invalid expiry: {}", e)))?;

        if deadline <= Instant::now() {
            let err = AgentError::deadline_exceeded("exceeded pause timeout");
            self.logger
                .error(Event::ProxyPauseError, &[("error", &err.to_string())]);
            return Err(err);
        }

        self.logger.info(Event::ProxyPauseExecute, &[]);
        let outcome = tokio::time::timeout_at(deadline, self.proxy.pause()).await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) if Instant::now() < deadline => {
                Some(AgentError::unknown(format!("unknown error: {}", error_chain(&err))))
            }
            Ok(Err(_)) | Err(_) => Some(AgentError::deadline_exceeded("exceeded pause timeout")),
        };

        if let Some(err) = failure {
            self.logger
                .error(Event::ProxyPauseError, &[("error", &err.to_string())]);
            return Err(err);
        }

        if request.expiry > 0 {
            self.schedule_resume(started + expiry, timestamp::format(&expires_at));
        }

        Ok(PauseResponse {
            created_at,
            expires_at,
        })
    }

    fn schedule_resume(&self, at: Instant, at_wall: String) {
        let proxy = Arc::clone(&self.proxy);
        let logger = self.logger.clone();

        logger.info(Event::ProxyResumeSchedule, &[("at", &at_wall)]);
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            logger.info(Event::ProxyResumeExecute, &[("trigger", "expiry")]);
            if let Err(err) = proxy.resume().await {
                logger.error(Event::ProxyResumeError, &[("error", &error_chain(&err))]);
            }
        });
    }

    /// Resume the proxy. Safe to call when not paused.
    pub async fn resume(&self) -> AgentResult<ResumeResponse> {
        self.logger
            .info(Event::ProxyResumeExecute, &[("trigger", "request")]);

        self.proxy.resume().await.map_err(|err| {
            let message = error_chain(&err);
            self.logger.error(Event::ProxyResumeError, &[("error", &message)]);
            AgentError::unknown(format!("unknown error: {}", message))
        })?;

        Ok(ResumeResponse {
            created_at: Utc::now(),
        })
    }

    /// Migrate the managed resource onto the synchronous standby
    pub async fn migrate(&self) -> AgentResult<MigrateResponse> {
        let nodes = self
            .crm
            .get(std::slice::from_ref(&self.sync_selector))
            .await
            .map_err(|err| {
                let message = error_chain(&err);
                self.logger.error(Event::CrmQueryError, &[("error", &message)]);
                AgentError::unknown(format!("failed to query cib: {}", message))
            })?;

        let Some(sync) = nodes.into_iter().next().flatten() else {
            self.logger.error(Event::SyncNotFound, &[]);
            return Err(AgentError::not_found("failed to find sync node"));
        };

        let address = self.crm.resolve_address(sync.id()).await.map_err(|err| {
            let message = error_chain(&err);
            self.logger
                .error(Event::SyncCannotResolve, &[("error", &message), ("node", sync.uname())]);
            AgentError::not_found(format!("failed to resolve sync host address: {}", message))
        })?;

        self.crm.migrate(sync.uname()).await.map_err(|err| {
            let message = error_chain(&err);
            self.logger
                .error(Event::CrmMigrateError, &[("error", &message), ("node", sync.uname())]);
            AgentError::unknown(format!("migration to {} failed: {}", sync.uname(), message))
        })?;

        Ok(MigrateResponse {
            migrating_to: sync.uname().to_string(),
            address,
            created_at: Utc::now(),
        })
    }

    /// Remove the migration constraint
    pub async fn unmigrate(&self) -> AgentResult<UnmigrateResponse> {
        self.crm.unmigrate().await.map_err(|err| {
            let message = error_chain(&err);
            self.logger.error(Event::CrmUnmigrateError, &[("error", &message)]);
            AgentError::unknown(format!("unmigrate failed: {}", message))
        })?;

        Ok(UnmigrateResponse {
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl AgentClient for FailoverAgent {
    async fn health_check(&self) -> AgentResult<HealthCheckResponse> {
        FailoverAgent::health_check(self).await
    }

    async fn pause(&self, request: PauseRequest) -> AgentResult<PauseResponse> {
        FailoverAgent::pause(self, request).await
    }

    async fn resume(&self) -> AgentResult<ResumeResponse> {
        FailoverAgent::resume(self).await
    }

    async fn migrate(&self) -> AgentResult<MigrateResponse> {
        FailoverAgent::migrate(self).await
    }

    async fn unmigrate(&self) -> AgentResult<UnmigrateResponse> {
        FailoverAgent::unmigrate(self).await
    }
}
