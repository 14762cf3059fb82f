//! # HTTP Server
//!
//! Serves one failover agent until shutdown is signalled.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use super::agent_routes::agent_routes;
use super::config::HttpServerConfig;
use crate::failover::FailoverAgent;
use crate::observability::{Event, Logger};
use crate::shutdown::Shutdown;

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
    logger: Logger,
}

impl HttpServer {
    pub fn with_config(config: HttpServerConfig, agent: Arc<FailoverAgent>, logger: Logger) -> Self {
        Self {
            config,
            router: agent_routes(agent),
            logger,
        }
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn start(self, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener. In-flight requests finish
    /// before this returns.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?.to_string();
        self.logger.info(Event::ServerListen, &[("addr", &addr)]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        self.logger.info(Event::ServerShutdown, &[("addr", &addr)]);
        Ok(())
    }
}
