//! Agent HTTP Binding Tests
//!
//! Routes are driven in process with `tower::ServiceExt::oneshot`; one test
//! goes over a real socket with the HTTP client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use pgswitch::crm::{ClusterRole, CommandExecutor, Crm, CrmResult, DEFAULT_RESOURCE};
use pgswitch::failover::{
    timestamp, AgentClient, AgentErrorCode, FailoverAgent, HealthStatus, HttpAgentClient,
    PauseRequest,
};
use pgswitch::http_server::{agent_routes, HttpServer, HttpServerConfig};
use pgswitch::observability::{Event, Logger};
use pgswitch::proxy::{Proxy, ProxyError, ProxyResult};
use pgswitch::shutdown;

/// Proxy whose pause takes `pause_delay`
#[derive(Default)]
struct TestProxy {
    pause_delay: Duration,
    pauses: AtomicUsize,
}

#[async_trait]
impl Proxy for TestProxy {
    async fn pause(&self) -> ProxyResult<()> {
        tokio::time::sleep(self.pause_delay).await;
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> ProxyResult<()> {
        Ok(())
    }

    async fn generate_config(&self, _host: &str) -> ProxyResult<()> {
        Err(ProxyError::NotConfigured("generate_config"))
    }

    async fn reload(&self) -> ProxyResult<()> {
        Err(ProxyError::NotConfigured("reload"))
    }
}

/// Cluster with a primary and no synchronous standby. Every crm command fails.
struct DegradedCluster;

#[async_trait]
impl CommandExecutor for DegradedCluster {
    async fn combined_output(&self, program: &str, _args: &[&str]) -> CrmResult<Vec<u8>> {
        match program {
            "cibadmin" => Ok(br#"<cib have-quorum="1"><configuration><nodes>
                <node id="1" uname="pg01"><instance_attributes id="a1">
                  <nvpair id="a1-s" name="pgsql-data-status" value="LATEST"/>
                </instance_attributes></node>
              </nodes></configuration></cib>"#
                .to_vec()),
            _ => Err(pgswitch::crm::CrmError::Command {
                command: program.to_string(),
                message: "exit status: 1".into(),
            }),
        }
    }
}

fn agent(proxy: Arc<TestProxy>, logger: Logger) -> Arc<FailoverAgent> {
    Arc::new(FailoverAgent::new(
        proxy,
        Arc::new(Crm::with_executor(Arc::new(DegradedCluster), DEFAULT_RESOURCE)),
        ClusterRole::SyncStandby.selector().unwrap(),
        logger,
    ))
}

async fn call(agent: Arc<FailoverAgent>, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = agent_routes(agent).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_reports_healthy() {
    let agent = agent(Arc::default(), Logger::discard());
    let (status, body) = call(agent, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "HEALTHY");
}

#[tokio::test]
async fn test_pause_returns_wire_timestamps() {
    let proxy = Arc::new(TestProxy::default());
    let agent = agent(proxy.clone(), Logger::discard());

    let (status, body) = call(
        agent,
        Method::POST,
        "/pause",
        Some(serde_json::json!({"timeout": 5, "expiry": 0})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(proxy.pauses.load(Ordering::SeqCst), 1);
    for field in ["created_at", "expires_at"] {
        let raw = body[field].as_str().unwrap();
        assert!(
            chrono::DateTime::parse_from_str(raw, timestamp::FORMAT).is_ok(),
            "{} = {}",
            field,
            raw
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_pause_is_gateway_timeout() {
    let proxy = Arc::new(TestProxy {
        pause_delay: Duration::from_secs(30),
        ..Default::default()
    });
    let agent = agent(proxy, Logger::discard());

    let (status, body) = call(
        agent,
        Method::POST,
        "/pause",
        Some(serde_json::json!({"timeout": 1, "expiry": 25})),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "DEADLINE_EXCEEDED");
}

#[tokio::test]
async fn test_migrate_without_sync_is_not_found() {
    let (logger, capture) = Logger::memory("agent");
    let agent = agent(Arc::default(), logger);

    let (status, body) = call(agent, Method::POST, "/migrate", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(capture.contains_event(Event::SyncNotFound));
}

#[tokio::test]
async fn test_unmigrate_failure_is_internal_error() {
    let agent = agent(Arc::default(), Logger::discard());

    let (status, body) = call(agent, Method::POST, "/unmigrate", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "UNKNOWN");
    assert!(body["message"].as_str().unwrap().contains("unmigrate"));
}

#[tokio::test]
async fn test_malformed_pause_body_is_rejected() {
    let agent = agent(Arc::default(), Logger::discard());
    let (status, _) = call(
        agent,
        Method::POST,
        "/pause",
        Some(serde_json::json!({"timeout": "soon"})),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_client_round_trip_over_socket() {
    let proxy = Arc::new(TestProxy::default());
    let (logger, capture) = Logger::memory("http");
    let server = HttpServer::with_config(
        HttpServerConfig::default(),
        agent(proxy.clone(), Logger::discard()),
        logger,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    let (trigger, shutdown) = shutdown::channel();
    let serving = tokio::spawn(server.serve(listener, shutdown));

    let client = HttpAgentClient::new(endpoint);
    assert_eq!(client.health_check().await.unwrap().status, HealthStatus::Healthy);
    client
        .pause(PauseRequest { timeout: 5, expiry: 0 })
        .await
        .unwrap();
    client.resume().await.unwrap();

    let err = client.migrate().await.unwrap_err();
    assert_eq!(err.code, AgentErrorCode::NotFound);

    drop(client);
    trigger.trigger();
    serving.await.unwrap().unwrap();

    assert_eq!(proxy.pauses.load(Ordering::SeqCst), 1);
    assert!(capture.contains_event(Event::ServerListen));
    assert!(capture.contains_event(Event::ServerShutdown));
}
