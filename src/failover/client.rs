//! Client side of the failover RPC.
//!
//! [`AgentClient`] is what the coordinator talks to. The agent itself
//! implements it for in-process use; [`HttpAgentClient`] reaches a remote
//! agent over its HTTP binding.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::{AgentError, AgentErrorCode, AgentResult};
use super::types::{
    HealthCheckResponse, MigrateResponse, PauseRequest, PauseResponse, ResumeResponse,
    UnmigrateResponse,
};

/// The five failover operations, as seen by a caller
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn health_check(&self) -> AgentResult<HealthCheckResponse>;
    async fn pause(&self, request: PauseRequest) -> AgentResult<PauseResponse>;
    async fn resume(&self) -> AgentResult<ResumeResponse>;
    async fn migrate(&self) -> AgentResult<MigrateResponse>;
    async fn unmigrate(&self) -> AgentResult<UnmigrateResponse>;
}

/// Agent reached over HTTP at `http://<endpoint>`
pub struct HttpAgentClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAgentClient {
    /// `endpoint` is `host:port`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, reqwest::Client::new())
    }

    pub fn with_client(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.endpoint, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> AgentResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| unreachable(&self.endpoint, e))?;
        decode(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> AgentResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| unreachable(&self.endpoint, e))?;
        decode(response).await
    }
}

fn unreachable(endpoint: &str, err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        return AgentError::deadline_exceeded(format!("{}: {}", endpoint, err));
    }
    AgentError::unavailable(format!("{}: {}", endpoint, err))
}

/// Success bodies decode into `T`, error bodies into the agent's error
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> AgentResult<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| AgentError::unknown(format!("malformed response: {}", e)));
    }

    match response.json::<AgentError>().await {
        Ok(err) => Err(err),
        Err(_) => Err(AgentError::new(
            AgentErrorCode::Unknown,
            format!("unexpected status {}", status),
        )),
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn health_check(&self) -> AgentResult<HealthCheckResponse> {
        self.get("/health").await
    }

    async fn pause(&self, request: PauseRequest) -> AgentResult<PauseResponse> {
        self.post("/pause", &request).await
    }

    async fn resume(&self) -> AgentResult<ResumeResponse> {
        self.post("/resume", &()).await
    }

    async fn migrate(&self) -> AgentResult<MigrateResponse> {
        self.post("/migrate", &()).await
    }

    async fn unmigrate(&self) -> AgentResult<UnmigrateResponse> {
        self.post("/unmigrate", &()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = HttpAgentClient::new("10.0.0.1:8080");
        assert_eq!(client.url("/pause"), "http://10.0.0.1:8080/pause");
        assert_eq!(client.endpoint(), "10.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = HttpAgentClient::new(endpoint);
        let err = client.health_check().await.unwrap_err();
        assert_eq!(err.code, AgentErrorCode::Unavailable);
    }
}
