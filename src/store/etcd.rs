//! etcd coordination store, spoken over the v3 JSON gateway.
//!
//! Keys and values travel base64 encoded, 64-bit integers as strings. Each
//! lock owns a lease of its own, revoked on unlock, so a coordinator that
//! dies mid-run loses the lock once the lease runs out.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::{CoordinationStore, KeyValue, LockHandle, WatchStream};
use crate::observability::{Event, Logger};

struct HeldLock {
    /// Ownership key returned by the lock service, still encoded
    key: String,
    lease: i64,
}

/// Coordination store backed by an etcd cluster
pub struct EtcdStore {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
    held: Mutex<HashMap<Uuid, HeldLock>>,
    logger: Logger,
}

impl EtcdStore {
    /// `endpoint` is the gateway base URL, e.g. `http://127.0.0.1:2379`.
    /// `timeout` bounds every call except watch streams and lock waits.
    pub fn new(endpoint: impl Into<String>, timeout: Duration, logger: Logger) -> Self {
        Self::with_client(endpoint, timeout, reqwest::Client::new(), logger)
    }

    pub fn with_client(
        endpoint: impl Into<String>,
        timeout: Duration,
        client: reqwest::Client,
        logger: Logger,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            client,
            held: Mutex::new(HashMap::new()),
            logger,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3/{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn held(&self) -> StoreResult<MutexGuard<'_, HashMap<Uuid, HeldLock>>> {
        self.held
            .lock()
            .map_err(|_| StoreError::Unavailable("lock table poisoned".into()))
    }

    async fn send(&self, path: &str, body: Value, timeout: Option<Duration>) -> StoreResult<reqwest::Response> {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| transport(path, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Unavailable(format!(
            "{}: status {}: {}",
            path,
            status,
            body.trim()
        )))
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value, timeout: Option<Duration>) -> StoreResult<T> {
        self.send(path, body, timeout)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: malformed response: {}", path, e)))
    }

    async fn revoke(&self, lease: i64) -> StoreResult<()> {
        self.call::<Value>("lease/revoke", json!({ "ID": lease }), Some(self.timeout))
            .await
            .map(|_| ())
    }
}

fn transport(path: &str, err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        return StoreError::Timeout(format!("{}: {}", path, err));
    }
    StoreError::Unavailable(format!("{}: {}", path, err))
}

fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

fn decode_text(encoded: &str) -> StoreResult<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StoreError::Unavailable(format!("undecodable base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Unavailable(format!("non-utf8 value: {}", e)))
}

/// Smallest key above every key starting with `prefix`
fn prefix_end(prefix: &str) -> Vec<u8> {
    let mut end = prefix.as_bytes().to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // "\0" as range end means every key from the start key on
    vec![0]
}

/// 64-bit integers arrive as JSON strings, occasionally as numbers
fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Text(String),
        Number(i64),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Default, Deserialize)]
struct Header {
    #[serde(default, deserialize_with = "int64")]
    revision: i64,
}

#[derive(Debug, Deserialize)]
struct WireKeyValue {
    key: String,
    /// Omitted for empty values
    #[serde(default)]
    value: String,
    #[serde(default, deserialize_with = "int64")]
    mod_revision: i64,
}

impl WireKeyValue {
    fn decode(self) -> StoreResult<KeyValue> {
        Ok(KeyValue::new(
            decode_text(&self.key)?,
            decode_text(&self.value)?,
            self.mod_revision,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<WireKeyValue>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    #[serde(default)]
    header: Header,
}

#[derive(Debug, Deserialize)]
struct TxnResponse {
    #[serde(default)]
    succeeded: bool,
}

#[derive(Debug, Deserialize)]
struct LeaseGrantResponse {
    #[serde(rename = "ID", deserialize_with = "int64")]
    id: i64,
}

#[derive(Debug, Deserialize)]
struct LockResponse {
    key: String,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    /// PUT is the zero value and omitted
    #[serde(rename = "type", default)]
    kind: Option<String>,
    kv: WireKeyValue,
}

#[derive(Debug, Default, Deserialize)]
struct WatchResult {
    #[serde(default)]
    created: bool,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    events: Vec<WireEvent>,
}

impl WatchResult {
    /// Writes only; deletes carry no value to act on
    fn into_key_values(self) -> StoreResult<Vec<KeyValue>> {
        self.events
            .into_iter()
            .filter(|event| event.kind.as_deref().map_or(true, |kind| kind == "PUT"))
            .map(|event| event.kv.decode())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct WatchFrame {
    result: Option<WatchResult>,
    error: Option<Value>,
}

fn decode_frame(line: &[u8]) -> StoreResult<WatchResult> {
    let frame: WatchFrame = serde_json::from_slice(line)
        .map_err(|e| StoreError::Unavailable(format!("watch: malformed frame: {}", e)))?;

    match (frame.result, frame.error) {
        (_, Some(error)) => Err(StoreError::Unavailable(format!("watch: {}", error))),
        (Some(result), None) => Ok(result),
        (None, None) => Err(StoreError::Unavailable("watch: empty frame".into())),
    }
}

/// Splits the newline-delimited watch response into frames
struct WatchReader {
    response: reqwest::Response,
    buffer: Vec<u8>,
}

impl WatchReader {
    async fn next(&mut self) -> StoreResult<Option<WatchResult>> {
        loop {
            if let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=end).collect();
                if is_blank(&line) {
                    continue;
                }
                return decode_frame(&line).map(Some);
            }

            match self.response.chunk().await.map_err(|e| transport("watch", e))? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None if is_blank(&self.buffer) => return Ok(None),
                None => {
                    let line = std::mem::take(&mut self.buffer);
                    return decode_frame(&line).map(Some);
                }
            }
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>> {
        let response: RangeResponse = self
            .call("kv/range", json!({ "key": encode(key) }), Some(self.timeout))
            .await?;

        response
            .kvs
            .into_iter()
            .next()
            .map(WireKeyValue::decode)
            .transpose()
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<KeyValue> {
        let response: PutResponse = self
            .call(
                "kv/put",
                json!({ "key": encode(key), "value": encode(value) }),
                Some(self.timeout),
            )
            .await?;

        Ok(KeyValue::new(key, value, response.header.revision))
    }

    async fn put_if_changed(&self, key: &str, value: &str) -> StoreResult<bool> {
        // A value compare against a missing key fails, so absent keys are written
        let body = json!({
            "compare": [{
                "key": encode(key),
                "target": "VALUE",
                "result": "EQUAL",
                "value": encode(value),
            }],
            "failure": [{
                "request_put": { "key": encode(key), "value": encode(value) },
            }],
        });

        let response: TxnResponse = self.call("kv/txn", body, Some(self.timeout)).await?;
        Ok(!response.succeeded)
    }

    /// Returns once the watch is established, so writes made after this
    /// call are always delivered.
    async fn watch_prefix(&self, prefix: &str) -> StoreResult<WatchStream> {
        let body = json!({
            "create_request": {
                "key": encode(prefix),
                "range_end": encode(prefix_end(prefix)),
            },
        });
        let response = self.send("watch", body, None).await?;
        let mut reader = WatchReader {
            response,
            buffer: Vec::new(),
        };

        let created = tokio::time::timeout(self.timeout, reader.next())
            .await
            .map_err(|_| StoreError::Timeout(format!("watch {}: not created", prefix)))??;
        if !created.map_or(false, |result| result.created) {
            return Err(StoreError::Unavailable(format!(
                "watch {}: stream ended before creation",
                prefix
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let logger = self.logger.clone();
        let prefix = prefix.to_string();

        tokio::spawn(async move {
            loop {
                let result = match reader.next().await {
                    Ok(Some(result)) => result,
                    Ok(None) => break,
                    Err(err) => {
                        logger.error(Event::WatchError, &[("error", &err.to_string()), ("prefix", &prefix)]);
                        break;
                    }
                };
                let canceled = result.canceled;

                match result.into_key_values() {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        logger.error(Event::WatchError, &[("error", &err.to_string()), ("prefix", &prefix)]);
                        break;
                    }
                }

                if canceled {
                    logger.error(Event::WatchError, &[("error", "canceled by server"), ("prefix", &prefix)]);
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Waits for the current holder without a bound; callers time it out.
    /// An abandoned wait leaves its lease to expire on its own.
    async fn lock(&self, name: &str, lease: Duration) -> StoreResult<LockHandle> {
        let ttl = lease.as_secs().max(1);
        let granted: LeaseGrantResponse = self
            .call("lease/grant", json!({ "TTL": ttl }), Some(self.timeout))
            .await?;

        let locked: StoreResult<LockResponse> = self
            .call(
                "lock/lock",
                json!({ "name": encode(name), "lease": granted.id }),
                None,
            )
            .await;
        let locked = match locked {
            Ok(locked) => locked,
            Err(err) => {
                if let Err(revoke) = self.revoke(granted.id).await {
                    self.logger.warn(
                        Event::LockRelease,
                        &[("error", &revoke.to_string()), ("lock", name)],
                    );
                }
                return Err(err);
            }
        };

        let owner = Uuid::new_v4();
        self.held()?.insert(
            owner,
            HeldLock {
                key: locked.key,
                lease: granted.id,
            },
        );

        Ok(LockHandle {
            name: name.to_string(),
            owner,
        })
    }

    async fn unlock(&self, handle: &LockHandle) -> StoreResult<()> {
        let held = self
            .held()?
            .remove(&handle.owner)
            .ok_or_else(|| StoreError::NotLockHolder(handle.name.clone()))?;

        let unlocked = self
            .call::<Value>("lock/unlock", json!({ "key": held.key }), Some(self.timeout))
            .await
            .map(|_| ());
        // Revoking the lease also drops the ownership key
        let revoked = self.revoke(held.lease).await;

        unlocked.or(revoked)
    }
}
