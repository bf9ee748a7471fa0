//! Client context: the upstream interface to the cache.
//!
//! A `Client` is explicitly constructed and explicitly owned; there is no
//! ambient global instance. It wires the injected transport through the
//! interceptor, the normalizer, and the record store, and hands results back
//! as futures with first-class cancellation.

use crate::envelope::ResponseEnvelope;
use crate::intercept::{DetectionMode, ResponseInterceptor, Signal, SignalHandler};
use crate::normalize::{denormalize, normalize};
use crate::resolver::{KeyResolver, TypenameIdResolver};
use crate::storage::{EvictionPolicy, RecordStore};
use crate::transport::Transport;
use crate::types::{CacheError, Operation, OperationKind};
use eyre::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// How queries consult the cache. Mutations always hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Serve from cache when complete, otherwise fetch. Default.
    #[default]
    CacheFirst,

    /// Always fetch; responses still update the cache.
    NetworkOnly,

    /// Never touch the network; an incomplete cache is an error.
    CacheOnly,
}

/// The outcome of one executed operation.
#[derive(Debug, Clone)]
pub struct ExecutedResponse {
    /// The response `data` tree (reconstructed from cache or as received).
    pub data: Value,

    /// The interceptor's classification. Cache hits never saw the transport
    /// and carry `Neutral`.
    pub signal: Signal,

    pub from_cache: bool,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    store_path: Option<PathBuf>,
    eviction: EvictionPolicy,
    detection: DetectionMode,
    fetch_policy: FetchPolicy,
    resolver: Option<Arc<dyn KeyResolver>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            store_path: None,
            eviction: EvictionPolicy::NoEviction,
            detection: DetectionMode::Structured,
            fetch_policy: FetchPolicy::CacheFirst,
            resolver: None,
            transport: None,
        }
    }

    /// Back the store with a database file so records survive restarts.
    /// Without this the store is in-memory.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction = policy;
        self
    }

    pub fn detection_mode(mut self, mode: DetectionMode) -> Self {
        self.detection = mode;
        self
    }

    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Replace the default `TypenameIdResolver`.
    pub fn resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The transport is the one required piece.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Client> {
        let transport = self
            .transport
            .ok_or_else(|| eyre::eyre!("client requires a transport"))?;

        let store = match &self.store_path {
            Some(path) => RecordStore::open(path, self.eviction)?,
            None => RecordStore::in_memory(self.eviction)?,
        };

        Ok(Client {
            store: Arc::new(store),
            resolver: self.resolver.unwrap_or_else(|| Arc::new(TypenameIdResolver)),
            transport,
            interceptor: Arc::new(ResponseInterceptor::new(self.detection)),
            fetch_policy: self.fetch_policy,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client context for executing operations through the normalized cache.
///
/// Cloning is cheap and shares the store, so detached operations keep
/// working while the original handle stays usable.
#[derive(Clone)]
pub struct Client {
    store: Arc<RecordStore>,
    resolver: Arc<dyn KeyResolver>,
    transport: Arc<dyn Transport>,
    interceptor: Arc<ResponseInterceptor>,
    fetch_policy: FetchPolicy,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Register a handler for conflict/success signals.
    pub fn subscribe(&self, handler: SignalHandler) {
        self.interceptor.subscribe(handler);
    }

    /// Execute an operation to completion.
    ///
    /// Queries honor the configured fetch policy; mutations always go to the
    /// network. Network responses are classified by the interceptor and
    /// normalized into the store before this returns.
    pub async fn execute(&self, operation: &Operation) -> Result<ExecutedResponse> {
        match (operation.kind, self.fetch_policy) {
            (OperationKind::Mutation, _) | (OperationKind::Query, FetchPolicy::NetworkOnly) => {
                self.fetch_and_store(operation).await
            }

            (OperationKind::Query, FetchPolicy::CacheOnly) => match self.read_cached(operation)? {
                Some(data) => Ok(ExecutedResponse {
                    data,
                    signal: Signal::Neutral,
                    from_cache: true,
                }),
                None => Err(eyre::eyre!(CacheError::MissingRecord(operation.root_key()))),
            },

            (OperationKind::Query, FetchPolicy::CacheFirst) => {
                if let Some(data) = self.read_cached(operation)? {
                    log::debug!("serving '{}' from cache", operation.name);
                    return Ok(ExecutedResponse {
                        data,
                        signal: Signal::Neutral,
                        from_cache: true,
                    });
                }
                self.fetch_and_store(operation).await
            }
        }
    }

    /// Execute on a spawned task, returning a cancellable handle.
    pub fn execute_detached(&self, operation: Operation) -> OperationHandle {
        let client = self.clone();
        let join = tokio::spawn(async move { client.execute(&operation).await });
        OperationHandle { join }
    }

    /// Reconstruct an operation's result from the cache only.
    /// `None` means the cache cannot answer it completely.
    pub fn read_cached(&self, operation: &Operation) -> Result<Option<Value>> {
        denormalize(operation, &self.store, self.resolver.as_ref())
    }

    /// Remove one record, e.g. `"Task.1"` or a root key.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        log::debug!("invalidating record {}", key);
        self.store.delete(key)
    }

    /// Drop every cached record.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }

    /// Tear down the client, closing the store handle when this is the last
    /// reference to it.
    pub fn close(self) -> Result<()> {
        let Client { store, .. } = self;
        match Arc::try_unwrap(store) {
            Ok(store) => store.close(),
            Err(_) => {
                log::debug!("store still shared; deferring close to last handle");
                Ok(())
            }
        }
    }

    async fn fetch_and_store(&self, operation: &Operation) -> Result<ExecutedResponse> {
        let response = self
            .transport
            .send(operation)
            .await
            .map_err(|e| eyre::eyre!(CacheError::TransportFailure(e.to_string())))?;

        if !response.is_success() {
            return Err(eyre::eyre!(CacheError::TransportFailure(format!(
                "server returned status {}",
                response.status
            ))));
        }

        let signal = self.interceptor.inspect(&response);

        let envelope = ResponseEnvelope::parse(&response.body)
            .map_err(|e| eyre::eyre!(CacheError::MalformedResponseBody(e.to_string())))?;

        let data = envelope.data.unwrap_or(Value::Null);
        if data.is_object() {
            // One transaction per response: all records land together or not
            // at all, so cancellation can never leave a half-merged entity.
            let batch = normalize(&data, operation, self.resolver.as_ref())?;
            let count = batch.records.len();
            self.store.apply_batch(&batch.records)?;
            log::debug!("cached {} record(s) for '{}'", count, operation.name);
        } else if !envelope.errors.is_empty() {
            log::debug!(
                "response for '{}' carried errors and no data; cache untouched",
                operation.name
            );
        }

        Ok(ExecutedResponse {
            data,
            signal,
            from_cache: false,
        })
    }
}

/// Handle to a detached operation.
///
/// Dropping the handle does not cancel the operation; call [`cancel`] for
/// that. Cancellation cannot corrupt the store: a response batch already
/// committed stands, one not yet committed is never applied.
///
/// [`cancel`]: OperationHandle::cancel
pub struct OperationHandle {
    join: JoinHandle<Result<ExecutedResponse>>,
}

impl OperationHandle {
    /// Cancel the operation. Waiting afterwards yields `CacheError::Cancelled`.
    pub fn cancel(&self) {
        self.join.abort();
    }

    /// Whether the operation has completed (successfully, with an error, or
    /// by cancellation). Does not consume the handle.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> Result<ExecutedResponse> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(eyre::eyre!(CacheError::Cancelled)),
            Err(e) => Err(eyre::eyre!("operation task failed: {}", e)),
        }
    }
}
