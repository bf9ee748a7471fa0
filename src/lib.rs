//! Normcache: a normalized GraphQL response cache.
//!
//! Normcache flattens query and mutation responses into identity-keyed
//! records backed by SQLite, so updating one entity updates every cached
//! query result that references it. A response interceptor classifies every
//! completed response for server-reported write conflicts and success
//! signals. The HTTP transport is injected; this crate never opens a socket.
//!
//! # Example
//!
//! ```no_run
//! use normcache::{Client, Field, Operation, Selection, Signal, StaticTransport};
//! use std::sync::Arc;
//!
//! # async fn example() -> eyre::Result<()> {
//! let transport = Arc::new(StaticTransport::new());
//! let client = Client::builder()
//!     .store_path("tasks-cache.db")
//!     .transport(transport)
//!     .build()?;
//!
//! client.subscribe(Box::new(|signal| {
//!     if signal == Signal::Conflict {
//!         println!("conflict detected");
//!     }
//! }));
//!
//! let all_tasks = Operation::query(
//!     "AllTasks",
//!     "query AllTasks { allTasks { __typename id title } }",
//!     Selection::of([Field::new("allTasks").select(Selection::of([
//!         Field::new("__typename"),
//!         Field::new("id"),
//!         Field::new("title"),
//!     ]))]),
//! );
//!
//! let response = client.execute(&all_tasks).await?;
//! println!("from cache: {}", response.from_cache);
//! # Ok(())
//! # }
//! ```

mod envelope;
mod types;

pub mod client;
pub mod intercept;
pub mod normalize;
pub mod resolver;
pub mod storage;
pub mod transport;

// Re-export public API
pub use client::{Client, ClientBuilder, ExecutedResponse, FetchPolicy, OperationHandle};
pub use envelope::{GraphqlError, ResponseEnvelope};
pub use intercept::{CONFLICT_MARKER, DetectionMode, ResponseInterceptor, Signal, SignalHandler};
pub use normalize::{NormalizedBatch, denormalize, normalize};
pub use resolver::{KeyResolver, TypenameIdResolver};
pub use storage::{EvictionPolicy, RecordStore};
pub use transport::{RawResponse, StaticTransport, Transport, TransportError};
pub use types::{
    Argument, CacheError, CacheKey, Field, ID_FIELD, Operation, OperationKind, Record,
    RecordValue, Selection, TYPENAME_FIELD,
};
