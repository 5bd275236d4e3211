//! Synchronous client for SuiteCRM's REST API (`service/v4_1/rest.php`).
//!
//! # Overview
//! `SessionClient` logs in, sends method calls and turns responses into
//! `Record` values. Calls travel through a `Call` implementation: a plain
//! `Connection`, or a `CachingClient` that answers repeated identical calls
//! from a bounded LRU. Server-declared errors come back as
//! `ApiError::Server` with a `FailureKind` from `classify`.
//!
//! # Design
//! - No globals: each client owns its session and cache, so several
//!   independent clients can live side by side.
//! - `Transport` is the only I/O seam. Requests and responses are plain data
//!   (`HttpRequest`/`HttpResponse`); `UreqTransport` is the default.
//! - Parameters are ordered `serde_json` maps and are sent in insertion
//!   order, as the server reads some of them positionally.
//! - A rejected session is renewed and the call retried exactly once.

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod record;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheStats, CachingClient, ResponseCache, DEFAULT_CAPACITY};
pub use config::Config;
pub use connection::{is_error_payload, Call, Connection, Parameters};
pub use error::{classify, ApiError, ConfigError, FailureCategory, FailureKind, ServerError};
pub use http::{HttpRequest, HttpResponse};
pub use record::{Record, RelatedRecord};
pub use session::{password_hash, CachedSuiteCrm, SessionClient, SuiteCrm};
pub use transport::{Transport, UreqTransport};
pub use types::{
    LinkFields, ListQuery, NoteAttachment, RecordPage, RecordQuery, RelatedQuery, RelationshipOutcome,
};
