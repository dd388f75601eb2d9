//! Synchronous client for a CouchDB-style document database HTTP API.
//!
//! # Overview
//! Manages databases and documents (CRUD, bulk writes, replication, view
//! compaction, user accounts) without the caller constructing HTTP requests
//! or parsing raw responses. The engine speaks HTTP/1.0 over one fresh TCP
//! socket per call and reads to end-of-stream — no pooling, no keep-alive,
//! no retries.
//!
//! # Design
//! - [`CouchClient`] holds the connection config and selected database;
//!   setters take `&mut self`, operations take `&self`.
//! - [`http`] keeps requests and responses as plain data: encoding and
//!   parsing are pure and testable without a network.
//! - Document bodies are schema-free [`serde_json::Value`]s.
//! - A decoded response body with a non-empty `error` field becomes
//!   [`Error::Couch`] carrying the HTTP status, whatever the status was.

pub mod client;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;
pub mod users;

pub use client::{AuthScheme, CouchClient};
pub use error::Error;
pub use http::{HttpInfo, HttpMethod, HttpRequest, RawResponse};
pub use types::{Body, BulkWrite, Replication, Response};
pub use users::UserUtils;
