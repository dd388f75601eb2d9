//! The CouchDB client: connection configuration, the HTTP transaction
//! engine, and the document-level API.
//!
//! # Design
//! `CouchClient` owns the connection config (host, port, credentials,
//! decode flag) and the selected database. Setters take `&mut self`; every
//! operation takes `&self`, so the config is read-only for the duration of
//! a transaction. Each operation validates its own arguments, builds a path
//! and optional JSON body, and funnels through one `request` call:
//! build packet → one-shot socket exchange → interpret body.

use serde_json::Value;

use crate::error::Error;
use crate::http::{base64_encode, HttpMethod, HttpRequest, RawResponse};
use crate::transport;
use crate::types::{Body, BulkWrite, Replication, Response};

const USER_AGENT: &str = concat!("couch-core/", env!("CARGO_PKG_VERSION"));

/// Authentication scheme for [`CouchClient::login`]. HTTP Basic is the only
/// scheme the server API supports here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    Basic,
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: String,
    scheme: AuthScheme,
}

/// Synchronous, blocking CouchDB client. One socket per operation, no
/// pooling, no retries.
#[derive(Debug, Clone)]
pub struct CouchClient {
    host: String,
    port: u16,
    database: Option<String>,
    credentials: Option<Credentials>,
    decode_responses: bool,
}

impl Default for CouchClient {
    fn default() -> Self {
        Self::new("127.0.0.1", 5984)
    }
}

impl CouchClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            database: None,
            credentials: None,
            decode_responses: true,
        }
    }

    /// Store credentials for HTTP Basic authentication. Empty usernames and
    /// passwords are allowed; every subsequent request carries an
    /// `Authorization` header.
    pub fn login(&mut self, username: &str, password: &str) {
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
            scheme: AuthScheme::Basic,
        });
    }

    /// Control whether response bodies are decoded from JSON (the default)
    /// or handed back as raw text.
    pub fn set_decode_responses(&mut self, decode: bool) {
        self.decode_responses = decode;
    }

    /// Select the database that document-scoped operations target.
    pub fn set_database(&mut self, database: &str) {
        self.database = Some(database.to_string());
    }

    /// The currently selected database, if any.
    pub fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// GET `/{db}{path}`. `path` is appended verbatim, so it must begin
    /// with `/` — e.g. `"/doc1"` or `"/_design/app/_view/by_name?key=..."`.
    pub fn get(&self, path: &str) -> Result<Response, Error> {
        let db = self.database()?;
        self.request(HttpMethod::Get, &format!("/{db}{path}"), None, Vec::new())
    }

    /// PUT `doc` (which must be a JSON object) under `id`.
    pub fn put(&self, id: &str, doc: &Value) -> Result<Response, Error> {
        let db = self.database()?;

        if !doc.is_object() {
            return Err(Error::Validation(
                "put() needs an object for its data - are you trying to use delete()?".to_string(),
            ));
        }

        let body = serialize(doc)?;
        self.request(HttpMethod::Put, &format!("/{db}/{id}"), Some(body), Vec::new())
    }

    /// POST `doc` (which must be a JSON object), letting the server assign
    /// the document id.
    pub fn post(&self, doc: &Value) -> Result<Response, Error> {
        let db = self.database()?;

        if !doc.is_object() {
            return Err(Error::Validation("post() needs an object for its data".to_string()));
        }

        let body = serialize(doc)?;
        self.request(HttpMethod::Post, &format!("/{db}"), Some(body), Vec::new())
    }

    /// DELETE the document `id` at revision `rev`.
    pub fn delete(&self, id: &str, rev: &str) -> Result<Response, Error> {
        let db = self.database()?;

        if id.is_empty() || rev.is_empty() {
            return Err(Error::Validation(
                "delete() expects a non-empty id and revision".to_string(),
            ));
        }

        self.request(
            HttpMethod::Delete,
            &format!("/{db}/{id}?rev={rev}"),
            None,
            Vec::new(),
        )
    }

    /// Server-side COPY of `src_id` to `dst_id`, overwriting revision
    /// `dst_rev` of an existing destination when given.
    pub fn copy(&self, src_id: &str, dst_id: &str, dst_rev: Option<&str>) -> Result<Response, Error> {
        let db = self.database()?;

        if src_id.is_empty() {
            return Err(Error::Validation("copy() got an invalid source id".to_string()));
        }
        if dst_id.is_empty() {
            return Err(Error::Validation("copy() got an invalid destination id".to_string()));
        }
        if matches!(dst_rev, Some("")) {
            return Err(Error::Validation(
                "copy() got an invalid destination revision".to_string(),
            ));
        }

        let destination = match dst_rev {
            Some(rev) => format!("{dst_id}?rev={rev}"),
            None => dst_id.to_string(),
        };
        let headers = vec![("Destination".to_string(), destination)];

        self.request(HttpMethod::Copy, &format!("/{db}/{src_id}"), None, headers)
    }

    /// POST multiple documents to `/{db}/_bulk_docs` in one request.
    ///
    /// `all_or_nothing` defaults to true on the server side, so the field is
    /// only serialized when the caller opts out.
    pub fn bulk(&self, docs: &[Value], all_or_nothing: bool) -> Result<Response, Error> {
        let db = self.database()?;

        let payload = BulkWrite {
            all_or_nothing: (!all_or_nothing).then_some(false),
            docs,
        };
        let body = serialize(&payload)?;

        self.request(
            HttpMethod::Post,
            &format!("/{db}/_bulk_docs"),
            Some(body),
            Vec::new(),
        )
    }

    /// GET `/{db}/_all_docs` with the standard paging options. Key values
    /// are passed through as given; the caller percent-encodes anything
    /// beyond spaces and quotes.
    pub fn get_all_docs(
        &self,
        include_docs: bool,
        limit: Option<u64>,
        start_key: Option<&str>,
        end_key: Option<&str>,
    ) -> Result<Response, Error> {
        let db = self.database()?;
        let query = all_docs_query(include_docs, limit, start_key, end_key);
        self.request(HttpMethod::Get, &format!("/{db}/_all_docs?{query}"), None, Vec::new())
    }

    /// GET `/{db}/_all_docs_by_seq` with the same options as
    /// [`CouchClient::get_all_docs`].
    pub fn get_all_docs_by_seq(
        &self,
        include_docs: bool,
        limit: Option<u64>,
        start_key: Option<&str>,
        end_key: Option<&str>,
    ) -> Result<Response, Error> {
        let db = self.database()?;
        let query = all_docs_query(include_docs, limit, start_key, end_key);
        self.request(
            HttpMethod::Get,
            &format!("/{db}/_all_docs_by_seq?{query}"),
            None,
            Vec::new(),
        )
    }

    /// GET `/_all_dbs`. Not database-scoped.
    pub fn get_all_databases(&self) -> Result<Response, Error> {
        self.request(HttpMethod::Get, "/_all_dbs", None, Vec::new())
    }

    /// Ask the server for `count` fresh UUIDs.
    pub fn generate_ids(&self, count: u64) -> Result<Response, Error> {
        self.request(HttpMethod::Get, &format!("/_uuids?count={count}"), None, Vec::new())
    }

    /// PUT `/{name}` to create a database.
    pub fn create_database(&self, name: &str) -> Result<Response, Error> {
        if name.is_empty() {
            return Err(Error::Validation(
                "create_database() expected a valid database name".to_string(),
            ));
        }
        self.request(HttpMethod::Put, &format!("/{name}"), None, Vec::new())
    }

    /// DELETE `/{name}` to drop a database.
    pub fn delete_database(&self, name: &str) -> Result<Response, Error> {
        if name.is_empty() {
            return Err(Error::Validation(
                "delete_database() expected a valid database name".to_string(),
            ));
        }
        self.request(HttpMethod::Delete, &format!("/{name}"), None, Vec::new())
    }

    /// Trigger replication from `source` to `target`. `continuous` is only
    /// serialized when true.
    pub fn replicate(&self, source: &str, target: &str, continuous: bool) -> Result<Response, Error> {
        if source.is_empty() {
            return Err(Error::Validation(
                "replicate() is missing a source to replicate from".to_string(),
            ));
        }
        if target.is_empty() {
            return Err(Error::Validation(
                "replicate() is missing a target to replicate to".to_string(),
            ));
        }

        let payload = Replication {
            source,
            target,
            continuous: continuous.then_some(true),
        };
        let body = serialize(&payload)?;

        self.request(HttpMethod::Post, "/_replicate", Some(body), Vec::new())
    }

    /// POST `/{db}/_compact`, or `/{db}/_compact/{view}` to compact a
    /// single view index.
    pub fn compact(&self, view_name: Option<&str>) -> Result<Response, Error> {
        let db = self.database()?;
        let path = match view_name {
            Some(view) if !view.is_empty() => format!("/{db}/_compact/{view}"),
            _ => format!("/{db}/_compact"),
        };
        self.request(HttpMethod::Post, &path, None, Vec::new())
    }

    /// Assemble the outbound request for `method`/`path`: caller headers
    /// first, then the forced `Host` and `User-Agent`, then `Authorization`
    /// when credentials are configured.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        extra_headers: Vec<(String, String)>,
    ) -> HttpRequest {
        let mut request = HttpRequest {
            method,
            path: path.to_string(),
            headers: extra_headers,
            body,
        };

        request.set_header("Host", format!("{}:{}", self.host, self.port));
        request.set_header("User-Agent", USER_AGENT);

        if let Some(credentials) = &self.credentials {
            match credentials.scheme {
                AuthScheme::Basic => {
                    let token = base64_encode(
                        format!("{}:{}", credentials.username, credentials.password).as_bytes(),
                    );
                    request.set_header("Authorization", format!("Basic {token}"));
                }
            }
        }

        request
    }

    /// One full transaction: encode, exchange, interpret.
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        extra_headers: Vec<(String, String)>,
    ) -> Result<Response, Error> {
        let request = self.build_request(method, path, body, extra_headers);
        tracing::debug!(method = method.as_str(), path, "sending request");

        let raw = transport::exchange(&self.host, self.port, &request.encode())?;
        tracing::debug!(status = raw.info.status, "response received");

        self.interpret(raw)
    }

    /// Decode the body and finalize the response. The decode always runs so
    /// the error marker is detected even when the caller asked for raw
    /// bodies, and a detected marker takes precedence over a normal return.
    fn interpret(&self, raw: RawResponse) -> Result<Response, Error> {
        let RawResponse { info, headers, body } = raw;

        let decoded: Option<Value> = serde_json::from_str(&body).ok();

        if let Some(error) = decoded
            .as_ref()
            .and_then(|value| value.get("error"))
            .and_then(Value::as_str)
            .filter(|error| !error.is_empty())
        {
            let reason = decoded
                .as_ref()
                .and_then(|value| value.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(Error::Couch {
                message: format!("{error} ({reason})"),
                status: info.status,
            });
        }

        let body = if self.decode_responses {
            // A body that is not JSON decodes to null rather than failing.
            Body::Json(decoded.unwrap_or(Value::Null))
        } else {
            Body::Raw(body)
        };

        Ok(Response { info, headers, body })
    }

    fn database(&self) -> Result<&str, Error> {
        match self.database.as_deref() {
            Some(db) if !db.is_empty() => Ok(db),
            _ => Err(Error::Validation("no database specified".to_string())),
        }
    }
}

fn all_docs_query(
    include_docs: bool,
    limit: Option<u64>,
    start_key: Option<&str>,
    end_key: Option<&str>,
) -> String {
    let mut query = Vec::new();

    if include_docs {
        query.push("include_docs=true".to_string());
    }
    if let Some(key) = start_key {
        query.push(format!("startkey={key}"));
    }
    if let Some(key) = end_key {
        query.push(format!("endkey={key}"));
    }
    if let Some(limit) = limit {
        query.push(format!("limit={limit}"));
    }

    query.join("&")
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value)
        .map_err(|e| Error::Validation(format!("payload could not be serialized: {e}")))
}
