//! In-memory mock of a CouchDB-style HTTP API.
//!
//! Implements just enough of the REST surface for the client's integration
//! tests: database create/delete/list, document CRUD with revision
//! tracking (including the COPY verb and its `Destination` header), bulk
//! writes, `_all_docs` paging, `_uuids`, `_replicate`, and `_compact`.
//! Success and error bodies follow CouchDB's shapes: `{"ok":true,...}`,
//! `{"error":...,"reason":...}`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Databases by name, each a map of document id to document. Documents
/// carry their `_id` and `_rev` inline, as CouchDB stores them.
pub type Db = Arc<RwLock<HashMap<String, HashMap<String, Value>>>>;

type Reply = (StatusCode, Json<Value>);

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/_all_dbs", get(all_dbs))
        .route("/_uuids", get(uuids))
        .route("/_replicate", post(replicate))
        .route("/{db}", put(create_db).delete(delete_db).post(create_doc))
        .route("/{db}/_bulk_docs", post(bulk_docs))
        .route("/{db}/_all_docs", get(all_docs))
        .route("/{db}/_all_docs_by_seq", get(all_docs))
        .route("/{db}/_compact", post(compact))
        .route("/{db}/_compact/{view}", post(compact))
        .route("/{db}/{id}", any(document))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn couch_error(status: StatusCode, error: &str, reason: &str) -> Reply {
    (status, Json(json!({"error": error, "reason": reason})))
}

fn not_found() -> Reply {
    couch_error(StatusCode::NOT_FOUND, "not_found", "missing")
}

fn conflict() -> Reply {
    couch_error(StatusCode::CONFLICT, "conflict", "Document update conflict.")
}

/// Next revision token: generation counter, dash, fresh UUID.
fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split('-').next())
        .and_then(|generation| generation.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    format!("{generation}-{}", Uuid::new_v4().simple())
}

/// Store `doc` under `id`, enforcing CouchDB's revision rule: updating an
/// existing document requires supplying its current `_rev`.
fn store_doc(
    docs: &mut HashMap<String, Value>,
    id: &str,
    mut doc: Value,
) -> Result<String, Reply> {
    let current_rev = docs
        .get(id)
        .and_then(|existing| existing.get("_rev"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(current) = &current_rev {
        let supplied = doc.get("_rev").and_then(Value::as_str);
        if supplied != Some(current.as_str()) {
            return Err(conflict());
        }
    }

    let rev = next_rev(current_rev.as_deref());
    if let Some(fields) = doc.as_object_mut() {
        fields.insert("_id".to_string(), json!(id));
        fields.insert("_rev".to_string(), json!(rev));
    }
    docs.insert(id.to_string(), doc);

    Ok(rev)
}

// --- server-level routes ---

async fn all_dbs(State(db): State<Db>) -> Reply {
    let databases = db.read().await;
    let mut names: Vec<&String> = databases.keys().collect();
    names.sort();
    (StatusCode::OK, Json(json!(names)))
}

#[derive(Deserialize)]
struct UuidsQuery {
    count: Option<usize>,
}

async fn uuids(Query(query): Query<UuidsQuery>) -> Reply {
    let ids: Vec<String> = (0..query.count.unwrap_or(10))
        .map(|_| Uuid::new_v4().simple().to_string())
        .collect();
    (StatusCode::OK, Json(json!({ "uuids": ids })))
}

async fn replicate(Json(body): Json<Value>) -> Reply {
    let source = body.get("source").and_then(Value::as_str).unwrap_or("");
    let target = body.get("target").and_then(Value::as_str).unwrap_or("");
    if source.is_empty() || target.is_empty() {
        return couch_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "source and target are required",
        );
    }
    (StatusCode::OK, Json(json!({"ok": true})))
}

// --- database routes ---

async fn create_db(State(db): State<Db>, Path(name): Path<String>) -> Reply {
    let mut databases = db.write().await;
    if databases.contains_key(&name) {
        return couch_error(
            StatusCode::PRECONDITION_FAILED,
            "file_exists",
            "The database could not be created, the file already exists.",
        );
    }
    databases.insert(name, HashMap::new());
    (StatusCode::CREATED, Json(json!({"ok": true})))
}

async fn delete_db(State(db): State<Db>, Path(name): Path<String>) -> Reply {
    let mut databases = db.write().await;
    match databases.remove(&name) {
        Some(_) => (StatusCode::OK, Json(json!({"ok": true}))),
        None => not_found(),
    }
}

async fn create_doc(State(db): State<Db>, Path(name): Path<String>, body: String) -> Reply {
    let doc: Value = match serde_json::from_str(&body) {
        Ok(doc @ Value::Object(_)) => doc,
        _ => return couch_error(StatusCode::BAD_REQUEST, "bad_request", "invalid JSON object"),
    };

    let mut databases = db.write().await;
    let Some(docs) = databases.get_mut(&name) else {
        return not_found();
    };

    let id = doc
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    match store_doc(docs, &id, doc) {
        Ok(rev) => (StatusCode::CREATED, Json(json!({"ok": true, "id": id, "rev": rev}))),
        Err(reply) => reply,
    }
}

async fn bulk_docs(State(db): State<Db>, Path(name): Path<String>, body: String) -> Reply {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(_) => return couch_error(StatusCode::BAD_REQUEST, "bad_request", "invalid JSON"),
    };
    let Some(incoming) = payload.get("docs").and_then(Value::as_array).cloned() else {
        return couch_error(StatusCode::BAD_REQUEST, "bad_request", "missing docs field");
    };

    let mut databases = db.write().await;
    let Some(docs) = databases.get_mut(&name) else {
        return not_found();
    };

    let mut rows = Vec::new();
    for doc in incoming {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        match store_doc(docs, &id, doc) {
            Ok(rev) => rows.push(json!({"ok": true, "id": id, "rev": rev})),
            Err(_) => rows.push(json!({
                "id": id,
                "error": "conflict",
                "reason": "Document update conflict."
            })),
        }
    }

    (StatusCode::CREATED, Json(json!(rows)))
}

#[derive(Deserialize)]
struct AllDocsQuery {
    include_docs: Option<bool>,
    startkey: Option<String>,
    endkey: Option<String>,
    limit: Option<usize>,
}

async fn all_docs(
    State(db): State<Db>,
    Path(name): Path<String>,
    Query(query): Query<AllDocsQuery>,
) -> Reply {
    let databases = db.read().await;
    let Some(docs) = databases.get(&name) else {
        return not_found();
    };

    let mut ids: Vec<&String> = docs.keys().collect();
    ids.sort();

    // Keys arrive JSON-encoded; compare on the bare string.
    let start = query.startkey.as_deref().map(|key| key.trim_matches('"'));
    let end = query.endkey.as_deref().map(|key| key.trim_matches('"'));

    let mut rows = Vec::new();
    for id in ids {
        if start.is_some_and(|start| id.as_str() < start) {
            continue;
        }
        if end.is_some_and(|end| id.as_str() > end) {
            continue;
        }
        if query.limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }

        let doc = &docs[id];
        let rev = doc.get("_rev").and_then(Value::as_str).unwrap_or("");
        let mut row = json!({"id": id, "key": id, "value": {"rev": rev}});
        if query.include_docs == Some(true) {
            row["doc"] = doc.clone();
        }
        rows.push(row);
    }

    (
        StatusCode::OK,
        Json(json!({"total_rows": docs.len(), "offset": 0, "rows": rows})),
    )
}

async fn compact(State(db): State<Db>, Path(path): Path<Vec<String>>) -> Reply {
    let databases = db.read().await;
    let name = path.first().map(String::as_str).unwrap_or("");
    if !databases.contains_key(name) {
        return not_found();
    }
    (StatusCode::ACCEPTED, Json(json!({"ok": true})))
}

// --- document routes ---

#[derive(Deserialize)]
struct DocQuery {
    rev: Option<String>,
}

async fn document(
    State(db): State<Db>,
    Path((name, id)): Path<(String, String)>,
    Query(query): Query<DocQuery>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Reply {
    match method.as_str() {
        "GET" => get_doc(&db, &name, &id).await,
        "PUT" => put_doc(&db, &name, &id, &body).await,
        "DELETE" => delete_doc(&db, &name, &id, query.rev.as_deref()).await,
        "COPY" => copy_doc(&db, &name, &id, &headers).await,
        _ => couch_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Only GET, PUT, DELETE, and COPY are allowed",
        ),
    }
}

async fn get_doc(db: &Db, name: &str, id: &str) -> Reply {
    let databases = db.read().await;
    match databases.get(name).and_then(|docs| docs.get(id)) {
        Some(doc) => (StatusCode::OK, Json(doc.clone())),
        None => not_found(),
    }
}

async fn put_doc(db: &Db, name: &str, id: &str, body: &str) -> Reply {
    let doc: Value = match serde_json::from_str(body) {
        Ok(doc @ Value::Object(_)) => doc,
        _ => return couch_error(StatusCode::BAD_REQUEST, "bad_request", "invalid JSON object"),
    };

    let mut databases = db.write().await;
    let Some(docs) = databases.get_mut(name) else {
        return not_found();
    };

    match store_doc(docs, id, doc) {
        Ok(rev) => (StatusCode::CREATED, Json(json!({"ok": true, "id": id, "rev": rev}))),
        Err(reply) => reply,
    }
}

async fn delete_doc(db: &Db, name: &str, id: &str, rev: Option<&str>) -> Reply {
    let mut databases = db.write().await;
    let Some(docs) = databases.get_mut(name) else {
        return not_found();
    };
    let Some(current) = docs.get(id).and_then(|doc| doc.get("_rev")).and_then(Value::as_str)
    else {
        return not_found();
    };

    if rev != Some(current) {
        return conflict();
    }

    let deleted_rev = next_rev(Some(current));
    docs.remove(id);
    (
        StatusCode::OK,
        Json(json!({"ok": true, "id": id, "rev": deleted_rev})),
    )
}

async fn copy_doc(db: &Db, name: &str, id: &str, headers: &HeaderMap) -> Reply {
    let Some(destination) = headers.get("Destination").and_then(|v| v.to_str().ok()) else {
        return couch_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "Destination header is mandatory for COPY",
        );
    };
    let (dest_id, dest_rev) = match destination.split_once("?rev=") {
        Some((dest_id, rev)) => (dest_id, Some(rev)),
        None => (destination, None),
    };

    let mut databases = db.write().await;
    let Some(docs) = databases.get_mut(name) else {
        return not_found();
    };
    let Some(source) = docs.get(id).cloned() else {
        return not_found();
    };

    let current = docs
        .get(dest_id)
        .and_then(|doc| doc.get("_rev"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if current.is_some() && dest_rev != current.as_deref() {
        return conflict();
    }

    let rev = next_rev(current.as_deref());
    let mut copy = source;
    if let Some(fields) = copy.as_object_mut() {
        fields.insert("_id".to_string(), json!(dest_id));
        fields.insert("_rev".to_string(), json!(rev));
    }
    docs.insert(dest_id.to_string(), copy);

    (
        StatusCode::CREATED,
        Json(json!({"ok": true, "id": dest_id, "rev": rev})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_rev_starts_at_generation_one() {
        let rev = next_rev(None);
        assert!(rev.starts_with("1-"));
    }

    #[test]
    fn next_rev_bumps_the_generation() {
        let rev = next_rev(Some("3-abcdef"));
        assert!(rev.starts_with("4-"));
    }

    #[test]
    fn store_doc_rejects_update_without_matching_rev() {
        let mut docs = HashMap::new();
        let rev = store_doc(&mut docs, "a", json!({"x": 1})).unwrap();

        // No _rev on an existing doc: conflict.
        assert!(store_doc(&mut docs, "a", json!({"x": 2})).is_err());

        // Correct _rev: accepted, generation bumped.
        let updated = store_doc(&mut docs, "a", json!({"x": 2, "_rev": rev})).unwrap();
        assert!(updated.starts_with("2-"));
        assert_eq!(docs["a"]["x"], json!(2));
    }

    #[test]
    fn store_doc_stamps_id_and_rev_into_the_document() {
        let mut docs = HashMap::new();
        let rev = store_doc(&mut docs, "a", json!({"x": 1})).unwrap();
        assert_eq!(docs["a"]["_id"], json!("a"));
        assert_eq!(docs["a"]["_rev"], json!(rev));
    }
}
