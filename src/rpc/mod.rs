mod handlers;

use crate::bundles::HttpBundles;
use crate::config::Config;
use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::Error;
use crate::store::Store;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hard cap on a single reference page, keeping responses bounded no
/// matter what limit the caller asks for.
const MAX_PAGE_LIMIT: usize = 500;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

pub const METHOD_LIST: &[&str] = &[
    // -- Position queries --
    "definitions", // where is the symbol at a position defined
    "references",  // cursor-paginated references across dumps and repos
    "hover",       // hover documentation, falling back to the definition site
    "exists",      // which dumps can answer queries for a path
    // -- Upload management --
    "get_upload",
    "list_uploads",
    "delete_upload",
    // -- Introspection --
    "help",
    "list_methods",
];

#[derive(Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    pub code: u16,
    pub category: String,
    pub message: String,
    pub request_id: String,
}

#[derive(Serialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

// --- Params ---
//
// These mirror the gateway's HTTP query parameters one-to-one; see the
// handler comments for the route each method backs.

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DefinitionsParams {
    path: String,
    line: i64,
    character: i64,
    upload_id: i64,
}

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ReferencesParams {
    repository_id: i64,
    commit: String,
    path: String,
    line: i64,
    character: i64,
    upload_id: i64,
    limit: Option<usize>,
    cursor: Option<String>,
}

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct HoverParams {
    path: String,
    line: i64,
    character: i64,
    upload_id: i64,
}

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ExistsParams {
    repository_id: i64,
    commit: String,
    path: String,
}

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetUploadParams {
    id: i64,
}

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ListUploadsParams {
    repository_id: i64,
    query: Option<String>,
    state: Option<String>,
    #[serde(default)]
    visible_at_tip: bool,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DeleteUploadParams {
    id: i64,
    /// Current tip commit, required to recompute tip visibility when a
    /// visible dump is deleted.
    tip_commit: Option<String>,
}

fn schema_value<T: schemars::JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}))
}

/// JSON Schema for the params record of the given method.
pub fn method_param_schema(method: &str) -> Value {
    match method {
        "definitions" => schema_value::<DefinitionsParams>(),
        "references" => schema_value::<ReferencesParams>(),
        "hover" => schema_value::<HoverParams>(),
        "exists" => schema_value::<ExistsParams>(),
        "get_upload" => schema_value::<GetUploadParams>(),
        "list_uploads" => schema_value::<ListUploadsParams>(),
        "delete_upload" => schema_value::<DeleteUploadParams>(),
        _ => json!({"type": "object"}),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> std::result::Result<T, Error> {
    serde_json::from_value(params).map_err(|err| Error::InvalidRequest(format!("params: {err}")))
}

fn method_help() -> Value {
    json!({
        "methods": METHOD_LIST,
        "examples": [
            {"method": "definitions", "params": {"path": "svc/a.go", "line": 3, "character": 5, "uploadId": 7}},
            {"method": "references", "params": {"repositoryId": 1, "commit": "deadbeef", "path": "svc/a.go", "line": 3, "character": 5, "uploadId": 7, "limit": 25}},
            {"method": "hover", "params": {"path": "svc/a.go", "line": 3, "character": 5, "uploadId": 7}},
            {"method": "exists", "params": {"repositoryId": 1, "commit": "deadbeef", "path": "svc/a.go"}},
        ],
    })
}

fn next_request_id() -> String {
    format!("req-{}", REQUEST_COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn error_response(id: Value, err: &Error, request_id: String) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            code: err.status_code(),
            category: err.category().to_string(),
            message: err.to_string(),
            request_id,
        }),
    }
}

/// Run the JSONL RPC server over stdin/stdout: one request record per line,
/// one response record per line.
pub fn serve(db_path: PathBuf, bundle_manager_url: Option<String>) -> Result<()> {
    let app = App::new(db_path, bundle_manager_url)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                eprintln!("lsifq: stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => app.handle_request(request),
            Err(err) => error_response(
                Value::Null,
                &Error::InvalidRequest(err.to_string()),
                next_request_id(),
            ),
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

/// Issue a single method call against a fresh engine and return the
/// serialized response.
pub fn call(
    db_path: PathBuf,
    bundle_manager_url: Option<String>,
    method: String,
    params_raw: &str,
    id_raw: &str,
) -> Result<String> {
    let params: Value = serde_json::from_str(params_raw).with_context(|| "parse params JSON")?;
    let id = serde_json::from_str(id_raw).unwrap_or_else(|_| Value::String(id_raw.to_string()));
    let app = App::new(db_path, bundle_manager_url)?;
    let request = RpcRequest { id, method, params };
    let response = app.handle_request(request);
    Ok(serde_json::to_string(&response)?)
}

struct App {
    engine: Engine,
}

impl App {
    fn new(db_path: PathBuf, bundle_manager_url: Option<String>) -> Result<Self> {
        let store = Store::new(&db_path)?;
        let url = bundle_manager_url
            .unwrap_or_else(|| Config::get().bundle_manager_url.clone());
        let bundles = HttpBundles::new(&url)?;
        Ok(Self {
            engine: Engine::new(store, Box::new(bundles)),
        })
    }

    fn handle_request(&self, req: RpcRequest) -> RpcResponse {
        let id = req.id.clone();
        let request_id = next_request_id();
        let deadline =
            Deadline::after(Duration::from_secs(Config::get().request_timeout_secs as u64));

        match handle_method(&self.engine, deadline, &req.method, req.params) {
            Ok(value) => RpcResponse {
                id,
                result: Some(value),
                error: None,
            },
            Err(err) => error_response(id, &err, request_id),
        }
    }
}

pub fn handle_method(
    engine: &Engine,
    deadline: Deadline,
    method: &str,
    params: Value,
) -> std::result::Result<Value, Error> {
    let start = Instant::now();
    let value = match method {
        "help" => method_help(),
        "list_methods" => {
            let methods: Vec<Value> = METHOD_LIST
                .iter()
                .map(|name| json!({"name": name, "params": method_param_schema(name)}))
                .collect();
            json!(methods)
        }
        "definitions" => handlers::handle_definitions(engine, deadline, params)?,
        "references" => handlers::handle_references(engine, deadline, params)?,
        "hover" => handlers::handle_hover(engine, deadline, params)?,
        "exists" => handlers::handle_exists(engine, deadline, params)?,
        "get_upload" => handlers::handle_get_upload(engine, deadline, params)?,
        "list_uploads" => handlers::handle_list_uploads(engine, deadline, params)?,
        "delete_upload" => handlers::handle_delete_upload(engine, deadline, params)?,
        other => {
            return Err(Error::InvalidRequest(format!("unknown method: {other}")));
        }
    };

    let elapsed = start.elapsed();
    if elapsed.as_millis() > 100 {
        eprintln!("lsifq: Slow query: {} took {:?}", method, elapsed);
    }

    Ok(value)
}
