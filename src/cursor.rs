//! Reference-pagination cursors.
//!
//! A cursor records the position inside the virtual concatenation of the
//! four reference result streams. One variant per phase carries exactly the
//! fields that phase resumes from; the wire encoding stays a phase-tagged
//! record so fields can be added without breaking old clients. Encoded
//! cursors are opaque, URL-safe strings; a cursor handed back to a client
//! is sufficient to resume without re-fetching prior pages' dump metadata.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::MonikerData;

/// Bumped whenever the encoding changes shape; decoding rejects anything
/// else so stale clients get a clean malformed-cursor answer instead of a
/// misread resume point.
pub const CURSOR_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SameDumpCursor {
    pub dump_id: i64,
    pub path: String,
    pub line: i64,
    pub character: i64,
    pub monikers: Vec<MonikerData>,
    pub skip_results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionMonikersCursor {
    pub dump_id: i64,
    pub path: String,
    pub monikers: Vec<MonikerData>,
    pub skip_results: usize,
}

/// Batch-windowed state shared by the two remote phases: the current
/// candidate-dump batch, progress through the full candidate listing, and
/// progress inside the dump currently being drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReferencesCursor {
    pub dump_id: i64,
    pub scheme: String,
    pub identifier: String,
    pub name: String,
    pub version: String,
    pub dump_ids: Vec<i64>,
    pub total_dumps_when_batching: usize,
    pub skip_dumps_when_batching: usize,
    pub skip_dumps_in_batch: usize,
    pub skip_results_in_dump: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum Cursor {
    SameDump(SameDumpCursor),
    DefinitionMonikers(DefinitionMonikersCursor),
    SameRepo(RemoteReferencesCursor),
    RemoteRepo(RemoteReferencesCursor),
}

impl Cursor {
    pub fn phase(&self) -> &'static str {
        match self {
            Cursor::SameDump(_) => "same-dump",
            Cursor::DefinitionMonikers(_) => "definition-monikers",
            Cursor::SameRepo(_) => "same-repo",
            Cursor::RemoteRepo(_) => "remote-repo",
        }
    }
}

pub fn encode_cursor(cursor: &Cursor) -> String {
    let mut value = serde_json::to_value(cursor).expect("cursor serializes as JSON");
    if let Value::Object(map) = &mut value {
        map.insert("version".to_string(), Value::from(CURSOR_VERSION));
    }
    URL_SAFE_NO_PAD.encode(value.to_string())
}

pub fn decode_cursor(raw: &str) -> Result<Cursor> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| Error::MalformedCursor("not base64".to_string()))?;
    let mut value: Value = serde_json::from_slice(&bytes)
        .map_err(|_| Error::MalformedCursor("not a JSON record".to_string()))?;

    let Some(map) = value.as_object_mut() else {
        return Err(Error::MalformedCursor("not a JSON record".to_string()));
    };
    match map.remove("version").and_then(|v| v.as_u64()) {
        Some(CURSOR_VERSION) => {}
        Some(other) => {
            return Err(Error::MalformedCursor(format!(
                "unsupported cursor version {other}"
            )));
        }
        None => return Err(Error::MalformedCursor("missing cursor version".to_string())),
    }

    serde_json::from_value(value).map_err(|err| Error::MalformedCursor(err.to_string()))
}
