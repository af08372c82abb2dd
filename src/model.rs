use serde::{Deserialize, Serialize};

pub const STATE_QUEUED: &str = "queued";
pub const STATE_PROCESSING: &str = "processing";
pub const STATE_COMPLETED: &str = "completed";
pub const STATE_ERRORED: &str = "errored";

pub const MONIKER_KIND_IMPORT: &str = "import";
pub const MONIKER_KIND_EXPORT: &str = "export";
pub const MONIKER_KIND_LOCAL: &str = "local";

/// An index artifact for a (repository, commit, root) tuple. Rows live in
/// `lsif_uploads`; a dump is an upload in the `completed` state and only
/// completed rows are eligible for query. `root` is `/`-terminated when
/// non-empty.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dump {
    pub id: i64,
    pub repository_id: i64,
    pub commit: String,
    pub root: String,
    pub visible_at_tip: bool,
    pub state: String,
    pub indexer: String,
    pub uploaded_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,
}

/// The pre-conversion view of a dump, sharing its identifier space.
/// `place_in_queue` ranks queued uploads by arrival order.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    #[serde(flatten)]
    pub dump: Dump,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_in_queue: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: i64,
    pub character: i64,
}

/// Half-open range: inclusive start, exclusive end, as emitted by bundles.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A bundle-local location. `path` is dump-relative (no root prefix).
/// Bundles do not emit `dumpId`; the Bundle Access Interface tags each
/// returned location with the dump it came from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub dump_id: i64,
    pub path: String,
    pub range: Range,
}

/// A Location enriched with its Dump record, so callers can emit
/// repository, commit and the absolute path `dump.root + location.path`.
#[derive(Debug, Serialize, Clone)]
pub struct ResolvedLocation {
    pub dump: Dump,
    pub path: String,
    pub range: Range,
}

/// The wire shape of a location. `path` is absolute within the repository.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiLocation {
    pub repository_id: i64,
    pub commit: String,
    pub path: String,
    pub range: Range,
}

impl From<ResolvedLocation> for ApiLocation {
    fn from(resolved: ResolvedLocation) -> Self {
        ApiLocation {
            repository_id: resolved.dump.repository_id,
            commit: resolved.dump.commit,
            path: resolved.path,
            range: resolved.range,
        }
    }
}

/// A portable symbol identifier attached to a range. If `kind` is `import`
/// and `package_information_id` is set, the identifier can be resolved to a
/// defining dump through the package index.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonikerData {
    pub kind: String,
    pub scheme: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_information_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageInformationData {
    pub name: String,
    pub version: String,
}

/// A reference-index row as the pager consumes it: a candidate dump plus
/// the opaque membership filter over identifiers that dump references.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageReference {
    pub dump_id: i64,
    pub filter: Vec<u8>,
}
