//! Per-dump lookups against the bundle manager service.
//!
//! Every operation names the dump it reads; paths are dump-relative. The
//! interface tags returned locations with their source dump id so callers
//! always know which dump produced a result. Transport failures surface as
//! `BundleUnavailable` and are never retried here; a payload referencing
//! data the bundle does not contain surfaces as `MalformedBundle`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::model::{Location, MonikerData, PackageInformationData, Range};

/// The two per-dump symbol tables a moniker search can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonikerTable {
    Definition,
    Reference,
}

impl MonikerTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonikerTable::Definition => "definition",
            MonikerTable::Reference => "reference",
        }
    }
}

/// The bundle access surface consumed by the resolvers. Implementations are
/// stateless per call; the deadline bounds each outbound request.
pub trait Bundles: Send + Sync {
    fn exists(&self, deadline: Deadline, dump_id: i64, path: &str) -> Result<bool>;

    fn definitions(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Location>>;

    fn references(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Location>>;

    fn hover(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Option<(String, Range)>>;

    /// Moniker groups attached to the ranges enclosing a position,
    /// innermost range first.
    fn monikers_by_position(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Vec<MonikerData>>>;

    /// Paginated symbol search within one dump. Returns the page and the
    /// total row count for the (table, scheme, identifier) key.
    fn moniker_results(
        &self,
        deadline: Deadline,
        dump_id: i64,
        table: MonikerTable,
        scheme: &str,
        identifier: &str,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> Result<(Vec<Location>, usize)>;

    fn package_information(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        package_information_id: &str,
    ) -> Result<PackageInformationData>;
}

#[derive(Debug, Deserialize)]
struct HoverPayload {
    text: String,
    range: Range,
}

#[derive(Debug, Deserialize)]
struct MonikerResultsPayload {
    locations: Vec<Location>,
    count: usize,
}

/// HTTP client for the bundle manager's `/dbs/{dumpId}/{op}` endpoints.
pub struct HttpBundles {
    base_url: String,
    call_timeout: Duration,
    client: reqwest::blocking::Client,
}

impl HttpBundles {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            call_timeout: Duration::from_secs(Config::get().bundle_timeout_secs as u64),
            client,
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        deadline: Deadline,
        dump_id: i64,
        op: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        deadline.check()?;
        let timeout = deadline.call_timeout(self.call_timeout)?;
        let url = format!("{}/dbs/{}/{}", self.base_url, dump_id, op);

        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .map_err(|err| transport_error(err, deadline))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // The dump was supposed to contain what we asked about.
            return Err(Error::MalformedBundle {
                filename: format!("{dump_id}.db"),
                kind: op.to_string(),
                key: query
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&"),
            });
        }
        if !status.is_success() {
            return Err(Error::BundleUnavailable(format!(
                "bundle manager returned {status} for {op} on dump {dump_id}"
            )));
        }

        response
            .json::<T>()
            .map_err(|err| Error::BundleUnavailable(format!("decode {op} response: {err}")))
    }
}

fn transport_error(err: reqwest::Error, deadline: Deadline) -> Error {
    // A timeout that coincides with an exhausted request budget is the
    // request being cancelled, not the bundle being down.
    if err.is_timeout() && deadline.check().is_err() {
        return Error::Cancelled;
    }
    Error::BundleUnavailable(err.to_string())
}

fn position_query(path: &str, line: i64, character: i64) -> Vec<(&'static str, String)> {
    vec![
        ("path", path.to_string()),
        ("line", line.to_string()),
        ("character", character.to_string()),
    ]
}

fn tag_locations(dump_id: i64, mut locations: Vec<Location>) -> Vec<Location> {
    for location in &mut locations {
        location.dump_id = dump_id;
    }
    locations
}

impl Bundles for HttpBundles {
    fn exists(&self, deadline: Deadline, dump_id: i64, path: &str) -> Result<bool> {
        self.get_json(deadline, dump_id, "exists", &[("path", path.to_string())])
    }

    fn definitions(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Location>> {
        let locations = self.get_json(
            deadline,
            dump_id,
            "definitions",
            &position_query(path, line, character),
        )?;
        Ok(tag_locations(dump_id, locations))
    }

    fn references(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Location>> {
        let locations = self.get_json(
            deadline,
            dump_id,
            "references",
            &position_query(path, line, character),
        )?;
        Ok(tag_locations(dump_id, locations))
    }

    fn hover(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Option<(String, Range)>> {
        let payload: Option<HoverPayload> = self.get_json(
            deadline,
            dump_id,
            "hover",
            &position_query(path, line, character),
        )?;
        Ok(payload.map(|hover| (hover.text, hover.range)))
    }

    fn monikers_by_position(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Vec<MonikerData>>> {
        self.get_json(
            deadline,
            dump_id,
            "monikersByPosition",
            &position_query(path, line, character),
        )
    }

    fn moniker_results(
        &self,
        deadline: Deadline,
        dump_id: i64,
        table: MonikerTable,
        scheme: &str,
        identifier: &str,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> Result<(Vec<Location>, usize)> {
        let mut query = vec![
            ("modelType", table.as_str().to_string()),
            ("scheme", scheme.to_string()),
            ("identifier", identifier.to_string()),
        ];
        if let Some(skip) = skip {
            query.push(("skip", skip.to_string()));
        }
        if let Some(take) = take {
            query.push(("take", take.to_string()));
        }

        let payload: MonikerResultsPayload =
            self.get_json(deadline, dump_id, "monikerResults", &query)?;
        Ok((
            tag_locations(dump_id, payload.locations),
            payload.count,
        ))
    }

    fn package_information(
        &self,
        deadline: Deadline,
        dump_id: i64,
        path: &str,
        package_information_id: &str,
    ) -> Result<PackageInformationData> {
        self.get_json(
            deadline,
            dump_id,
            "packageInformation",
            &[
                ("path", path.to_string()),
                ("packageInformationId", package_information_id.to_string()),
            ],
        )
    }
}
