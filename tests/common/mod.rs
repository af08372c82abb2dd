#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use lsifq::bundles::{Bundles, MonikerTable};
use lsifq::deadline::Deadline;
use lsifq::error::{Error, Result};
use lsifq::model::{
    Location, MonikerData, PackageInformationData, Position, Range, STATE_COMPLETED,
};
use lsifq::store::{Store, UploadRecord};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn temp_store(label: &str) -> Store {
    let mut dir = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("lsifq-test-{label}-{nanos}-{counter}"));
    let db_path: PathBuf = dir.join("lsifq.sqlite");
    Store::new(&db_path).unwrap()
}

pub fn completed_dump(
    repository_id: i64,
    commit: &str,
    root: &str,
    indexer: &str,
) -> UploadRecord {
    UploadRecord {
        repository_id,
        commit: commit.to_string(),
        root: root.to_string(),
        state: STATE_COMPLETED.to_string(),
        visible_at_tip: false,
        indexer: indexer.to_string(),
        uploaded_at: 1,
    }
}

/// Record a linear history `commits[0] <- commits[1] <- ...` (each commit's
/// parent is the next entry).
pub fn linear_history(store: &Store, repository_id: i64, commits: &[&str]) {
    let mut links = Vec::new();
    for (i, commit) in commits.iter().enumerate() {
        let parent = commits.get(i + 1).map(|p| p.to_string());
        links.push((commit.to_string(), parent));
    }
    store.insert_commits(repository_id, &links).unwrap();
}

pub fn range(start_line: i64, start_character: i64, end_line: i64, end_character: i64) -> Range {
    Range {
        start: Position {
            line: start_line,
            character: start_character,
        },
        end: Position {
            line: end_line,
            character: end_character,
        },
    }
}

pub fn location(dump_id: i64, path: &str, range: Range) -> Location {
    Location {
        dump_id,
        path: path.to_string(),
        range,
    }
}

pub fn import_moniker(scheme: &str, identifier: &str, package_information_id: &str) -> MonikerData {
    MonikerData {
        kind: "import".to_string(),
        scheme: scheme.to_string(),
        identifier: identifier.to_string(),
        package_information_id: Some(package_information_id.to_string()),
    }
}

pub fn export_moniker(scheme: &str, identifier: &str) -> MonikerData {
    MonikerData {
        kind: "export".to_string(),
        scheme: scheme.to_string(),
        identifier: identifier.to_string(),
        package_information_id: None,
    }
}

type PositionKey = (i64, String, i64, i64);
type MonikerKey = (i64, &'static str, String, String);

/// In-memory bundle manager: fixture maps keyed the way the real endpoints
/// are addressed. Unset keys answer empty, like a dump with no data there.
#[derive(Default)]
pub struct FakeBundles {
    pub existing_paths: HashSet<(i64, String)>,
    pub definitions: HashMap<PositionKey, Vec<Location>>,
    pub references: HashMap<PositionKey, Vec<Location>>,
    pub hovers: HashMap<PositionKey, (String, Range)>,
    pub monikers: HashMap<PositionKey, Vec<Vec<MonikerData>>>,
    pub moniker_results: HashMap<MonikerKey, Vec<Location>>,
    pub package_information: HashMap<(i64, String), PackageInformationData>,
}

impl FakeBundles {
    pub fn add_path(&mut self, dump_id: i64, path: &str) {
        self.existing_paths.insert((dump_id, path.to_string()));
    }

    pub fn add_definitions(
        &mut self,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
        locations: Vec<Location>,
    ) {
        self.definitions
            .insert((dump_id, path.to_string(), line, character), locations);
    }

    pub fn add_references(
        &mut self,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
        locations: Vec<Location>,
    ) {
        self.references
            .insert((dump_id, path.to_string(), line, character), locations);
    }

    pub fn add_hover(
        &mut self,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
        text: &str,
        hover_range: Range,
    ) {
        self.hovers.insert(
            (dump_id, path.to_string(), line, character),
            (text.to_string(), hover_range),
        );
    }

    pub fn add_monikers(
        &mut self,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
        groups: Vec<Vec<MonikerData>>,
    ) {
        self.monikers
            .insert((dump_id, path.to_string(), line, character), groups);
    }

    pub fn add_moniker_results(
        &mut self,
        dump_id: i64,
        table: MonikerTable,
        scheme: &str,
        identifier: &str,
        locations: Vec<Location>,
    ) {
        self.moniker_results.insert(
            (dump_id, table.as_str(), scheme.to_string(), identifier.to_string()),
            locations,
        );
    }

    pub fn add_package_information(
        &mut self,
        dump_id: i64,
        package_information_id: &str,
        name: &str,
        version: &str,
    ) {
        self.package_information.insert(
            (dump_id, package_information_id.to_string()),
            PackageInformationData {
                name: name.to_string(),
                version: version.to_string(),
            },
        );
    }
}

impl Bundles for FakeBundles {
    fn exists(&self, _deadline: Deadline, dump_id: i64, path: &str) -> Result<bool> {
        Ok(self.existing_paths.contains(&(dump_id, path.to_string())))
    }

    fn definitions(
        &self,
        _deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Location>> {
        Ok(self
            .definitions
            .get(&(dump_id, path.to_string(), line, character))
            .cloned()
            .unwrap_or_default())
    }

    fn references(
        &self,
        _deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Location>> {
        Ok(self
            .references
            .get(&(dump_id, path.to_string(), line, character))
            .cloned()
            .unwrap_or_default())
    }

    fn hover(
        &self,
        _deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Option<(String, Range)>> {
        Ok(self
            .hovers
            .get(&(dump_id, path.to_string(), line, character))
            .cloned())
    }

    fn monikers_by_position(
        &self,
        _deadline: Deadline,
        dump_id: i64,
        path: &str,
        line: i64,
        character: i64,
    ) -> Result<Vec<Vec<MonikerData>>> {
        Ok(self
            .monikers
            .get(&(dump_id, path.to_string(), line, character))
            .cloned()
            .unwrap_or_default())
    }

    fn moniker_results(
        &self,
        _deadline: Deadline,
        dump_id: i64,
        table: MonikerTable,
        scheme: &str,
        identifier: &str,
        skip: Option<usize>,
        take: Option<usize>,
    ) -> Result<(Vec<Location>, usize)> {
        let all = self
            .moniker_results
            .get(&(dump_id, table.as_str(), scheme.to_string(), identifier.to_string()))
            .cloned()
            .unwrap_or_default();
        let total = all.len();
        let start = skip.unwrap_or(0).min(total);
        let end = match take {
            Some(take) => (start + take).min(total),
            None => total,
        };
        Ok((all[start..end].to_vec(), total))
    }

    fn package_information(
        &self,
        _deadline: Deadline,
        dump_id: i64,
        path: &str,
        package_information_id: &str,
    ) -> Result<PackageInformationData> {
        self.package_information
            .get(&(dump_id, package_information_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::MalformedBundle {
                filename: format!("{dump_id}.db"),
                kind: "packageInformation".to_string(),
                key: format!("{path}:{package_information_id}"),
            })
    }
}
