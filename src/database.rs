//! Local package databases - which repository owns a package.
//!
//! pacman keeps two kinds of databases:
//!
//! ```text
//! /var/lib/pacman/local/<name>-<pkgver>-<pkgrel>/desc   installed packages
//! /var/lib/pacman/sync/<repo>.db                        one tar.gz per repository
//! ```
//!
//! Each sync database holds one directory per package with a `desc` file
//! (and, in older formats, a `depends` file) made of `%FIELD%` blocks:
//!
//! ```text
//! %NAME%
//! openssl
//!
//! %PROVIDES%
//! libcrypto.so=3-64
//! libssl.so=3-64
//! ```
//!
//! Loading happens in two phases. [`PackageIndex`] accepts concurrent
//! inserts while repository databases are ingested in parallel; once every
//! database is in, [`PackageIndex::freeze`] turns it into a read-only
//! [`Classifier`] with the reverse `PROVIDES` index. Classification cannot
//! start before ingestion finishes because the classifier does not exist
//! until then.

use crate::error::{AurError, Result};
use crate::extract;
use crate::recipe::strip_constraint;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::{Component, Path};
use std::sync::{PoisonError, RwLock};
use walkdir::WalkDir;

/// Label reported for packages present in the local database.
pub const INSTALLED: &str = "installed";

/// Label reported for packages no local repository knows about.
pub const EXTERNAL: &str = "aur";

/// Metadata files read from each package directory of a sync database.
const METADATA_FILES: [&str; 2] = ["desc", "depends"];

/// One package entry from a repository database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    repo: String,
    fields: HashMap<String, String>,
}

impl PackageRecord {
    /// Create an empty record owned by `repo`.
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Repository label assigned at ingestion time.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn name(&self) -> &str {
        self.get("NAME").unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Names this package provides, with version decoration removed.
    pub fn provides(&self) -> impl Iterator<Item = &str> {
        self.get("PROVIDES")
            .unwrap_or_default()
            .split_whitespace()
            .map(strip_constraint)
            .filter(|name| !name.is_empty())
    }
}

/// Parse `%FIELD%` blocks from a metadata file into `fields`.
///
/// Multi-line values are joined with single spaces and trimmed.
fn parse_fields(text: &str, fields: &mut HashMap<String, String>) -> std::result::Result<(), String> {
    let mut current: Option<(String, Vec<&str>)> = None;
    let mut finish = |field: Option<(String, Vec<&str>)>| {
        if let Some((key, values)) = field {
            fields.insert(key, values.join(" ").trim().to_string());
        }
    };

    for line in text.lines() {
        let line = line.trim_end_matches('\r');

        if let Some(key) = field_marker(line) {
            finish(current.take());
            current = Some((key.to_string(), Vec::new()));
            continue;
        }

        let blank = line.trim().is_empty();
        match current.take() {
            Some(field) if blank => finish(Some(field)),
            Some((key, mut values)) => {
                values.push(line);
                current = Some((key, values));
            }
            None if blank => {}
            None => return Err(format!("value outside of a field: {:?}", line)),
        }
    }

    finish(current);
    Ok(())
}

fn field_marker(line: &str) -> Option<&str> {
    let key = line.strip_prefix('%')?.strip_suffix('%')?;
    (!key.is_empty() && !key.contains('%')).then_some(key)
}

/// Parse a single `desc` file into a record owned by `repo`.
pub fn parse_desc(text: &str, repo: &str) -> Result<PackageRecord> {
    let mut record = PackageRecord::new(repo);
    parse_fields(text, &mut record.fields).map_err(|reason| AurError::Database {
        source_name: repo.to_string(),
        reason,
    })?;
    if record.name().is_empty() {
        return Err(AurError::Database {
            source_name: repo.to_string(),
            reason: "package entry without %NAME%".to_string(),
        });
    }
    Ok(record)
}

/// Package name -> record, written concurrently while databases load.
#[derive(Debug, Default)]
pub struct PackageIndex {
    packages: RwLock<HashMap<String, PackageRecord>>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any earlier record with the same name.
    ///
    /// Returns the replaced record. When two repositories ship the same
    /// package the last insert wins.
    pub fn insert(&self, record: PackageRecord) -> Option<PackageRecord> {
        let mut packages = self.packages.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = packages.insert(record.name().to_string(), record);
        if let Some(old) = &replaced {
            tracing::debug!("{} from [{}] replaced by a later database", old.name(), old.repo());
        }
        replaced
    }

    pub fn len(&self) -> usize {
        self.packages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ingest one repository database (tar or tar.gz) tagging every record
    /// with `repo`. Returns the number of packages read.
    pub fn ingest<R: Read>(&self, reader: R, repo: &str) -> Result<usize> {
        let malformed = |reason: String| AurError::Database {
            source_name: repo.to_string(),
            reason,
        };

        let reader = extract::decompressed(reader)?;
        let mut archive = tar::Archive::new(reader);
        let mut current: Option<(String, HashMap<String, String>)> = None;
        let mut count = 0;

        for entry in archive.entries().map_err(|e| malformed(e.to_string()))? {
            let mut entry = entry.map_err(|e| malformed(e.to_string()))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let path = entry.path().map_err(|e| malformed(e.to_string()))?.into_owned();
            let Some((dir, file)) = package_file(&path) else {
                continue;
            };
            if !METADATA_FILES.contains(&file.as_str()) {
                continue;
            }

            if current.as_ref().is_some_and(|(d, _)| *d != dir) {
                if let Some((_, fields)) = current.take() {
                    self.insert_fields(fields, repo)?;
                    count += 1;
                }
            }

            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| malformed(format!("{}: {}", path.display(), e)))?;

            let fields = &mut current.get_or_insert_with(|| (dir, HashMap::new())).1;
            parse_fields(&text, fields)
                .map_err(|reason| malformed(format!("{}: {}", path.display(), reason)))?;
        }

        if let Some((_, fields)) = current {
            self.insert_fields(fields, repo)?;
            count += 1;
        }

        tracing::debug!("ingested {} packages from [{}]", count, repo);
        Ok(count)
    }

    /// Ingest a database file, labelling it by its file stem (`core.db` -> `core`).
    pub fn ingest_path(&self, path: &Path) -> Result<usize> {
        let repo = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| AurError::Database {
                source_name: path.display().to_string(),
                reason: "cannot derive repository name".to_string(),
            })?;
        tracing::info!("reading {}", path.display());
        let file = std::fs::File::open(path)?;
        self.ingest(std::io::BufReader::new(file), repo)
    }

    fn insert_fields(&self, fields: HashMap<String, String>, repo: &str) -> Result<()> {
        let record = PackageRecord {
            repo: repo.to_string(),
            fields,
        };
        if record.name().is_empty() {
            return Err(AurError::Database {
                source_name: repo.to_string(),
                reason: "package entry without %NAME%".to_string(),
            });
        }
        self.insert(record);
        Ok(())
    }

    /// Finish ingestion and build the read-only classifier.
    pub fn freeze(self, installed: InstalledSet) -> Classifier {
        let packages = self.packages.into_inner().unwrap_or_else(PoisonError::into_inner);

        // Iterate by name so the first provider alphabetically owns an alias.
        let mut names: Vec<&String> = packages.keys().collect();
        names.sort();
        let mut provides = HashMap::new();
        for name in names {
            for provided in packages[name].provides() {
                provides
                    .entry(provided.to_string())
                    .or_insert_with(|| name.clone());
            }
        }

        Classifier {
            installed,
            packages,
            provides,
        }
    }
}

/// Split `pkg-1.0-1/desc` into (`pkg-1.0-1`, `desc`).
fn package_file(path: &Path) -> Option<(String, String)> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    match parts.as_slice() {
        [dir, file] => Some((dir.to_string(), file.to_string())),
        _ => None,
    }
}

/// Ingest every `*.db` file in `dir` in parallel.
pub fn load_sync_dbs(dir: &Path) -> Result<PackageIndex> {
    let index = PackageIndex::new();
    if !dir.exists() {
        tracing::warn!("sync database directory {} does not exist", dir.display());
        return Ok(index);
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read {}: {}", dir.display(), e))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("db") {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();

    paths
        .par_iter()
        .map(|path| index.ingest_path(path))
        .collect::<Result<Vec<usize>>>()?;

    Ok(index)
}

/// Names of packages already installed locally.
#[derive(Debug, Clone, Default)]
pub struct InstalledSet(HashSet<String>);

impl InstalledSet {
    /// Read the local database. A missing directory yields an empty set.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut names = HashSet::new();
        if !dir.exists() {
            return Ok(Self(names));
        }

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read {}: {}", dir.display(), e))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy();
            if dir_name.starts_with('.') {
                continue;
            }

            let from_desc = std::fs::read_to_string(entry.path().join("desc"))
                .ok()
                .and_then(|text| parse_desc(&text, INSTALLED).ok())
                .map(|record| record.name().to_string());
            names.insert(from_desc.unwrap_or_else(|| strip_pkgver(&dir_name).to_string()));
        }

        Ok(Self(names))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for InstalledSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// `lib32-glibc-2.39-1` -> `lib32-glibc`
fn strip_pkgver(dir_name: &str) -> &str {
    dir_name
        .rsplitn(3, '-')
        .nth(2)
        .filter(|name| !name.is_empty())
        .unwrap_or(dir_name)
}

/// Where a dependency is satisfied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Present in the local database.
    Installed,
    /// Shipped by a configured repository, directly or through `PROVIDES`.
    Repo {
        repo: String,
        /// Real package name when matched through `PROVIDES`.
        alias: Option<String>,
    },
    /// Unknown locally; expected to live in the AUR.
    External,
}

impl Classification {
    pub fn label(&self) -> &str {
        match self {
            Classification::Installed => INSTALLED,
            Classification::Repo { repo, .. } => repo.as_str(),
            Classification::External => EXTERNAL,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Classification::Repo { alias, .. } => alias.as_deref(),
            _ => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Classification::External)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alias() {
            Some(alias) => write!(f, "{} ({})", self.label(), alias),
            None => f.write_str(self.label()),
        }
    }
}

/// Read-only package lookup built by [`PackageIndex::freeze`].
#[derive(Debug, Default)]
pub struct Classifier {
    installed: InstalledSet,
    packages: HashMap<String, PackageRecord>,
    provides: HashMap<String, String>,
}

impl Classifier {
    /// Load the local database and every sync database concurrently.
    pub fn load(local_db: &Path, sync_db: &Path) -> Result<Self> {
        let (installed, index) = rayon::join(
            || InstalledSet::load(local_db),
            || load_sync_dbs(sync_db),
        );
        let (installed, index) = (installed?, index?);
        tracing::info!(
            "{} installed packages, {} repository packages",
            installed.len(),
            index.len()
        );
        Ok(index.freeze(installed))
    }

    /// Decide where `name` comes from. Never fails: anything unknown is
    /// [`Classification::External`].
    pub fn classify(&self, name: &str) -> Classification {
        if self.installed.contains(name) {
            return Classification::Installed;
        }

        if let Some(record) = self.packages.get(name) {
            return Classification::Repo {
                repo: record.repo().to_string(),
                alias: None,
            };
        }

        if let Some(record) = self.provides.get(name).and_then(|real| self.packages.get(real)) {
            return Classification::Repo {
                repo: record.repo().to_string(),
                alias: Some(record.name().to_string()),
            };
        }

        Classification::External
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
