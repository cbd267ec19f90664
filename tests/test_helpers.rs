// Test helpers for archive and database fixtures
// Everything is built in memory or under a TempDir; nothing touches the system
#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::PathBuf;
use tar::{EntryType, Header};
use tempfile::TempDir;

/// In-memory tar archive builder
///
/// Headers are GNU format, so any path longer than 100 bytes is written as a
/// `././@LongLink` entry followed by the real entry.
///
/// # Example
/// ```
/// use test_helpers::ArchiveBuilder;
///
/// let bytes = ArchiveBuilder::new()
///     .dir("yay")
///     .file("yay/PKGBUILD", b"pkgname=yay\n")
///     .into_tar_gz();
/// ```
pub struct ArchiveBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    pub fn dir(mut self, path: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    pub fn file(self, path: &str, contents: &[u8]) -> Self {
        self.file_with_mode(path, contents, 0o644)
    }

    pub fn file_with_mode(mut self, path: &str, contents: &[u8], mode: u32) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        self.builder
            .append_data(&mut header, path, contents)
            .unwrap();
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        self.builder.append_link(&mut header, path, target).unwrap();
        self
    }

    /// Regular file whose header name is written verbatim, bypassing the
    /// builder's path validation. Used to craft `../` entries.
    pub fn raw_file(mut self, name: &str, contents: &[u8]) -> Self {
        let mut header = Header::new_gnu();
        let bytes = name.as_bytes();
        header.as_gnu_mut().unwrap().name[..bytes.len()].copy_from_slice(bytes);
        header.set_entry_type(EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        self.builder.append(&header, contents).unwrap();
        self
    }

    /// Regular file whose real path lives in a PAX `path` record, the way
    /// `git archive` writes paths that do not fit a ustar header. The ustar
    /// header itself carries `placeholder`.
    pub fn pax_file(mut self, path: &str, placeholder: &str, contents: &[u8]) -> Self {
        let record = pax_record("path", path);
        let mut pax = Header::new_ustar();
        pax.set_path("PaxHeader/entry").unwrap();
        pax.set_entry_type(EntryType::XHeader);
        pax.set_size(record.len() as u64);
        pax.set_mode(0o644);
        pax.set_cksum();
        self.builder.append(&pax, record.as_bytes()).unwrap();

        let mut header = Header::new_ustar();
        header.set_path(placeholder).unwrap();
        header.set_entry_type(EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        self.builder.append(&header, contents).unwrap();
        self
    }

    /// Global PAX header as written at the start of every `git archive`.
    pub fn pax_global_comment(mut self, comment: &str) -> Self {
        let record = pax_record("comment", comment);
        let mut header = Header::new_ustar();
        header.set_path("pax_global_header").unwrap();
        header.set_entry_type(EntryType::XGlobalHeader);
        header.set_size(record.len() as u64);
        header.set_mode(0o666);
        header.set_cksum();
        self.builder.append(&header, record.as_bytes()).unwrap();
        self
    }

    pub fn into_tar(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    pub fn into_tar_gz(self) -> Vec<u8> {
        gzip(&self.into_tar())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One `<len> <key>=<value>\n` PAX record; `len` counts itself.
fn pax_record(key: &str, value: &str) -> String {
    let body = format!(" {}={}\n", key, value);
    let mut len = body.len();
    while (len.to_string().len() + body.len()) != len {
        len = len.to_string().len() + body.len();
    }
    format!("{}{}", len, body)
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

/// `desc` file contents for a repository or local database entry
pub fn desc(name: &str, version: &str, provides: &[&str]) -> String {
    let mut text = format!("%NAME%\n{}\n\n%VERSION%\n{}\n\n", name, version);
    if !provides.is_empty() {
        text.push_str("%PROVIDES%\n");
        for p in provides {
            text.push_str(p);
            text.push('\n');
        }
        text.push('\n');
    }
    text
}

/// A sync database (`<repo>.db`) as pacman ships it: tar.gz with one
/// `<name>-<version>/desc` per package.
pub fn sync_db(packages: &[(&str, &str, &[&str])]) -> Vec<u8> {
    let mut builder = ArchiveBuilder::new();
    for (name, version, provides) in packages {
        let dir = format!("{}-{}", name, version);
        builder = builder
            .dir(&dir)
            .file(&format!("{}/desc", dir), desc(name, version, provides).as_bytes());
    }
    builder.into_tar_gz()
}

/// Isolated pacman-style database layout
///
/// - temp/
///   - local/   (installed packages, one directory each)
///   - sync/    (`<repo>.db` archives)
///   - out/     (extraction target)
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub local: PathBuf,
    pub sync: PathBuf,
    pub out: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        let local = root.join("local");
        let sync = root.join("sync");
        let out = root.join("out");

        std::fs::create_dir_all(&local).unwrap();
        std::fs::create_dir_all(&sync).unwrap();
        std::fs::create_dir_all(&out).unwrap();

        Self {
            temp_dir,
            local,
            sync,
            out,
        }
    }

    /// Record `name` as installed, the way pacman lays out its local db.
    pub fn install(&self, name: &str, version: &str) {
        let dir = self.local.join(format!("{}-{}", name, version));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("desc"), desc(name, version, &[])).unwrap();
    }

    pub fn add_repo(&self, repo: &str, packages: &[(&str, &str, &[&str])]) {
        std::fs::write(self.sync.join(format!("{}.db", repo)), sync_db(packages)).unwrap();
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new();

        assert!(env.local.exists());
        assert!(env.sync.exists());
        assert!(env.out.exists());
    }

    #[test]
    fn test_environment_cleanup() {
        let local = {
            let env = TestEnvironment::new();
            env.local.clone()
        };
        assert!(!local.exists());
    }

    #[test]
    fn test_long_path_emits_gnu_longname() {
        let long = format!("pkg/{}", "a".repeat(150));
        let bytes = ArchiveBuilder::new().file(&long, b"x").into_tar();

        let mut archive = tar::Archive::new(&bytes[..]);
        let kinds: Vec<EntryType> = archive
            .entries()
            .unwrap()
            .raw(true)
            .map(|e| e.unwrap().header().entry_type())
            .collect();
        assert_eq!(kinds, vec![EntryType::GNULongName, EntryType::Regular]);
    }
}
