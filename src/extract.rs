//! Streaming tar extraction for AUR snapshots.
//!
//! AUR snapshots are tar.gz archives containing a single directory named
//! after the package:
//!
//! ```text
//! yay/
//! yay/.SRCINFO
//! yay/PKGBUILD
//! ```
//!
//! Entries are read strictly in order (no seeking) and written below the
//! destination directory as they arrive. The archive is read in raw mode so
//! long paths are handled here. A GNU long-name entry (type `L`) carries the
//! full path of the entry that follows it; so does the `path` record of a
//! PAX extended header (type `x`), which is what `git archive` writes. The
//! following entry is written under that path instead of its truncated
//! header name. Global PAX headers are skipped.
//!
//! Symbolic and hard links are recognized but not materialized. There is no
//! rollback: files written before an error stay on disk.

use crate::error::{AurError, Result};
use anyhow::Context;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// What an extraction wrote to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// First path component of the first entry, usually the package directory.
    pub root: Option<PathBuf>,
    pub files: usize,
    pub directories: usize,
    /// Symlink and hard-link entries that were not materialized.
    pub skipped_links: usize,
}

/// Wrap `reader` in a gzip decoder if the stream starts with the gzip magic.
pub fn decompressed<'a, R: Read + 'a>(reader: R) -> io::Result<Box<dyn Read + 'a>> {
    let mut reader = BufReader::new(reader);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Extract a tar stream below `dest`.
///
/// # Examples
///
/// ```no_run
/// use aurpull::extract;
///
/// fn main() -> anyhow::Result<()> {
///     let file = std::fs::File::open("yay.tar.gz")?;
///     let stream = extract::decompressed(file)?;
///     let extracted = extract::extract(std::path::Path::new("."), stream)?;
///     println!("{} files", extracted.files);
///     Ok(())
/// }
/// ```
pub fn extract<R: Read>(dest: &Path, reader: R) -> Result<Extracted> {
    let mut archive = Archive::new(reader);
    let mut entries = archive
        .entries()
        .map_err(|e| AurError::Archive(e.to_string()))?
        .raw(true);
    let mut summary = Extracted::default();

    while let Some(entry) = entries.next() {
        let mut entry = entry.map_err(|e| AurError::Archive(e.to_string()))?;
        let kind = entry.header().entry_type();

        // `L` and PAX `x` entries name the entry that follows them
        let override_path = if kind.is_gnu_longname() {
            Some(read_long_name(&mut entry)?)
        } else if kind.is_pax_local_extensions() {
            match read_pax_path(&mut entry)? {
                Some(path) => Some(path),
                None => continue,
            }
        } else {
            None
        };

        if let Some(long_name) = override_path {
            drop(entry);
            let mut next = entries
                .next()
                .ok_or_else(|| {
                    AurError::Archive(format!("path {} is not followed by an entry", long_name))
                })?
                .map_err(|e| AurError::Archive(e.to_string()))?;
            let kind = next.header().entry_type();
            write_entry(dest, Path::new(&long_name), kind, &mut next, &mut summary)?;
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| AurError::Archive(e.to_string()))?
            .into_owned();
        write_entry(dest, &path, kind, &mut entry, &mut summary)?;
    }

    Ok(summary)
}

/// Materialize one entry at `dest/path`.
fn write_entry<R: Read>(
    dest: &Path,
    path: &Path,
    kind: EntryType,
    entry: &mut tar::Entry<'_, R>,
    summary: &mut Extracted,
) -> Result<()> {
    match kind {
        EntryType::Directory => {
            let target = target_path(dest, path)?;
            note_root(summary, path);
            let mode = entry.header().mode().ok();
            tracing::debug!("{}", path.display());
            create_dir(&target, mode)?;
            summary.directories += 1;
        }
        EntryType::Regular | EntryType::Continuous => {
            let target = target_path(dest, path)?;
            note_root(summary, path);
            let mode = entry.header().mode().ok();
            tracing::debug!("{}", path.display());
            write_file(&target, mode, entry)?;
            summary.files += 1;
        }
        EntryType::Symlink | EntryType::Link => {
            tracing::warn!("link {} not materialized", path.display());
            summary.skipped_links += 1;
        }
        EntryType::XHeader | EntryType::XGlobalHeader | EntryType::GNULongLink => {
            tracing::debug!("skipping {:?} header {}", kind, path.display());
        }
        other => {
            tracing::debug!("ignoring {:?} entry {}", other, path.display());
        }
    }
    Ok(())
}

fn read_long_name<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<String> {
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| AurError::Archive("long name is not valid UTF-8".to_string()))
}

/// The `path` record of a PAX extended header, if it has one.
fn read_pax_path<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Option<String>> {
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(None);
    };
    for extension in extensions {
        let extension = extension?;
        if extension.key() == Ok("path") {
            let path = extension
                .value()
                .map_err(|_| AurError::Archive("PAX path is not valid UTF-8".to_string()))?;
            return Ok(Some(path.to_string()));
        }
    }
    Ok(None)
}

/// Join `path` onto `dest`, refusing anything that could escape it.
fn target_path(dest: &Path, path: &Path) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => {
                return Err(AurError::Archive(format!(
                    "entry {} escapes the destination directory",
                    path.display()
                )));
            }
        }
    }
    Ok(target)
}

fn note_root(summary: &mut Extracted, path: &Path) {
    if summary.root.is_none() {
        summary.root = path
            .components()
            .find(|c| matches!(c, Component::Normal(_)))
            .map(|c| PathBuf::from(c.as_os_str()));
    }
}

/// Create a directory (and its parents). Existing directories are left alone.
fn create_dir(path: &Path, mode: Option<u32>) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    set_mode(path, mode)?;
    Ok(())
}

fn write_file<R: Read>(path: &Path, mode: Option<u32>, data: &mut R) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    io::copy(data, &mut file).with_context(|| format!("Failed to write: {}", path.display()))?;
    drop(file);
    set_mode(path, mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}
