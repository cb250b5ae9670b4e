//! Deterministic tar archiving of local files and directories.
//!
//! Every source path contributes entries rooted at its base name:
//!
//! | source        | entries                         |
//! |---------------|---------------------------------|
//! | `./foo/` dir  | `foo`, `foo/bar.txt`, `foo/sub` |
//! | `./baz.txt`   | `baz.txt`                       |
//!
//! Directories are walked depth-first with children sorted by file name,
//! so the same tree always yields the same entry order. Only regular files
//! and directories are archived; symlinks and special files are skipped.

use crate::error::{LayupError, Result};
use log::debug;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;


/// Writes a tar archive of `paths` into `writer` and returns the writer.
///
/// Sources are processed in the order given. Any unreadable path aborts the
/// whole archive; the caller should discard whatever was written so far.
///
/// # Examples
///
/// ```no_run
/// use liblayup::archive::build_archive;
///
/// # fn example() -> liblayup::Result<()> {
/// let tar_bytes = build_archive(&["./app", "./static"], Vec::new())?;
/// println!("{} bytes", tar_bytes.len());
/// # Ok(())
/// # }
/// ```
pub fn build_archive<P, W>(paths: &[P], writer: W) -> Result<W>
where
    P: AsRef<Path>,
    W: Write,
{
    let mut builder = Builder::new(writer);

    for source in paths {
        append_source(&mut builder, source.as_ref())?;
    }

    builder
        .into_inner()
        .map_err(|e| LayupError::io_stream("failed to finish tar archive", e))
}

/// Archives `paths` into an in-memory buffer.
pub fn archive_to_vec<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<u8>> {
    build_archive(paths, Vec::new())
}

fn append_source<W: Write>(builder: &mut Builder<W>, source: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(source)
        .map_err(|e| LayupError::io("failed to stat", source, e))?;

    let base = base_name(source)?;

    if metadata.is_file() {
        return append_file(builder, source, &base, &metadata);
    }
    if !metadata.is_dir() {
        debug!("skipping special file {}", source.display());
        return Ok(());
    }

    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.to_path_buf());
            LayupError::io("failed to walk", &path, e.into())
        })?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| LayupError::validation_with_source("walked outside of source", e))?;
        let name = archive_path(&base, relative);
        if name.is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let metadata = entry
                .metadata()
                .map_err(|e| LayupError::io("failed to stat", entry.path(), e.into()))?;
            append_directory(builder, entry.path(), &name, &metadata)?;
        } else if file_type.is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| LayupError::io("failed to stat", entry.path(), e.into()))?;
            append_file(builder, entry.path(), &name, &metadata)?;
        } else {
            debug!("skipping special file {}", entry.path().display());
        }
    }

    Ok(())
}

fn append_directory<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &str,
    metadata: &Metadata,
) -> Result<()> {
    let mut header = header_for(EntryType::Directory, metadata, 0);
    builder
        .append_data(&mut header, name, std::io::empty())
        .map_err(|e| LayupError::io("failed to archive directory", path, e))
}

fn append_file<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &str,
    metadata: &Metadata,
) -> Result<()> {
    // The handle lives only for this entry and is closed on every return path.
    let file = File::open(path).map_err(|e| LayupError::io("failed to open", path, e))?;
    append_contents(builder, path, name, metadata, file)
}

/// Appends `contents` as a regular file sized from `metadata`.
///
/// The header is written before the data, so the data must match the stat
/// size exactly. A short or long read fails the entry.
fn append_contents<W: Write, R: Read>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &str,
    metadata: &Metadata,
    contents: R,
) -> Result<()> {
    let size = metadata.len();
    let mut header = header_for(EntryType::Regular, metadata, size);
    let mut reader = CountingReader::new(contents.take(size));
    builder
        .append_data(&mut header, name, &mut reader)
        .map_err(|e| LayupError::io("failed to archive file", path, e))?;

    let copied = reader.count;
    let mut rest = reader.into_inner().into_inner();
    let grew = rest
        .read(&mut [0u8; 1])
        .map_err(|e| LayupError::io("failed to archive file", path, e))?
        > 0;

    if copied != size || grew {
        let detail = if grew {
            format!("more than the {} bytes reported", size)
        } else {
            format!("{} of the {} bytes reported", copied, size)
        };
        return Err(LayupError::io(
            "file changed while archiving",
            path,
            io::Error::new(io::ErrorKind::InvalidData, format!("read {}", detail)),
        ));
    }
    Ok(())
}

/// Counts the bytes passed through a reader.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

fn header_for(entry_type: EntryType, metadata: &Metadata, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode_of(entry_type, metadata));
    header.set_mtime(mtime_of(metadata));
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn mode_of(_entry_type: EntryType, metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(entry_type: EntryType, metadata: &Metadata) -> u32 {
    match entry_type {
        EntryType::Directory => 0o755,
        _ if metadata.permissions().readonly() => 0o444,
        _ => 0o644,
    }
}

fn mtime_of(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Returns the last path component of `source`, resolving `.` and `..`.
fn base_name(source: &Path) -> Result<String> {
    if let Some(name) = source.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }

    let canonical = source
        .canonicalize()
        .map_err(|e| LayupError::io("failed to resolve", source, e))?;
    Ok(canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// Joins `base` and `relative` with forward slashes whatever the host separator.
fn archive_path(base: &str, relative: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !base.is_empty() {
        parts.push(base.to_string());
    }
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    parts.join("/")
}
