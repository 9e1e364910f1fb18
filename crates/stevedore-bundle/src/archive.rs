use crate::{fsync_dir, BundleError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Placeholder path used when a failure happens before any entry header is read.
const ARCHIVE_PATH: &str = "<archive>";

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// Create a deterministic gzip-compressed tar archive from a directory.
///
/// Identical trees produce identical bytes. Entries are walked in sorted
/// order with zeroed mtime and ownership. Modes are fixed at 0644 for files
/// and 0755 for directories.
///
/// Only regular files and directories are packed; anything else is skipped
/// with a warning.
pub fn pack(source_dir: &Path) -> Result<Vec<u8>, BundleError> {
    let mut entries = Vec::new();
    if source_dir.exists() {
        collect(source_dir, "", &mut entries)?;
    }

    let mut ar = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    ar.follow_symlinks(false);
    for entry in &entries {
        append_entry(&mut ar, entry)?;
    }

    let data = ar.into_inner()?.finish()?;
    debug!(
        "packed {} entries from {} ({} bytes)",
        entries.len(),
        source_dir.display(),
        data.len()
    );
    Ok(data)
}

/// Pack `source_dir` and atomically write the archive to `dest`.
///
/// Returns the archive size in bytes. Nothing is written to `dest` if packing fails.
pub fn pack_to_file(source_dir: &Path, dest: &Path) -> Result<u64, BundleError> {
    let data = pack(source_dir)?;
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(&data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| BundleError::Io(e.error))?;
    fsync_dir(&parent)?;
    Ok(data.len() as u64)
}

/// Extract an archive produced by [`pack`] into `dest`.
///
/// Any malformed input (bad gzip header, truncated entry, entry escaping the
/// destination) fails with [`BundleError::Decode`] naming the offending entry.
/// On failure `dest` may hold a partial extraction; callers unpack into a
/// scratch directory and discard it.
pub fn unpack(archive: &[u8], dest: &Path) -> Result<(), BundleError> {
    fs::create_dir_all(dest)?;
    let mut ar = tar::Archive::new(GzDecoder::new(archive));
    ar.set_preserve_permissions(false);
    ar.set_preserve_mtime(false);
    ar.set_unpack_xattrs(false);

    let entries = ar
        .entries()
        .map_err(|e| BundleError::decode(ARCHIVE_PATH, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| BundleError::decode(ARCHIVE_PATH, e))?;
        let path = entry
            .path()
            .map_err(|e| BundleError::decode(ARCHIVE_PATH, e))?
            .to_string_lossy()
            .into_owned();

        match entry.header().entry_type() {
            tar::EntryType::Regular | tar::EntryType::Directory => {}
            other => {
                warn!("skipping bundle entry {path} of type {other:?}");
                continue;
            }
        }

        let inside = entry
            .unpack_in(dest)
            .map_err(|e| BundleError::decode(path.clone(), e))?;
        if !inside {
            return Err(BundleError::decode(path, "entry escapes the bundle root"));
        }
    }
    Ok(())
}

/// A packable item, addressed by its `/`-separated path inside the bundle.
enum Entry {
    File { name: String, source: PathBuf },
    Dir { name: String },
}

/// Walk `dir` depth-first with children in byte order, so the same tree
/// always yields the same entry sequence.
fn collect(dir: &Path, prefix: &str, out: &mut Vec<Entry>) -> Result<(), BundleError> {
    let mut children = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(fs::DirEntry::file_name);

    for child in children {
        let file_name = child.file_name();
        let file_name = file_name.to_string_lossy();
        let name = if prefix.is_empty() {
            file_name.into_owned()
        } else {
            format!("{prefix}/{file_name}")
        };
        // DirEntry::file_type does not follow symlinks.
        let kind = child.file_type()?;
        if kind.is_dir() {
            out.push(Entry::Dir { name: name.clone() });
            collect(&child.path(), &name, out)?;
        } else if kind.is_file() {
            out.push(Entry::File {
                name,
                source: child.path(),
            });
        } else {
            warn!("skipping unsupported bundle entry: {name}");
        }
    }
    Ok(())
}

fn make_header(entry_type: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header.set_size(size);
    header
}

fn append_entry<W: Write>(ar: &mut tar::Builder<W>, entry: &Entry) -> Result<(), BundleError> {
    let (path, entry_type, mode, data) = match entry {
        Entry::File { name, source } => (
            name.clone(),
            tar::EntryType::Regular,
            FILE_MODE,
            fs::read(source)?,
        ),
        Entry::Dir { name } => (
            format!("{name}/"),
            tar::EntryType::Directory,
            DIR_MODE,
            Vec::new(),
        ),
    };
    let mut header = make_header(entry_type, mode, data.len() as u64);
    ar.append_data(&mut header, &path, data.as_slice())?;
    Ok(())
}
