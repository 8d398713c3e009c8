//! Rewrites the leading path component of every member of a tar archive.
use std::{
    borrow::Cow,
    io::{Read, Write},
    path::{Component, Path, PathBuf},
};

use tar::{EntryType, Header};

use crate::{error::ArchiveError, naming::OutputCompression};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression framing detected around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    PlainTar,
    Gzip,
}

/// Detects the compression of `bytes` from its magic number. Anything that is
/// not gzip is assumed to be a plain tar stream.
pub fn detect_compression(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else {
        Compression::PlainTar
    }
}

/// Handle compression formats internally.
enum TarCompression<'a> {
    PlainTar(&'a [u8]),
    Gzip(flate2::read::GzDecoder<&'a [u8]>),
}

impl<'a> TarCompression<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        match detect_compression(bytes) {
            Compression::PlainTar => TarCompression::PlainTar(bytes),
            Compression::Gzip => TarCompression::Gzip(flate2::read::GzDecoder::new(bytes)),
        }
    }
}

impl Read for TarCompression<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TarCompression::PlainTar(reader) => reader.read(buf),
            TarCompression::Gzip(reader) => reader.read(buf),
        }
    }
}

/// Maps a member path onto the new root.
///
/// The first component (the old root directory) is dropped and the remainder
/// is placed below `new_root`. Returns `None` for depth-1 members and for
/// paths that are absolute or climb out of the archive.
fn rewrite_path(path: &Path, new_root: &str) -> Option<PathBuf> {
    let mut components = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir));
    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return None,
    }

    let mut rewritten = PathBuf::from(new_root);
    let mut depth = 0;
    for component in components {
        match component {
            Component::Normal(segment) => {
                rewritten.push(segment);
                depth += 1;
            }
            _ => return None,
        }
    }

    (depth > 0).then_some(rewritten)
}

/// Builds a GNU header that carries over all metadata of `source`.
///
/// Numeric fields some writers leave blank fall back to neutral values
/// instead of failing the whole archive.
fn copy_header(source: &Header, size: u64) -> std::io::Result<Header> {
    let entry_type = source.entry_type();
    let default_mode = if entry_type.is_dir() { 0o755 } else { 0o644 };

    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(source.mode().unwrap_or(default_mode));
    header.set_uid(source.uid().unwrap_or(0));
    header.set_gid(source.gid().unwrap_or(0));
    header.set_mtime(source.mtime().unwrap_or(0));
    header.set_size(size);

    if let Ok(Some(name)) = source.username() {
        header.set_username(name)?;
    }
    if let Ok(Some(name)) = source.groupname() {
        header.set_groupname(name)?;
    }
    if let Ok(Some(major)) = source.device_major() {
        header.set_device_major(major)?;
    }
    if let Ok(Some(minor)) = source.device_minor() {
        header.set_device_minor(minor)?;
    }

    Ok(header)
}

fn malformed(err: std::io::Error) -> ArchiveError {
    ArchiveError::MalformedArchive(err.to_string())
}

/// Repackages a tar archive so that all members live below `new_root`.
///
/// The input may be plain or gzip compressed; the output is always an
/// uncompressed tar written with GNU headers, so paths of any length survive.
/// Use [`encode`] to compress the result.
///
/// Members directly below the old root keep their relative layout. The old
/// root directory entry itself becomes `new_root`, while other depth-1
/// members (such as a `pax_global_header`) are dropped because they have no
/// place below the new root. Hard link targets are rewritten the same way;
/// symlink targets are kept as they are.
pub fn repackage(source: &[u8], new_root: &str) -> Result<Vec<u8>, ArchiveError> {
    if new_root.is_empty()
        || new_root == "."
        || new_root == ".."
        || new_root.contains(['/', '\\'])
    {
        return Err(ArchiveError::InvalidRootName(new_root.to_string()));
    }
    if source.is_empty() {
        return Err(ArchiveError::MalformedArchive("archive is empty".into()));
    }

    let mut archive = tar::Archive::new(TarCompression::new(source));
    let mut builder = tar::Builder::new(Vec::new());

    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut seen = 0usize;

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        seen += 1;

        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
            skipped += 1;
            continue;
        }

        let path = entry.path().map_err(malformed)?.into_owned();
        let target = match rewrite_path(&path, new_root) {
            Some(target) => target,
            None if entry_type.is_dir() && is_single_segment(&path) => PathBuf::from(new_root),
            None => {
                if !is_single_segment(&path) {
                    tracing::warn!("skipping archive member with unsafe path '{}'", path.display());
                }
                skipped += 1;
                continue;
            }
        };

        // Hard links must point at a member that survives the rewrite.
        let link_name = match entry.link_name().map_err(malformed)?.map(Cow::into_owned) {
            Some(link) if entry_type.is_hard_link() => match rewrite_path(&link, new_root) {
                Some(link) => Some(link),
                None => {
                    tracing::warn!(
                        "skipping hard link '{}' to '{}' outside the archive root",
                        path.display(),
                        link.display()
                    );
                    skipped += 1;
                    continue;
                }
            },
            link => link,
        };

        let size = if entry_type.is_file() || entry_type == EntryType::Continuous {
            entry.size()
        } else {
            0
        };
        let mut header = copy_header(entry.header(), size).map_err(malformed)?;

        // Errors here come from reading the source entry, the sink is a Vec.
        let appended = match link_name {
            Some(link) if entry_type.is_hard_link() || entry_type.is_symlink() => {
                builder.append_link(&mut header, &target, &link)
            }
            _ if size > 0 => builder.append_data(&mut header, &target, &mut entry),
            _ => builder.append_data(&mut header, &target, std::io::empty()),
        };
        appended.map_err(malformed)?;
        written += 1;
    }

    if seen == 0 {
        return Err(ArchiveError::MalformedArchive(
            "archive contains no members".into(),
        ));
    }

    tracing::debug!(written, skipped, root = new_root, "repackaged archive");
    Ok(builder.into_inner()?)
}

fn is_single_segment(path: &Path) -> bool {
    let mut components = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir));
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

/// Applies the requested output compression to a plain tar stream.
pub fn encode(tar: Vec<u8>, compression: OutputCompression) -> Result<Vec<u8>, ArchiveError> {
    match compression {
        OutputCompression::Plain => Ok(tar),
        OutputCompression::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&tar)?;
            Ok(encoder.finish()?)
        }
    }
}
