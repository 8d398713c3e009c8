use std::path::Path;

use repack_consts::consts::TARBALL_SUFFIXES;

/// Checks whether file has a tarball extension this crate can produce.
pub fn is_tarball(file_name: &str) -> bool {
    TARBALL_SUFFIXES
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

/// Derives the root directory name for an archive from its file name.
///
/// Known tarball suffixes are stripped as a whole (`proj.tar.gz` becomes
/// `proj`), any other name loses its last extension only. Returns `None` when
/// nothing is left, e.g. for `.tar`.
pub fn root_name(file_name: &str) -> Option<&str> {
    let stem = match TARBALL_SUFFIXES
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
    {
        Some(stem) => stem,
        None => Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name),
    };

    Some(stem.trim()).filter(|stem| !stem.is_empty())
}

/// How the produced archive is stored on disk.
///
/// The file extension of the output always matches its contents: names ending
/// in `.tar.gz` or `.tgz` are gzip compressed, everything else is plain tar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCompression {
    Plain,
    Gzip,
}

impl OutputCompression {
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            OutputCompression::Gzip
        } else {
            OutputCompression::Plain
        }
    }

    /// The content type an HTTP response serving this archive should carry.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputCompression::Plain => "application/x-tar",
            OutputCompression::Gzip => "application/gzip",
        }
    }
}
