//! Fetches the configured repository archive, re-roots it and stores the result
//! in the download directory.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use repack_archive::{ArchiveError, OutputCompression};
use repack_config::Config;
use repack_fetch::{ArchiveFetcher, ArchiveLocation, FetchError};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// An archive that was written to the download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArchive {
    /// The file name inside the download directory, as configured.
    pub file_name: String,
    pub path: PathBuf,
    /// The top-level directory every member of the archive lives under.
    pub root_name: String,
    pub size: u64,
}

impl ProducedArchive {
    pub fn compression(&self) -> OutputCompression {
        OutputCompression::from_file_name(&self.file_name)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ProduceError {
    #[error("cannot derive an archive root directory from '{0}'")]
    InvalidOutputName(String),

    #[error("failed to download the repository archive")]
    Fetch(#[from] FetchError),

    #[error("failed to repackage the repository archive")]
    Archive(#[from] ArchiveError),

    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the repackaging task did not complete")]
    Join(#[from] tokio::task::JoinError),
}

/// Runs one fetch and repackage cycle for `config`.
///
/// Nothing is written unless every step succeeds, so a failed run leaves an
/// earlier archive with the same name in place.
#[instrument(skip_all, fields(output = %config.output_name, branch = %config.branch))]
pub async fn produce_archive(
    config: &Config,
    fetcher: &ArchiveFetcher,
) -> Result<ProducedArchive, ProduceError> {
    let file_name = config.output_name.clone();
    let root_name = repack_archive::root_name(&file_name)
        .ok_or_else(|| ProduceError::InvalidOutputName(file_name.clone()))?
        .to_string();
    if !repack_archive::is_tarball(&file_name) {
        warn!("'{file_name}' has no tar extension, the archive is written as plain tar");
    }

    let location = ArchiveLocation::new(&config.repo_url, &config.branch, config.archive_format)?;
    info!(url = %location.url(), "fetching repository archive");
    let source = fetcher.fetch(&location, &config.access_token).await?;

    let compression = OutputCompression::from_file_name(&file_name);
    let new_root = root_name.clone();
    let contents = tokio::task::spawn_blocking(move || {
        let tar = repack_archive::repackage(&source, &new_root)?;
        repack_archive::encode(tar, compression)
    })
    .await??;

    fs_err::tokio::create_dir_all(&config.download_dir)
        .await
        .map_err(|source| ProduceError::Io {
            path: config.download_dir.clone(),
            source,
        })?;

    let path = config.download_dir.join(&file_name);
    atomic_write(&path, &contents)
        .await
        .map_err(|source| ProduceError::Io {
            path: path.clone(),
            source,
        })?;

    let size = contents.len() as u64;
    info!(path = %path.display(), size, root = %root_name, "produced archive");

    Ok(ProducedArchive {
        file_name,
        path,
        root_name,
        size,
    })
}

/// Writes `contents` next to `path` first and renames it into place, so readers
/// never see a partially written archive.
async fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;
    let prefix = format!(
        ".{}.",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp")
    );

    let temp_path = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(dir)?
        .into_temp_path();

    // The temp file is removed when `temp_path` is dropped on error.
    tokio::fs::write(&temp_path, contents).await?;
    temp_path.persist(path).map_err(|e| e.error)?;

    Ok(())
}
