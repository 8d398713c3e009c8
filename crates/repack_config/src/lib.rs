use std::{
    collections::BTreeSet as Set,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use itertools::Itertools;
use miette::{IntoDiagnostic, miette};
use repack_consts::consts;
use serde::{Deserialize, Serialize, de::IntoDeserializer};
use url::Url;

/// The archive flavour requested from the forge.
///
/// GitLab serves the same tree as `.tar.gz`, `.tar.bz2`, `.tar` and `.zip`;
/// only the two tar flavours can be repackaged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar")]
    Tar,
}

impl ArchiveFormat {
    /// The file suffix used in the archive download URL.
    pub fn suffix(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Tar => "tar",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = serde::de::value::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deserialize(s.into_deserializer())
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// When the download endpoint builds the archive it serves.
///
/// - `Eager`: the archive is built once at startup and the endpoint serves
///   whatever is in the download directory.
/// - `Lazy`: every download request fetches and repackages the archive again.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    #[default]
    Eager,
    Lazy,
}

impl FromStr for ServeMode {
    type Err = serde::de::value::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deserialize(s.into_deserializer())
    }
}

impl std::fmt::Display for ServeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeMode::Eager => write!(f, "eager"),
            ServeMode::Lazy => write!(f, "lazy"),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(consts::DEFAULT_DOWNLOAD_DIR)
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, consts::DEFAULT_PORT))
}

fn default_fetch_timeout_secs() -> u64 {
    consts::DEFAULT_FETCH_TIMEOUT_SECS
}

/// Everything needed to fetch, repackage and serve one repository archive.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Base address of the repository, e.g. `https://gitlab.com/group/project`.
    pub repo_url: String,

    /// The branch whose archive is downloaded.
    pub branch: String,

    /// Sent as a bearer token with the archive request.
    pub access_token: String,

    /// File name of the produced archive. Its stem becomes the new root
    /// directory inside the archive.
    pub output_name: String,

    #[serde(default)]
    pub archive_format: ArchiveFormat,

    #[serde(default)]
    pub serve_mode: ServeMode,

    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// The file this configuration was read from.
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

// Hand written so the access token never ends up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("repo_url", &self.repo_url)
            .field("branch", &self.branch)
            .field("access_token", &"********")
            .field("output_name", &self.output_name)
            .field("archive_format", &self.archive_format)
            .field("serve_mode", &self.serve_mode)
            .field("download_dir", &self.download_dir)
            .field("listen", &self.listen)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("loaded_from", &self.loaded_from)
            .finish()
    }
}

/// Whether `name` names a file directly inside a directory, without
/// separators or relative components.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no file was found at {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read config from '{0}'")]
    ReadError(std::io::Error),
    #[error("failed to parse config of {1}: {0}")]
    ParseError(miette::Report, PathBuf),
    #[error("validation error of {1}: {0}")]
    ValidationError(miette::Report, PathBuf),
}

impl Config {
    /// Parse the given json string and return a Config instance.
    ///
    /// # Returns
    ///
    /// The parsed config, and the unused keys
    ///
    /// # Errors
    ///
    /// Parsing errors, including missing required fields
    pub fn from_json(json: &str) -> miette::Result<(Config, Set<String>)> {
        let mut de = serde_json::Deserializer::from_str(json);

        let mut unused_keys = Set::new();
        let mut config: Config = serde_ignored::deserialize(&mut de, |path| {
            unused_keys.insert(path.to_string());
        })
        .into_diagnostic()?;
        de.end().into_diagnostic()?;

        config.output_name = config.output_name.trim().to_string();

        Ok((config, unused_keys))
    }

    /// Load the config from the given path.
    ///
    /// # Errors
    ///
    /// I/O errors, parsing errors or validation errors
    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        tracing::debug!("Loading config from {}", path.display());
        let s = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    || e.kind() == std::io::ErrorKind::NotADirectory =>
            {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::ReadError(e)),
        };

        let (mut config, unused_keys) =
            Config::from_json(&s).map_err(|e| ConfigError::ParseError(e, path.to_path_buf()))?;

        if !unused_keys.is_empty() {
            tracing::warn!(
                "Ignoring '{}' in {}",
                unused_keys.iter().join(", "),
                path.display()
            );
        }

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e, path.to_path_buf()))?;

        config.loaded_from = Some(path.to_path_buf());
        tracing::debug!("Loaded config from: {}", path.display());

        Ok(config)
    }

    /// Checks the invariants that deserialization alone cannot express.
    pub fn validate(&self) -> miette::Result<()> {
        for (key, value) in [
            ("repo_url", &self.repo_url),
            ("branch", &self.branch),
            ("access_token", &self.access_token),
            ("output_name", &self.output_name),
        ] {
            if value.trim().is_empty() {
                return Err(miette!("'{key}' must not be empty"));
            }
        }

        let url = Url::parse(self.repo_url.trim())
            .map_err(|e| miette!("'repo_url' is not a valid url: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(miette!(
                "'repo_url' must use http or https, found '{}'",
                url.scheme()
            ));
        }
        let has_repo_name = url
            .path_segments()
            .is_some_and(|mut segments| segments.any(|segment| !segment.is_empty()));
        if !has_repo_name {
            return Err(miette!(
                "'repo_url' must include the repository path, found '{}'",
                self.repo_url
            ));
        }

        if !is_plain_file_name(&self.output_name) {
            return Err(miette!(
                "'output_name' must be a plain file name, found '{}'",
                self.output_name
            ));
        }
        if repack_archive::root_name(&self.output_name).is_none() {
            return Err(miette!(
                "'output_name' needs a name before its extension, found '{}'",
                self.output_name
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(miette!("'fetch_timeout_secs' must be at least 1"));
        }

        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
