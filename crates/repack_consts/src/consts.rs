pub const REPACK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the configuration is read from when neither `--config` nor
/// [`CONFIG_PATH_ENV`] is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/download_config.json";
pub const CONFIG_PATH_ENV: &str = "REPACK_CONFIG";

pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Some forges answer unknown user agents with a bot-check page.
pub const USER_AGENT: &str = "Mozilla/5.0";

/// How much of a rejected response body is kept for diagnostics.
pub const BODY_PREFIX_LEN: usize = 500;

/// Tarball suffixes that are stripped as a whole to derive an archive's root
/// directory, longest first so `.tar.gz` wins over `.gz`.
pub const TARBALL_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar"];

pub const CLAP_GLOBAL_OPTIONS: &str = "Global Options";
