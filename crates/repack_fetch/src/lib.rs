//! Downloads the archive of a repository branch from a GitLab-style forge.
//!
//! [`ArchiveLocation`] derives where the archive lives, [`ArchiveFetcher`]
//! downloads it and decides whether the response really is an archive.

mod client;
mod error;
mod fetch;
mod location;

pub use client::build_reqwest_client;
pub use error::FetchError;
pub use fetch::{ArchiveFetcher, is_archive_response};
pub use location::ArchiveLocation;
