//! Repackaging of repository archives under a new top-level directory.
//!
//! Forges name the single root directory of an archive after the project and
//! branch (`proj-main/`). This crate swaps that directory for a caller chosen
//! name while keeping every member's relative path, metadata and contents.
//! Everything here works on in-memory byte buffers and performs no I/O.

mod error;
mod naming;
mod repackage;

pub use error::ArchiveError;
pub use naming::{OutputCompression, is_tarball, root_name};
pub use repackage::{Compression, detect_compression, encode, repackage};
