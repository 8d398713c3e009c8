pub mod cli;
pub mod produce;
pub mod server;

pub use produce::{ProduceError, ProducedArchive, produce_archive};
