//! Pipeline stages
//!
//! The stage catalog and the progress cursor derived from it.

pub mod catalog;
pub mod progress;

pub use catalog::{CatalogError, StageCatalog, StageHandling, StageName, DONE_STAGE, PIPELINE_STAGES};
pub use progress::{progress, ProgressMark, StageProgress};
