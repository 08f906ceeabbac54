//! Persistent progress of one catalog.
//!
//! A `ProgressDocument` lists the catalog's items, the candidates found for
//! each, and which items are complete. `ProgressStore` owns the document for
//! the lifetime of a run: mutations are serialized by one mutex and written
//! through to disk (atomic replace) before they return, so re-running against
//! the same file skips completed items and consumed candidates.

mod error;
mod model;
mod persist;
mod store;

pub use error::StoreError;
pub use model::{Candidate, Item, ProgressDocument, Tier, DEFAULT_TIER};
pub use persist::{document_path, load_document, save_document};
pub use store::ProgressStore;
