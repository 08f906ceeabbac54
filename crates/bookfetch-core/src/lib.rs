//! Download coordination for book catalogs.
//!
//! A persisted [`progress::ProgressDocument`] lists the items of a catalog.
//! [`pipeline::DownloadOrchestrator`] searches the catalog for each item,
//! narrows results with [`matcher::filter_candidates`], and downloads every
//! retained candidate under [`admission::AdmissionController`] limits, either
//! directly or through an external agent whose downloads are detected by
//! [`watcher::CompletionWatcher`].

pub mod admission;
pub mod catalog;
pub mod config;
pub mod download;
pub mod logging;
pub mod matcher;
pub mod naming;
pub mod pipeline;
pub mod progress;
pub mod watcher;
