//! # kubeplate-sync
//!
//! Render → diff → atomic write.
//!
//! A [`TemplateUnit`] renders its template, compares the result with the last
//! output it saw and, when different, persists it with [`atomic_write`].

pub mod error;
pub mod unit;
pub mod writer;

pub use error::SyncError;
pub use unit::{Processed, TemplateUnit};
pub use writer::atomic_write;
