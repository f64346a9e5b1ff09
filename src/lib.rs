//! autotag - image description, tagging, and catalog upload
//!
//! Two batch passes share one persisted artifact:
//! - the Processing Pass sends images to a vision model for a description,
//!   extracts tags from that description, and checkpoints results into a
//!   resumable JSON ledger;
//! - the Sync Pass uploads images plus their ledger metadata to a remote
//!   catalog, skipping entries the catalog already has.

pub mod config;
pub mod error;
pub mod ledger;
pub mod process;
pub mod scanner;
pub mod services;
pub mod sync;
pub mod vocabulary;

pub use crate::error::{Error, Result};
