//! External service clients
//!
//! The vision service and the catalog are opaque collaborators reached over
//! HTTP. Each client owns its error enum and its request pacing; the pass
//! loops depend only on the trait seams so tests can substitute deterministic
//! stubs.

pub mod catalog;
pub mod rate_limit;
pub mod vision;

pub use catalog::{Catalog, CatalogClient, CatalogError};
pub use vision::{DescriptionGenerator, TagExtractor, VisionClient, VisionError};
