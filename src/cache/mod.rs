//! Generic client-side caching layer.
//!
//! This module is records-agnostic: it knows about resource keys, staleness
//! and in-flight de-duplication, not about endpoints. The cached API
//! surface in `records::cached_client` builds on it.

mod layer;
mod traits;

pub use layer::QueryCache;
pub use traits::{CacheEvent, ResourceKey};
