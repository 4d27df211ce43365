//! The student-records API surface: HTTP gateway, raw typed accessors and
//! the cached client built on top of them.

mod cached_client;
mod client;
mod http;
pub mod types;

pub use cached_client::CachedClient;
pub use client::RecordsClient;
pub use http::HttpClient;
