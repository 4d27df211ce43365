//! Keys and shared types for the caching system.

use std::fmt;

/// Identifier for one cached collection of entities.
///
/// Each key maps to at most one cached value plus its metadata (fetch
/// timestamp, in-flight state). The set is closed: the API exposes exactly
/// these four collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  Students,
  Semesters,
  Courses,
  Enrollments,
}

impl ResourceKey {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKey::Students => "students",
      ResourceKey::Semesters => "semesters",
      ResourceKey::Courses => "courses",
      ResourceKey::Enrollments => "enrollments",
    }
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Typed change notification published by the cache. Consumers that render
/// a collection subscribe and re-read on events for their key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
  /// A fetch installed a fresh value for the key.
  Updated(ResourceKey),
  /// The key was invalidated; the next read will refetch.
  Invalidated(ResourceKey),
}
