//! Cache layer that orchestrates cached reads, in-flight de-duplication
//! and mutation-driven invalidation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use super::traits::{CacheEvent, ResourceKey};
use crate::error::ApiError;

/// Outcome of one network fetch, shared with every reader attached to it.
type FetchOutcome = Result<Value, ApiError>;

#[derive(Default)]
struct Slot {
  /// Bumped on every invalidation. A fetch only installs its result when
  /// the epoch it started under is still current.
  epoch: u64,
  state: SlotState,
}

#[derive(Default)]
enum SlotState {
  #[default]
  Idle,
  /// A fetch is in flight; late readers subscribe to this channel instead
  /// of issuing their own request.
  InFlight(watch::Receiver<Option<FetchOutcome>>),
  Ready {
    value: Value,
    fetched_at: Instant,
  },
}

/// Client-side query/mutation cache.
///
/// Sits between the application and the network client, keyed by
/// [`ResourceKey`]. Reads are served from cache while fresh, de-duplicated
/// while a fetch is in flight, and retried once on failure. Mutations are
/// never retried; on success they invalidate their declared set of keys so
/// the next read of each refetches. Entries are never evicted; the cache
/// lives for the process.
#[derive(Clone)]
pub struct QueryCache {
  slots: Arc<Mutex<HashMap<ResourceKey, Slot>>>,
  /// How long before cached data is considered stale.
  stale_time: Duration,
  events: broadcast::Sender<CacheEvent>,
}

enum Plan {
  Hit(Value),
  Join {
    rx: watch::Receiver<Option<FetchOutcome>>,
    epoch: u64,
  },
  Lead {
    tx: watch::Sender<Option<FetchOutcome>>,
    epoch: u64,
  },
}

impl QueryCache {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      slots: Arc::new(Mutex::new(HashMap::new())),
      stale_time: Duration::from_secs(5 * 60),
      events,
    }
  }

  /// Subscribe to typed change events. This is how a view layer learns
  /// that a collection it renders moved underneath it.
  #[allow(dead_code)]
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// The slot table. All critical sections are short and synchronous, so a
  /// poisoned lock only means some other task panicked mid-section; the
  /// table itself is still coherent.
  fn slots(&self) -> MutexGuard<'_, HashMap<ResourceKey, Slot>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read one resource with cache-first strategy.
  ///
  /// 1. Fresh cache entry: returned immediately, no network.
  /// 2. Fetch already in flight for `key`: attach to it and share its
  ///    outcome, so overlapping reads issue exactly one request.
  /// 3. Miss or stale: lead a fetch, retrying once on failure. Errors are
  ///    not cached; the next read starts over.
  pub async fn read<T, F, Fut>(&self, key: ResourceKey, fetch: F) -> Result<T, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    loop {
      let plan = {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();
        match &slot.state {
          SlotState::Ready { value, fetched_at } if fetched_at.elapsed() < self.stale_time => {
            Plan::Hit(value.clone())
          }
          SlotState::InFlight(rx) => Plan::Join {
            rx: rx.clone(),
            epoch: slot.epoch,
          },
          _ => {
            let (tx, rx) = watch::channel(None);
            slot.state = SlotState::InFlight(rx);
            Plan::Lead {
              tx,
              epoch: slot.epoch,
            }
          }
        }
      };

      match plan {
        Plan::Hit(value) => {
          debug!(key = %key, "cache hit");
          return decode(key, value);
        }
        Plan::Join { rx, epoch } => {
          debug!(key = %key, "joining in-flight fetch");
          match wait_for_outcome(rx).await {
            Some(outcome) => return outcome.and_then(|value| decode(key, value)),
            None => {
              // The leading read was dropped before resolving. Release the
              // slot and start over; this read becomes the new leader.
              let mut slots = self.slots();
              if let Some(slot) = slots.get_mut(&key) {
                if slot.epoch == epoch && matches!(slot.state, SlotState::InFlight(_)) {
                  slot.state = SlotState::Idle;
                }
              }
            }
          }
        }
        Plan::Lead { tx, epoch } => {
          debug!(key = %key, "cache miss, fetching");
          let result = match fetch().await {
            Ok(data) => Ok(data),
            Err(first) => {
              warn!(key = %key, error = %first, "fetch failed, retrying once");
              fetch().await
            }
          };

          let outcome = result.and_then(|data| {
            serde_json::to_value(&data)
              .map(|value| (data, value))
              .map_err(|e| ApiError::Application(format!("failed to encode {}: {}", key, e)))
          });

          let mut installed = false;
          {
            let mut slots = self.slots();
            if let Some(slot) = slots.get_mut(&key) {
              // Skip the writeback when the key was invalidated while the
              // fetch was in flight: the result may predate the mutation.
              if slot.epoch == epoch {
                slot.state = match &outcome {
                  Ok((_, value)) => {
                    installed = true;
                    SlotState::Ready {
                      value: value.clone(),
                      fetched_at: Instant::now(),
                    }
                  }
                  Err(_) => SlotState::Idle,
                };
              }
            }
          }
          if installed {
            let _ = self.events.send(CacheEvent::Updated(key));
          }

          let shared = match &outcome {
            Ok((_, value)) => Ok(value.clone()),
            Err(e) => Err(e.clone()),
          };
          let _ = tx.send(Some(shared));

          return outcome.map(|(data, _)| data);
        }
      }
    }
  }

  /// Run a mutation, then invalidate the listed keys on success.
  ///
  /// Mutations are never retried here: surfacing the error immediately is
  /// preferable to risking a duplicate write. Two concurrent mutations on
  /// the same key race at the network level and the last response to
  /// arrive wins; each one's invalidation still applies independently, so
  /// the next read refetches either way.
  pub async fn mutate<T, F, Fut>(
    &self,
    invalidates: &[ResourceKey],
    op: F,
  ) -> Result<T, ApiError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let data = op().await?;
    for key in invalidates {
      self.invalidate(*key);
    }
    Ok(data)
  }

  /// Drop the cached value for `key`, forcing the next read to refetch.
  pub fn invalidate(&self, key: ResourceKey) {
    {
      let mut slots = self.slots();
      if let Some(slot) = slots.get_mut(&key) {
        debug!(key = %key, "invalidating");
        slot.epoch += 1;
        slot.state = SlotState::Idle;
      }
    }
    let _ = self.events.send(CacheEvent::Invalidated(key));
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

fn decode<T: DeserializeOwned>(key: ResourceKey, value: Value) -> Result<T, ApiError> {
  serde_json::from_value(value)
    .map_err(|e| ApiError::Application(format!("failed to decode {}: {}", key, e)))
}

/// Wait until the leading fetch publishes its outcome. Returns `None` when
/// the leader was dropped without ever resolving.
async fn wait_for_outcome(
  mut rx: watch::Receiver<Option<FetchOutcome>>,
) -> Option<FetchOutcome> {
  loop {
    let current = rx.borrow_and_update().clone();
    if current.is_some() {
      return current;
    }
    if rx.changed().await.is_err() {
      // Sender gone; it may have published right before dropping.
      return rx.borrow().clone();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn counting_fetcher(
    counter: &Arc<AtomicU32>,
    payload: Vec<u32>,
  ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<Vec<u32>, ApiError>> + Send>> {
    let counter = counter.clone();
    move || {
      let counter = counter.clone();
      let payload = payload.clone();
      Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(payload)
      })
    }
  }

  #[tokio::test]
  async fn concurrent_reads_share_one_fetch() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetch = counting_fetcher(&calls, vec![1, 2, 3]);

    let (a, b, c) = tokio::join!(
      cache.read::<Vec<u32>, _, _>(ResourceKey::Students, &fetch),
      cache.read::<Vec<u32>, _, _>(ResourceKey::Students, &fetch),
      cache.read::<Vec<u32>, _, _>(ResourceKey::Students, &fetch),
    );

    assert_eq!(a.unwrap(), vec![1, 2, 3]);
    assert_eq!(b.unwrap(), vec![1, 2, 3]);
    assert_eq!(c.unwrap(), vec![1, 2, 3]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn fresh_entry_skips_network() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetch = counting_fetcher(&calls, vec![7]);

    let first: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();
    let second: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn stale_entry_refetches() {
    let cache = QueryCache::new().with_stale_time(Duration::ZERO);
    let calls = Arc::new(AtomicU32::new(0));
    let fetch = counting_fetcher(&calls, vec![7]);

    let _: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();
    let _: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn failed_fetch_is_retried_once() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls2 = calls.clone();

    let result: Result<Vec<u32>, _> = cache
      .read(ResourceKey::Semesters, move || {
        let calls = calls2.clone();
        async move {
          if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ApiError::Network("connection reset".into()))
          } else {
            Ok(vec![1])
          }
        }
      })
      .await;

    assert_eq!(result.unwrap(), vec![1]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn errors_are_not_cached() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls2 = calls.clone();

    let fetch = move || {
      let calls = calls2.clone();
      async move {
        // Fail the first read's attempt and its retry, succeed afterwards.
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
          Err(ApiError::Http {
            status: 500,
            payload: None,
          })
        } else {
          Ok(vec![9])
        }
      }
    };

    let first: Result<Vec<u32>, _> = cache.read(ResourceKey::Enrollments, &fetch).await;
    assert!(first.is_err());

    let second: Vec<u32> = cache.read(ResourceKey::Enrollments, &fetch).await.unwrap();
    assert_eq!(second, vec![9]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn attached_reads_share_the_error() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls2 = calls.clone();

    let fetch = move || {
      let calls = calls2.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err::<Vec<u32>, _>(ApiError::Network("unreachable".into()))
      }
    };

    let (a, b) = tokio::join!(
      cache.read::<Vec<u32>, _, _>(ResourceKey::Students, &fetch),
      cache.read::<Vec<u32>, _, _>(ResourceKey::Students, &fetch),
    );

    assert_eq!(a, b);
    assert!(a.is_err());
    // One leading read: initial attempt plus one retry, nothing from the
    // attached read.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn mutation_invalidates_dependent_keys() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetch = counting_fetcher(&calls, vec![1]);

    let _: Vec<u32> = cache.read(ResourceKey::Semesters, &fetch).await.unwrap();
    let _: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();
    let _: Vec<u32> = cache.read(ResourceKey::Students, &fetch).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Deleting a semester cascades to courses and students.
    cache
      .mutate(
        &[
          ResourceKey::Semesters,
          ResourceKey::Courses,
          ResourceKey::Students,
        ],
        || async { Ok(()) },
      )
      .await
      .unwrap();

    let _: Vec<u32> = cache.read(ResourceKey::Semesters, &fetch).await.unwrap();
    let _: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();
    let _: Vec<u32> = cache.read(ResourceKey::Students, &fetch).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 6);
  }

  #[tokio::test]
  async fn failed_mutation_is_not_retried() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls2 = calls.clone();

    let result: Result<(), _> = cache
      .mutate(&[ResourceKey::Students], move || {
        let calls = calls2.clone();
        async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Err(ApiError::Http {
            status: 409,
            payload: None,
          })
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The failed mutation must not have invalidated anything either: prime
    // the key, fail another mutation, and the entry is still served.
    let fetch = counting_fetcher(&calls, vec![1]);
    let _: Vec<u32> = cache.read(ResourceKey::Students, &fetch).await.unwrap();
    let before = calls.load(Ordering::SeqCst);
    let _ = cache
      .mutate(&[ResourceKey::Students], || async {
        Err::<(), _>(ApiError::Network("down".into()))
      })
      .await;
    let _: Vec<u32> = cache.read(ResourceKey::Students, &fetch).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), before);
  }

  #[tokio::test]
  async fn fetch_resolving_after_invalidation_is_not_installed() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let slow = counting_fetcher(&calls, vec![1]);

    let read = cache.read::<Vec<u32>, _, _>(ResourceKey::Courses, &slow);
    tokio::pin!(read);

    // Let the fetch start, then invalidate underneath it.
    tokio::select! {
      biased;
      _ = &mut read => panic!("fetch should still be sleeping"),
      _ = tokio::time::sleep(Duration::from_millis(5)) => {}
    }
    cache.invalidate(ResourceKey::Courses);

    // The in-flight read still resolves for its caller...
    assert_eq!(read.await.unwrap(), vec![1]);

    // ...but its value was not installed, so the next read refetches.
    let _: Vec<u32> = cache.read(ResourceKey::Courses, &slow).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn dropped_leader_hands_over_to_next_reader() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetch = counting_fetcher(&calls, vec![4]);

    {
      // Start a read and drop it before it resolves, the way an unmounted
      // consumer abandons a fetch.
      let abandoned = cache.read::<Vec<u32>, _, _>(ResourceKey::Students, &fetch);
      tokio::pin!(abandoned);
      tokio::select! {
        biased;
        _ = &mut abandoned => panic!("fetch should still be sleeping"),
        _ = tokio::time::sleep(Duration::from_millis(5)) => {}
      }
    }

    let value: Vec<u32> = cache.read(ResourceKey::Students, &fetch).await.unwrap();
    assert_eq!(value, vec![4]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn subscribers_see_updates_and_invalidations() {
    let cache = QueryCache::new();
    let mut events = cache.subscribe();
    let calls = Arc::new(AtomicU32::new(0));
    let fetch = counting_fetcher(&calls, vec![1]);

    let _: Vec<u32> = cache.read(ResourceKey::Courses, &fetch).await.unwrap();
    assert_eq!(
      events.recv().await.unwrap(),
      CacheEvent::Updated(ResourceKey::Courses)
    );

    cache
      .mutate(&[ResourceKey::Courses], || async { Ok(()) })
      .await
      .unwrap();
    assert_eq!(
      events.recv().await.unwrap(),
      CacheEvent::Invalidated(ResourceKey::Courses)
    );
  }
}
