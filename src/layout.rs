//! Dashboard layout model and the bridge that persists it.
//!
//! Layout state is owned jointly by the session (in-memory copy) and the
//! backend (source of truth across devices). The bridge applies changes to
//! the session synchronously and coalesces backend writes behind a
//! trailing-edge debounce, so a drag burst turns into one request carrying
//! the final arrangement.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::session::SessionStore;

/// Delay between the last layout change and the backend write.
const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// One tile placement on the 12-column dashboard grid.
///
/// The wire names (`i`, `w`, `h`) are the grid library's; everything else
/// about the tile (content, styling) lives in the view layer and never
/// reaches this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutItem {
  #[serde(rename = "i")]
  pub id: String,
  pub x: u32,
  pub y: u32,
  #[serde(rename = "w")]
  pub width: u32,
  #[serde(rename = "h")]
  pub height: u32,
}

impl LayoutItem {
  fn new(id: &str, x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      id: id.to_string(),
      x,
      y,
      width,
      height,
    }
  }
}

/// The document shape stored by the backend and the persisted blob.
#[derive(Debug, Serialize, Deserialize)]
struct LayoutDocument {
  #[serde(rename = "landingPageLayout")]
  landing_page_layout: Vec<LayoutItem>,
}

/// The fixed arrangement used until a user rearranges their dashboard.
pub fn default_layout() -> Vec<LayoutItem> {
  vec![
    LayoutItem::new("hero", 0, 0, 12, 4),
    LayoutItem::new("students-card", 0, 4, 4, 1),
    LayoutItem::new("semesters-card", 4, 4, 4, 1),
    LayoutItem::new("courses-card", 8, 4, 4, 1),
    LayoutItem::new("testimonials-card", 0, 5, 6, 3),
    LayoutItem::new("upcoming-events-card", 6, 5, 6, 3),
    LayoutItem::new("past-events-card", 0, 8, 12, 2),
  ]
}

/// Serialize a layout to the backend's document string.
pub fn encode_document(items: &[LayoutItem]) -> serde_json::Result<String> {
  serde_json::to_string(&LayoutDocument {
    landing_page_layout: items.to_vec(),
  })
}

/// Parse a stored layout document, falling back to the default arrangement
/// when the string is malformed or missing the expected shape.
pub fn parse_document(raw: &str) -> Vec<LayoutItem> {
  match serde_json::from_str::<LayoutDocument>(raw) {
    Ok(doc) => doc.landing_page_layout,
    Err(e) => {
      warn!(error = %e, "stored layout is unreadable, using default");
      default_layout()
    }
  }
}

type SaveFuture = Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send>>;
type SaverFn = Arc<dyn Fn(String, String) -> SaveFuture + Send + Sync>;

/// Reconciles the session's layout copy with the backend.
pub struct LayoutBridge {
  session: Arc<SessionStore>,
  saver: SaverFn,
  debounce: Duration,
  /// At most one scheduled write; a new change replaces it.
  pending: Mutex<Option<JoinHandle<()>>>,
}

impl LayoutBridge {
  /// `saver` receives `(email, layout_document)` and performs the backend
  /// write; in production it posts to `/auth/layout`.
  pub fn new<F, Fut>(session: Arc<SessionStore>, saver: F) -> Self
  where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
  {
    Self {
      session,
      saver: Arc::new(move |email, layout| Box::pin(saver(email, layout))),
      debounce: SAVE_DEBOUNCE,
      pending: Mutex::new(None),
    }
  }

  /// Override the debounce window.
  pub fn with_debounce(mut self, debounce: Duration) -> Self {
    self.debounce = debounce;
    self
  }

  /// Apply a layout change: the session copy updates synchronously, the
  /// backend write is scheduled at the trailing edge of the debounce
  /// window. A change arriving inside the window cancels and reschedules
  /// the pending write; intermediate arrangements are dropped by design.
  pub fn on_change(&self, items: Vec<LayoutItem>) {
    self.session.set_layout(items.clone());
    self.schedule_save(items);
  }

  /// Adopt an account's stored layout at login/signup time. `stored` is
  /// the backend's layout string (`None` for a fresh account); when there
  /// is none, the default arrangement is written back so every device
  /// starts from the same state. The session copy is set before any
  /// network traffic, so a renderer attached to the session never sees a
  /// missing layout.
  pub async fn adopt(&self, email: &str, stored: Option<&str>) {
    match stored {
      Some(raw) => {
        self.session.set_layout(parse_document(raw));
      }
      None => {
        let items = default_layout();
        self.session.set_layout(items.clone());
        match encode_document(&items) {
          Ok(document) => {
            if let Err(e) = (self.saver)(email.to_string(), document).await {
              // Same tolerance as the original: a failed default-layout
              // write must not fail the login.
              warn!(error = %e, "failed to save default layout");
            }
          }
          Err(e) => warn!(error = %e, "failed to encode default layout"),
        }
      }
    }
  }

  /// Wait for a scheduled write, if any, to run to completion.
  pub async fn flush(&self) {
    let pending = self.pending().take();
    if let Some(handle) = pending {
      let _ = handle.await;
    }
  }

  fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    self.pending.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn schedule_save(&self, items: Vec<LayoutItem>) {
    let mut pending = self.pending();
    if let Some(previous) = pending.take() {
      previous.abort();
    }

    let session = self.session.clone();
    let saver = self.saver.clone();
    let debounce = self.debounce;
    *pending = Some(tokio::spawn(async move {
      tokio::time::sleep(debounce).await;

      // Logged out mid-burst: nothing to attribute the layout to.
      let Some(user) = session.snapshot().user else {
        return;
      };
      let document = match encode_document(&items) {
        Ok(document) => document,
        Err(e) => {
          warn!(error = %e, "failed to encode layout");
          return;
        }
      };

      debug!(email = %user.email, "persisting layout");
      if let Err(e) = saver(user.email, document).await {
        warn!(error = %e, "failed to save layout");
      }
    }));
  }
}
