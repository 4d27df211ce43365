//! Session state machine.
//!
//! Exactly one session exists per running client. Consumers read
//! snapshots and subscribe to change notifications; every mutation runs
//! synchronously and publishes the new state before returning.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::persist::{PersistStore, PersistedAuth, PersistedRoot};
use super::token::TokenStore;
use crate::layout::{self, LayoutItem};

/// Identity projection of the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
  /// No credential held.
  Anonymous,
  /// A credential exchange is in flight.
  Authenticating,
  Authenticated,
  /// A credential exchange failed; access-wise equivalent to `Anonymous`,
  /// with a message to display. The next submission clears it.
  Error,
}

/// Snapshot of the session, published on every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
  pub phase: SessionPhase,
  pub user: Option<User>,
  pub error: Option<String>,
  /// In-memory copy of the dashboard layout.
  pub layout: Vec<LayoutItem>,
}

impl SessionState {
  pub fn is_logged_in(&self) -> bool {
    self.phase == SessionPhase::Authenticated
  }

  /// Whether a credential exchange is in flight (the UI's spinner flag).
  #[allow(dead_code)]
  pub fn is_loading(&self) -> bool {
    self.phase == SessionPhase::Authenticating
  }
}

impl Default for SessionState {
  fn default() -> Self {
    Self {
      phase: SessionPhase::Anonymous,
      user: None,
      error: None,
      layout: layout::default_layout(),
    }
  }
}

pub struct SessionStore {
  state: watch::Sender<SessionState>,
  tokens: Arc<TokenStore>,
  persist: Arc<PersistStore>,
  /// The deferred blob clear from the most recent logout, so a shutdown
  /// can wait for it instead of exiting with the blob still on disk.
  pending_clear: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
  /// Build the store, rehydrating optimistically from the persisted blob:
  /// a previously signed-in identity re-enters `Authenticated` without
  /// contacting the server. [`SessionStore::ensure_valid`] is the backstop
  /// that corrects this when the credential has actually expired.
  pub fn new(tokens: Arc<TokenStore>, persist: Arc<PersistStore>) -> Self {
    let mut state = SessionState::default();
    if let Some(root) = persist.load() {
      if root.auth.is_logged_in {
        if let Some(user) = root.auth.user {
          debug!(email = %user.email, "restoring session");
          state.phase = SessionPhase::Authenticated;
          state.user = Some(user);
        }
      }
      if let Some(raw) = root.layout.as_deref() {
        state.layout = layout::parse_document(raw);
      }
    }

    let (state, _) = watch::channel(state);
    Self {
      state,
      tokens,
      persist,
      pending_clear: Mutex::new(None),
    }
  }

  /// Current state, cloned out.
  pub fn snapshot(&self) -> SessionState {
    self.state.borrow().clone()
  }

  /// Subscribe to state changes. The receiver observes every transition
  /// published after this call plus the current value. This is how a view
  /// layer tracks the session; the CLI only takes snapshots.
  #[allow(dead_code)]
  pub fn subscribe(&self) -> watch::Receiver<SessionState> {
    self.state.subscribe()
  }

  /// A login or signup submission went out: enter `Authenticating`,
  /// clearing any error from a previous attempt.
  pub fn begin_auth(&self) {
    self.state.send_modify(|state| {
      state.phase = SessionPhase::Authenticating;
      state.error = None;
    });
  }

  /// A credential exchange succeeded. Stores the token when the server
  /// issued one, enters `Authenticated` and rewrites the persisted blob.
  pub fn complete_login(&self, user: User, token: Option<&str>) {
    if let Some(token) = token {
      if let Err(e) = self.tokens.store(token) {
        // The session still works for this run; only rehydration suffers.
        warn!(error = %e, "failed to persist credential");
      }
    }

    debug!(email = %user.email, "authenticated");
    self.state.send_modify(|state| {
      state.phase = SessionPhase::Authenticated;
      state.user = Some(user);
      state.error = None;
    });
    self.persist_current();
  }

  /// A credential exchange failed; keep the message for display.
  pub fn fail_auth(&self, message: impl Into<String>) {
    self.state.send_modify(|state| {
      state.phase = SessionPhase::Error;
      state.user = None;
      state.error = Some(message.into());
    });
  }

  /// A signup succeeded: the account exists but the session stays signed
  /// out until the user logs in.
  pub fn complete_signup(&self) {
    self.state.send_modify(|state| {
      state.phase = SessionPhase::Anonymous;
      state.error = None;
    });
  }

  /// Tear the session down: used for explicit logout and forced logout on
  /// an invalid credential alike. Clears the token immediately and the
  /// persisted blob after a short delay (so an in-flight blob write cannot
  /// resurrect it). The in-memory layout survives; a later login replaces
  /// it from the backend.
  pub fn logout(&self) {
    debug!("logging out");
    self.tokens.clear();
    self.state.send_modify(|state| {
      state.phase = SessionPhase::Anonymous;
      state.user = None;
      state.error = None;
    });
    *self.pending_clear() = Some(self.persist.clear_deferred());
  }

  /// Wait for a deferred blob clear, if one is outstanding. Called before
  /// process exit; a long-lived client never needs it.
  pub async fn flush(&self) {
    let pending = self.pending_clear().take();
    if let Some(handle) = pending {
      let _ = handle.await;
    }
  }

  /// Opportunistic credential check, run on entry to any protected
  /// operation. An `Authenticated` session whose token is gone or expired
  /// is forcibly logged out. Returns whether the session is (still)
  /// authenticated.
  pub fn ensure_valid(&self) -> bool {
    if self.state.borrow().is_logged_in() && !self.tokens.is_valid() {
      warn!("credential missing or expired, forcing logout");
      self.logout();
      return false;
    }
    self.state.borrow().is_logged_in()
  }

  /// Replace the in-memory layout and rewrite the persisted blob. This is
  /// the synchronous half of a layout change; backend persistence is the
  /// bridge's job.
  pub fn set_layout(&self, items: Vec<LayoutItem>) {
    self.state.send_modify(|state| state.layout = items);
    self.persist_current();
  }

  fn pending_clear(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    self
      .pending_clear
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn persist_current(&self) {
    let state = self.state.borrow().clone();
    let root = PersistedRoot {
      layout: match layout::encode_document(&state.layout) {
        Ok(document) => Some(document),
        Err(e) => {
          warn!(error = %e, "failed to encode layout for persistence");
          None
        }
      },
      auth: PersistedAuth {
        is_logged_in: state.is_logged_in(),
        user: state.user,
      },
      meta: Default::default(),
    };
    if let Err(e) = self.persist.save(&root) {
      warn!(error = %e, "failed to persist session state");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn stores(dir: &TempDir) -> (Arc<TokenStore>, Arc<PersistStore>) {
    (
      Arc::new(TokenStore::at(dir.path().join("auth_token.json"))),
      Arc::new(PersistStore::at(dir.path().join("persist_root.json"))),
    )
  }

  fn session(dir: &TempDir) -> SessionStore {
    let (tokens, persist) = stores(dir);
    SessionStore::new(tokens, persist)
  }

  fn user() -> User {
    User {
      email: "a@b.com".into(),
    }
  }

  #[tokio::test]
  async fn login_happy_path() {
    let dir = TempDir::new().unwrap();
    let store = session(&dir);

    assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);

    store.begin_auth();
    assert!(store.snapshot().is_loading());

    store.complete_login(user(), Some("t1"));
    let state = store.snapshot();
    assert!(state.is_logged_in());
    assert_eq!(state.user, Some(user()));
    assert_eq!(state.error, None);
    assert!(store.tokens.is_valid());

    // The blob reflects the signed-in identity.
    let blob = store.persist.load().unwrap();
    assert!(blob.auth.is_logged_in);
    assert_eq!(blob.auth.user, Some(user()));
  }

  #[tokio::test]
  async fn failed_exchange_keeps_error_until_resubmission() {
    let dir = TempDir::new().unwrap();
    let store = session(&dir);

    store.begin_auth();
    store.fail_auth("Invalid email or password");

    let state = store.snapshot();
    assert_eq!(state.phase, SessionPhase::Error);
    assert!(!state.is_logged_in());
    assert_eq!(state.error.as_deref(), Some("Invalid email or password"));

    // Resubmitting clears the error.
    store.begin_auth();
    let state = store.snapshot();
    assert!(state.is_loading());
    assert_eq!(state.error, None);
  }

  #[tokio::test]
  async fn signup_success_stays_anonymous() {
    let dir = TempDir::new().unwrap();
    let store = session(&dir);

    store.begin_auth();
    store.complete_signup();
    let state = store.snapshot();
    assert_eq!(state.phase, SessionPhase::Anonymous);
    assert_eq!(state.user, None);
  }

  #[tokio::test(start_paused = true)]
  async fn logout_clears_everything() {
    let dir = TempDir::new().unwrap();
    let store = session(&dir);

    store.begin_auth();
    store.complete_login(user(), Some("t1"));
    store.logout();

    let state = store.snapshot();
    assert_eq!(state.phase, SessionPhase::Anonymous);
    assert_eq!(state.user, None);
    assert!(!store.tokens.is_valid());

    // The blob clear is deferred, not immediate.
    assert!(store.persist.load().is_some());
    store.flush().await;
    assert!(store.persist.load().is_none());
  }

  #[tokio::test]
  async fn rehydrates_from_persisted_identity() {
    let dir = TempDir::new().unwrap();
    {
      let store = session(&dir);
      store.begin_auth();
      store.complete_login(user(), Some("t1"));
    }

    let restored = session(&dir);
    let state = restored.snapshot();
    assert!(state.is_logged_in());
    assert_eq!(state.user, Some(user()));
    // Token survived too, so the backstop agrees.
    assert!(restored.ensure_valid());
  }

  #[tokio::test]
  async fn ensure_valid_forces_logout_without_token() {
    let dir = TempDir::new().unwrap();
    {
      let store = session(&dir);
      store.begin_auth();
      store.complete_login(user(), Some("t1"));
    }

    // The credential disappears out from under the persisted identity.
    let (tokens, _) = stores(&dir);
    tokens.clear();

    let restored = session(&dir);
    assert!(restored.snapshot().is_logged_in());
    assert!(!restored.ensure_valid());
    assert_eq!(restored.snapshot().phase, SessionPhase::Anonymous);
  }

  #[tokio::test]
  async fn subscribers_observe_transitions() {
    let dir = TempDir::new().unwrap();
    let store = session(&dir);
    let mut rx = store.subscribe();

    store.begin_auth();
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_loading());

    store.complete_login(user(), None);
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_logged_in());
  }

  #[tokio::test]
  async fn layout_changes_are_published_and_persisted() {
    let dir = TempDir::new().unwrap();
    let store = session(&dir);
    store.begin_auth();
    store.complete_login(user(), Some("t1"));

    let mut items = crate::layout::default_layout();
    items[0].x = 3;
    store.set_layout(items.clone());

    assert_eq!(store.snapshot().layout, items);
    let blob = store.persist.load().unwrap();
    assert_eq!(
      blob.layout.unwrap(),
      crate::layout::encode_document(&items).unwrap()
    );
  }
}
