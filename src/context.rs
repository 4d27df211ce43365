//! The application context: every store and client, explicitly
//! constructed and wired, passed to consumers instead of living as
//! ambient global state.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::error::ApiError;
use crate::layout::LayoutBridge;
use crate::records::types::LoginResponse;
use crate::records::{CachedClient, HttpClient, RecordsClient};
use crate::session::{PersistStore, SessionStore, TokenStore, User};

pub struct Context {
  pub client: CachedClient,
  pub session: Arc<SessionStore>,
  pub layout: Arc<LayoutBridge>,
}

impl Context {
  /// Construct the full data layer against the default on-disk stores.
  /// Rehydrates the previous session, when one was persisted.
  pub fn new(config: Config) -> Result<Self> {
    let tokens = Arc::new(TokenStore::open()?);
    let persist = Arc::new(PersistStore::open()?);
    Self::with_stores(config, tokens, persist)
  }

  fn with_stores(
    config: Config,
    tokens: Arc<TokenStore>,
    persist: Arc<PersistStore>,
  ) -> Result<Self> {
    let (unauthorized_tx, unauthorized_rx) = mpsc::unbounded_channel();
    let http = HttpClient::new(&config.api.url, tokens.clone(), unauthorized_tx)?;
    let records = RecordsClient::new(http);
    let cache = QueryCache::new().with_stale_time(config.cache.stale_time());
    let client = CachedClient::new(records.clone(), cache);

    let session = Arc::new(SessionStore::new(tokens, persist));
    spawn_unauthorized_listener(session.clone(), unauthorized_rx);

    let saver_client = records;
    let layout = Arc::new(
      LayoutBridge::new(session.clone(), move |email, layout| {
        let client = saver_client.clone();
        async move { client.save_layout(&email, &layout).await }
      })
      .with_debounce(config.layout.debounce()),
    );

    Ok(Self {
      client,
      session,
      layout,
    })
  }

  /// Exchange credentials for a session. On success the token is
  /// persisted, the session becomes authenticated and the account's
  /// dashboard layout is adopted (the default arrangement is written back
  /// for accounts that have none).
  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
    self.session.begin_auth();
    match self.client.login(email, password).await {
      Ok(response) => {
        self.session.complete_login(
          User {
            email: response.email.clone(),
          },
          response.token.as_deref(),
        );
        self
          .layout
          .adopt(&response.email, response.layout.as_deref())
          .await;
        Ok(response)
      }
      Err(e) => {
        self.session.fail_auth(e.message());
        Err(e)
      }
    }
  }

  /// Create an account. The session stays signed out; the new account's
  /// dashboard is seeded with the default arrangement.
  pub async fn signup(&self, email: &str, password: &str) -> Result<String, ApiError> {
    self.session.begin_auth();
    match self.client.signup(email, password).await {
      Ok(response) => {
        self.layout.adopt(email, None).await;
        self.session.complete_signup();
        Ok(response.message)
      }
      Err(e) => {
        self.session.fail_auth(e.message());
        Err(e)
      }
    }
  }

  pub fn logout(&self) {
    self.session.logout();
  }

  /// Flush pending background work (the debounced layout write, a
  /// deferred session clear) before the process exits.
  pub async fn shutdown(&self) {
    self.layout.flush().await;
    self.session.flush().await;
  }
}

/// A 401 anywhere in the gateway tears the session down. Subscribers
/// observe the anonymous state and return to the login entry point.
fn spawn_unauthorized_listener(
  session: Arc<SessionStore>,
  mut unauthorized_rx: mpsc::UnboundedReceiver<()>,
) {
  tokio::spawn(async move {
    while unauthorized_rx.recv().await.is_some() {
      session.logout();
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::SessionPhase;
  use tempfile::TempDir;

  fn context_in(dir: &TempDir) -> Context {
    let tokens = Arc::new(TokenStore::at(dir.path().join("auth_token.json")));
    let persist = Arc::new(PersistStore::at(dir.path().join("persist_root.json")));
    Context::with_stores(Config::default(), tokens, persist).unwrap()
  }

  #[tokio::test]
  async fn fresh_context_is_anonymous() {
    let dir = TempDir::new().unwrap();
    let ctx = context_in(&dir);
    assert_eq!(ctx.session.snapshot().phase, SessionPhase::Anonymous);
    assert!(!ctx.session.ensure_valid());
  }

  #[tokio::test]
  async fn unauthorized_signal_forces_logout() {
    let dir = TempDir::new().unwrap();
    let tokens = Arc::new(TokenStore::at(dir.path().join("auth_token.json")));
    let persist = Arc::new(PersistStore::at(dir.path().join("persist_root.json")));
    let session = Arc::new(SessionStore::new(tokens, persist));
    session.begin_auth();
    session.complete_login(
      User {
        email: "a@b.com".into(),
      },
      Some("t1"),
    );

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_unauthorized_listener(session.clone(), rx);

    let mut states = session.subscribe();
    tx.send(()).unwrap();
    states.changed().await.unwrap();

    let state = states.borrow().clone();
    assert_eq!(state.phase, SessionPhase::Anonymous);
    assert_eq!(state.user, None);
  }
}
