//! HTTP gateway for the records API.
//!
//! Builds requests against the configured base URL, attaches the bearer
//! token when one is held, and normalizes failures into [`ApiError`]. A
//! 401 additionally clears the token and raises the unauthorized signal so
//! the session store can tear itself down; the error is still returned to
//! the caller.

use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

use crate::error::ApiError;
use crate::session::TokenStore;

#[derive(Clone)]
pub struct HttpClient {
  http: reqwest::Client,
  base_url: Url,
  tokens: Arc<TokenStore>,
  unauthorized_tx: mpsc::UnboundedSender<()>,
}

impl HttpClient {
  /// Build a gateway. `unauthorized_tx` fires once per 401 response; the
  /// context wires it to the session store's forced logout.
  pub fn new(
    base_url: &str,
    tokens: Arc<TokenStore>,
    unauthorized_tx: mpsc::UnboundedSender<()>,
  ) -> Result<Self, ApiError> {
    let mut base_url = Url::parse(base_url)
      .map_err(|e| ApiError::Application(format!("invalid base url {}: {}", base_url, e)))?;

    // Endpoint templates are joined relative to the base, which only works
    // when the base path ends with a slash.
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    Ok(Self {
      http: reqwest::Client::new(),
      base_url,
      tokens,
      unauthorized_tx,
    })
  }

  /// Send one request and normalize the response.
  ///
  /// Empty 2xx bodies map to `Value::Null`; non-2xx statuses map to
  /// `ApiError::Http` carrying the parsed error payload when there is one.
  pub async fn send(
    &self,
    endpoint: &str,
    method: Method,
    body: Option<Value>,
  ) -> Result<Value, ApiError> {
    let url = self.endpoint_url(endpoint)?;

    let mut request = self
      .http
      .request(method, url)
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = self.tokens.get() {
      request = request.bearer_auth(token);
    }
    if let Some(body) = &body {
      request = request.json(body);
    }

    let response = request
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;

    if status == 401 {
      self.on_unauthorized();
    }

    handle_response(status, &text)
  }

  pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
    let value = self.send(endpoint, Method::GET, None).await?;
    decode(value)
  }

  pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize,
  {
    let body = encode(body)?;
    let value = self.send(endpoint, Method::POST, Some(body)).await?;
    decode(value)
  }

  pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize,
  {
    let body = encode(body)?;
    let value = self.send(endpoint, Method::PUT, Some(body)).await?;
    decode(value)
  }

  pub async fn delete(&self, endpoint: &str) -> Result<(), ApiError> {
    self.send(endpoint, Method::DELETE, None).await?;
    Ok(())
  }

  fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(endpoint.trim_start_matches('/'))
      .map_err(|e| ApiError::Application(format!("invalid endpoint {}: {}", endpoint, e)))
  }

  /// Session correction on 401: drop the credential and signal the session
  /// store. Subsequent requests go out without the old token.
  fn on_unauthorized(&self) {
    warn!("request rejected with 401, discarding credential");
    self.tokens.clear();
    let _ = self.unauthorized_tx.send(());
  }
}

fn handle_response(status: u16, body: &str) -> Result<Value, ApiError> {
  if !(200..300).contains(&status) {
    return Err(ApiError::Http {
      status,
      payload: serde_json::from_str(body).ok(),
    });
  }
  if body.is_empty() {
    return Ok(Value::Null);
  }
  serde_json::from_str(body).map_err(|e| ApiError::Application(format!("malformed body: {}", e)))
}

fn encode<B: Serialize>(body: &B) -> Result<Value, ApiError> {
  serde_json::to_value(body).map_err(|e| ApiError::Application(format!("unencodable body: {}", e)))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
  serde_json::from_value(value)
    .map_err(|e| ApiError::Application(format!("unexpected response shape: {}", e)))
}
