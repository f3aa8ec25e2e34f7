// Bearer credential cache with request coalescing
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::error::{Result, ServiceError};
use crate::infrastructure::config::OAuthSettings;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
/// Refresh slightly before the provider-stated expiry.
const EARLY_REFRESH_SECS: u64 = 30;
const MIN_TTL_SECS: u64 = 5;
/// Assumed lifetime when the authority omits `expires_in`.
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

/// The token-issuing authority behind the cache.
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    async fn exchange(&self, scopes: &[String], audience: Option<&str>) -> Result<TokenGrant>;
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

type ExchangeFuture = Shared<BoxFuture<'static, std::result::Result<CachedToken, String>>>;

#[derive(Default)]
struct CacheState {
    tokens: Mutex<HashMap<String, CachedToken>>,
    pending: Mutex<HashMap<String, ExchangeFuture>>,
}

impl CacheState {
    /// Expired entries are evicted here, on the next lookup.
    fn lookup(&self, key: &str) -> Option<CachedToken> {
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get(key) {
            Some(token) if token.expires_at > Instant::now() => Some(token.clone()),
            Some(_) => {
                tokens.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Caches bearer tokens per (sorted scopes, audience) key and coalesces
/// concurrent exchanges: the second caller for a key attaches to the
/// in-flight request and observes its outcome. A failed exchange clears the
/// in-flight marker before surfacing, so retries are never blocked.
#[derive(Clone)]
pub struct TokenCache {
    authority: Arc<dyn CredentialAuthority>,
    state: Arc<CacheState>,
}

impl TokenCache {
    pub fn new(authority: Arc<dyn CredentialAuthority>) -> Self {
        Self {
            authority,
            state: Arc::new(CacheState::default()),
        }
    }

    pub async fn get_token(&self, scopes: &[String], audience: Option<&str>) -> Result<String> {
        let key = cache_key(scopes, audience);

        if let Some(cached) = self.state.lookup(&key) {
            debug!(key = %key, "using cached access token");
            return Ok(cached.access_token);
        }

        let exchange = {
            let mut pending = self.state.pending.lock().unwrap();
            if let Some(inflight) = pending.get(&key) {
                debug!(key = %key, "token exchange already in flight, waiting");
                inflight.clone()
            } else {
                let fut = self.spawn_exchange(key.clone(), scopes.to_vec(), audience);
                pending.insert(key.clone(), fut.clone());
                fut
            }
        };

        exchange
            .await
            .map(|token| token.access_token)
            .map_err(ServiceError::UpstreamAuth)
    }

    fn spawn_exchange(&self, key: String, scopes: Vec<String>, audience: Option<&str>) -> ExchangeFuture {
        let authority = Arc::clone(&self.authority);
        let state = Arc::clone(&self.state);
        let audience = audience.map(str::to_string);
        async move {
            let outcome = authority
                .exchange(&scopes, audience.as_deref())
                .await
                .map(|grant| CachedToken {
                    expires_at: Instant::now() + ttl_for(grant.expires_in),
                    access_token: grant.access_token,
                });

            match &outcome {
                Ok(token) => {
                    state.tokens.lock().unwrap().insert(key.clone(), token.clone());
                    info!(key = %key, "access token obtained");
                }
                Err(e) => warn!(key = %key, error = %e, "token exchange failed"),
            }
            // Clear the in-flight marker before any waiter observes the
            // result, so a failure never poisons the cache.
            state.pending.lock().unwrap().remove(&key);

            outcome.map_err(|e| e.to_string())
        }
        .boxed()
        .shared()
    }
}

fn cache_key(scopes: &[String], audience: Option<&str>) -> String {
    let mut sorted: Vec<&str> = scopes.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{}::{}", sorted.join(" "), audience.unwrap_or(""))
}

fn ttl_for(expires_in: Option<u64>) -> Duration {
    match expires_in {
        Some(secs) => Duration::from_secs(secs.saturating_sub(EARLY_REFRESH_SECS).max(MIN_TTL_SECS)),
        None => DEFAULT_TTL,
    }
}

/// Client-credentials exchange against the configured token endpoint.
pub struct HttpCredentialAuthority {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl HttpCredentialAuthority {
    pub fn new(oauth: &OAuthSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token_url: oauth.token_url.clone(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[async_trait]
impl CredentialAuthority for HttpCredentialAuthority {
    async fn exchange(&self, scopes: &[String], audience: Option<&str>) -> Result<TokenGrant> {
        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
        ];
        if let Some(secret) = &self.client_secret {
            // Some providers require the secret in the body even with basic auth.
            form.push(("client_secret", secret.clone()));
        }
        if !scopes.is_empty() {
            form.push(("scope", scopes.join(" ")));
        }
        if let Some(audience) = audience {
            form.push(("audience", audience.to_string()));
        }

        let mut request = self.client.post(&self.token_url).form(&form);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::UpstreamAuth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamAuth(e.to_string()))?;

        match payload.access_token {
            Some(access_token) => Ok(TokenGrant {
                access_token,
                expires_in: payload.expires_in,
            }),
            None => Err(ServiceError::UpstreamAuth(
                "token endpoint did not return an access_token".into(),
            )),
        }
    }
}
