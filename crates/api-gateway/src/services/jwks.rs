//! JWK Set Cache
//!
//! Holds the identity provider's signing keys. The set is fetched lazily on
//! first use and fetched again when a token names a `kid` the cache does not
//! know, at most once per refresh interval.

use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

#[derive(Default)]
struct JwksState {
    keys: Vec<Jwk>,
    fetched_at: Option<Instant>,
}

impl JwksState {
    /// Signing key for `kid`; without a kid only an unambiguous single key matches
    fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|k| k.common.key_id.as_deref() == Some(kid)),
            None if self.keys.len() == 1 => self.keys.first(),
            None => None,
        }
    }

    fn refresh_due(&self, min_interval: Duration) -> bool {
        self.fetched_at
            .map(|at| at.elapsed() >= min_interval)
            .unwrap_or(true)
    }
}

pub struct JwksCache {
    client: reqwest::Client,
    uri: String,
    min_refresh_interval: Duration,
    state: RwLock<JwksState>,
}

impl JwksCache {
    pub fn new(client: reqwest::Client, uri: impl Into<String>, min_refresh_interval: Duration) -> Self {
        Self {
            client,
            uri: uri.into(),
            min_refresh_interval,
            state: RwLock::new(JwksState::default()),
        }
    }

    /// Decoding key for a token header's `kid`
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, GatewayError> {
        {
            let state = self.state.read().await;
            if let Some(jwk) = state.find(kid) {
                return to_decoding_key(jwk);
            }
        }

        let mut state = self.state.write().await;

        // Another request may have refreshed while we waited for the lock
        if let Some(jwk) = state.find(kid) {
            return to_decoding_key(jwk);
        }

        if !state.refresh_due(self.min_refresh_interval) {
            debug!(kid = ?kid, "Unknown key id, JWK set refreshed recently");
            return Err(GatewayError::InvalidToken(
                "No signing key matches the token".to_string(),
            ));
        }

        state.keys = self.fetch().await?;
        state.fetched_at = Some(Instant::now());

        match state.find(kid) {
            Some(jwk) => to_decoding_key(jwk),
            None => {
                warn!(kid = ?kid, "Token key id not present in JWK set");
                Err(GatewayError::InvalidToken(
                    "No signing key matches the token".to_string(),
                ))
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<Jwk>, GatewayError> {
        let unavailable = |e: reqwest::Error| {
            warn!(uri = %self.uri, error = %e, "Failed to retrieve JWK set");
            GatewayError::InvalidToken("Couldn't retrieve remote JWK set".to_string())
        };

        let set: JwkSet = self
            .client
            .get(&self.uri)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        let keys = signing_keys(set);
        info!(uri = %self.uri, keys = keys.len(), "JWK set refreshed");
        Ok(keys)
    }
}

/// Keys usable for signature verification (`use` absent or `sig`)
fn signing_keys(set: JwkSet) -> Vec<Jwk> {
    set.keys
        .into_iter()
        .filter(|k| {
            !matches!(
                k.common.public_key_use,
                Some(PublicKeyUse::Encryption) | Some(PublicKeyUse::Other(_))
            )
        })
        .collect()
}

fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, GatewayError> {
    DecodingKey::from_jwk(jwk)
        .map_err(|e| GatewayError::InvalidToken(format!("Unusable signing key: {}", e)))
}
