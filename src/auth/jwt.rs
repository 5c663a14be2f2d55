use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use super::identity::{Identity, IdentityError, IdentityVerifier};
use crate::config::{IdentityConfig, IdentityKeySource};

/// Minimum gap between two signing-key fetches triggered by unknown `kid`s.
const JWKS_MIN_REFRESH: Duration = Duration::from_secs(60);

/// Verifies provider-issued ID tokens (Firebase style) by signature, issuer,
/// audience and expiry.
pub struct JwtIdentityVerifier {
    issuer: String,
    audience: String,
    keys: KeySource,
}

enum KeySource {
    Secret(DecodingKey),
    Jwks(JwksCache),
}

struct JwksCache {
    url: Url,
    client: reqwest::Client,
    min_refresh: Duration,
    state: RwLock<CachedKeys>,
}

#[derive(Default)]
struct CachedKeys {
    set: Option<JwkSet>,
    fetched_at: Option<Instant>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

impl JwtIdentityVerifier {
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let keys = match &config.key_source {
            IdentityKeySource::Secret(secret) => {
                KeySource::Secret(DecodingKey::from_secret(secret.as_bytes()))
            }
            IdentityKeySource::Jwks(url) => {
                let client = reqwest::Client::builder()
                    .build()
                    .context("failed to build JWKS HTTP client")?;
                KeySource::Jwks(JwksCache::new(url.clone(), client, JWKS_MIN_REFRESH))
            }
        };

        Ok(Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            keys,
        })
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let (key, algorithm) = match &self.keys {
            KeySource::Secret(key) => (key.clone(), Algorithm::HS256),
            KeySource::Jwks(cache) => {
                let header =
                    decode_header(token).map_err(|err| IdentityError::Invalid(err.to_string()))?;
                let kid = header
                    .kid
                    .ok_or_else(|| IdentityError::Invalid("token header has no kid".into()))?;
                (cache.key_for(&kid).await?, Algorithm::RS256)
            }
        };

        let data = decode::<Claims>(token, &key, &self.validation(algorithm))
            .map_err(|err| IdentityError::Invalid(err.to_string()))?;

        Ok(Identity {
            subject_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

impl JwksCache {
    fn new(url: Url, client: reqwest::Client, min_refresh: Duration) -> Self {
        Self {
            url,
            client,
            min_refresh,
            state: RwLock::new(CachedKeys::default()),
        }
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        let cached = self.state.read().await.decoding_key(kid)?;
        if let Some(key) = cached {
            return Ok(key);
        }

        let mut state = self.state.write().await;
        // Another request may have refreshed while this one waited for the lock.
        if let Some(key) = state.decoding_key(kid)? {
            return Ok(key);
        }

        // Unknown kid: the provider may have rotated keys. Refetch at most once per interval.
        let recently_fetched = state
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.min_refresh);
        if !recently_fetched {
            state.set = Some(self.fetch().await.map_err(IdentityError::Upstream)?);
            state.fetched_at = Some(Instant::now());
        }

        state
            .decoding_key(kid)?
            .ok_or_else(|| IdentityError::Invalid(format!("unknown signing key `{kid}`")))
    }

    async fn fetch(&self) -> Result<JwkSet> {
        tracing::debug!(url = %self.url, "refreshing identity provider signing keys");
        let set = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("failed to fetch signing keys")?
            .error_for_status()
            .context("signing key endpoint returned an error")?
            .json::<JwkSet>()
            .await
            .context("signing key endpoint returned invalid JSON")?;
        Ok(set)
    }
}

impl CachedKeys {
    fn decoding_key(&self, kid: &str) -> Result<Option<DecodingKey>, IdentityError> {
        let Some(jwk) = self.set.as_ref().and_then(|set| set.find(kid)) else {
            return Ok(None);
        };
        DecodingKey::from_jwk(jwk)
            .map(Some)
            .map_err(|err| IdentityError::Invalid(format!("unusable signing key: {err}")))
    }
}
