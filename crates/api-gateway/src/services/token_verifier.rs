//! Access Token Verification
//!
//! Verifies bearer tokens issued by the identity provider and turns them
//! into a [`Principal`].
//!
//! # Key Sources
//!
//! - **JWK set** (`JWT_JWK_SET_URI`): RS*/ES*/PS* tokens, keys selected by `kid`
//! - **Shared secret** (`JWT_SECRET`): HS256 tokens, for development and tests
//!
//! When both are configured the JWK set wins.
//!
//! # Checks
//!
//! - Signature and algorithm
//! - `exp` (with leeway)
//! - `iss` contains `/realms/<realm>`, whatever the host and port

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::GatewayError;
use crate::models::TokenClaims;
use crate::security::Principal;
use crate::services::jwks::JwksCache;

enum KeySource {
    Secret(DecodingKey),
    Jwks(Arc<JwksCache>),
}

pub struct TokenVerifier {
    keys: KeySource,
    realm: String,
    leeway_secs: u64,
}

impl TokenVerifier {
    /// HS256 verification with a shared secret
    pub fn with_secret(secret: &str, realm: impl Into<String>) -> Self {
        Self {
            keys: KeySource::Secret(DecodingKey::from_secret(secret.as_bytes())),
            realm: realm.into(),
            leeway_secs: 30,
        }
    }

    /// Verification against the identity provider's JWK set
    pub fn with_jwks(jwks: Arc<JwksCache>, realm: impl Into<String>) -> Self {
        Self {
            keys: KeySource::Jwks(jwks),
            realm: realm.into(),
            leeway_secs: 30,
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Build from process configuration
    pub fn from_config(config: &shared::AuthConfig, client: reqwest::Client) -> shared::Result<Self> {
        let verifier = match (&config.jwk_set_uri, &config.jwt_secret) {
            (Some(uri), _) => {
                let jwks = JwksCache::new(
                    client,
                    uri.clone(),
                    Duration::from_secs(config.jwks_refresh_secs),
                );
                Self::with_jwks(Arc::new(jwks), config.realm.clone())
            }
            (None, Some(secret)) => Self::with_secret(secret, config.realm.clone()),
            (None, None) => {
                return Err(shared::Error::config(
                    "Either JWT_JWK_SET_URI or JWT_SECRET must be set",
                ))
            }
        };

        Ok(verifier.with_leeway(config.leeway_secs))
    }

    pub async fn verify(&self, token: &str) -> Result<Principal, GatewayError> {
        let header = decode_header(token).map_err(invalid)?;

        let key = match &self.keys {
            KeySource::Secret(key) => {
                if header.alg != Algorithm::HS256 {
                    return Err(GatewayError::InvalidToken(format!(
                        "Unsupported token algorithm {:?}",
                        header.alg
                    )));
                }
                key.clone()
            }
            KeySource::Jwks(jwks) => {
                if matches!(
                    header.alg,
                    Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
                ) {
                    return Err(GatewayError::InvalidToken(
                        "Symmetric token algorithms are not accepted".to_string(),
                    ));
                }
                jwks.decoding_key(header.kid.as_deref()).await?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_secs;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<TokenClaims>(token, &key, &validation)
            .map_err(invalid)?
            .claims;

        if !issuer_in_realm(claims.iss.as_deref(), &self.realm) {
            debug!(iss = ?claims.iss, realm = %self.realm, "Token issuer outside realm");
            return Err(GatewayError::InvalidToken(
                "The iss claim is not valid".to_string(),
            ));
        }

        let roles: BTreeSet<String> = claims.granted_roles().into_iter().collect();

        Ok(Principal {
            subject: claims.sub,
            username: claims.preferred_username,
            roles,
            token: token.to_string(),
        })
    }
}

fn invalid(err: jsonwebtoken::errors::Error) -> GatewayError {
    use jsonwebtoken::errors::ErrorKind;

    let message = match err.kind() {
        ErrorKind::ExpiredSignature => "Jwt expired".to_string(),
        ErrorKind::InvalidSignature => "Invalid token signature".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("Missing required claim {}", claim),
        _ => format!("Malformed token: {}", err),
    };
    GatewayError::InvalidToken(message)
}

/// `iss` must contain `/realms/<realm>`, whatever the host and port
fn issuer_in_realm(iss: Option<&str>, realm: &str) -> bool {
    iss.is_some_and(|iss| iss.contains(&format!("/realms/{}", realm)))
}
