//! Access token claims issued by the identity provider

use serde::{Deserialize, Serialize};

/// Claims the gateway reads from a verified access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: String, // Subject (user id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>, // Issuer URL, expected to contain /realms/<realm>
    pub exp: i64, // Expiration time (as UTC timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Realm-level role block (`realm_access.roles`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl TokenClaims {
    /// Roles granted by the token
    ///
    /// `realm_access.roles` wins when present; otherwise the top-level
    /// `roles` claim is used; otherwise the token grants no roles.
    pub fn granted_roles(&self) -> Vec<String> {
        if let Some(roles) = self.realm_access.as_ref().and_then(|ra| ra.roles.clone()) {
            return roles;
        }

        self.roles.clone().unwrap_or_default()
    }
}
