//! services/api/src/adapters/identity.rs
//!
//! HTTP adapter for the hosted OAuth identity service. Implements the
//! `IdentityProvider` port by trading an authorization code for the
//! signed-in user's profile.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use tutoring_portal_core::domain::StudentIdentity;
use tutoring_portal_core::ports::{IdentityProvider, PortError, PortResult};
use uuid::Uuid;

const TOKEN_PATH: &str = "/auth/v1/token";
const USER_PATH: &str = "/auth/v1/user";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    user: Option<UserResponse>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
}

impl UserResponse {
    fn into_identity(self) -> PortResult<StudentIdentity> {
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| PortError::Unexpected("identity has no email address".to_string()))?;
        Ok(StudentIdentity {
            user_id: self.id,
            email,
            display_name: self.user_metadata.full_name.or(self.user_metadata.name),
        })
    }
}

/// Talks to the identity service over its token and user endpoints.
pub struct HttpIdentityAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn fetch_user(&self, access_token: &str) -> PortResult<UserResponse> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, USER_PATH))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("identity user request failed: {}", e)))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Identity service rejected the access token");
            return Err(PortError::Unauthorized);
        }
        response
            .json::<UserResponse>()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed user response: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityAdapter {
    async fn exchange_code(&self, code: &str) -> PortResult<StudentIdentity> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .query(&[("grant_type", "authorization_code")])
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "auth_code": code }))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("token request failed: {}", e)))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Authorization code was rejected");
                return Err(PortError::Unauthorized);
            }
            s => {
                return Err(PortError::Unexpected(format!(
                    "identity service returned {}",
                    s
                )))
            }
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed token response: {}", e)))?;

        let user = match token.user {
            Some(user) => user,
            None => self.fetch_user(&token.access_token).await?,
        };
        user.into_identity()
    }
}
