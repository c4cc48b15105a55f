use crate::cmd::progress;
use crate::config::{AuthType, CachedToken, ConfigManager, ConnectionConfig, TokenCache};
use crate::error::{M365Error, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use colored::Colorize;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields,
    RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Resource every connection signs in to first
pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";

/// Supplies bearer tokens for a resource (scheme + host of the request URL)
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, resource: &str) -> Result<String>;
}

/// Hands out the same token for every resource
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self, _resource: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Tokens for a stored connection, served from the on-disk cache and renewed
/// through the refresh token (device code) or the client secret.
pub struct ConnectionTokenProvider {
    config: ConfigManager,
    connection: ConnectionConfig,
}

impl ConnectionTokenProvider {
    pub fn new(config: ConfigManager, connection: ConnectionConfig) -> Self {
        Self { config, connection }
    }
}

#[async_trait]
impl TokenProvider for ConnectionTokenProvider {
    async fn access_token(&self, resource: &str) -> Result<String> {
        let mut cache = self.config.load_token(&self.connection.name)?;

        if let Some(token) = cache.tokens.get(resource) {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Acquiring token for {} on '{}'", resource, self.connection.name);
        let auth = Authenticator::new(&self.connection)?;
        let grant = match self.connection.auth_type {
            AuthType::Secret => auth.client_credentials(resource).await?,
            AuthType::DeviceCode => {
                let refresh_token = cache
                    .refresh_token
                    .clone()
                    .ok_or(M365Error::TokenNotFound)?;
                auth.refresh(&refresh_token, resource).await?
            }
        };

        let access_token = grant.access_token.clone();
        grant.store(resource, &mut cache);
        self.config.save_token(&self.connection.name, &cache)?;

        Ok(access_token)
    }
}

/// Result of a token request
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenGrant {
    fn from_response(token: &BasicTokenResponse) -> Self {
        let lifetime = token.expires_in().unwrap_or(Duration::from_secs(3600));
        let expires_at = Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::hours(1));

        Self {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at,
        }
    }

    pub fn store(self, resource: &str, cache: &mut TokenCache) {
        if let Some(refresh_token) = self.refresh_token {
            cache.refresh_token = Some(refresh_token);
        }
        cache.tokens.insert(
            resource.to_string(),
            CachedToken {
                access_token: self.access_token,
                expires_at: self.expires_at,
            },
        );
    }
}

/// OAuth2 flows against the Microsoft identity platform for one connection
pub struct Authenticator {
    client: BasicClient,
    connection_name: String,
}

impl Authenticator {
    pub fn new(connection: &ConnectionConfig) -> Result<Self> {
        let tenant = &connection.tenant_id;

        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            MICROSOFT_AUTHORITY, tenant
        ))
        .map_err(|e| M365Error::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            MICROSOFT_AUTHORITY, tenant
        ))
        .map_err(|e| M365Error::AuthError(format!("Invalid token URL: {}", e)))?;

        let device_auth_url = DeviceAuthorizationUrl::new(format!(
            "{}/{}/oauth2/v2.0/devicecode",
            MICROSOFT_AUTHORITY, tenant
        ))
        .map_err(|e| M365Error::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let secret = match connection.auth_type {
            AuthType::Secret => Some(ClientSecret::new(
                connection.client_secret.clone().ok_or_else(|| {
                    M365Error::AuthError("Client secret required for secret authentication".into())
                })?,
            )),
            AuthType::DeviceCode => None,
        };

        let client = BasicClient::new(
            ClientId::new(connection.app_id.clone()),
            secret,
            auth_url,
            Some(token_url),
        )
        .set_auth_type(oauth2::AuthType::RequestBody)
        .set_device_authorization_url(device_auth_url);

        Ok(Self {
            client,
            connection_name: connection.name.clone(),
        })
    }

    /// Interactive device code sign-in for Microsoft Graph
    pub async fn device_code(&self) -> Result<TokenGrant> {
        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            self.client
                .exchange_device_code()
                .map_err(|e| M365Error::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(default_scope(GRAPH_RESOURCE)))
                .add_scope(Scope::new("offline_access".to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    M365Error::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        eprintln!(
            "\n{} To sign in, visit {} and enter the code {}\n",
            "→".cyan(),
            details.verification_uri().as_str().bold(),
            details.user_code().secret().bold()
        );

        let spinner = progress::create_spinner(&format!(
            "Waiting for sign-in to '{}'...",
            self.connection_name
        ));
        let token = self
            .client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await;

        match token {
            Ok(token) => {
                progress::finish_spinner_success(&spinner, "Signed in");
                Ok(TokenGrant::from_response(&token))
            }
            Err(e) => {
                spinner.finish_and_clear();
                Err(M365Error::AuthError(format!("Token exchange failed: {}", e)))
            }
        }
    }

    /// App-only token for `resource`
    pub async fn client_credentials(&self, resource: &str) -> Result<TokenGrant> {
        let token = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(default_scope(resource)))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                M365Error::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        Ok(TokenGrant::from_response(&token))
    }

    /// Redeem a refresh token for an access token to `resource`
    pub async fn refresh(&self, refresh_token: &str, resource: &str) -> Result<TokenGrant> {
        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scope(Scope::new(default_scope(resource)))
            .request_async(async_http_client)
            .await
            .map_err(|e| M365Error::AuthError(format!("Token refresh failed: {}", e)))?;

        Ok(TokenGrant::from_response(&token))
    }
}

fn default_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

/// Decode the claims of a JWT access token without validating it
pub fn token_claims(access_token: &str) -> Option<Value> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Signed-in user name carried by a delegated token
pub fn user_name_from_access_token(access_token: &str) -> Option<String> {
    let claims = token_claims(access_token)?;
    ["upn", "unique_name", "preferred_username"]
        .iter()
        .find_map(|claim| claims.get(*claim).and_then(Value::as_str))
        .map(str::to_string)
}

/// App-only tokens carry roles but no delegated scopes
pub fn is_app_only_access_token(access_token: &str) -> bool {
    match token_claims(access_token) {
        Some(claims) => {
            claims.get("idtyp").and_then(Value::as_str) == Some("app")
                || claims.get("scp").is_none()
        }
        None => false,
    }
}

pub fn tenant_id_from_access_token(access_token: &str) -> Option<String> {
    token_claims(access_token)?
        .get("tid")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jwt(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_user_name_prefers_upn() {
        let token = jwt(json!({
            "upn": "megan@contoso.onmicrosoft.com",
            "unique_name": "other@contoso.onmicrosoft.com",
            "scp": "Chat.ReadWrite"
        }));
        assert_eq!(
            user_name_from_access_token(&token).as_deref(),
            Some("megan@contoso.onmicrosoft.com")
        );
        assert!(!is_app_only_access_token(&token));
    }

    #[test]
    fn test_app_only_token() {
        let token = jwt(json!({ "roles": ["User.Read.All"], "idtyp": "app", "tid": "abc" }));
        assert!(is_app_only_access_token(&token));
        assert!(user_name_from_access_token(&token).is_none());
        assert_eq!(tenant_id_from_access_token(&token).as_deref(), Some("abc"));
    }

    #[test]
    fn test_garbage_token() {
        assert!(token_claims("not-a-token").is_none());
        assert!(!is_app_only_access_token("a.b.c"));
    }

    #[test]
    fn test_grant_keeps_previous_refresh_token() {
        let mut cache = TokenCache {
            refresh_token: Some("old".into()),
            ..Default::default()
        };
        TokenGrant {
            access_token: "spo-token".into(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
        .store("https://contoso.sharepoint.com", &mut cache);

        assert_eq!(cache.refresh_token.as_deref(), Some("old"));
        assert!(cache.tokens["https://contoso.sharepoint.com"].is_valid());
    }

    #[test]
    fn test_default_scope() {
        assert_eq!(
            default_scope("https://contoso.sharepoint.com/"),
            "https://contoso.sharepoint.com/.default"
        );
    }
}
