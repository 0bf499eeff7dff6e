use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::OAuthConfig;
use crate::errors::AuthError;
use crate::models::{Account, GraphMe, TokenResponse, TokenState};

/// Lead time before expiry at which a proactive refresh is triggered
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Owns the lifecycle of a single OAuth grant: authorization-code exchange,
/// access-token caching, silent refresh and sign-out. Tracks at most one
/// signed-in identity; state lives only in process memory.
pub struct AuthManager {
    config: OAuthConfig,
    client: reqwest::Client,
    pub(crate) token_state: Option<TokenState>,
}

impl AuthManager {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("calendar-bridge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::MissingConfiguration {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(AuthManager {
            config,
            client,
            token_state: None,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    fn credentials(&self) -> Result<(&str, &str), AuthError> {
        let client_id =
            self.config
                .client_id
                .as_deref()
                .ok_or_else(|| AuthError::MissingConfiguration {
                    reason: "CLIENT_ID is not set".to_string(),
                })?;
        let client_secret =
            self.config
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::MissingConfiguration {
                    reason: "CLIENT_SECRET is not set".to_string(),
                })?;
        Ok((client_id, client_secret))
    }

    fn authorize_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.config.authority_base_url, self.config.tenant
        )
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_base_url, self.config.tenant
        )
    }

    /// Build the URL the user's browser must be sent to for interactive
    /// sign-in. Does not touch token state.
    pub fn begin_authorization(&self) -> Result<String, AuthError> {
        let (client_id, _) = self.credentials()?;

        let mut url =
            Url::parse(&self.authorize_endpoint()).map_err(|e| AuthError::MissingConfiguration {
                reason: format!("Invalid authority URL: {}", e),
            })?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.config.scopes.join(" "));

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens and replace token state
    /// wholesale. On any failure the previous state is left untouched.
    pub async fn complete_authorization(&mut self, code: &str) -> Result<&TokenState, AuthError> {
        if code.is_empty() {
            return Err(AuthError::ExchangeFailed {
                message: "No authorization code provided".to_string(),
            });
        }
        let (client_id, client_secret) = self.credentials()?;

        let scope = self.config.scopes.join(" ");
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .client
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!("Authorization code exchange rejected: {} {}", status, message);
            return Err(AuthError::ExchangeFailed { message });
        }

        let token: TokenResponse = response.json().await?;
        let account = self.fetch_account(&token.access_token).await?;
        tracing::info!("Successfully acquired token for user: {}", account.username);

        let state = TokenState {
            access_token: SecretString::new(token.access_token),
            refresh_token: token.refresh_token.map(SecretString::new),
            expires_on: Utc::now() + Duration::seconds(token.expires_in as i64),
            account,
        };
        Ok(self.token_state.insert(state))
    }

    /// Resolve the signed-in identity from Graph `/me`
    async fn fetch_account(&self, access_token: &str) -> Result<Account, AuthError> {
        let response = self
            .client
            .get(format!("{}/me", self.config.graph_base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed {
                message: format!("Failed to resolve account: {} {}", status, message),
            });
        }

        let me: GraphMe = response.json().await?;
        Ok(Account {
            username: me.user_principal_name.or(me.mail).unwrap_or_default(),
            name: me.display_name.unwrap_or_default(),
        })
    }

    /// Return an access token with more than the safety margin of remaining
    /// validity, refreshing first when needed. Suspends for the refresh round
    /// trip when one is required.
    pub async fn get_valid_access_token(&mut self) -> Result<String, AuthError> {
        let state = self.token_state.as_ref().ok_or(AuthError::NotAuthenticated)?;

        if needs_refresh(state.expires_on, Utc::now()) {
            tracing::info!("Token expired or expiring soon, refreshing...");
            self.refresh_access_token().await?;
        }

        let state = self.token_state.as_ref().ok_or(AuthError::NotAuthenticated)?;
        Ok(state.access_token.expose_secret().clone())
    }

    /// Mint a new access token from the stored refresh token. The refresh
    /// token is replaced only if the authority rotated it. Any failure
    /// collapses token state to absent before propagating, so no caller can
    /// observe a credential the authority has already rejected.
    pub async fn refresh_access_token(&mut self) -> Result<&TokenState, AuthError> {
        let state = self.token_state.as_ref().ok_or(AuthError::NotAuthenticated)?;
        let Some(refresh_token) = state.refresh_token.as_ref().map(|t| t.expose_secret().clone())
        else {
            self.token_state = None;
            return Err(AuthError::NoRefreshToken);
        };
        let (client_id, client_secret) = match self.credentials() {
            Ok(creds) => creds,
            Err(e) => {
                self.token_state = None;
                return Err(e);
            }
        };

        let scope = self.config.scopes.join(" ");
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("scope", scope.as_str()),
        ];

        let result = self
            .client
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.token_state = None;
                return Err(AuthError::RefreshFailed {
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!("Token refresh rejected: {} {}", status, message);
            self.token_state = None;
            return Err(AuthError::RefreshFailed { message });
        }

        let token: TokenResponse = match response.json().await {
            Ok(token) => token,
            Err(e) => {
                self.token_state = None;
                return Err(AuthError::RefreshFailed {
                    message: e.to_string(),
                });
            }
        };

        let state = self.token_state.as_mut().ok_or(AuthError::NotAuthenticated)?;
        state.access_token = SecretString::new(token.access_token);
        state.expires_on = Utc::now() + Duration::seconds(token.expires_in as i64);
        if let Some(rotated) = token.refresh_token {
            state.refresh_token = Some(SecretString::new(rotated));
        }
        tracing::info!("Successfully refreshed token");
        Ok(state)
    }

    /// Pure read: some credential exists. Makes no freshness guarantee and
    /// never triggers a refresh.
    pub fn is_authenticated(&self) -> bool {
        self.token_state
            .as_ref()
            .is_some_and(|s| !s.access_token.expose_secret().is_empty())
    }

    pub fn current_user(&self) -> Option<&Account> {
        self.token_state.as_ref().map(|s| &s.account)
    }

    /// Discard token state. Idempotent.
    pub fn sign_out(&mut self) {
        if self.token_state.take().is_some() {
            tracing::info!("User signed out");
        }
    }
}

/// Remaining lifetime strictly below the margin triggers a refresh; exactly
/// the margin does not.
fn needs_refresh(expires_on: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_on.signed_duration_since(now) < Duration::seconds(REFRESH_MARGIN_SECS)
}
