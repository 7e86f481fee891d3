//! OAuth2 authentication for the remote content store
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for the
//! interactive `auth login` command, and the refresh-token grant used by
//! the credential coordinator.
//!
//! ## Components
//!
//! - [`OAuthSettings`] - Endpoints, client identity and scopes
//! - [`PkceFlow`] - Authorization URL, code exchange and token refresh
//! - [`OAuthTokenRefresher`] - `ITokenRefresher` over [`PkceFlow`]
//! - [`LocalCallbackServer`] - Minimal HTTP server for the OAuth redirect
//! - [`login`] - Orchestrates the full interactive flow

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};

use mediapush_core::config::AuthConfig;
use mediapush_core::domain::Credential;
use mediapush_core::ports::{ITokenRefresher, RefreshError};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// OAuthSettings
// ============================================================================

/// Everything the OAuth client needs, resolved from `auth` config
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub redirect_port: u16,
    pub scopes: Vec<String>,
}

impl OAuthSettings {
    /// Resolves settings; fails when no client id is configured
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .context("auth.client_id is not configured")?;

        Ok(Self {
            client_id,
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.redirect_uri(),
            redirect_port: config.redirect_port,
            scopes: config.scopes.clone(),
        })
    }
}

// ============================================================================
// PkceFlow
// ============================================================================

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 flows using the `oauth2` crate
pub struct PkceFlow {
    client: ConfiguredClient,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl PkceFlow {
    pub fn new(settings: &OAuthSettings) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_auth_uri(AuthUrl::new(settings.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(settings.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(settings.redirect_uri.clone()).context("Invalid redirect URI")?,
            );
        if let Some(ref secret) = settings.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        // The token endpoint must not be followed across redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            scopes: settings.scopes.clone(),
            http,
        })
    }

    /// Authorization URL with a PKCE challenge
    ///
    /// Returns `(url, csrf_token, pkce_verifier)`; keep the verifier until
    /// the code exchange.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            // Ask for a refresh token on every consent
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, csrf) = request.set_pkce_challenge(challenge).url();
        debug!("Generated authorization URL");
        (url.to_string(), csrf, verifier)
    }

    /// Exchanges an authorization code for a credential
    pub async fn exchange_code(&self, code: String, verifier: PkceCodeVerifier) -> Result<Credential> {
        info!("Exchanging authorization code for tokens");

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .context("Token endpoint returned no refresh token")?;

        Ok(credential_from_response(&response, refresh_token))
    }

    /// Refresh-token grant
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        debug!("Refreshing access token");

        let result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await;

        match result {
            Ok(response) => {
                // Providers that do not rotate keep the old refresh token valid
                let refresh = response
                    .refresh_token()
                    .map(|t| t.secret().to_string())
                    .unwrap_or_else(|| refresh_token.to_string());
                info!("Access token refreshed");
                Ok(credential_from_response(&response, refresh))
            }
            Err(RequestTokenError::ServerResponse(response)) => {
                let description = response
                    .error_description()
                    .cloned()
                    .unwrap_or_else(|| response.error().to_string());
                match response.error() {
                    BasicErrorResponseType::InvalidGrant => {
                        warn!(%description, "Refresh grant rejected");
                        Err(RefreshError::Revoked(description))
                    }
                    other => {
                        warn!(error = %other, %description, "Token endpoint error");
                        Err(RefreshError::Transient(format!("{other}: {description}")))
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh request failed");
                Err(RefreshError::Transient(e.to_string()))
            }
        }
    }
}

fn credential_from_response(response: &BasicTokenResponse, refresh_token: String) -> Credential {
    let lifetime = response
        .expires_in()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Credential::new(
        response.access_token().secret().to_string(),
        refresh_token,
        Utc::now() + Duration::seconds(lifetime),
    )
}

// ============================================================================
// OAuthTokenRefresher
// ============================================================================

/// Refresh-token exchange against the configured token endpoint
pub struct OAuthTokenRefresher {
    flow: PkceFlow,
}

impl OAuthTokenRefresher {
    pub fn new(settings: &OAuthSettings) -> Result<Self> {
        Ok(Self {
            flow: PkceFlow::new(settings)?,
        })
    }
}

#[async_trait::async_trait]
impl ITokenRefresher for OAuthTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        self.flow.refresh(refresh_token).await
    }
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Parameters extracted from the OAuth2 callback
#[derive(Debug)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Minimal HTTP server that receives the OAuth2 redirect on localhost
///
/// Binds before the browser is opened so the redirect cannot race the
/// listener. Requests without a `code` (favicon probes, errors) are answered
/// and ignored until a valid callback arrives.
pub struct LocalCallbackServer {
    listener: tokio::net::TcpListener,
}

impl LocalCallbackServer {
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to bind callback server to 127.0.0.1:{port}"))?;
        info!(port, "OAuth callback server listening");
        Ok(Self { listener })
    }

    /// Waits for the redirect carrying the authorization code
    pub async fn wait(self) -> Result<CallbackParams> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::header::{HeaderValue, CONTENT_TYPE};
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::sync::mpsc;

        let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);

        loop {
            let (stream, _addr) = tokio::select! {
                accepted = self.listener.accept() => {
                    accepted.context("Failed to accept connection on callback server")?
                }
                Some(params) = rx.recv() => {
                    info!("Received OAuth callback");
                    return Ok(params);
                }
            };

            let tx = tx.clone();
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let tx = tx.clone();
                async move {
                    let uri = req.uri().to_string();
                    let (status, html) = match parse_callback_params(&uri) {
                        Some(params) => {
                            let _ = tx.send(params).await;
                            (StatusCode::OK, success_html())
                        }
                        None => (
                            StatusCode::BAD_REQUEST,
                            error_html("Missing authorization code in callback"),
                        ),
                    };
                    let mut response = Response::new(Full::new(Bytes::from(html)));
                    *response.status_mut() = status;
                    response.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/html; charset=utf-8"),
                    );
                    Ok::<_, hyper::Error>(response)
                }
            });

            tokio::spawn(async move {
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    warn!("Callback server connection error: {}", e);
                }
            });
        }
    }
}

/// Parses the authorization code and state from a callback URI
fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{}", uri)).ok()?;
    let mut code = None;
    let mut state = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            _ => {}
        }
    }

    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>MediaPush - Signed In</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Signed In</h1>
    <p>MediaPush can now upload to your library.</p>
    <p>You can close this window and return to the terminal.</p>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>MediaPush - Sign-in Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Sign-in Error</h1>
    <p>{}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#,
        message
    )
}

// ============================================================================
// login
// ============================================================================

/// Full interactive PKCE login
///
/// Opens the browser at the authorization URL (printing it when no browser
/// can be launched), waits for the redirect, checks the CSRF state and
/// exchanges the code.
pub async fn login(settings: &OAuthSettings) -> Result<Credential> {
    info!("Starting OAuth2 PKCE login flow");

    let flow = PkceFlow::new(settings)?;
    let (auth_url, csrf, verifier) = flow.generate_auth_url();
    let server = LocalCallbackServer::bind(settings.redirect_port).await?;

    if let Err(e) = webbrowser::open(&auth_url) {
        warn!(error = %e, "Could not open a browser");
    }
    eprintln!("If your browser did not open, visit:\n\n  {auth_url}\n");

    let callback = server.wait().await?;
    if callback.state != *csrf.secret() {
        anyhow::bail!("OAuth callback state did not match; aborting login");
    }

    let credential = flow.exchange_code(callback.code, verifier).await?;
    info!("OAuth2 PKCE login completed");
    Ok(credential)
}
