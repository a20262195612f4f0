//! Google sign-in for Drive access.
//!
//! OAuth 2.0 Authorization Code + PKCE with a loopback redirect. The access
//! token is persisted through [`TokenStore`]; sign-out revokes it with Google
//! before forgetting it locally.

use super::common::{
    bind_callback_listener, generate_pkce, open_url_in_browser, parse_redirect_url,
    wait_for_oauth_callback, OAuthCallbackResult, Pkce,
};
use super::token_store::{StoredToken, TokenStore};
use crate::config::DriveConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// How the authorization code gets back to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectCapture {
    /// Serve the redirect on the loopback port and open a browser.
    Loopback,
    /// Headless: the user pastes the redirect URL from their browser.
    Paste,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<String>,
    auth_url: String,
    token_url: String,
    revoke_url: String,
    scopes: Vec<String>,
    redirect_port: u16,
}

impl GoogleOAuth {
    pub fn new(config: &DriveConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .context(
                "Google client id not configured. Set drive.client_id in config.toml or CODEBUDDY_GOOGLE_CLIENT_ID",
            )?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            client_id,
            client_secret: config.client_secret.clone().filter(|s| !s.is_empty()),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            revoke_url: config.revoke_url.clone(),
            scopes: config.scopes.clone(),
            redirect_port: config.redirect_port,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.redirect_port)
    }

    /// Consent-screen URL for one PKCE exchange.
    pub fn authorize_url(&self, pkce: &Pkce) -> String {
        let params = [
            ("response_type", "code".to_string()),
            ("client_id", self.client_id.clone()),
            ("redirect_uri", self.redirect_uri()),
            ("scope", self.scopes.join(" ")),
            ("code_challenge", pkce.challenge.clone()),
            ("code_challenge_method", "S256".to_string()),
            ("state", pkce.state.clone()),
            ("include_granted_scopes", "true".to_string()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.auth_url)
    }

    /// Trade an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        let redirect_uri = self.redirect_uri();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let body = form
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let resp = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .context("failed to reach the Google token endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google token exchange failed ({status}): {body}");
        }

        resp.json()
            .await
            .context("failed to parse Google token response")
    }

    /// Ask Google to invalidate `access_token`.
    pub async fn revoke(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.revoke_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("token={}", urlencoding::encode(access_token)))
            .send()
            .await
            .context("failed to reach the Google revoke endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google token revoke failed ({status}): {body}");
        }
        Ok(())
    }

    /// Run the interactive sign-in and persist the resulting token.
    pub async fn sign_in(&self, store: &TokenStore, capture: RedirectCapture) -> Result<StoredToken> {
        let pkce = generate_pkce();
        let url = self.authorize_url(&pkce);

        println!();
        println!("  Sign in to Google to enable Drive storage.");
        println!("  Open this URL in your browser:");
        println!("  {url}");
        println!();

        let callback = match capture {
            RedirectCapture::Loopback => {
                let listener = bind_callback_listener(self.redirect_port).await?;
                open_url_in_browser(&url);
                println!("  Waiting for authorization...");
                wait_for_oauth_callback(listener, CALLBACK_TIMEOUT).await?
            }
            RedirectCapture::Paste => read_pasted_redirect().await?,
        };
        callback.verify_state(&pkce.state)?;

        let response = self.exchange_code(&callback.code, &pkce.verifier).await?;
        let mut token = StoredToken::new(
            response.access_token,
            response.expires_in,
            Utc::now().timestamp_millis(),
        );
        token.scope = response.scope;
        store.save(&token).await?;

        tracing::info!(path = %store.path().display(), "google.signed_in");
        Ok(token)
    }

    /// Revoke and forget the stored token. A failed revoke still signs out locally.
    pub async fn sign_out(&self, store: &TokenStore) -> Result<bool> {
        let Some(token) = store.load_valid()? else {
            return Ok(false);
        };
        if let Err(err) = self.revoke(&token.access_token).await {
            tracing::warn!(error = %err, "google.revoke_failed");
        }
        store.clear()?;
        Ok(true)
    }
}

async fn read_pasted_redirect() -> Result<OAuthCallbackResult> {
    println!("  Paste the full redirect URL from your browser's address bar");
    println!("  (it starts with http://127.0.0.1:...):");

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read the redirect URL")?;
    parse_redirect_url(&line)
}
