//! OAuth building blocks: PKCE, the loopback redirect listener, browser
//! opening and owner-only credential files.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── PKCE (Proof Key for Code Exchange, S256) ────────────────────────

#[derive(Debug, Clone)]
pub struct Pkce {
    /// base64url of 32 random bytes (43 chars)
    pub verifier: String,
    /// base64url(SHA-256(verifier))
    pub challenge: String,
    /// CSRF state echoed back by the provider
    pub state: String,
}

pub fn generate_pkce() -> Pkce {
    let verifier = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
    let challenge = pkce_challenge(&verifier);
    let state = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>());
    Pkce {
        verifier,
        challenge,
        state,
    }
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

// ── Loopback redirect ───────────────────────────────────────────────

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCallbackResult {
    pub code: String,
    pub state: Option<String>,
}

impl OAuthCallbackResult {
    /// Reject callbacks whose `state` does not match what we sent.
    pub fn verify_state(&self, expected: &str) -> Result<()> {
        match self.state.as_deref() {
            Some(state) if state == expected => Ok(()),
            _ => bail!("OAuth state mismatch; the sign-in response was not for this request"),
        }
    }
}

/// Parse a redirect query string (`code=...&state=...`).
///
/// A provider-side refusal (`error=access_denied`) is reported as an error.
pub fn parse_callback_query(query: &str) -> Result<OAuthCallbackResult> {
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode_query_value(value);
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        bail!("Authorization was not granted: {error}");
    }
    let code = code.context("OAuth callback missing 'code' parameter")?;
    Ok(OAuthCallbackResult { code, state })
}

/// Parse a full redirect URL pasted by the user (headless sign-in).
pub fn parse_redirect_url(url: &str) -> Result<OAuthCallbackResult> {
    let query = url
        .trim()
        .split_once('?')
        .map(|(_, query)| query.split('#').next().unwrap_or(query))
        .context("redirect URL has no query parameters")?;
    parse_callback_query(query)
}

fn decode_query_value(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or(spaced)
}

/// Bind the loopback listener the provider redirects to.
pub async fn bind_callback_listener(port: u16) -> Result<TcpListener> {
    TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind localhost:{port} for the OAuth redirect"))
}

/// Serve exactly one redirect request and return its parameters.
pub async fn wait_for_oauth_callback(
    listener: TcpListener,
    timeout: Duration,
) -> Result<OAuthCallbackResult> {
    tokio::time::timeout(timeout, accept_callback(&listener))
        .await
        .map_err(|_| anyhow::anyhow!("OAuth callback timed out after {}s", timeout.as_secs()))?
}

async fn accept_callback(listener: &TcpListener) -> Result<OAuthCallbackResult> {
    let (mut stream, _) = listener.accept().await?;

    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    // "GET /?code=...&state=... HTTP/1.1"
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default();
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
    let parsed = parse_callback_query(query);

    let (title, detail) = match &parsed {
        Ok(_) => ("Signed in to CodeBuddy", "You can close this tab and return to your terminal."),
        Err(_) => ("Sign-in failed", "Return to your terminal for details."),
    };
    let html = format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head>\
         <body style=\"font-family:system-ui;text-align:center;padding:60px\">\
         <h2>{title}</h2><p>{detail}</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{html}",
        html.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;

    parsed
}

// ── Browser opener ──────────────────────────────────────────────────

/// Best-effort; failures are ignored because the URL is also printed.
pub fn open_url_in_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let spawned = std::process::Command::new("open").arg(url).spawn();

    #[cfg(target_os = "windows")]
    let spawned = std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn();

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let spawned = std::process::Command::new("xdg-open").arg(url).spawn();

    if let Err(err) = spawned {
        tracing::debug!(error = %err, "could not open browser");
    }
}

// ── Secure file I/O ─────────────────────────────────────────────────

/// Write `content` with owner-only permissions (0o600 on Unix).
pub async fn write_file_secure(path: &Path, content: &str) -> Result<()> {
    let path = path.to_path_buf();
    let content = content.to_string();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)?;
            file.write_all(content.as_bytes())?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        #[cfg(not(unix))]
        std::fs::write(&path, &content)?;

        Ok(())
    })
    .await
    .context("credential write task panicked")?
    .context("failed to write credential file")
}
