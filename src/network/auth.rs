use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, watch};
use uuid::Uuid;

use crate::common::Identity;
use crate::config::FirebaseConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SIGN_IN_WITH_IDP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const REFRESH_MARGIN_SECS: i64 = 60;
const CALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in cancelled: {0}")]
    Cancelled(String),

    #[error("callback state did not match the request")]
    StateMismatch,

    #[error("invalid callback: {0}")]
    Callback(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Source of the signed-in identity.
pub trait SessionProvider: Send + Sync {
    /// Observable "current identity or none".
    fn watch(&self) -> watch::Receiver<Option<Identity>>;

    fn current(&self) -> Option<Identity> {
        self.watch().borrow().clone()
    }

    /// Runs the interactive consent flow. The consent page URL, if any, is
    /// pushed into `consent` for the UI to open. On success the observed
    /// identity changes as well.
    fn sign_in(&self, consent: mpsc::Sender<String>) -> BoxFuture<'_, Result<Identity, AuthError>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>>;

    /// Bearer token for store requests.
    fn id_token(&self) -> BoxFuture<'_, Result<String, AuthError>>;
}

#[derive(Debug, Clone)]
struct Credentials {
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) <= now
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdpSignInResponse {
    local_id: String,
    display_name: Option<String>,
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Google sign-in through Firebase Authentication, using the installed-app
/// loopback redirect.
pub struct GoogleSession {
    http: reqwest::Client,
    config: FirebaseConfig,
    credentials: Mutex<Option<Credentials>>,
    identity: watch::Sender<Option<Identity>>,
}

impl GoogleSession {
    pub fn new(http: reqwest::Client, config: FirebaseConfig) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            http,
            config,
            credentials: Mutex::new(None),
            identity,
        }
    }

    async fn run_consent_flow(&self, consent: mpsc::Sender<String>) -> Result<Identity, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        let state = Uuid::new_v4().simple().to_string();

        let consent_url = consent_url(&self.config.oauth_client_id, &redirect_uri, &state)?;
        log::info!("Waiting for Google consent on {redirect_uri}");
        if consent.send(consent_url.to_string()).await.is_err() {
            log::warn!("UI is gone; consent URL not delivered");
        }

        let code = await_callback(&listener, &state).await?;
        drop(listener);

        let google: GoogleTokenResponse = read_json(
            self.http
                .post(GOOGLE_TOKEN_URL)
                .form(&[
                    ("code", code.as_str()),
                    ("client_id", self.config.oauth_client_id.as_str()),
                    ("client_secret", self.config.oauth_client_secret.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ])
                .send()
                .await?,
        )
        .await?;

        let post_body = format!("id_token={}&providerId=google.com", google.id_token);
        let firebase: IdpSignInResponse = read_json(
            self.http
                .post(SIGN_IN_WITH_IDP_URL)
                .query(&[("key", self.config.api_key.as_str())])
                .json(&serde_json::json!({
                    "postBody": post_body,
                    "requestUri": redirect_uri,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }))
                .send()
                .await?,
        )
        .await?;

        let identity = Identity {
            uid: firebase.local_id,
            display_name: firebase.display_name.filter(|name| !name.is_empty()),
            photo_url: firebase.photo_url.filter(|url| !url.is_empty()),
        };
        *self.credentials.lock().await = Some(Credentials {
            id_token: firebase.id_token,
            refresh_token: firebase.refresh_token,
            expires_at: expiry_from(&firebase.expires_in),
        });
        self.identity.send_replace(Some(identity.clone()));
        log::info!("Signed in as {}", identity.uid);

        Ok(identity)
    }

    async fn fresh_token(&self) -> Result<String, AuthError> {
        let mut guard = self.credentials.lock().await;
        let credentials = guard.as_mut().ok_or(AuthError::NotSignedIn)?;
        if !credentials.needs_refresh(Utc::now()) {
            return Ok(credentials.id_token.clone());
        }

        log::debug!("Refreshing Firebase ID token");
        let refreshed: RefreshResponse = read_json(
            self.http
                .post(SECURE_TOKEN_URL)
                .query(&[("key", self.config.api_key.as_str())])
                .form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", credentials.refresh_token.as_str()),
                ])
                .send()
                .await?,
        )
        .await?;

        credentials.id_token = refreshed.id_token;
        credentials.refresh_token = refreshed.refresh_token;
        credentials.expires_at = expiry_from(&refreshed.expires_in);
        Ok(credentials.id_token.clone())
    }
}

impl SessionProvider for GoogleSession {
    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    fn sign_in(&self, consent: mpsc::Sender<String>) -> BoxFuture<'_, Result<Identity, AuthError>> {
        Box::pin(self.run_consent_flow(consent))
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(async move {
            *self.credentials.lock().await = None;
            self.identity.send_replace(None);
            log::info!("Signed out");
            Ok(())
        })
    }

    fn id_token(&self) -> BoxFuture<'_, Result<String, AuthError>> {
        Box::pin(self.fresh_token())
    }
}

fn consent_url(client_id: &str, redirect_uri: &str, state: &str) -> Result<Url, AuthError> {
    Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
            ("prompt", "select_account"),
        ],
    )
    .map_err(|err| AuthError::Callback(err.to_string()))
}

async fn await_callback(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    await_callback_within(listener, expected_state, CALLBACK_READ_TIMEOUT).await
}

/// Accepts connections until one carries OAuth callback parameters.
/// Browsers open speculative connections that never send a request; those
/// are dropped once `read_timeout` passes.
async fn await_callback_within(
    listener: &TcpListener,
    expected_state: &str,
    read_timeout: Duration,
) -> Result<String, AuthError> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let (read_half, mut write_half) = stream.split();

        let mut reader = BufReader::new(read_half);
        let request_line = match tokio::time::timeout(read_timeout, read_request_head(&mut reader)).await {
            Ok(line) => line?,
            Err(_) => {
                log::debug!("Dropping idle loopback connection from {peer}");
                continue;
            }
        };

        let Some(target) = request_line.split_whitespace().nth(1) else {
            continue;
        };

        let params = query_params(target)?;
        if params.is_empty() {
            // Browsers probe for /favicon.ico and the like.
            write_half
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await?;
            continue;
        }

        let outcome = parse_callback(&params, expected_state);
        let page = if outcome.is_ok() {
            "Signed in. You can close this window and return to the chat."
        } else {
            "Sign-in did not complete. You can close this window."
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
            page.len()
        );
        write_half.write_all(response.as_bytes()).await?;
        write_half.shutdown().await.ok();
        return outcome;
    }
}

/// Returns the request line and consumes the headers after it.
async fn read_request_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut header = String::new();
    while reader.read_line(&mut header).await? > 0 && !header.trim().is_empty() {
        header.clear();
    }
    Ok(request_line)
}

fn query_params(target: &str) -> Result<HashMap<String, String>, AuthError> {
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|err| AuthError::Callback(err.to_string()))?;
    Ok(url.query_pairs().into_owned().collect())
}

fn parse_callback(params: &HashMap<String, String>, expected_state: &str) -> Result<String, AuthError> {
    if let Some(error) = params.get("error") {
        return Err(AuthError::Cancelled(error.clone()));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    params
        .get("code")
        .cloned()
        .ok_or_else(|| AuthError::Callback("missing code".to_string()))
}

fn expiry_from(expires_in: &str) -> DateTime<Utc> {
    let seconds = expires_in.parse::<i64>().unwrap_or(3600);
    Utc::now() + ChronoDuration::seconds(seconds)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
