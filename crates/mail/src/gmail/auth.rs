//! Gmail OAuth2 credential lifecycle
//!
//! Owns acquisition, disk persistence, validity checking, and refresh or
//! re-authentication of OAuth2 credentials for a (api, version, scopes,
//! prefix) identity. The interactive flow runs a local HTTP server to
//! receive the OAuth callback. Uses synchronous HTTP (ureq) to be
//! executor-agnostic.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::config::GoogleCredentials;
use crate::error::{Error, Result};
use crate::gmail::api::ProfileResponse;

/// Subdirectory of the config dir holding one token file per identity
const TOKEN_DIR: &str = "token_files";

/// Seconds before nominal expiry at which a token is treated as expired
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Identity of a persisted credential slot.
///
/// Identical identities always resolve to the same token file; distinct
/// prefixes map to distinct files so two accounts against the same API
/// never collide. Scopes ride inside the stored record and are checked
/// on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub api_name: String,
    pub api_version: String,
    pub scopes: Vec<String>,
    pub prefix: String,
}

impl ServiceIdentity {
    pub fn new(
        api_name: impl Into<String>,
        api_version: impl Into<String>,
        scopes: Vec<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            api_name: api_name.into(),
            api_version: api_version.into(),
            scopes,
            prefix: prefix.into(),
        }
    }

    /// Identity for the Gmail v1 API with full mailbox access
    pub fn gmail() -> Self {
        Self::new("gmail", "v1", vec!["https://mail.google.com/".to_string()], "")
    }

    /// File name of the persisted credential slot for this identity
    pub fn token_file_name(&self) -> String {
        format!("token_{}_{}{}.json", self.api_name, self.api_version, self.prefix)
    }
}

/// Persisted credential record, replaced whole-file on every save
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// True once the access token is within the expiry buffer.
    /// Records without an expiry are treated as expired.
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= chrono::Utc::now().timestamp() + EXPIRY_BUFFER_SECS,
            None => true,
        }
    }

    /// True if the granted scopes satisfy every requested scope
    fn covers(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }
}

/// Token response from the provider's token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Build the persisted record, keeping the previous refresh token when
    /// the provider did not rotate it and falling back to the requested
    /// scopes when the response omits the granted set.
    fn into_stored(self, previous_refresh: Option<String>, requested: &[String]) -> StoredToken {
        let scopes = match &self.scope {
            Some(s) if !s.is_empty() => s.split_whitespace().map(str::to_string).collect(),
            _ => requested.to_vec(),
        };
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
            scopes,
        }
    }
}

/// Persistence for credential records, one slot per identity
pub trait TokenStore: Send + Sync {
    fn load(&self, identity: &ServiceIdentity) -> Result<Option<StoredToken>>;
    fn save(&self, identity: &ServiceIdentity, token: &StoredToken) -> Result<()>;
    fn delete(&self, identity: &ServiceIdentity) -> Result<()>;
}

/// File-backed token store (~/.config/inboxman/token_files/)
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Store rooted at the default Inboxman config directory
    pub fn default_dir() -> Result<Self> {
        let dir = config::config_dir()
            .ok_or_else(|| Error::Configuration("could not determine config directory".into()))?;
        Ok(Self::new(dir.join(TOKEN_DIR)))
    }

    fn path_for(&self, identity: &ServiceIdentity) -> PathBuf {
        self.dir.join(identity.token_file_name())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, identity: &ServiceIdentity) -> Result<Option<StoredToken>> {
        let path = self.path_for(identity);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, identity: &ServiceIdentity, token: &StoredToken) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(token)?;
        // Whole-file replace; readers never observe a partial record
        fs::write(self.path_for(identity), content)?;
        Ok(())
    }

    fn delete(&self, identity: &ServiceIdentity) -> Result<()> {
        let path = self.path_for(identity);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory token store for tests and ephemeral sessions
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self, identity: &ServiceIdentity) -> Result<Option<StoredToken>> {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tokens.get(&identity.token_file_name()).cloned())
    }

    fn save(&self, identity: &ServiceIdentity, token: &StoredToken) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.insert(identity.token_file_name(), token.clone());
        Ok(())
    }

    fn delete(&self, identity: &ServiceIdentity) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.remove(&identity.token_file_name());
        Ok(())
    }
}

/// Obtains an authorization code for an authorization URL.
///
/// The production implementation opens a browser and listens for the
/// redirect; tests substitute a canned code.
pub trait AuthorizationPrompter: Send + Sync {
    /// Redirect URI the authorization URL must carry
    fn redirect_uri(&self) -> String;

    /// Surface `auth_url` to the user and collect the authorization code
    fn obtain_code(&self, auth_url: &str) -> Result<String>;
}

/// Browser-based prompter backed by a localhost callback listener
pub struct LocalServerPrompter {
    port: u16,
}

impl LocalServerPrompter {
    /// Port the OAuth client registration whitelists for the redirect
    pub const DEFAULT_PORT: u16 = 8080;

    pub fn new() -> Self {
        Self { port: Self::DEFAULT_PORT }
    }

    pub fn with_port(port: u16) -> Self {
        Self { port }
    }

    /// Wait for the OAuth callback and extract the authorization code
    fn wait_for_callback(&self, listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept()?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        // Format: GET /?code=AUTH_CODE&scope=... HTTP/1.1
        let code = query_param(&request_line, "code");
        let error = query_param(&request_line, "error");

        let (status, body) = if code.is_some() {
            ("200 OK", "Authentication successful! You can close this window.")
        } else {
            ("400 Bad Request", "Authentication failed. Please try again.")
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
            status, body
        );
        stream.write_all(response.as_bytes()).ok();

        if let Some(err) = error {
            return Err(Error::Authentication(format!("authorization denied: {err}")));
        }
        code.ok_or_else(|| Error::Authentication("no authorization code received".into()))
    }
}

impl Default for LocalServerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationPrompter for LocalServerPrompter {
    fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    fn obtain_code(&self, auth_url: &str) -> Result<String> {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).map_err(|e| {
            Error::Authentication(format!("could not bind callback port {}: {e}", self.port))
        })?;

        println!("\n=== Gmail Authentication Required ===");
        println!("Opening browser for authentication...");
        println!("If the browser doesn't open, visit: {}", auth_url);

        if let Err(e) = open::that(auth_url) {
            eprintln!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        println!("Waiting for authorization...");
        self.wait_for_callback(listener)
    }
}

/// Extract a query parameter from an HTTP request line
fn query_param(request_line: &str, name: &str) -> Option<String> {
    request_line
        .split_whitespace()
        .nth(1)
        .and_then(|path| path.split('?').nth(1))
        .and_then(|query| {
            query.split('&').find_map(|param| {
                let mut parts = param.split('=');
                if parts.next() == Some(name) {
                    parts.next().map(|s| s.to_string())
                } else {
                    None
                }
            })
        })
}

/// Token-endpoint operations, abstracted so tests can run without a network
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for tokens
    fn exchange_code(
        &self,
        credentials: &GoogleCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse>;

    /// Refresh an access token using a refresh token
    fn refresh(
        &self,
        credentials: &GoogleCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse>;

    /// Probe the provider with an access token to confirm it is accepted
    fn probe(&self, access_token: &str) -> Result<ProfileResponse>;
}

/// Production token endpoint talking to Google over ureq
pub struct HttpTokenEndpoint;

impl HttpTokenEndpoint {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    const PROFILE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1/users/me/profile";
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange_code(
        &self,
        credentials: &GoogleCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let mut response = ureq::post(Self::TOKEN_URL).send_form([
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])?;
        Ok(response.body_mut().read_json()?)
    }

    fn refresh(
        &self,
        credentials: &GoogleCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let mut response = ureq::post(Self::TOKEN_URL).send_form([
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])?;
        Ok(response.body_mut().read_json()?)
    }

    fn probe(&self, access_token: &str) -> Result<ProfileResponse> {
        let mut response = ureq::get(Self::PROFILE_URL)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()?;
        Ok(response.body_mut().read_json()?)
    }
}

/// One lock per credential identity. Two concurrent interactive flows or
/// refreshes for the same identity would race on the persisted record, so
/// `access_token` serializes on the identity's token file name.
fn identity_lock(key: &str) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(key.to_string()).or_default().clone()
}

/// OAuth2 credential lifecycle manager for one identity
pub struct GmailAuth {
    credentials: GoogleCredentials,
    identity: ServiceIdentity,
    store: Box<dyn TokenStore>,
    prompter: Box<dyn AuthorizationPrompter>,
    endpoint: Box<dyn TokenEndpoint>,
}

impl GmailAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";

    /// Lifecycle manager with the production store, prompter and endpoint
    pub fn new(credentials: GoogleCredentials, identity: ServiceIdentity) -> Result<Self> {
        Ok(Self::with_parts(
            credentials,
            identity,
            Box::new(FileTokenStore::default_dir()?),
            Box::new(LocalServerPrompter::new()),
            Box::new(HttpTokenEndpoint),
        ))
    }

    /// Lifecycle manager with injected collaborators
    pub fn with_parts(
        credentials: GoogleCredentials,
        identity: ServiceIdentity,
        store: Box<dyn TokenStore>,
        prompter: Box<dyn AuthorizationPrompter>,
        endpoint: Box<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            credentials,
            identity,
            store,
            prompter,
            endpoint,
        }
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Get a valid access token, refreshing or re-authenticating as needed.
    ///
    /// State machine: a persisted, unexpired record whose scopes cover the
    /// request is used as-is; an expired record with a refresh token is
    /// silently refreshed; anything else (no record, refresh failure,
    /// insufficient scopes) runs the interactive flow. Every successful
    /// transition persists the record before returning.
    pub fn access_token(&self) -> Result<String> {
        self.credentials.validate()?;
        if self.identity.scopes.is_empty() {
            return Err(Error::Configuration("scope set is empty".into()));
        }

        let lock = identity_lock(&self.identity.token_file_name());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(stored) = self.store.load(&self.identity)? {
            let covers = stored.covers(&self.identity.scopes);
            if covers && !stored.is_expired() {
                return Ok(stored.access_token);
            }

            if covers && stored.refresh_token.is_some() {
                let refresh_token = stored.refresh_token.clone();
                info!(
                    "Access token for {} expired, attempting refresh",
                    self.identity.token_file_name()
                );
                match self
                    .endpoint
                    .refresh(&self.credentials, refresh_token.as_deref().unwrap_or(""))
                {
                    Ok(response) => {
                        let token = response.into_stored(refresh_token, &self.identity.scopes);
                        self.store.save(&self.identity, &token)?;
                        return Ok(token.access_token);
                    }
                    Err(e) => {
                        warn!("Token refresh failed, re-running authorization flow: {e}");
                    }
                }
            }
        }

        let token = self.run_interactive_flow()?;
        Ok(token.access_token)
    }

    /// Run the interactive authorization flow and persist the result
    fn run_interactive_flow(&self) -> Result<StoredToken> {
        let redirect_uri = self.prompter.redirect_uri();
        let auth_url = self.build_auth_url(&redirect_uri)?;

        info!(
            "Starting interactive authorization for {}",
            self.identity.token_file_name()
        );
        let code = self
            .prompter
            .obtain_code(&auth_url)
            .map_err(|e| Error::Authentication(format!("authorization flow failed: {e}")))?;

        let response = self
            .endpoint
            .exchange_code(&self.credentials, &code, &redirect_uri)
            .map_err(|e| Error::Authentication(format!("code exchange failed: {e}")))?;

        let token = response.into_stored(None, &self.identity.scopes);
        self.store.save(&self.identity, &token)?;
        info!("Authorization successful for {}", self.identity.token_file_name());
        Ok(token)
    }

    /// Authorization URL with offline access and forced consent, so a
    /// refresh token is always granted
    fn build_auth_url(&self, redirect_uri: &str) -> Result<String> {
        let mut url = url::Url::parse(Self::AUTH_URL)
            .map_err(|e| Error::Configuration(format!("bad auth endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.identity.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url.into())
    }

    /// Confirm the provider accepts the credential. On rejection the
    /// persisted record is deleted so the next acquisition starts clean.
    pub(crate) fn verify(&self) -> Result<ProfileResponse> {
        let access_token = self.access_token()?;
        match self.endpoint.probe(&access_token) {
            Ok(profile) => Ok(profile),
            Err(e) => {
                warn!(
                    "Provider rejected credential for {}, deleting persisted record",
                    self.identity.token_file_name()
                );
                self.store.delete(&self.identity)?;
                Err(Error::Authentication(format!(
                    "provider rejected credential: {e}"
                )))
            }
        }
    }
}
