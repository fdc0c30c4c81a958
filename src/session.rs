//! Session tokens and their renewal.
//!
//! Tokens are obtained outside this program (a browser login flow writes them
//! to `userdata.json`). [`FileSessionProvider`] reads that store and can run an
//! external command to refresh it. [`AccountSession`] wraps remote calls so an
//! expired token is renewed and the call retried exactly once.

use crate::api::{ApiError, AuthToken};
use crate::profiles::Profile;
use serde::Deserialize;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Default session store filename.
pub const SESSIONS_FILENAME: &str = "userdata.json";

/// Environment variable carrying the profile name to the renewal command.
pub const PROFILE_ENV: &str = "NOTPX_PROFILE";

/// Error from the session store or renewal hook
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("failed to read session store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session store {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to start renewal command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("renewal command '{command}' exited with {status}")]
    CommandFailed { command: String, status: std::process::ExitStatus },
}

/// Source of session tokens.
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    /// Current token of `account`, if one is stored.
    async fn authorization(&self, account: &str) -> Result<Option<AuthToken>, SessionError>;

    /// Obtain a fresh token for `profile`. `None` means renewal is impossible.
    async fn renew(&self, profile: &Profile) -> Result<Option<AuthToken>, SessionError>;
}

#[derive(Debug, Deserialize)]
struct StoredSession {
    name: String,
    #[serde(default)]
    authorization: Option<String>,
}

/// Reads tokens from a JSON array of `{ "name", "authorization" }`.
#[derive(Debug, Clone)]
pub struct FileSessionProvider {
    store: PathBuf,
    renew_command: Option<Vec<String>>,
}

impl FileSessionProvider {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        Self { store: store.into(), renew_command: None }
    }

    /// Run `argv` (profile name appended) to refresh the store on renewal.
    pub fn with_renew_command(mut self, argv: Option<Vec<String>>) -> Self {
        self.renew_command = argv.filter(|argv| !argv.is_empty());
        self
    }

    async fn read_store(&self) -> Result<Vec<StoredSession>, SessionError> {
        let data = match tokio::fs::read(&self.store).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %self.store.display(), "session store does not exist");
                return Ok(Vec::new());
            }
            Err(source) => return Err(SessionError::Io { path: self.store.clone(), source }),
        };
        serde_json::from_slice(&data)
            .map_err(|source| SessionError::Json { path: self.store.clone(), source })
    }
}

impl SessionProvider for FileSessionProvider {
    async fn authorization(&self, account: &str) -> Result<Option<AuthToken>, SessionError> {
        let sessions = self.read_store().await?;
        Ok(sessions
            .into_iter()
            .find(|s| s.name == account)
            .and_then(|s| s.authorization)
            .filter(|t| !t.is_empty())
            .map(AuthToken::new))
    }

    async fn renew(&self, profile: &Profile) -> Result<Option<AuthToken>, SessionError> {
        let Some(argv) = &self.renew_command else {
            tracing::warn!(profile = %profile.name, "no renewal command configured");
            return Ok(None);
        };
        let command = argv.join(" ");
        tracing::info!(profile = %profile.name, %command, "renewing session");

        let status = tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .arg(&profile.name)
            .env(PROFILE_ENV, &profile.name)
            .status()
            .await
            .map_err(|source| SessionError::Spawn { command: command.clone(), source })?;
        if !status.success() {
            return Err(SessionError::CommandFailed { command, status });
        }
        self.authorization(&profile.name).await
    }
}

/// Error from a call made through an [`AccountSession`].
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("no session available for '{account}'")]
    NoSession { account: String },
    #[error("session for '{account}' could not be renewed")]
    RenewalFailed { account: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Api(e) => e.kind(),
            CallError::NoSession { .. } => "no_session",
            CallError::RenewalFailed { .. } => "renewal_failed",
            CallError::Session(_) => "session_store",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CallError::Api(e) => e.status(),
            _ => None,
        }
    }
}

/// The live token of one account plus the means to renew it.
pub struct AccountSession<'a, S> {
    provider: &'a S,
    profile: &'a Profile,
    token: AuthToken,
    lost: bool,
}

impl<'a, S: SessionProvider> AccountSession<'a, S> {
    /// Look up the stored token, renewing once if none is stored.
    pub async fn open(provider: &'a S, profile: &'a Profile) -> Result<Self, CallError> {
        let token = match provider.authorization(&profile.name).await? {
            Some(token) => token,
            None => provider
                .renew(profile)
                .await?
                .ok_or_else(|| CallError::NoSession { account: profile.name.clone() })?,
        };
        Ok(Self { provider, profile, token, lost: false })
    }

    /// Use a known token.
    pub fn with_token(provider: &'a S, profile: &'a Profile, token: AuthToken) -> Self {
        Self { provider, profile, token, lost: false }
    }

    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    pub fn profile(&self) -> &Profile {
        self.profile
    }

    /// Whether a renewal has failed. A lost session is never renewed again.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Replace the token with a renewed one.
    pub async fn renew(&mut self) -> Result<(), CallError> {
        if self.lost {
            return Err(CallError::RenewalFailed { account: self.profile.name.clone() });
        }
        match self.provider.renew(self.profile).await {
            Ok(Some(token)) => {
                self.token = token;
                return Ok(());
            }
            Ok(None) => tracing::error!("session renewal returned no token"),
            Err(e) => tracing::error!(error = %e, "session renewal failed"),
        }
        self.lost = true;
        Err(CallError::RenewalFailed { account: self.profile.name.clone() })
    }

    /// Run `op` with the current token. On 401 renew once and retry once.
    pub async fn call<T, F, Fut>(&mut self, mut op: F) -> Result<T, CallError>
    where
        F: FnMut(AuthToken) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match op(self.token.clone()).await {
            Err(e) if e.is_unauthorized() => {
                tracing::info!("authorization expired, renewing session");
                self.renew().await?;
                tracing::info!("session renewed, retrying");
                Ok(op(self.token.clone()).await?)
            }
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;

    struct Scripted {
        stored: Option<AuthToken>,
        renewals: RefCell<Vec<Option<AuthToken>>>,
        renew_calls: Cell<usize>,
    }

    impl Scripted {
        fn new(stored: Option<&str>, renewals: &[Option<&str>]) -> Self {
            Self {
                stored: stored.map(AuthToken::new),
                renewals: RefCell::new(renewals.iter().rev().map(|t| t.map(AuthToken::new)).collect()),
                renew_calls: Cell::new(0),
            }
        }
    }

    impl SessionProvider for Scripted {
        async fn authorization(&self, _account: &str) -> Result<Option<AuthToken>, SessionError> {
            Ok(self.stored.clone())
        }

        async fn renew(&self, _profile: &Profile) -> Result<Option<AuthToken>, SessionError> {
            self.renew_calls.set(self.renew_calls.get() + 1);
            Ok(self.renewals.borrow_mut().pop().flatten())
        }
    }

    #[tokio::test]
    async fn test_call_renews_once_on_unauthorized() {
        let provider = Scripted::new(Some("old"), &[Some("new")]);
        let profile = Profile::new("acc");
        let mut session = AccountSession::open(&provider, &profile).await.unwrap();

        let seen = RefCell::new(Vec::new());
        let result = session
            .call(|token| {
                seen.borrow_mut().push(token.as_str().to_string());
                async move {
                    if token.as_str() == "old" { Err(ApiError::Unauthorized) } else { Ok(5) }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(*seen.borrow(), vec!["old", "new"]);
        assert_eq!(session.token().as_str(), "new");
        assert_eq!(provider.renew_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_call_retries_at_most_once() {
        let provider = Scripted::new(Some("old"), &[Some("new"), Some("newer")]);
        let profile = Profile::new("acc");
        let mut session = AccountSession::open(&provider, &profile).await.unwrap();

        let calls = Cell::new(0);
        let result: Result<(), _> = session
            .call(|_| {
                calls.set(calls.get() + 1);
                async { Err(ApiError::Unauthorized) }
            })
            .await;
        assert!(matches!(result, Err(CallError::Api(ApiError::Unauthorized))));
        assert_eq!(calls.get(), 2);
        assert_eq!(provider.renew_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_failed_renewal_abandons_call() {
        let provider = Scripted::new(Some("old"), &[None]);
        let profile = Profile::new("acc");
        let mut session = AccountSession::open(&provider, &profile).await.unwrap();

        let result: Result<(), _> = session.call(|_| async { Err(ApiError::Unauthorized) }).await;
        assert!(matches!(result, Err(CallError::RenewalFailed { .. })));
        assert!(session.is_lost());
    }

    #[tokio::test]
    async fn test_lost_session_is_not_renewed_again() {
        let provider = Scripted::new(Some("old"), &[None, Some("late")]);
        let profile = Profile::new("acc");
        let mut session = AccountSession::open(&provider, &profile).await.unwrap();

        for _ in 0..3 {
            let result: Result<(), _> = session.call(|_| async { Err(ApiError::Unauthorized) }).await;
            assert!(matches!(result, Err(CallError::RenewalFailed { .. })));
        }
        assert_eq!(provider.renew_calls.get(), 1);
        assert_eq!(session.token().as_str(), "old");
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let provider = Scripted::new(Some("old"), &[Some("new")]);
        let profile = Profile::new("acc");
        let mut session = AccountSession::open(&provider, &profile).await.unwrap();

        let result: Result<(), _> = session
            .call(|_| async { Err(ApiError::Status { status: 400, body: "bad".into() }) })
            .await;
        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(provider.renew_calls.get(), 0);
    }

    #[tokio::test]
    async fn test_open_without_token_tries_renewal() {
        let provider = Scripted::new(None, &[None]);
        let profile = Profile::new("acc");
        let result = AccountSession::open(&provider, &profile).await;
        assert!(matches!(result, Err(CallError::NoSession { .. })));
        assert_eq!(provider.renew_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_file_provider_reads_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SESSIONS_FILENAME);
        std::fs::write(
            &path,
            r#"[{"name": "a", "authorization": "tok-a"}, {"name": "b", "authorization": ""}]"#,
        )
        .unwrap();
        let provider = FileSessionProvider::new(&path);
        assert_eq!(provider.authorization("a").await.unwrap(), Some(AuthToken::new("tok-a")));
        assert_eq!(provider.authorization("b").await.unwrap(), None);
        assert_eq!(provider.authorization("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_provider_missing_store_is_empty() {
        let temp = TempDir::new().unwrap();
        let provider = FileSessionProvider::new(temp.path().join(SESSIONS_FILENAME));
        assert_eq!(provider.authorization("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_provider_without_command_cannot_renew() {
        let temp = TempDir::new().unwrap();
        let provider = FileSessionProvider::new(temp.path().join(SESSIONS_FILENAME))
            .with_renew_command(Some(Vec::new()));
        assert_eq!(provider.renew(&Profile::new("a")).await.unwrap(), None);
    }
}
