use thiserror::Error;

/// Session-level failures.
///
/// `CredentialsInvalid` and `Challenged` are terminal for the run and must
/// reach the operator; retrying a challenged login risks account lockout.
/// `Expired` is recoverable via silent re-authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected: credentials invalid")]
    CredentialsInvalid,

    #[error("login hit a security checkpoint, manual intervention required")]
    Challenged,

    #[error("session expired")]
    Expired,

    #[error("browser error: {0}")]
    Browser(anyhow::Error),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Browser(err)
    }
}

/// Per-field parsing failures inside the AI fallback branch.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("AI extraction timed out after {attempts} attempts")]
    AiTimeout { attempts: u32 },

    #[error("AI response did not match the expected schema: {0}")]
    MalformedResponse(String),

    #[error("AI request failed: {0}")]
    Request(String),
}

/// Dedup ledger failures. Always fatal for the run: once the ledger is
/// unreachable, at-most-once notification cannot be guaranteed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Feed pass failures. Post-level problems are skipped inside the
/// extractor and never surface as this error; a pass only fails as a whole.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("feed collection failed: {0}")]
    Collection(String),
}

/// Top-level run failure surfaced to external alerting.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
