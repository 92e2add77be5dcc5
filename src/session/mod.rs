pub mod chrome;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::error::AuthError;
use crate::models::SessionStatus;
use crate::storage::Store;

pub use chrome::ChromeSurface;

/// Whether `html` renders the platform's login form. The single heuristic
/// for "this session is not authenticated", shared by the surface probe and
/// the feed extractor's mid-pass check.
pub fn login_wall_present(html: &str) -> bool {
    html.contains("name=\"email\"") || html.contains("name='email'")
}

/// What an interactive-equivalent login attempt came back with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Challenged,
    BadCredentials,
}

/// The browsing surface the session manager drives. `ChromeSurface` is the
/// real implementation; tests script this trait directly.
pub trait BrowserSurface: Send {
    /// Import a previously exported session blob and report whether the
    /// platform still honors it.
    fn restore(&mut self, blob: &str) -> Result<bool>;

    /// Full login with credentials.
    fn login(&mut self, email: &str, password: &str) -> Result<LoginOutcome>;

    /// Live probe: does the platform consider us authenticated right now?
    fn probe(&mut self) -> Result<bool>;

    /// Export session state as an opaque blob for later resumption.
    fn export(&mut self) -> Result<String>;

    /// Navigate a feed and return one HTML snapshot per scroll step.
    fn collect_feed_html(&mut self, url: &str, scroll_budget: u32) -> Result<Vec<String>>;
}

/// Owns the authenticated browsing session and its persisted state.
///
/// State machine: Unauthenticated → Authenticating → {Valid | Challenged |
/// CredentialsInvalid}; Valid → Expired on a failed probe, and the next
/// acquire tries silent resumption before a fresh login. Challenged and
/// CredentialsInvalid are terminal for the run: they surface to the
/// operator instead of retrying, since retrying a challenged login risks
/// account lockout. No other component touches the persisted session row.
pub struct SessionManager {
    surface: Box<dyn BrowserSurface>,
    store: Arc<Store>,
    credentials: Credentials,
    status: SessionStatus,
    probed_this_run: bool,
}

impl SessionManager {
    pub fn new(surface: Box<dyn BrowserSurface>, store: Arc<Store>, credentials: Credentials) -> Self {
        Self {
            surface,
            store,
            credentials,
            status: SessionStatus::Unauthenticated,
            probed_this_run: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Ensure a Valid session, resuming a persisted one when possible.
    pub fn acquire(&mut self) -> Result<(), AuthError> {
        match self.status {
            SessionStatus::Valid => Ok(()),
            SessionStatus::Challenged => Err(AuthError::Challenged),
            SessionStatus::CredentialsInvalid => Err(AuthError::CredentialsInvalid),
            SessionStatus::Unauthenticated
            | SessionStatus::Expired
            | SessionStatus::Authenticating => self.authenticate(),
        }
    }

    fn authenticate(&mut self) -> Result<(), AuthError> {
        self.status = SessionStatus::Authenticating;

        // Silent resumption first: a stored blob avoids a fresh login and
        // the extra attention it draws.
        if let Ok(Some((blob, _))) = self.store.load_session() {
            if !blob.is_empty() {
                info!("attempting session resumption from stored state");
                match self.surface.restore(&blob) {
                    Ok(true) => {
                        self.status = SessionStatus::Valid;
                        self.persist_best_effort();
                        info!("session resumed without login");
                        return Ok(());
                    }
                    Ok(false) => info!("stored session no longer honored, logging in"),
                    Err(e) => warn!(error = %e, "session restore failed, logging in"),
                }
            }
        }

        info!("performing full login");
        let outcome = self
            .surface
            .login(&self.credentials.login_email, &self.credentials.login_password)?;

        match outcome {
            LoginOutcome::Success => {
                self.status = SessionStatus::Valid;
                self.persist_best_effort();
                info!("login succeeded");
                Ok(())
            }
            LoginOutcome::Challenged => {
                self.status = SessionStatus::Challenged;
                self.record_status();
                Err(AuthError::Challenged)
            }
            LoginOutcome::BadCredentials => {
                self.status = SessionStatus::CredentialsInvalid;
                self.record_status();
                Err(AuthError::CredentialsInvalid)
            }
        }
    }

    /// Probe the live session. Rate-limited to one real probe per run so
    /// repeated validation cannot trip anti-automation defenses; later
    /// calls answer from the cached status.
    pub fn validate(&mut self) -> Result<bool, AuthError> {
        if self.status != SessionStatus::Valid {
            return Ok(false);
        }
        if self.probed_this_run {
            return Ok(true);
        }
        self.probed_this_run = true;

        let alive = self.surface.probe()?;
        if !alive {
            warn!("session probe failed, marking expired");
            self.status = SessionStatus::Expired;
            self.record_status();
        }
        Ok(alive)
    }

    /// Called by the extractor when a pass hits a login wall mid-feed.
    pub fn mark_expired(&mut self) {
        self.status = SessionStatus::Expired;
        self.record_status();
    }

    /// Collect feed HTML through the owned surface. Requires a Valid
    /// session; the caller is expected to `acquire` first.
    pub fn collect_feed_html(
        &mut self,
        url: &str,
        scroll_budget: u32,
    ) -> Result<Vec<String>, AuthError> {
        if self.status != SessionStatus::Valid {
            return Err(AuthError::Expired);
        }
        self.surface
            .collect_feed_html(url, scroll_budget)
            .map_err(AuthError::Browser)
    }

    /// Scoped save of the serialized session so later runs resume without
    /// re-authenticating.
    pub fn persist(&mut self) -> Result<(), AuthError> {
        let blob = self.surface.export()?;
        self.store
            .save_session(&blob, self.status)
            .map_err(|e| AuthError::Browser(e.into()))
    }

    fn persist_best_effort(&mut self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist session state");
        }
    }

    fn record_status(&mut self) {
        let blob = self.surface.export().unwrap_or_default();
        if let Err(e) = self.store.save_session(&blob, self.status) {
            warn!(error = %e, "failed to record session status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Script {
        restore_ok: bool,
        login_outcome: Option<LoginOutcome>,
        probe_alive: bool,
    }

    struct ScriptedSurface {
        script: Script,
        restores: Arc<AtomicUsize>,
        logins: Arc<AtomicUsize>,
        probes: Arc<AtomicUsize>,
    }

    impl ScriptedSurface {
        fn new(script: Script) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let restores = Arc::new(AtomicUsize::new(0));
            let logins = Arc::new(AtomicUsize::new(0));
            let probes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script,
                    restores: restores.clone(),
                    logins: logins.clone(),
                    probes: probes.clone(),
                },
                restores,
                logins,
                probes,
            )
        }
    }

    impl BrowserSurface for ScriptedSurface {
        fn restore(&mut self, _blob: &str) -> Result<bool> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            Ok(self.script.restore_ok)
        }

        fn login(&mut self, _email: &str, _password: &str) -> Result<LoginOutcome> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(self.script.login_outcome.unwrap_or(LoginOutcome::Success))
        }

        fn probe(&mut self) -> Result<bool> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.script.probe_alive)
        }

        fn export(&mut self) -> Result<String> {
            Ok(r#"{"cookies":[]}"#.to_string())
        }

        fn collect_feed_html(&mut self, _url: &str, _budget: u32) -> Result<Vec<String>> {
            Ok(vec![String::new()])
        }
    }

    fn store() -> (Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("test.db")).unwrap());
        (store, dir)
    }

    fn creds() -> Credentials {
        Credentials {
            login_email: "scout@example.com".to_string(),
            login_password: "secret".to_string(),
            ai_api_key: None,
        }
    }

    #[test]
    fn cold_acquire_logs_in_and_persists() {
        let (store, _dir) = store();
        let (surface, _r, logins, _p) = ScriptedSurface::new(Script {
            login_outcome: Some(LoginOutcome::Success),
            ..Default::default()
        });
        let mut mgr = SessionManager::new(Box::new(surface), store.clone(), creds());

        assert_eq!(mgr.status(), SessionStatus::Unauthenticated);
        mgr.acquire().unwrap();
        assert_eq!(mgr.status(), SessionStatus::Valid);
        assert_eq!(logins.load(Ordering::SeqCst), 1);

        let (_, status) = store.load_session().unwrap().unwrap();
        assert_eq!(status, SessionStatus::Valid);
    }

    #[test]
    fn stored_session_resumes_without_login() {
        let (store, _dir) = store();
        store
            .save_session(r#"{"cookies":[]}"#, SessionStatus::Valid)
            .unwrap();

        let (surface, restores, logins, _p) = ScriptedSurface::new(Script {
            restore_ok: true,
            ..Default::default()
        });
        let mut mgr = SessionManager::new(Box::new(surface), store, creds());

        mgr.acquire().unwrap();
        assert_eq!(mgr.status(), SessionStatus::Valid);
        assert_eq!(restores.load(Ordering::SeqCst), 1);
        assert_eq!(logins.load(Ordering::SeqCst), 0, "no login when resume works");
    }

    #[test]
    fn failed_probe_expires_then_reacquire_tries_resume_first() {
        let (store, _dir) = store();
        let (surface, restores, logins, _p) = ScriptedSurface::new(Script {
            restore_ok: true,
            login_outcome: Some(LoginOutcome::Success),
            probe_alive: false,
        });
        let mut mgr = SessionManager::new(Box::new(surface), store, creds());

        mgr.acquire().unwrap();
        let logins_before = logins.load(Ordering::SeqCst);

        assert!(!mgr.validate().unwrap());
        assert_eq!(mgr.status(), SessionStatus::Expired);

        mgr.acquire().unwrap();
        assert_eq!(mgr.status(), SessionStatus::Valid);
        assert!(restores.load(Ordering::SeqCst) >= 1, "resume attempted");
        assert_eq!(
            logins.load(Ordering::SeqCst),
            logins_before,
            "silent resume avoided a second login"
        );
    }

    #[test]
    fn validate_probes_at_most_once_per_run() {
        let (store, _dir) = store();
        let (surface, _r, _l, probes) = ScriptedSurface::new(Script {
            login_outcome: Some(LoginOutcome::Success),
            probe_alive: true,
            ..Default::default()
        });
        let mut mgr = SessionManager::new(Box::new(surface), store, creds());

        mgr.acquire().unwrap();
        assert!(mgr.validate().unwrap());
        assert!(mgr.validate().unwrap());
        assert!(mgr.validate().unwrap());
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn challenge_is_terminal_and_never_retried() {
        let (store, _dir) = store();
        let (surface, _r, logins, _p) = ScriptedSurface::new(Script {
            login_outcome: Some(LoginOutcome::Challenged),
            ..Default::default()
        });
        let mut mgr = SessionManager::new(Box::new(surface), store, creds());

        assert!(matches!(mgr.acquire(), Err(AuthError::Challenged)));
        assert_eq!(mgr.status(), SessionStatus::Challenged);

        // A second acquire must not touch the platform again.
        assert!(matches!(mgr.acquire(), Err(AuthError::Challenged)));
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bad_credentials_are_terminal() {
        let (store, _dir) = store();
        let (surface, _r, logins, _p) = ScriptedSurface::new(Script {
            login_outcome: Some(LoginOutcome::BadCredentials),
            ..Default::default()
        });
        let mut mgr = SessionManager::new(Box::new(surface), store, creds());

        assert!(matches!(mgr.acquire(), Err(AuthError::CredentialsInvalid)));
        assert!(matches!(mgr.acquire(), Err(AuthError::CredentialsInvalid)));
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn feed_collection_requires_valid_session() {
        let (store, _dir) = store();
        let (surface, _r, _l, _p) = ScriptedSurface::new(Script::default());
        let mut mgr = SessionManager::new(Box::new(surface), store, creds());

        assert!(matches!(
            mgr.collect_feed_html("https://example.com/groups/1", 3),
            Err(AuthError::Expired)
        ));
    }
}
