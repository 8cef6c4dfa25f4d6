//! Captcha-assisted login handshake.
//!
//! ```text
//! Init → PageFetched → CaptchaFetched → Submitted ─┬→ Authenticated
//!                                                  ├→ Rejected
//!                                                  └→ NetworkFailure
//! ```
//!
//! A manual code sent for an unknown or stale challenge ends in `Expired`
//! before anything is sent upstream.
//!
//! Automatic mode runs this loop up to the attempt budget with solver
//! guesses, then hands a challenge to the caller. Manual mode resumes a
//! stored challenge with the caller's code and submits once.

use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use registrar_common::constants::MAX_REDIRECT_HOPS;
use registrar_common::{
    AuthenticatedSession, CaptchaChallenge, Clock, CookieJar, IssuedChallenge, LoginPageFields,
    RegistrarError,
};

use crate::cipher;
use crate::config::{AppConfig, ManualFallback, PortalConfig};
use crate::net::{Browser, BrowserProfile, PortalResponse, PortalTransport};
use crate::store::{self, RecordKind, SessionStore};

use super::markup::{self, PageParse};
use super::rate_limit::LoginRateLimiter;
use super::retry::RetryPolicy;
use super::solver::CaptchaSolver;

/// Handshake progress, logged as each step completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    Init,
    PageFetched,
    CaptchaFetched,
    Submitted,
    Authenticated,
    Rejected,
    Expired,
    NetworkFailure,
}

/// Caller's answer to a previously issued challenge
#[derive(Debug, Clone)]
pub struct ManualCode {
    pub challenge_token: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Present in manual mode
    pub manual: Option<ManualCode>,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthenticatedSession),
    /// The caller must solve `challenge` and log in again in manual mode
    Rejected {
        message: String,
        challenge: IssuedChallenge,
    },
}

/// Everything a captcha image is bound to
#[derive(Debug, Clone)]
struct ChallengeSnapshot {
    cookies: CookieJar,
    fields: LoginPageFields,
    image: Vec<u8>,
}

enum Submission {
    /// Portal answered with a redirect; the jar now holds the ticket cookie
    Accepted(PortalResponse),
    Rejected(String),
}

enum AttemptOutcome {
    Authenticated {
        cookies: CookieJar,
        application_id: Option<String>,
    },
    Rejected {
        message: String,
        snapshot: ChallengeSnapshot,
    },
}

pub struct LoginChoreographer {
    transport: Arc<dyn PortalTransport>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    limiter: LoginRateLimiter,
    portal: PortalConfig,
    profile: BrowserProfile,
    policy: RetryPolicy,
    challenge_ttl: Duration,
    session_ttl: Duration,
    fallback: ManualFallback,
}

impl LoginChoreographer {
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn PortalTransport>,
        solver: Option<Arc<dyn CaptchaSolver>>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = LoginRateLimiter::new(
            store.clone(),
            clock.clone(),
            Duration::from_secs(config.login.cooldown_secs),
        );
        let policy = config.retry_policy();
        let profile = BrowserProfile {
            timeout: policy.request_timeout,
            ..config.profile()
        };
        Self {
            transport,
            solver,
            store,
            clock,
            limiter,
            portal: config.portal.clone(),
            profile,
            policy,
            challenge_ttl: Duration::from_secs(config.captcha.challenge_ttl_secs),
            session_ttl: Duration::from_secs(config.login.session_ttl_secs),
            fallback: config.login.manual_fallback,
        }
    }

    /// Open a login form and fetch its captcha for manual entry
    pub async fn issue_challenge(&self) -> Result<IssuedChallenge, RegistrarError> {
        let snapshot = self.capture_challenge().await?;
        self.store_challenge(snapshot).await
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, RegistrarError> {
        self.limiter.check_and_touch(&request.username).await?;

        match request.manual {
            Some(manual) => {
                self.login_manual(&request.username, &request.password, manual)
                    .await
            }
            None => self.login_auto(&request.username, &request.password).await,
        }
    }

    /// Live session for `token`
    pub async fn session(&self, token: &str) -> Result<AuthenticatedSession, RegistrarError> {
        let session: AuthenticatedSession =
            store::get_json(self.store.as_ref(), RecordKind::Session, token)
                .await?
                .ok_or(RegistrarError::SessionInvalid)?;
        if session.is_expired(self.clock.now()) {
            return Err(RegistrarError::SessionInvalid);
        }
        Ok(session)
    }

    /// Forget a session; unknown tokens are ignored
    pub async fn invalidate(&self, token: &str) -> Result<(), RegistrarError> {
        info!(token = %token_prefix(token), "Session invalidated");
        self.store.delete(RecordKind::Session, token).await
    }

    async fn login_auto(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, RegistrarError> {
        let Some(solver) = self.solver.as_deref() else {
            debug!(subject = %username, "No captcha solver configured, going manual");
            return self
                .fall_back_to_manual(
                    "Automatic captcha recognition unavailable, please enter the code".to_string(),
                    None,
                )
                .await;
        };

        let mut last_message = None;
        let mut last_snapshot = None;

        for attempt in self.policy.attempts() {
            if let Some(delay) = self.policy.delay_before(attempt) {
                tokio::time::sleep(delay).await;
            }

            match self
                .attempt_auto(solver, username, password)
                .await
                .inspect_err(|e| note_failure(username, e))
            {
                Ok(AttemptOutcome::Authenticated {
                    cookies,
                    application_id,
                }) => {
                    let session = self.persist(username, cookies, application_id).await?;
                    return Ok(LoginOutcome::Authenticated(session));
                }
                Ok(AttemptOutcome::Rejected { message, snapshot }) => {
                    warn!(subject = %username, attempt, reason = %message, "Automatic attempt rejected");
                    last_message = Some(message);
                    last_snapshot = Some(snapshot);
                }
                Err(e) if self.policy.should_retry(attempt, &e) => {
                    warn!(subject = %username, attempt, error = %e, "Automatic attempt failed, retrying");
                    last_message = Some(e.to_string());
                }
                Err(e) if e.is_retryable() => {
                    // Budget spent on a transient failure
                    warn!(subject = %username, attempt, error = %e, "Automatic attempt failed");
                    last_message = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let message = last_message.unwrap_or_else(|| markup::DEFAULT_REJECTION.to_string());
        self.fall_back_to_manual(message, last_snapshot).await
    }

    async fn attempt_auto(
        &self,
        solver: &dyn CaptchaSolver,
        username: &str,
        password: &str,
    ) -> Result<AttemptOutcome, RegistrarError> {
        let mut browser = self.browser(CookieJar::new());
        stage(username, HandshakeStage::Init);

        let fields = self.open_login_page(&mut browser).await?;
        stage(username, HandshakeStage::PageFetched);

        let image = self.fetch_captcha(&mut browser).await?;
        stage(username, HandshakeStage::CaptchaFetched);

        let guess = solver.solve(&image).await?;
        let snapshot = ChallengeSnapshot {
            cookies: browser.jar().clone(),
            fields: fields.clone(),
            image,
        };

        match self
            .submit(&mut browser, username, password, &fields, &guess)
            .await?
        {
            Submission::Accepted(response) => {
                let application_id = self.complete(&mut browser, response).await?;
                stage(username, HandshakeStage::Authenticated);
                Ok(AttemptOutcome::Authenticated {
                    cookies: browser.into_jar(),
                    application_id,
                })
            }
            Submission::Rejected(message) => {
                stage(username, HandshakeStage::Rejected);
                Ok(AttemptOutcome::Rejected { message, snapshot })
            }
        }
    }

    async fn login_manual(
        &self,
        username: &str,
        password: &str,
        manual: ManualCode,
    ) -> Result<LoginOutcome, RegistrarError> {
        let challenge: CaptchaChallenge = store::take_json(
            self.store.as_ref(),
            RecordKind::Challenge,
            &manual.challenge_token,
        )
        .await?
        .ok_or_else(|| {
            stage(username, HandshakeStage::Expired);
            info!(
                subject = %username,
                token = %token_prefix(&manual.challenge_token),
                "Captcha challenge expired or unknown"
            );
            RegistrarError::CaptchaExpired
        })?;

        let mut browser = self.browser(challenge.cookies);
        stage(username, HandshakeStage::CaptchaFetched);

        match self
            .submit(&mut browser, username, password, &challenge.fields, &manual.code)
            .await
            .inspect_err(|e| note_failure(username, e))?
        {
            Submission::Accepted(response) => {
                let application_id = self
                    .complete(&mut browser, response)
                    .await
                    .inspect_err(|e| note_failure(username, e))?;
                stage(username, HandshakeStage::Authenticated);
                let session = self
                    .persist(username, browser.into_jar(), application_id)
                    .await?;
                Ok(LoginOutcome::Authenticated(session))
            }
            Submission::Rejected(message) => {
                stage(username, HandshakeStage::Rejected);
                match self.issue_challenge().await {
                    Ok(challenge) => Ok(LoginOutcome::Rejected { message, challenge }),
                    Err(e) => {
                        warn!(subject = %username, error = %e, "Could not open a new challenge");
                        Err(RegistrarError::AuthRejected { message })
                    }
                }
            }
        }
    }

    async fn fall_back_to_manual(
        &self,
        message: String,
        snapshot: Option<ChallengeSnapshot>,
    ) -> Result<LoginOutcome, RegistrarError> {
        let challenge = match (self.fallback, snapshot) {
            (ManualFallback::ReuseSnapshot, Some(snapshot)) => self.store_challenge(snapshot).await?,
            _ => self.issue_challenge().await?,
        };
        Ok(LoginOutcome::Rejected { message, challenge })
    }

    async fn capture_challenge(&self) -> Result<ChallengeSnapshot, RegistrarError> {
        let mut browser = self.browser(CookieJar::new());
        let fields = self.open_login_page(&mut browser).await?;
        let image = self.fetch_captcha(&mut browser).await?;
        Ok(ChallengeSnapshot {
            cookies: browser.into_jar(),
            fields,
            image,
        })
    }

    async fn store_challenge(
        &self,
        snapshot: ChallengeSnapshot,
    ) -> Result<IssuedChallenge, RegistrarError> {
        // Expired challenges are only reclaimed here
        match self.store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired records"),
            Err(e) => warn!(error = %e, "Failed to purge expired records"),
        }

        let now = self.clock.now();
        let ChallengeSnapshot {
            cookies,
            fields,
            image,
        } = snapshot;

        let challenge = store::issue(
            self.store.as_ref(),
            RecordKind::Challenge,
            self.challenge_ttl,
            |token| CaptchaChallenge {
                token,
                cookies,
                fields,
                created_at: now,
            },
        )
        .await?;

        debug!(token = %token_prefix(&challenge.token), "Captcha challenge stored");
        Ok(IssuedChallenge {
            token: challenge.token,
            image: image_data_uri(&image),
            expires_at: store::expiry(now, self.challenge_ttl),
        })
    }

    async fn open_login_page(
        &self,
        browser: &mut Browser<'_>,
    ) -> Result<LoginPageFields, RegistrarError> {
        let page = browser.get(&self.portal.login_url).await?;
        if !page.is_success() {
            return Err(RegistrarError::NetworkFailure(format!(
                "login page returned HTTP {}",
                page.status
            )));
        }

        match markup::parse_login_page(&page.text()) {
            PageParse::Ok(fields) => Ok(fields),
            PageParse::MissingField(field) => {
                warn!(field, "Login page is missing a required field");
                Err(RegistrarError::PageStructure {
                    field: field.to_string(),
                })
            }
        }
    }

    async fn fetch_captcha(&self, browser: &mut Browser<'_>) -> Result<Vec<u8>, RegistrarError> {
        let url = format!(
            "{}?{}",
            self.portal.captcha_url,
            self.clock.now().timestamp_millis()
        );
        let response = browser.get(&url).await?;
        if !response.is_success() || response.body.is_empty() {
            return Err(RegistrarError::NetworkFailure(format!(
                "captcha fetch returned HTTP {} with {} bytes",
                response.status,
                response.body.len()
            )));
        }
        Ok(response.body)
    }

    async fn submit(
        &self,
        browser: &mut Browser<'_>,
        username: &str,
        password: &str,
        fields: &LoginPageFields,
        code: &str,
    ) -> Result<Submission, RegistrarError> {
        let ciphertext = cipher::encrypt(password, &fields.salt)?;
        let form = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), ciphertext),
            ("captcha".to_string(), code.trim().to_string()),
            ("_eventId".to_string(), "submit".to_string()),
            ("cllt".to_string(), "userNameLogin".to_string()),
            ("dllt".to_string(), "generalLogin".to_string()),
            ("lt".to_string(), fields.legacy_ticket.clone()),
            ("execution".to_string(), fields.execution.clone()),
        ];

        let response = browser.post_form(&self.portal.login_url, form).await?;
        stage(username, HandshakeStage::Submitted);

        if response.is_redirect() {
            Ok(Submission::Accepted(response))
        } else {
            Ok(Submission::Rejected(markup::rejection_message(&response.text())))
        }
    }

    /// Follow the ticket redirects, warm up the application portal and
    /// scrape the application identifier.
    ///
    /// A missing identifier degrades the session instead of failing it.
    async fn complete(
        &self,
        browser: &mut Browser<'_>,
        accepted: PortalResponse,
    ) -> Result<Option<String>, RegistrarError> {
        let login_url = reqwest::Url::parse(&self.portal.login_url)
            .map_err(|e| RegistrarError::Internal(format!("invalid login URL: {}", e)))?;
        browser
            .follow_redirects(login_url, accepted, MAX_REDIRECT_HOPS)
            .await?;
        browser
            .visit(&self.portal.app_home_url, MAX_REDIRECT_HOPS)
            .await?;

        let probe_url = format!(
            "{}?xnxq={}",
            self.portal.timetable_page_url,
            urlencoding::encode(&self.portal.probe_semester)
        );
        let application_id = match browser.visit(&probe_url, MAX_REDIRECT_HOPS).await {
            Ok(page) => markup::input_value(&page.text(), "id", "xhid").filter(|id| !id.is_empty()),
            Err(e) => {
                warn!(error = %e, "Application identifier page unreachable");
                None
            }
        };
        if application_id.is_none() {
            warn!("No application identifier found, session will be degraded");
        }

        Ok(application_id)
    }

    async fn persist(
        &self,
        username: &str,
        cookies: CookieJar,
        application_id: Option<String>,
    ) -> Result<AuthenticatedSession, RegistrarError> {
        let hosts = [&self.portal.login_url, &self.portal.app_home_url]
            .into_iter()
            .filter_map(|url| reqwest::Url::parse(url).ok())
            .filter_map(|url| url.host_str().map(str::to_string));
        for host in hosts {
            if !cookies.covers(&host) {
                warn!(host = %host, "Session has no cookies for host");
            }
        }

        let now = self.clock.now();
        let ttl = self.session_ttl;
        let session = store::issue(self.store.as_ref(), RecordKind::Session, ttl, |token| {
            AuthenticatedSession {
                token,
                subject_id: username.to_string(),
                cookies,
                application_id,
                created_at: now,
                expires_at: store::expiry(now, ttl),
            }
        })
        .await?;

        info!(
            subject = %username,
            token = %token_prefix(&session.token),
            degraded = session.is_degraded(),
            "Login succeeded"
        );
        Ok(session)
    }

    fn browser(&self, jar: CookieJar) -> Browser<'_> {
        Browser::new(self.transport.as_ref(), &self.profile, jar)
    }
}

fn stage(subject: &str, stage: HandshakeStage) {
    debug!(subject = %subject, stage = ?stage, "Handshake stage");
}

fn note_failure(subject: &str, error: &RegistrarError) {
    if matches!(error, RegistrarError::NetworkFailure(_)) {
        stage(subject, HandshakeStage::NetworkFailure);
    }
}

/// Short token prefix for logs
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

/// Inline the captcha as a `data:` URI, sniffing the common image formats
fn image_data_uri(image: &[u8]) -> String {
    let mime = if image.starts_with(b"\x89PNG") {
        "image/png"
    } else if image.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "image/jpeg"
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{FakePortal, FixedSolver, GOOD_PASSWORD, PORTAL_CAPTCHA, test_config};
    use chrono::{TimeDelta, Utc};
    use registrar_common::ManualClock;

    struct Harness {
        portal: Arc<FakePortal>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        choreographer: LoginChoreographer,
    }

    fn harness(config: AppConfig, solver: Option<FixedSolver>) -> Harness {
        let portal = Arc::new(FakePortal::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let choreographer = LoginChoreographer::new(
            &config,
            portal.clone(),
            solver.map(|s| Arc::new(s) as Arc<dyn CaptchaSolver>),
            store.clone(),
            clock.clone(),
        );
        Harness {
            portal,
            store,
            clock,
            choreographer,
        }
    }

    fn auto(password: &str) -> LoginRequest {
        LoginRequest {
            username: "2023001".to_string(),
            password: password.to_string(),
            manual: None,
        }
    }

    fn manual(token: &str, code: &str) -> LoginRequest {
        LoginRequest {
            username: "2023001".to_string(),
            password: GOOD_PASSWORD.to_string(),
            manual: Some(ManualCode {
                challenge_token: token.to_string(),
                code: code.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_automatic_login_succeeds() {
        let h = harness(test_config(), Some(FixedSolver::always(PORTAL_CAPTCHA)));

        let outcome = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap();
        let LoginOutcome::Authenticated(session) = outcome else {
            panic!("expected a session");
        };
        assert_eq!(session.subject_id, "2023001");
        assert_eq!(session.application_id.as_deref(), Some("XH-2023001"));
        assert!(session.cookies.covers("idp.test"));
        assert!(session.cookies.covers("jw.test"));

        let loaded = h.choreographer.session(&session.token).await.unwrap();
        assert_eq!(loaded.subject_id, "2023001");
    }

    #[tokio::test]
    async fn test_wrong_guesses_exhaust_budget_then_fall_back() {
        let h = harness(test_config(), Some(FixedSolver::always("zzzz")));

        let outcome = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap();
        let LoginOutcome::Rejected { message, challenge } = outcome else {
            panic!("expected a manual challenge");
        };
        assert_eq!(message, "验证码错误");
        assert!(challenge.image.starts_with("data:image/png;base64,"));
        // Three submissions, then one more page for the fresh challenge
        assert_eq!(h.portal.submissions(), 3);
        assert_eq!(h.portal.login_page_loads(), 4);
    }

    #[tokio::test]
    async fn test_second_guess_can_succeed() {
        let h = harness(
            test_config(),
            Some(FixedSolver::sequence(&["zzzz", PORTAL_CAPTCHA])),
        );

        let outcome = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        assert_eq!(h.portal.submissions(), 2);
    }

    #[tokio::test]
    async fn test_missing_solver_goes_straight_to_manual() {
        let h = harness(test_config(), None);

        let outcome = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Rejected { .. }));
        assert_eq!(h.portal.submissions(), 0);
    }

    #[tokio::test]
    async fn test_structure_change_is_fatal() {
        let h = harness(test_config(), Some(FixedSolver::always(PORTAL_CAPTCHA)));
        h.portal.set_drop_salt(true);

        let err = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap_err();
        assert!(matches!(err, RegistrarError::PageStructure { ref field } if field == "pwdEncryptSalt"));
        assert_eq!(h.portal.login_page_loads(), 1);
    }

    #[tokio::test]
    async fn test_network_failures_are_retried_then_reported() {
        let h = harness(test_config(), Some(FixedSolver::always(PORTAL_CAPTCHA)));
        h.portal.set_offline(true);

        // Fallback needs the portal too, so the failure surfaces
        let err = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap_err();
        assert!(matches!(err, RegistrarError::NetworkFailure(_)));
        assert_eq!(h.portal.requests(), 4);
    }

    #[tokio::test]
    async fn test_manual_code_completes_login() {
        let h = harness(test_config(), None);
        let challenge = h.choreographer.issue_challenge().await.unwrap();

        let outcome = h
            .choreographer
            .login(manual(&challenge.token, PORTAL_CAPTCHA))
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_challenge_is_single_use() {
        let h = harness(test_config(), None);
        let challenge = h.choreographer.issue_challenge().await.unwrap();

        h.choreographer
            .login(manual(&challenge.token, PORTAL_CAPTCHA))
            .await
            .unwrap();
        h.clock.advance(TimeDelta::seconds(5));
        let err = h
            .choreographer
            .login(manual(&challenge.token, PORTAL_CAPTCHA))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrarError::CaptchaExpired));
    }

    #[tokio::test]
    async fn test_expired_challenge_is_rejected_without_remote_calls() {
        let h = harness(test_config(), None);
        let challenge = h.choreographer.issue_challenge().await.unwrap();
        let before = h.portal.requests();

        h.clock.advance(TimeDelta::seconds(301));
        let err = h
            .choreographer
            .login(manual(&challenge.token, PORTAL_CAPTCHA))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrarError::CaptchaExpired));
        assert_eq!(h.portal.requests(), before);
    }

    #[tokio::test]
    async fn test_wrong_manual_code_returns_fresh_challenge() {
        let h = harness(test_config(), None);
        let challenge = h.choreographer.issue_challenge().await.unwrap();

        let outcome = h
            .choreographer
            .login(manual(&challenge.token, "nope"))
            .await
            .unwrap();
        let LoginOutcome::Rejected {
            message,
            challenge: next,
        } = outcome
        else {
            panic!("expected a new challenge");
        };
        assert_eq!(message, "验证码错误");
        assert_ne!(next.token, challenge.token);
    }

    #[tokio::test]
    async fn test_wrong_password_surfaces_portal_message() {
        let h = harness(test_config(), None);
        let challenge = h.choreographer.issue_challenge().await.unwrap();

        let outcome = h
            .choreographer
            .login(LoginRequest {
                password: "wrong".to_string(),
                ..manual(&challenge.token, PORTAL_CAPTCHA)
            })
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Rejected { ref message, .. } if message == "您提供的用户名或者密码有误"));
    }

    #[tokio::test]
    async fn test_reuse_snapshot_fallback_reoffers_last_captcha() {
        let mut config = test_config();
        config.login.manual_fallback = ManualFallback::ReuseSnapshot;
        let h = harness(config, Some(FixedSolver::always("zzzz")));

        let outcome = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Rejected { .. }));
        // No extra page load for the fallback challenge
        assert_eq!(h.portal.login_page_loads(), 3);
    }

    #[tokio::test]
    async fn test_missing_application_id_degrades_session() {
        let h = harness(test_config(), Some(FixedSolver::always(PORTAL_CAPTCHA)));
        h.portal.set_hide_application_id(true);

        let LoginOutcome::Authenticated(session) =
            h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap()
        else {
            panic!("expected a session");
        };
        assert!(session.is_degraded());
    }

    #[tokio::test]
    async fn test_cooldown_applies_before_any_remote_call() {
        let h = harness(test_config(), Some(FixedSolver::always(PORTAL_CAPTCHA)));
        h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap();
        let before = h.portal.requests();

        let err = h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap_err();
        assert!(matches!(err, RegistrarError::RateLimited { .. }));
        assert_eq!(h.portal.requests(), before);
    }

    #[tokio::test]
    async fn test_session_expires_after_ttl() {
        let config = test_config();
        let ttl = i64::try_from(config.login.session_ttl_secs).unwrap();
        let h = harness(config, Some(FixedSolver::always(PORTAL_CAPTCHA)));
        let LoginOutcome::Authenticated(session) =
            h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap()
        else {
            panic!("expected a session");
        };

        h.clock.advance(TimeDelta::seconds(ttl - 1));
        assert!(h.choreographer.session(&session.token).await.is_ok());

        h.clock.advance(TimeDelta::seconds(2));
        assert!(matches!(
            h.choreographer.session(&session.token).await,
            Err(RegistrarError::SessionInvalid)
        ));
    }

    #[tokio::test]
    async fn test_session_can_be_invalidated() {
        let h = harness(test_config(), Some(FixedSolver::always(PORTAL_CAPTCHA)));
        let LoginOutcome::Authenticated(session) =
            h.choreographer.login(auto(GOOD_PASSWORD)).await.unwrap()
        else {
            panic!("expected a session");
        };

        h.choreographer.invalidate(&session.token).await.unwrap();
        assert!(matches!(
            h.choreographer.session(&session.token).await,
            Err(RegistrarError::SessionInvalid)
        ));
        assert!(h.store.get(RecordKind::Session, &session.token).await.unwrap().is_none());
    }

    #[test]
    fn test_token_prefix_is_bounded() {
        assert_eq!(token_prefix("abcdefghijkl"), "abcdefgh");
        assert_eq!(token_prefix("abc"), "abc");
    }
}
