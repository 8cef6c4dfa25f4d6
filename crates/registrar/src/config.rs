//! Configuration management for Registrar.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use registrar_common::constants::{
    ATTEMPT_DELAY_MS, CAPTCHA_TTL_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, DEFAULT_SEMESTER,
    LOGIN_COOLDOWN_SECS, MAX_LOGIN_ATTEMPTS, REQUEST_TIMEOUT_SECS, SESSION_TTL_SECS, USER_AGENT,
    endpoints,
};

use crate::net::BrowserProfile;
use crate::schedule::SemesterCalendar;
use crate::sso::RetryPolicy;

/// Where challenges, sessions and cooldowns live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local map (single instance only)
    Memory,
    /// Shared Redis
    Redis,
}

/// What to hand back once automatic recognition gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualFallback {
    /// Open a brand-new challenge
    Fresh,
    /// Re-offer the last rejected attempt's captcha
    ReuseSnapshot,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_store")]
    pub store: StoreBackend,

    /// Semester used when a request names none
    #[serde(default = "default_semester")]
    pub default_semester: String,

    #[serde(default)]
    pub portal: PortalConfig,

    #[serde(default)]
    pub captcha: CaptchaConfig,

    #[serde(default)]
    pub login: LoginConfig,

    /// Semester code → first day of week 1
    #[serde(default)]
    pub semesters: HashMap<String, NaiveDate>,
}

/// Remote endpoints and request shaping
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_captcha_url")]
    pub captcha_url: String,
    #[serde(default = "default_app_home_url")]
    pub app_home_url: String,
    #[serde(default = "default_timetable_page_url")]
    pub timetable_page_url: String,
    #[serde(default = "default_timetable_api_url")]
    pub timetable_api_url: String,
    #[serde(default = "default_current_week_url")]
    pub current_week_url: String,
    #[serde(default = "default_grades_url")]
    pub grades_url: String,
    #[serde(default = "default_rank_info_url")]
    pub rank_info_url: String,
    #[serde(default = "default_rank_page_url")]
    pub rank_page_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Semester used to load the page carrying the application identifier
    #[serde(default = "default_semester")]
    pub probe_semester: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            captcha_url: default_captcha_url(),
            app_home_url: default_app_home_url(),
            timetable_page_url: default_timetable_page_url(),
            timetable_api_url: default_timetable_api_url(),
            current_week_url: default_current_week_url(),
            grades_url: default_grades_url(),
            rank_info_url: default_rank_info_url(),
            rank_page_url: default_rank_page_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            probe_semester: default_semester(),
        }
    }
}

/// Captcha recognition settings
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Recognition service; automatic mode is skipped when unset
    #[serde(default)]
    pub solver_url: Option<String>,

    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            solver_url: None,
            challenge_ttl_secs: default_challenge_ttl(),
        }
    }
}

/// Login attempt budget and session lifetime
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_attempt_delay")]
    pub attempt_delay_ms: u64,

    /// Minimum seconds between login requests per subject
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_manual_fallback")]
    pub manual_fallback: ManualFallback,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_delay_ms: default_attempt_delay(),
            cooldown_secs: default_cooldown(),
            session_ttl_secs: default_session_ttl(),
            manual_fallback: default_manual_fallback(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_store() -> StoreBackend { StoreBackend::Memory }
fn default_semester() -> String { DEFAULT_SEMESTER.to_string() }
fn default_login_url() -> String { endpoints::LOGIN_URL.to_string() }
fn default_captcha_url() -> String { endpoints::CAPTCHA_URL.to_string() }
fn default_app_home_url() -> String { endpoints::APP_HOME_URL.to_string() }
fn default_timetable_page_url() -> String { endpoints::TIMETABLE_PAGE_URL.to_string() }
fn default_timetable_api_url() -> String { endpoints::TIMETABLE_API_URL.to_string() }
fn default_current_week_url() -> String { endpoints::CURRENT_WEEK_URL.to_string() }
fn default_grades_url() -> String { endpoints::GRADES_URL.to_string() }
fn default_rank_info_url() -> String { endpoints::RANK_INFO_URL.to_string() }
fn default_rank_page_url() -> String { endpoints::RANK_PAGE_URL.to_string() }
fn default_user_agent() -> String { USER_AGENT.to_string() }
fn default_request_timeout() -> u64 { REQUEST_TIMEOUT_SECS }
fn default_challenge_ttl() -> u64 { CAPTCHA_TTL_SECS } // 5 minutes
fn default_max_attempts() -> u32 { MAX_LOGIN_ATTEMPTS }
fn default_attempt_delay() -> u64 { ATTEMPT_DELAY_MS }
fn default_cooldown() -> u64 { LOGIN_COOLDOWN_SECS }
fn default_session_ttl() -> u64 { SESSION_TTL_SECS } // 7 days
fn default_manual_fallback() -> ManualFallback { ManualFallback::Fresh }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(store) = args.store {
            config.store = store;
        }
        if let Some(ref solver_url) = args.solver_url {
            config.captcha.solver_url = Some(solver_url.clone());
        }

        Ok(config)
    }

    pub fn profile(&self) -> BrowserProfile {
        BrowserProfile {
            user_agent: self.portal.user_agent.clone(),
            referer: self.portal.login_url.clone(),
            timeout: Duration::from_secs(self.portal.request_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.login.max_attempts,
            request_timeout: Duration::from_secs(self.portal.request_timeout_secs),
            attempt_delay: Duration::from_millis(self.login.attempt_delay_ms),
        }
    }

    pub fn calendar(&self) -> SemesterCalendar {
        SemesterCalendar::new(self.semesters.clone())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: default_redis_url(),
            store: default_store(),
            default_semester: default_semester(),
            portal: PortalConfig::default(),
            captcha: CaptchaConfig::default(),
            login: LoginConfig::default(),
            semesters: HashMap::new(),
        }
    }
}
