//! Shared constants for Registrar components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

/// CAPTCHA challenge expiry (5 minutes)
pub const CAPTCHA_TTL_SECS: u64 = 300;

/// Authenticated session validity (7 days)
pub const SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Minimum spacing between login attempts by one subject
pub const LOGIN_COOLDOWN_SECS: u64 = 3;

/// Full handshake attempts in automatic mode before manual fallback
pub const MAX_LOGIN_ATTEMPTS: u32 = 3;

/// Per-call timeout for outbound requests
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Pause between automatic attempts (milliseconds)
pub const ATTEMPT_DELAY_MS: u64 = 500;

/// Maximum redirect hops followed after a successful submission
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Length of the random prefix mixed into the password before encryption
pub const CIPHER_NONCE_LEN: usize = 64;

/// Semester probed when scraping the application identifier
pub const DEFAULT_SEMESTER: &str = "2025-2026-1";

/// Browser identity presented to the portal
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Remote endpoints (identity provider + application portal)
pub mod endpoints {
    pub const LOGIN_URL: &str = "https://auth.hbut.edu.cn/authserver/login";
    pub const CAPTCHA_URL: &str = "https://auth.hbut.edu.cn/authserver/getCaptcha.htl";
    pub const APP_HOME_URL: &str = "https://hbut.jw.chaoxing.com/admin/login";
    pub const TIMETABLE_PAGE_URL: &str = "https://hbut.jw.chaoxing.com/admin/pkgl/xskb/queryKbForXsd";
    pub const TIMETABLE_API_URL: &str = "https://hbut.jw.chaoxing.com/admin/pkgl/xskb/sdpkkbList";
    pub const CURRENT_WEEK_URL: &str = "https://hbut.jw.chaoxing.com/admin/api/getXlzc";
    pub const GRADES_URL: &str = "https://hbut.jw.chaoxing.com/admin/xsd/xsdcjcx/xsdQueryXscjList";
    pub const RANK_INFO_URL: &str = "https://hbut.jw.chaoxing.com/admin/cjgl/xscjbbdy/printdgxscj";
    pub const RANK_PAGE_URL: &str = "https://hbut.jw.chaoxing.com/admin/cjgl/xscjbbdy/getXscjpm";
}

/// Redis key prefixes
pub mod redis_keys {
    /// CAPTCHA challenge: captcha:{token}
    pub const CAPTCHA_PREFIX: &str = "captcha:";

    /// Authenticated session: session:{token}
    pub const SESSION_PREFIX: &str = "session:";

    /// Login cooldown record: ratelimit:{subject_id}
    pub const RATELIMIT_PREFIX: &str = "ratelimit:";
}

/// Course category codes used by the grade list
pub const COURSE_CATEGORIES: &[(&str, &str)] = &[
    ("44", "专业必修"),
    ("11", "通识必修"),
    ("12", "通识选修"),
    ("31", "学科基础"),
    ("40", "专业核心"),
    ("45", "专业选修"),
    ("50", "基础实践"),
    ("51", "专业实践"),
    ("52", "综合实践"),
    ("99", "公共选修"),
    ("98", "重修"),
    ("16", "限选"),
];

/// Label for course category codes missing from the table
pub const OTHER_CATEGORY: &str = "其他";
