//! Core types shared across Registrar components.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{COURSE_CATEGORIES, OTHER_CATEGORY};
use crate::cookies::CookieJar;

/// Anti-forgery fields scraped from the identity provider's login page.
///
/// All three must be echoed verbatim on submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPageFields {
    /// `execution` hidden input
    pub execution: String,
    /// `pwdEncryptSalt` hidden input, used as the cipher key
    pub salt: String,
    /// Legacy `lt` ticket (empty on portals that no longer emit it)
    pub legacy_ticket: String,
}

/// Stored captcha challenge awaiting a caller-supplied code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaChallenge {
    pub token: String,
    /// Cookies the captcha image is bound to
    pub cookies: CookieJar,
    pub fields: LoginPageFields,
    pub created_at: DateTime<Utc>,
}

/// Challenge handed to the caller for manual entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    pub token: String,
    /// `data:` URI of the captcha image
    pub image: String,
    pub expires_at: DateTime<Utc>,
}

/// Authenticated portal session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub token: String,
    /// Student number used to log in
    pub subject_id: String,
    /// Cookies for every domain the handshake touched
    pub cookies: CookieJar,
    /// Portal student identifier, required by timetable calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthenticatedSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Non-timetable calls still work on a degraded session
    pub fn is_degraded(&self) -> bool {
        self.application_id.as_deref().is_none_or(str::is_empty)
    }
}

/// Last login attempt by a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub subject_id: String,
    pub last_attempt: DateTime<Utc>,
}

/// Semester weeks on which a meeting recurs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPattern {
    /// Ascending, deduplicated week numbers
    pub weeks: Vec<u32>,
    /// Remote display string, e.g. "1-8,10-16周"
    pub raw: String,
}

/// One contiguous-period occurrence from the remote timetable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleMeeting {
    /// Day of week (1 = Monday)
    pub day: u8,
    /// First period
    pub start: u32,
    /// Number of periods, at least 1
    pub span: u32,
    pub course: String,
    pub teacher: String,
    pub room: String,
    pub weeks: WeekPattern,
    /// Remote row identifier
    #[serde(default)]
    pub meeting_id: String,
}

/// Merged display block: a maximal run of adjacent identical meetings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub day: u8,
    pub start: u32,
    pub span: u32,
    pub course: String,
    pub teacher: String,
    pub room: String,
    pub weeks: WeekPattern,
    #[serde(default)]
    pub meeting_id: String,
}

impl ScheduleBlock {
    /// First period after the block; `None` when it would not fit in a `u32`
    pub fn end_exclusive(&self) -> Option<u32> {
        self.start.checked_add(self.span)
    }
}

impl From<ScheduleMeeting> for ScheduleBlock {
    fn from(m: ScheduleMeeting) -> Self {
        Self {
            day: m.day,
            start: m.start,
            span: m.span,
            course: m.course,
            teacher: m.teacher,
            room: m.room,
            weeks: m.weeks,
            meeting_id: m.meeting_id,
        }
    }
}

/// Timetable for one semester, merged for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimetableView {
    pub semester: String,
    pub current_week: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    pub blocks: Vec<ScheduleBlock>,
}

/// One row of the grade list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub semester: String,
    pub course_name: String,
    pub credit: String,
    pub score: String,
    /// Course category label
    pub category: String,
    pub is_retake: bool,
}

/// Map a remote course category code to its label
pub fn course_category(code: &str) -> &'static str {
    COURSE_CATEGORIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
        .unwrap_or(OTHER_CATEGORY)
}

/// GPA and rank summary from the rank report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major_rank: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_rank: Option<String>,
    pub fail_count: u32,
}
