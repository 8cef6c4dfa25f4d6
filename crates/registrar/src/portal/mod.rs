//! Application-portal queries made on behalf of an authenticated session.
//!
//! Every call replays the session's cookie jar. The portal signals an
//! invalidated session by answering JSON endpoints with its HTML login page,
//! which surfaces as [`RegistrarError::SessionInvalid`].

mod grades;
mod rank;
mod timetable;

use chrono::Local;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use registrar_common::{
    AuthenticatedSession, Clock, GradeRecord, RankSummary, RegistrarError, TimetableView,
};

use crate::config::{AppConfig, PortalConfig};
use crate::net::{Browser, BrowserProfile, PortalResponse, PortalTransport};
use crate::schedule::{SemesterCalendar, merge_adjacent};

pub struct PortalClient {
    transport: Arc<dyn PortalTransport>,
    clock: Arc<dyn Clock>,
    portal: PortalConfig,
    profile: BrowserProfile,
    calendar: SemesterCalendar,
}

impl PortalClient {
    pub fn new(config: &AppConfig, transport: Arc<dyn PortalTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            portal: config.portal.clone(),
            profile: config.profile(),
            calendar: config.calendar(),
        }
    }

    /// Full grade list, newest semester first
    pub async fn grades(&self, session: &AuthenticatedSession) -> Result<Vec<GradeRecord>, RegistrarError> {
        let mut browser = self.browser(session);
        let response = browser
            .post_form(&self.portal.grades_url, grades::query_form())
            .await?;
        let body = json_body(&response)?;

        let records = grades::decode(&body);
        debug!(subject = %session.subject_id, count = records.len(), "Grades fetched");
        Ok(records)
    }

    /// Merged timetable for `semester`
    pub async fn timetable(
        &self,
        session: &AuthenticatedSession,
        semester: &str,
    ) -> Result<TimetableView, RegistrarError> {
        let application_id = session
            .application_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(RegistrarError::ApplicationIdMissing)?;

        let mut browser = self.browser(session);
        let current_week = self.current_week(&mut browser, semester).await;

        let url = format!(
            "{}?xnxq={}&xhid={}&xqdm=1&xskbxslx=0",
            self.portal.timetable_api_url,
            urlencoding::encode(semester),
            urlencoding::encode(application_id)
        );
        let response = browser.get(&url).await?;
        let body = json_body(&response)?;
        check_ret(&body)?;

        let meetings = timetable::decode(&body);
        let raw = meetings.len();
        let blocks = merge_adjacent(meetings);
        debug!(
            subject = %session.subject_id,
            semester = %semester,
            rows = raw,
            blocks = blocks.len(),
            "Timetable fetched"
        );

        Ok(TimetableView {
            semester: semester.to_string(),
            current_week,
            start_date: self.calendar.start_of(semester),
            blocks,
        })
    }

    /// GPA and rank summary; `semester` of `all` (or empty) covers every term
    pub async fn rankings(
        &self,
        session: &AuthenticatedSession,
        semester: &str,
        student_id: Option<&str>,
    ) -> Result<RankSummary, RegistrarError> {
        let student_id = student_id
            .filter(|id| !id.is_empty())
            .unwrap_or(&session.subject_id);
        let mut browser = self.browser(session);

        let info = browser
            .post_form(
                &self.portal.rank_info_url,
                vec![("xsxh".to_string(), student_id.to_string())],
            )
            .await?;
        let info = json_body(&info)?;
        let enrollment_year = rank::enrollment_year(&info)
            .ok_or_else(|| RegistrarError::NotFound(format!("student {}", student_id)))?;

        let semester = if semester == "all" { "" } else { semester };
        let url = format!(
            "{}?xh={}&sznj={}&xnxq={}",
            self.portal.rank_page_url,
            urlencoding::encode(student_id),
            urlencoding::encode(&enrollment_year),
            urlencoding::encode(semester)
        );
        let page = browser.get(&url).await?;
        if !page.is_success() {
            return Err(RegistrarError::UpstreamFormat(format!(
                "rank page returned HTTP {}",
                page.status
            )));
        }

        Ok(rank::parse_page(&page.text()))
    }

    /// Configured calendar first, then the portal's own counter, then week 1
    async fn current_week(&self, browser: &mut Browser<'_>, semester: &str) -> u32 {
        let today = self.clock.now().with_timezone(&Local).date_naive();
        if let Some(week) = self.calendar.current_week(semester, today) {
            return week;
        }

        match self.remote_week(browser).await {
            Ok(Some(week)) => week,
            Ok(None) => 1,
            Err(e) => {
                warn!(error = %e, "Remote week lookup failed, assuming week 1");
                1
            }
        }
    }

    async fn remote_week(&self, browser: &mut Browser<'_>) -> Result<Option<u32>, RegistrarError> {
        let response = browser.get(&self.portal.current_week_url).await?;
        let body = json_body(&response)?;
        if body.get("ret").and_then(Value::as_i64) != Some(0) {
            return Ok(None);
        }
        Ok(body.get("data").and_then(|data| value_u32(data, "xlzc")))
    }

    fn browser(&self, session: &AuthenticatedSession) -> Browser<'_> {
        Browser::new(self.transport.as_ref(), &self.profile, session.cookies.clone())
    }
}

/// Parse a JSON endpoint's body, treating an HTML answer as a lost session
fn json_body(response: &PortalResponse) -> Result<Value, RegistrarError> {
    if response.is_html() {
        return Err(RegistrarError::SessionInvalid);
    }
    if !response.is_success() {
        return Err(RegistrarError::UpstreamFormat(format!(
            "portal returned HTTP {}",
            response.status
        )));
    }
    serde_json::from_slice(&response.body)
        .map_err(|e| RegistrarError::UpstreamFormat(format!("invalid JSON: {}", e)))
}

/// Non-zero `ret` carries the portal's own message
fn check_ret(body: &Value) -> Result<(), RegistrarError> {
    match body.get("ret").and_then(Value::as_i64) {
        None | Some(0) => Ok(()),
        Some(code) => {
            let msg = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            Err(RegistrarError::UpstreamFormat(format!("ret {}: {}", code, msg)))
        }
    }
}

/// Field as text; numbers are rendered, null and missing become empty
fn value_str(row: &Value, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Field as an unsigned integer, whether sent as number or string
fn value_u32(row: &Value, key: &str) -> Option<u32> {
    match row.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
