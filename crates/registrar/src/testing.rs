//! Scripted stand-ins for the remote portal and the captcha solver.
//!
//! `FakePortal` plays both hosts: `idp.test` (login form, captcha, ticket
//! redirect) and `jw.test` (application pages and JSON endpoints). It checks
//! what a real identity provider checks: the captcha must have been served
//! to the submitting session, and the password must decrypt with the
//! session's salt.

use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use registrar_common::constants::CIPHER_NONCE_LEN;
use registrar_common::{AuthenticatedSession, CookieJar, RegistrarError};

use crate::config::AppConfig;
use crate::net::{BrowserProfile, Method, PortalRequest, PortalResponse, PortalTransport, TransportError};
use crate::sso::CaptchaSolver;

pub const GOOD_PASSWORD: &str = "correct-horse";
pub const PORTAL_CAPTCHA: &str = "k7Xq";
pub const APPLICATION_ID: &str = "XH-2023001";

const SALT: &str = "rjBFAaHsNkKAhpoi";
const APP_SESSION: &str = "app-session";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    let portal = &mut config.portal;
    portal.login_url = "https://idp.test/authserver/login".to_string();
    portal.captcha_url = "https://idp.test/authserver/getCaptcha.htl".to_string();
    portal.app_home_url = "https://jw.test/admin/login".to_string();
    portal.timetable_page_url = "https://jw.test/admin/pkgl/xskb/queryKbForXsd".to_string();
    portal.timetable_api_url = "https://jw.test/admin/pkgl/xskb/sdpkkbList".to_string();
    portal.current_week_url = "https://jw.test/admin/api/getXlzc".to_string();
    portal.grades_url = "https://jw.test/admin/xsd/xsdcjcx/xsdQueryXscjList".to_string();
    portal.rank_info_url = "https://jw.test/admin/cjgl/xscjbbdy/printdgxscj".to_string();
    portal.rank_page_url = "https://jw.test/admin/cjgl/xscjbbdy/getXscjpm".to_string();
    config.login.attempt_delay_ms = 0;
    config
}

pub fn test_profile() -> BrowserProfile {
    BrowserProfile {
        user_agent: "registrar-test".to_string(),
        referer: "https://idp.test/authserver/login".to_string(),
        timeout: Duration::from_secs(2),
    }
}

/// Session as left behind by a successful handshake against `FakePortal`
pub fn logged_in_session() -> AuthenticatedSession {
    let mut cookies = CookieJar::new();
    cookies.insert("idp.test", "CASTGC", "TGT-1");
    cookies.insert("jw.test", "JSESSIONID", APP_SESSION);
    let now = Utc::now();
    AuthenticatedSession {
        token: "test-session-token".to_string(),
        subject_id: "2023001".to_string(),
        cookies,
        application_id: Some(APPLICATION_ID.to_string()),
        created_at: now,
        expires_at: now + TimeDelta::days(7),
    }
}

#[derive(Default)]
struct FakeState {
    requests: usize,
    hits: HashMap<String, usize>,
    login_page_loads: usize,
    submissions: usize,
    /// idp session id → execution value it was issued
    forms: HashMap<String, String>,
    /// idp sessions that have been shown a captcha
    captcha_served: HashSet<String>,
    offline: bool,
    drop_salt: bool,
    hide_application_id: bool,
    sessions_revoked: bool,
    remote_week: Option<u32>,
}

pub struct FakePortal {
    state: Mutex<FakeState>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                remote_week: Some(7),
                ..Default::default()
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_offline(&self, offline: bool) {
        self.with_state(|s| s.offline = offline);
    }

    pub fn set_drop_salt(&self, drop: bool) {
        self.with_state(|s| s.drop_salt = drop);
    }

    pub fn set_hide_application_id(&self, hide: bool) {
        self.with_state(|s| s.hide_application_id = hide);
    }

    pub fn set_sessions_revoked(&self, revoked: bool) {
        self.with_state(|s| s.sessions_revoked = revoked);
    }

    pub fn set_remote_week(&self, week: Option<u32>) {
        self.with_state(|s| s.remote_week = week);
    }

    /// Every request received, failed ones included
    pub fn requests(&self) -> usize {
        self.with_state(|s| s.requests)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.with_state(|s| s.hits.get(path).copied().unwrap_or(0))
    }

    pub fn login_page_loads(&self) -> usize {
        self.with_state(|s| s.login_page_loads)
    }

    pub fn submissions(&self) -> usize {
        self.with_state(|s| s.submissions)
    }

    fn route(&self, state: &mut FakeState, request: &PortalRequest) -> PortalResponse {
        let host = request.url.host_str().unwrap_or_default();
        let path = request.url.path();
        let cookies = request_cookies(request);

        match (host, request.method, path) {
            ("idp.test", Method::Get, "/authserver/login") => login_page(state),
            ("idp.test", Method::Get, "/authserver/getCaptcha.htl") => {
                match cookies.get("JSESSIONID") {
                    Some(sid) if state.forms.contains_key(sid) => {
                        state.captcha_served.insert(sid.clone());
                        let mut body = PNG_MAGIC.to_vec();
                        body.extend_from_slice(b"captcha-pixels");
                        respond(200, "image/png", body)
                    }
                    _ => respond(403, "text/plain", b"no session".to_vec()),
                }
            }
            ("idp.test", Method::Post, "/authserver/login") => submit(state, request, &cookies),
            ("jw.test", Method::Get, "/admin/sso") => redirect("/admin/index")
                .with_cookie(&format!("JSESSIONID={}; Path=/admin; HttpOnly", APP_SESSION)),
            ("jw.test", Method::Get, "/loop") => redirect("/loop"),
            ("jw.test", _, _) if !app_session_valid(state, &cookies) => html(200, LOGIN_REDIRECT_PAGE),
            ("jw.test", Method::Get, "/admin/index" | "/admin/login") => html(200, "<html>首页</html>"),
            ("jw.test", Method::Get, "/admin/pkgl/xskb/queryKbForXsd") => {
                if state.hide_application_id {
                    html(200, "<html><body>课表</body></html>")
                } else {
                    html(
                        200,
                        &format!(r#"<input type="hidden" id="xhid" value="{}">"#, APPLICATION_ID),
                    )
                }
            }
            ("jw.test", Method::Get, "/admin/api/getXlzc") => match state.remote_week {
                Some(week) => json_response(json!({"ret": 0, "data": {"xlzc": week.to_string()}})),
                None => json_response(json!({"ret": -1, "msg": "不在教学周内"})),
            },
            ("jw.test", Method::Get, "/admin/pkgl/xskb/sdpkkbList") => {
                let xhid = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "xhid")
                    .map(|(_, v)| v.into_owned());
                if xhid.as_deref() == Some(APPLICATION_ID) {
                    json_response(timetable_rows())
                } else {
                    json_response(json!({"ret": 1, "msg": "缺少学号"}))
                }
            }
            ("jw.test", Method::Post, "/admin/xsd/xsdcjcx/xsdQueryXscjList") => json_response(json!({
                "results": [
                    {"xnxq": "2025-2026-1", "kcmc": "高等数学A", "xf": "5", "zhcj": "92", "kcxz": "11", "xdxz": "1"},
                    {"xnxq": "2024-2025-2", "kcmc": "大学英语", "xf": 2, "zhcj": "61", "kcxz": "77", "xdxz": "2"}
                ]
            })),
            ("jw.test", Method::Post, "/admin/cjgl/xscjbbdy/printdgxscj") => {
                let student = form_value(request, "xsxh").unwrap_or_default();
                let records = if student == "2023001" {
                    json!([{"sznj": "2023", "xm": "测试"}])
                } else {
                    json!([])
                };
                json_response(json!({"ret": 0, "data": {"records": records}}))
            }
            ("jw.test", Method::Get, "/admin/cjgl/xscjbbdy/getXscjpm") => html(200, RANK_PAGE),
            _ => respond(404, "text/plain", b"not found".to_vec()),
        }
    }
}

#[async_trait]
impl PortalTransport for FakePortal {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        *state.hits.entry(request.url.path().to_string()).or_default() += 1;
        if state.offline {
            return Err(TransportError::Connect("fake portal offline".to_string()));
        }
        Ok(self.route(&mut state, &request))
    }
}

fn login_page(state: &mut FakeState) -> PortalResponse {
    state.login_page_loads += 1;
    let n = state.login_page_loads;
    let sid = format!("idp-{}", n);
    let execution = format!("e{}s1", n);
    state.forms.insert(sid.clone(), execution.clone());

    let salt_input = if state.drop_salt {
        String::new()
    } else {
        format!(r#"<input type="hidden" id="pwdEncryptSalt" value="{}" />"#, SALT)
    };
    let body = format!(
        r#"<html><form id="pwdFromId">
             <input type="hidden" name="lt" value="">
             <input type="hidden" id="execution" name="execution" value="{}"/>
             {}
           </form></html>"#,
        execution, salt_input
    );
    html(200, &body).with_cookie(&format!("JSESSIONID={}; Path=/authserver; HttpOnly", sid))
}

fn submit(state: &mut FakeState, request: &PortalRequest, cookies: &HashMap<String, String>) -> PortalResponse {
    state.submissions += 1;

    let Some(sid) = cookies.get("JSESSIONID") else {
        return html(200, &rejection("会话已失效"));
    };
    let execution_ok = state.forms.get(sid).map(String::as_str) == form_value(request, "execution").as_deref();
    let captcha_ok = state.captcha_served.remove(sid)
        && form_value(request, "captcha").is_some_and(|c| c.eq_ignore_ascii_case(PORTAL_CAPTCHA));
    if !execution_ok || !captcha_ok {
        return html(200, &rejection("验证码错误"));
    }

    let password_ok = form_value(request, "password")
        .and_then(|ct| decrypt_tail(&ct))
        .is_some_and(|plain| plain == GOOD_PASSWORD);
    if !password_ok {
        return html(200, r#"<p id="errorMsg">您提供的用户名或者密码有误</p>"#);
    }

    state.forms.remove(sid);
    redirect(&format!("https://jw.test/admin/sso?ticket=ST-{}", state.submissions))
        .with_cookie("CASTGC=TGT-1; Path=/authserver; HttpOnly")
}

/// Password part of the ciphertext; the unknown IV only garbles the nonce
fn decrypt_tail(ciphertext: &str) -> Option<String> {
    let raw = STANDARD.decode(ciphertext).ok()?;
    let plain = cbc::Decryptor::<aes::Aes128>::new_from_slices(SALT.as_bytes(), &[0u8; 16])
        .ok()?
        .decrypt_padded_vec_mut::<Pkcs7>(&raw)
        .ok()?;
    String::from_utf8(plain.get(CIPHER_NONCE_LEN..)?.to_vec()).ok()
}

fn app_session_valid(state: &FakeState, cookies: &HashMap<String, String>) -> bool {
    !state.sessions_revoked && cookies.get("JSESSIONID").map(String::as_str) == Some(APP_SESSION)
}

fn request_cookies(request: &PortalRequest) -> HashMap<String, String> {
    request
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
        .flat_map(|(_, value)| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn form_value(request: &PortalRequest, key: &str) -> Option<String> {
    request
        .form
        .as_ref()?
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

fn timetable_rows() -> Value {
    json!({
        "ret": 0,
        "data": [
            {"kcmc": "高等数学A", "tmc": "李老师", "croommc": "6-101", "zc": "1-4周", "zcstr": "1,2,3,4", "xingqi": 1, "djc": 2, "djs": 2, "pkid": "P2"},
            {"kcmc": "高等数学A", "tmc": "李老师", "croommc": "6-101", "zc": "1-4周", "zcstr": "1,2,3,4", "xingqi": 1, "djc": 1, "djs": 1, "pkid": "P1"},
            {"kcmc": "<span>物理实验</span>", "tmc": "张老师", "croommc": "实验楼", "zc": "2-8双", "zcstr": "", "xingqi": "3", "djc": "5", "djs": "6", "pkid": "P3"}
        ]
    })
}

fn rejection(message: &str) -> String {
    format!(r#"<div><span id="showErrorTip"><span>{}</span></span></div>"#, message)
}

const LOGIN_REDIRECT_PAGE: &str = "<html><head><title>统一身份认证</title></head></html>";

const RANK_PAGE: &str = r#"<html><body>
  <div>平均学分绩点：3.62 算术平均分：86.4</div>
  <table>
    <tr><th>项目</th><th>值</th><th>专业排名</th><th>班级排名</th></tr>
    <tr><td>平均学分绩点</td><td>3.62</td><td>12/240</td><td>3/30</td></tr>
  </table>
</body></html>"#;

trait WithCookie {
    fn with_cookie(self, set_cookie: &str) -> Self;
}

impl WithCookie for PortalResponse {
    fn with_cookie(mut self, set_cookie: &str) -> Self {
        self.headers.push(("set-cookie".to_string(), set_cookie.to_string()));
        self
    }
}

fn respond(status: u16, content_type: &str, body: Vec<u8>) -> PortalResponse {
    PortalResponse {
        status,
        headers: vec![("content-type".to_string(), content_type.to_string())],
        body,
    }
}

fn html(status: u16, body: &str) -> PortalResponse {
    respond(status, "text/html;charset=UTF-8", body.as_bytes().to_vec())
}

fn json_response(value: Value) -> PortalResponse {
    respond(200, "application/json;charset=UTF-8", value.to_string().into_bytes())
}

fn redirect(location: &str) -> PortalResponse {
    PortalResponse {
        status: 302,
        headers: vec![("location".to_string(), location.to_string())],
        body: Vec::new(),
    }
}

/// Solver that replays scripted guesses, repeating the last one
pub struct FixedSolver {
    answers: Mutex<VecDeque<String>>,
    last: String,
}

impl FixedSolver {
    pub fn always(answer: &str) -> Self {
        Self::sequence(&[answer])
    }

    pub fn sequence(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            last: answers.last().map(|a| a.to_string()).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl CaptchaSolver for FixedSolver {
    async fn solve(&self, image: &[u8]) -> Result<String, RegistrarError> {
        assert!(image.starts_with(PNG_MAGIC), "solver got a non-captcha body");
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.clone()))
    }
}
