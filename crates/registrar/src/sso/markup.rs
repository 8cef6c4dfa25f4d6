//! Scraping helpers for identity-provider and portal pages.
//!
//! The pages are server-rendered forms; only `<input>` attributes and a few
//! message containers are ever read, so a tag-level regex scan is enough.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use registrar_common::LoginPageFields;

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("static regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("static regex")
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

/// Containers the identity provider renders rejection text into
const MESSAGE_IDS: &[&str] = &["errorMsg", "msg", "showErrorTip"];

pub const DEFAULT_REJECTION: &str = "Login failed: wrong username, password, or captcha";

/// Result of scraping the login form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageParse {
    Ok(LoginPageFields),
    /// A required hidden input is gone; names the field
    MissingField(&'static str),
}

pub fn parse_login_page(html: &str) -> PageParse {
    let inputs = input_tags(html);

    let Some(execution) = find_value(&inputs, "name", "execution") else {
        return PageParse::MissingField("execution");
    };
    let Some(salt) = find_value(&inputs, "id", "pwdEncryptSalt") else {
        return PageParse::MissingField("pwdEncryptSalt");
    };
    let legacy_ticket = find_value(&inputs, "name", "lt").unwrap_or_default();

    PageParse::Ok(LoginPageFields {
        execution,
        salt,
        legacy_ticket,
    })
}

/// `value` of the first `<input>` whose `attr` equals `expected`
pub fn input_value(html: &str, attr: &str, expected: &str) -> Option<String> {
    find_value(&input_tags(html), attr, expected)
}

/// Rejection text from a re-rendered login page, or a generic message
pub fn rejection_message(html: &str) -> String {
    MESSAGE_IDS
        .iter()
        .filter_map(|id| element_text(html, id))
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| DEFAULT_REJECTION.to_string())
}

/// Text content of the element with the given `id`, up to its first child
/// closing tag
fn element_text(html: &str, id: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)<[a-z0-9]+\b[^>]*\bid\s*=\s*["']{}["'][^>]*>(.*?)</"#,
        regex::escape(id)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| strip_html(m.as_str()))
}

/// Drop tags, decode the common entities, trim each text run and join them
pub fn strip_html(fragment: &str) -> String {
    ANY_TAG
        .split(fragment)
        .map(|run| decode_entities(run.trim()))
        .filter(|run| !run.is_empty())
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn input_tags(html: &str) -> Vec<HashMap<String, String>> {
    INPUT_TAG
        .find_iter(html)
        .map(|tag| {
            ATTRIBUTE
                .captures_iter(tag.as_str())
                .filter_map(|caps| {
                    let name = caps.get(1)?.as_str().to_ascii_lowercase();
                    let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?.as_str();
                    Some((name, decode_entities(value)))
                })
                .collect()
        })
        .collect()
}

fn find_value(inputs: &[HashMap<String, String>], attr: &str, expected: &str) -> Option<String> {
    let attr = attr.to_ascii_lowercase();
    inputs
        .iter()
        .find(|attrs| attrs.get(&attr).is_some_and(|v| v == expected))
        .map(|attrs| attrs.get("value").cloned().unwrap_or_default())
}
