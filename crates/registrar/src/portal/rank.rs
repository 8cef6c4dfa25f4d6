//! Rank report scraping.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use registrar_common::RankSummary;

use super::value_str;
use crate::sso::markup::strip_html;

static GPA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"平均学分绩点\s*[：:]\s*([0-9.]+)").expect("valid GPA regex"));
static AVERAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"算术平均分\s*[：:]\s*([0-9.]+)").expect("valid average regex"));
static FAILS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"不及格门数\s*[：:]\s*([0-9]+)").expect("valid fail count regex"));
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid row regex"));
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid cell regex"));

/// Enrollment year from the student info lookup
pub(super) fn enrollment_year(body: &Value) -> Option<String> {
    if body.get("ret").and_then(Value::as_i64) != Some(0) {
        return None;
    }
    body.pointer("/data/records/0")
        .map(|record| value_str(record, "sznj"))
        .filter(|year| !year.is_empty())
}

/// Summary figures from the report text; the major and class ranks come
/// from the table row headed `平均学分绩点`
pub(super) fn parse_page(html: &str) -> RankSummary {
    let text = strip_html(html);
    let capture = |re: &Regex| {
        re.captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    let mut summary = RankSummary {
        gpa: capture(&*GPA),
        average_score: capture(&*AVERAGE),
        fail_count: capture(&*FAILS).and_then(|n| n.parse().ok()).unwrap_or(0),
        ..Default::default()
    };

    let rank_row = ROW.captures_iter(html).find_map(|row| {
        let cells: Vec<String> = CELL
            .captures_iter(row.get(1)?.as_str())
            .filter_map(|cell| cell.get(1).map(|m| strip_html(m.as_str())))
            .collect();
        (cells.len() >= 4 && cells[0] == "平均学分绩点").then_some(cells)
    });
    if let Some(cells) = rank_row {
        summary.major_rank = non_empty(&cells[2]);
        summary.class_rank = non_empty(&cells[3]);
    }

    summary
}

fn non_empty(cell: &str) -> Option<String> {
    (!cell.is_empty()).then(|| cell.to_string())
}
