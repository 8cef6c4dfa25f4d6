use serde_json::Value;

use registrar_common::{GradeRecord, course_category};

use super::value_str;

/// Grid query for the whole grade history, newest semester first
pub(super) fn query_form() -> Vec<(String, String)> {
    [
        ("fxbz", "0"),
        ("gridtype", "jqgrid"),
        ("page.pn", "1"),
        ("page.size", "500"),
        ("sort", "xnxq"),
        ("order", "desc"),
        ("queryFields", "id,xnxq,kcmc,xf,kcxz,cjfxms,zhcj,xdxz"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub(super) fn decode(body: &Value) -> Vec<GradeRecord> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(decode_row).collect())
        .unwrap_or_default()
}

fn decode_row(row: &Value) -> GradeRecord {
    GradeRecord {
        semester: value_str(row, "xnxq"),
        course_name: value_str(row, "kcmc"),
        credit: value_str(row, "xf"),
        score: value_str(row, "zhcj"),
        category: course_category(&value_str(row, "kcxz")).to_string(),
        // Study type 2 is a retake
        is_retake: value_str(row, "xdxz") == "2",
    }
}
