use serde_json::Value;

use registrar_common::ScheduleMeeting;

use super::{value_str, value_u32};
use crate::schedule::parse_week_pattern;
use crate::sso::markup::strip_html;

pub(super) fn decode(body: &Value) -> Vec<ScheduleMeeting> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(decode_row).collect())
        .unwrap_or_default()
}

/// One timetable row.
///
/// `zcstr` is the explicit week list when present; `zc` is the display
/// string and the fallback source. Periods `djc..=djs` become a span of at
/// least one.
fn decode_row(row: &Value) -> ScheduleMeeting {
    let display = value_str(row, "zc");
    let explicit = value_str(row, "zcstr");
    let mut weeks = parse_week_pattern(if explicit.trim().is_empty() {
        &display
    } else {
        &explicit
    });
    weeks.raw = display;

    let start = value_u32(row, "djc").unwrap_or(1);
    let end = value_u32(row, "djs").unwrap_or(start);
    let span = end.saturating_sub(start).saturating_add(1).max(1);

    ScheduleMeeting {
        day: value_u32(row, "xingqi")
            .and_then(|d| u8::try_from(d).ok())
            .unwrap_or(0),
        start,
        span,
        course: strip_html(&value_str(row, "kcmc")),
        teacher: strip_html(&value_str(row, "tmc")),
        room: strip_html(&value_str(row, "croommc")),
        weeks,
        meeting_id: value_str(row, "pkid"),
    }
}
