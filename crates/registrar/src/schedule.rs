//! Timetable normalization.
//!
//! The portal returns one row per meeting, often split into single periods.
//! Rows are merged into display blocks, and the academic week is derived
//! from the semester start date rather than the portal's own week counter,
//! which reports week 1 throughout holidays.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use registrar_common::{ScheduleBlock, WeekPattern};

/// Parse a week list such as `"1,2,3"`, `"1-8,10-16周"` or `"1-15单"`.
///
/// Tokens that are not numbers or ranges are skipped. The raw string is kept
/// for display.
pub fn parse_week_pattern(raw: &str) -> WeekPattern {
    let mut weeks = BTreeSet::new();

    for token in raw.split([',', '，', ' ', ';']) {
        let token = token
            .trim()
            .trim_end_matches('周')
            .trim_end_matches([')', '）']);
        if token.is_empty() {
            continue;
        }

        let (token, parity) = if let Some(t) = token.strip_suffix('单') {
            (t, Some(1))
        } else if let Some(t) = token.strip_suffix('双') {
            (t, Some(0))
        } else {
            (token, None)
        };
        let token = token
            .trim_end_matches(['(', '（'])
            .trim()
            .trim_end_matches('周');

        match token.split_once('-') {
            Some((from, to)) => {
                let (Ok(from), Ok(to)) = (from.trim().parse::<u32>(), to.trim().parse::<u32>())
                else {
                    continue;
                };
                weeks.extend(
                    (from..=to).filter(|w| parity.is_none_or(|p| w % 2 == p)),
                );
            }
            None => {
                if let Ok(week) = token.parse::<u32>() {
                    weeks.insert(week);
                }
            }
        }
    }

    WeekPattern {
        weeks: weeks.into_iter().collect(),
        raw: raw.to_string(),
    }
}

/// Merge exactly adjacent meetings into blocks.
///
/// Input is stably sorted by (day, start). A meeting joins the running block
/// when day, course, teacher, room and raw week string all match and it
/// starts on the period right after the block. Applying this to its own
/// output changes nothing.
pub fn merge_adjacent<I, M>(meetings: I) -> Vec<ScheduleBlock>
where
    I: IntoIterator<Item = M>,
    M: Into<ScheduleBlock>,
{
    let mut sorted: Vec<ScheduleBlock> = meetings.into_iter().map(Into::into).collect();
    sorted.sort_by_key(|b| (b.day, b.start));

    let mut merged = Vec::with_capacity(sorted.len());
    let mut iter = sorted.into_iter();
    let Some(mut current) = iter.next() else {
        return merged;
    };

    for next in iter {
        if same_identity(&current, &next) && current.end_exclusive() == Some(next.start) {
            current.span = current.span.saturating_add(next.span);
        } else {
            merged.push(std::mem::replace(&mut current, next));
        }
    }
    merged.push(current);

    merged
}

fn same_identity(a: &ScheduleBlock, b: &ScheduleBlock) -> bool {
    a.day == b.day
        && a.course == b.course
        && a.teacher == b.teacher
        && a.room == b.room
        && a.weeks.raw == b.weeks.raw
}

/// Academic week for `today`, 1-based; days before the start count as week 1
pub fn compute_current_week(semester_start: NaiveDate, today: NaiveDate) -> u32 {
    if today < semester_start {
        return 1;
    }
    let days = (today - semester_start).num_days();
    u32::try_from(days / 7).unwrap_or(u32::MAX - 1) + 1
}

/// Known semester start dates, keyed by semester code (e.g. `2025-2026-1`)
#[derive(Debug, Clone, Default)]
pub struct SemesterCalendar {
    starts: HashMap<String, NaiveDate>,
}

impl SemesterCalendar {
    pub fn new(starts: HashMap<String, NaiveDate>) -> Self {
        Self { starts }
    }

    pub fn start_of(&self, semester: &str) -> Option<NaiveDate> {
        self.starts.get(semester).copied()
    }

    /// Week derived from the configured start date, if the semester is known
    pub fn current_week(&self, semester: &str, today: NaiveDate) -> Option<u32> {
        self.start_of(semester)
            .map(|start| compute_current_week(start, today))
    }
}
