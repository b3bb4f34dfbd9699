//! Timeframe parsing for `Recall` (§4.2 "Timeframe parsing").
//!
//! Accepts an exact range, a single date (expanded to a full civil day), or
//! one of a fixed set of natural-language phrases. A `:auto` mode scans a
//! free-text query for the first matching phrase, in the fixed order the
//! patterns are tried here (§9 open question: first-match-wins), and returns
//! the query with that phrase removed alongside the parsed range.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc, Weekday};

use crate::config::WeekStart;
use crate::error::{Result, ValidationError};
use crate::types::Timestamp;

/// An inclusive-start, exclusive-end time range, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeframe {
    /// Range start, inclusive.
    pub start: Timestamp,
    /// Range end, exclusive.
    pub end: Timestamp,
}

impl Timeframe {
    /// True if `ts` falls within `[start, end)`.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Builds a timeframe from two timestamps, normalizing order if the
    /// caller supplied an already-exact inverted range.
    pub fn exact(start: Timestamp, end: Timestamp) -> Self {
        if start.as_millis() <= end.as_millis() {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Combines two timeframes via disjunction (the smallest range covering
    /// both), per §4.2 "multiple ranges may be combined via disjunction".
    pub fn union(&self, other: &Timeframe) -> Timeframe {
        Timeframe {
            start: Timestamp::from_millis(self.start.as_millis().min(other.start.as_millis())),
            end: Timestamp::from_millis(self.end.as_millis().max(other.end.as_millis())),
        }
    }
}

fn to_datetime(ts: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.as_millis())
        .single()
        .unwrap_or_else(Utc::now)
}

fn from_date(date: NaiveDate) -> Timestamp {
    let dt = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    Timestamp::from_millis(Utc.from_utc_datetime(&dt).timestamp_millis())
}

fn civil_day(date: NaiveDate) -> Timeframe {
    Timeframe {
        start: from_date(date),
        end: from_date(date + ChronoDuration::days(1)),
    }
}

/// The weekday chrono uses to mark the first day of a configured week.
fn start_weekday(week_start: WeekStart) -> Weekday {
    match week_start {
        WeekStart::Sunday => Weekday::Sun,
        WeekStart::Monday => Weekday::Mon,
    }
}

/// The date of the most recent occurrence of `week_start`'s weekday, on or
/// before `date`.
fn week_start_date(date: NaiveDate, week_start: WeekStart) -> NaiveDate {
    let target = start_weekday(week_start).num_days_from_monday() as i64;
    let current = date.weekday().num_days_from_monday() as i64;
    let back = (current - target).rem_euclid(7);
    date - ChronoDuration::days(back)
}

/// Rolling window of the last `days` days up to `now`, i.e. `[now - days,
/// now)`. Used by "last N days", "recently"/"recent", and the fixed
/// 3-day "a few days ago" family.
fn rolling_days(now: Timestamp, days: i64) -> Timeframe {
    Timeframe {
        start: now.minus(std::time::Duration::from_secs((days.max(0) as u64) * 86_400)),
        end: now,
    }
}

/// The constant window used by "few"/"several"/"a few days ago" (§4.2).
pub const VAGUE_DAYS_AGO: i64 = 3;
/// The constant window used by "recently"/"recent" (§4.2).
pub const RECENT_DAYS: i64 = 3;

/// Parses one of the §4.2 natural-language timeframe phrases (case folded
/// by the caller via `to_lowercase` is not required; matching here is
/// already case-insensitive).
pub fn parse_phrase(phrase: &str, week_start: WeekStart, now: Timestamp) -> Result<Timeframe> {
    let lower = phrase.trim().to_lowercase();
    let today = to_datetime(now).date_naive();

    if lower == "today" {
        return Ok(civil_day(today));
    }
    if lower == "yesterday" {
        return Ok(civil_day(today - ChronoDuration::days(1)));
    }
    if lower == "this morning" {
        let day = civil_day(today);
        return Ok(Timeframe {
            start: day.start,
            end: day.start.plus(std::time::Duration::from_secs(12 * 3600)),
        });
    }
    if lower == "last week" {
        return Ok(rolling_days(now, 7));
    }
    if lower == "this month" {
        let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
            .expect("day 1 is always valid");
        let next_month_start = add_month(month_start);
        return Ok(Timeframe {
            start: from_date(month_start),
            end: from_date(next_month_start),
        });
    }
    if lower == "last month" {
        let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
            .expect("day 1 is always valid");
        let prev_month_start = subtract_month(month_start);
        return Ok(Timeframe {
            start: from_date(prev_month_start),
            end: from_date(month_start),
        });
    }
    if lower == "recently" || lower == "recent" {
        return Ok(rolling_days(now, RECENT_DAYS));
    }
    if lower == "few days ago" || lower == "several days ago" || lower == "a few days ago" {
        return Ok(rolling_days(now, VAGUE_DAYS_AGO));
    }
    if lower == "last weekend" {
        return Ok(weekend_n_ago(today, week_start, 1));
    }
    if let Some(n) = parse_prefix_suffix(&lower, "last ", " days") {
        return Ok(rolling_days(now, n));
    }
    if let Some(n) = parse_suffix(&lower, " weekends ago") {
        return Ok(weekend_n_ago(today, week_start, n));
    }

    Err(ValidationError::UnrecognizedTimeframe(phrase.to_string()).into())
}

/// Saturday 00:00 through Monday 00:00, `n` weekends before the current one
/// (`n = 1` is "last weekend").
fn weekend_n_ago(today: NaiveDate, week_start: WeekStart, n: i64) -> Timeframe {
    let this_week_start = week_start_date(today, week_start);
    // The Saturday that starts the weekend immediately preceding this week.
    let saturday_before_this_week = this_week_start - ChronoDuration::days(2);
    let saturday = saturday_before_this_week - ChronoDuration::days(7 * (n.max(1) - 1));
    Timeframe {
        start: from_date(saturday),
        end: from_date(saturday + ChronoDuration::days(2)),
    }
}

fn add_month(date: NaiveDate) -> NaiveDate {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).expect("valid date")
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1).expect("valid date")
    }
}

fn subtract_month(date: NaiveDate) -> NaiveDate {
    if date.month() == 1 {
        NaiveDate::from_ymd_opt(date.year() - 1, 12, 1).expect("valid date")
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() - 1, 1).expect("valid date")
    }
}

fn parse_prefix_suffix(s: &str, prefix: &str, suffix: &str) -> Option<i64> {
    let middle = s.strip_prefix(prefix)?.strip_suffix(suffix)?;
    middle.trim().parse::<i64>().ok().filter(|n| *n > 0)
}

fn parse_suffix(s: &str, suffix: &str) -> Option<i64> {
    let middle = s.strip_suffix(suffix)?;
    middle.trim().parse::<i64>().ok().filter(|n| *n > 0)
}

/// The fixed, ordered table of phrase patterns tried by [`parse_auto`].
/// Order matters: "this month" must be tried before a hypothetical
/// "month"-only match, and multi-word phrases are tried before their
/// single-word substrings (e.g. "last week" before "last N days").
const AUTO_PHRASES: &[&str] = &[
    "today",
    "yesterday",
    "this morning",
    "last week",
    "this month",
    "last month",
    "last weekend",
    "recently",
    "recent",
    "a few days ago",
    "few days ago",
    "several days ago",
];

/// Scans `query` for the first matching timeframe phrase (in the fixed
/// order of [`AUTO_PHRASES`], then the parametric "last N days" / "N
/// weekends ago" forms), strips it from the query, and returns the cleaned
/// query alongside the parsed range. Returns the query unchanged and `None`
/// if nothing matched.
pub fn parse_auto(query: &str, week_start: WeekStart, now: Timestamp) -> (String, Option<Timeframe>) {
    let lower = query.to_lowercase();

    for phrase in AUTO_PHRASES {
        if let Some(pos) = lower.find(phrase) {
            if let Ok(timeframe) = parse_phrase(phrase, week_start, now) {
                let cleaned = strip_phrase(query, pos, phrase.len());
                return (cleaned, Some(timeframe));
            }
        }
    }

    if let Some((pos, len, n)) = find_parametric(&lower, "last ", " days") {
        if let Ok(timeframe) = parse_phrase(&format!("last {n} days"), week_start, now) {
            return (strip_phrase(query, pos, len), Some(timeframe));
        }
    }
    if let Some((pos, len, n)) = find_parametric_suffix(&lower, " weekends ago") {
        let timeframe = weekend_n_ago(to_datetime(now).date_naive(), week_start, n);
        return (strip_phrase(query, pos, len), Some(timeframe));
    }

    (query.to_string(), None)
}

fn find_parametric(lower: &str, prefix: &str, suffix: &str) -> Option<(usize, usize, i64)> {
    let prefix_pos = lower.find(prefix)?;
    let after_prefix = &lower[prefix_pos + prefix.len()..];
    let suffix_pos = after_prefix.find(suffix)?;
    let number_str = after_prefix[..suffix_pos].trim();
    let n = number_str.parse::<i64>().ok().filter(|n| *n > 0)?;
    let total_len = prefix.len() + suffix_pos + suffix.len();
    Some((prefix_pos, total_len, n))
}

fn find_parametric_suffix(lower: &str, suffix: &str) -> Option<(usize, usize, i64)> {
    let suffix_pos = lower.find(suffix)?;
    let before = &lower[..suffix_pos];
    let word_start = before
        .rfind(|c: char| !c.is_ascii_digit() && !c.is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    let number_str = before[word_start..].trim();
    let n = number_str.parse::<i64>().ok().filter(|n| *n > 0)?;
    let start = word_start;
    let len = suffix_pos + suffix.len() - start;
    Some((start, len, n))
}

fn strip_phrase(query: &str, byte_pos: usize, byte_len: usize) -> String {
    let mut out = String::with_capacity(query.len());
    out.push_str(&query[..byte_pos]);
    out.push_str(&query[byte_pos + byte_len..]);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
