//! Scheduling engine over the unified calendar.
//!
//! Pure functions: conflict detection between events, free-slot search
//! inside a working-hours window, and ranking of those slots as meeting
//! suggestions. All interval math happens in UTC; slots are reported in
//! the caller's time zone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::services::calendar_store::{CalendarEvent, EventStatus};

/// Score at or above which a slot is described as well spaced.
const WELL_SPACED_SCORE: f64 = 0.75;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("unknown time zone: {0}")]
    UnknownTimezone(String),

    #[error("invalid time of day (expected HH:MM): {0}")]
    InvalidTime(String),

    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("{time} does not exist on {date} in {timezone}")]
    NonexistentLocalTime {
        date: NaiveDate,
        time: NaiveTime,
        timezone: String,
    },
}

// ============================================================================
// Parsing helpers
// ============================================================================

pub fn parse_timezone(name: &str) -> Result<Tz, SchedulingError> {
    name.parse::<Tz>()
        .map_err(|_| SchedulingError::UnknownTimezone(name.to_string()))
}

/// Parse `HH:MM` (24h).
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, SchedulingError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| SchedulingError::InvalidTime(value.to_string()))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, SchedulingError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| SchedulingError::InvalidDate(value.to_string()))
}

/// Parse an ISO 8601 timestamp. One without an offset is taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, SchedulingError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| chrono::NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| SchedulingError::InvalidTimestamp(value.to_string()))
}

// ============================================================================
// Intervals
// ============================================================================

/// Half-open UTC time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The event's span in UTC, widened by `buffer` on both sides.
    pub fn of_event(event: &CalendarEvent, buffer: Duration) -> Self {
        Self {
            start: event.start.with_timezone(&Utc) - buffer,
            end: event.end.with_timezone(&Utc) + buffer,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Sort and coalesce intervals. Touching intervals are merged.
pub fn merge_intervals(intervals: impl IntoIterator<Item = Interval>) -> Vec<Interval> {
    let mut ordered: Vec<Interval> = intervals.into_iter().collect();
    ordered.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(ordered.len());
    for current in ordered {
        match merged.last_mut() {
            Some(last) if current.start <= last.end => {
                last.end = last.end.max(current.end);
            }
            _ => merged.push(current),
        }
    }
    merged
}

// ============================================================================
// Conflicts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both events are confirmed
    Hard,
    /// At least one event is tentative
    Soft,
}

impl ConflictKind {
    fn title(self) -> &'static str {
        match self {
            ConflictKind::Hard => "Hard",
            ConflictKind::Soft => "Soft",
        }
    }
}

/// Overlap between two events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub event_ids: Vec<String>,
    pub provider_labels: Vec<String>,
    /// Start of the overlap, UTC
    #[schema(value_type = String, format = DateTime)]
    pub start: DateTime<FixedOffset>,
    /// End of the overlap, UTC
    #[schema(value_type = String, format = DateTime)]
    pub end: DateTime<FixedOffset>,
    pub explanation: String,
}

/// Every pair of events whose time ranges overlap, ordered by the earlier
/// event's start. Events that merely touch do not conflict.
pub fn detect_conflicts(events: &[CalendarEvent]) -> Vec<Conflict> {
    let mut ordered: Vec<&CalendarEvent> = events.iter().collect();
    ordered.sort_by_key(|event| (event.start, event.end));

    let mut conflicts = Vec::new();
    for (i, left) in ordered.iter().enumerate() {
        for right in &ordered[i + 1..] {
            if right.start >= left.end {
                break;
            }
            let overlap_start = left.start.max(right.start);
            let overlap_end = left.end.min(right.end);
            if overlap_start >= overlap_end {
                continue;
            }

            let kind = if left.status == EventStatus::Confirmed
                && right.status == EventStatus::Confirmed
            {
                ConflictKind::Hard
            } else {
                ConflictKind::Soft
            };
            conflicts.push(Conflict {
                kind,
                event_ids: vec![left.id.clone(), right.id.clone()],
                provider_labels: vec![left.provider.to_string(), right.provider.to_string()],
                start: overlap_start.with_timezone(&Utc).fixed_offset(),
                end: overlap_end.with_timezone(&Utc).fixed_offset(),
                explanation: format!(
                    "{} conflict between '{}' ({}) and '{}' ({})",
                    kind.title(),
                    left.title,
                    left.provider,
                    right.title,
                    right.provider
                ),
            });
        }
    }
    conflicts
}

// ============================================================================
// Availability
// ============================================================================

/// Parameters of a free-slot search.
#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub timezone: Tz,
    pub duration: Duration,
    /// Padding kept free around every event
    pub buffer: Duration,
    pub working_start: NaiveTime,
    /// An end at or before the start means the window runs past midnight
    pub working_end: NaiveTime,
}

/// A candidate meeting slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeSlot {
    #[schema(value_type = String, format = DateTime)]
    pub start: DateTime<FixedOffset>,
    #[schema(value_type = String, format = DateTime)]
    pub end: DateTime<FixedOffset>,
    /// How roomy the surrounding free gap is, in `[0, 1]`
    pub score: f64,
    pub reason: String,
}

fn local_instant(
    tz: Tz,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<Utc>, SchedulingError> {
    // Ambiguous times (DST fall-back) resolve to the first occurrence
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SchedulingError::NonexistentLocalTime {
            date,
            time,
            timezone: tz.name().to_string(),
        })
}

/// Working-hours window of `query.date` in UTC.
pub fn working_window(query: &SlotQuery) -> Result<Interval, SchedulingError> {
    let start = local_instant(query.timezone, query.date, query.working_start)?;
    let mut end = local_instant(query.timezone, query.date, query.working_end)?;
    if end <= start {
        let next_day = query.date.succ_opt().unwrap_or(query.date);
        end = local_instant(query.timezone, next_day, query.working_end)?;
    }
    Ok(Interval::new(start, end))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// One slot per free gap of the working window that can hold the
/// requested duration, placed at the start of the gap.
///
/// The score grows with the gap length and saturates at three times the
/// duration.
pub fn available_slots(
    events: &[CalendarEvent],
    query: &SlotQuery,
) -> Result<Vec<TimeSlot>, SchedulingError> {
    let window = working_window(query)?;

    let busy = events.iter().filter_map(|event| {
        let interval = Interval::of_event(event, query.buffer);
        let start = interval.start.max(window.start);
        let end = interval.end.min(window.end);
        (start < end).then(|| Interval::new(start, end))
    });

    let mut free = Vec::new();
    let mut cursor = window.start;
    for interval in merge_intervals(busy) {
        if cursor < interval.start {
            free.push(Interval::new(cursor, interval.start));
        }
        cursor = cursor.max(interval.end);
    }
    if cursor < window.end {
        free.push(Interval::new(cursor, window.end));
    }

    let duration_minutes = query.duration.num_minutes();
    let saturation = (duration_minutes * 3).max(1) as f64;

    let slots = free
        .into_iter()
        .filter(|gap| gap.duration() >= query.duration)
        .map(|gap| {
            let gap_minutes = gap.duration().num_seconds() as f64 / 60.0;
            let score = round3((gap_minutes / saturation).min(1.0));
            let reason = if score >= WELL_SPACED_SCORE {
                "Well-spaced slot"
            } else {
                "Available slot"
            };
            TimeSlot {
                start: gap.start.with_timezone(&query.timezone).fixed_offset(),
                end: (gap.start + query.duration)
                    .with_timezone(&query.timezone)
                    .fixed_offset(),
                score,
                reason: reason.to_string(),
            }
        })
        .collect();
    Ok(slots)
}

/// Order slots for suggestion and keep at most `limit`.
///
/// Slots starting (local wall clock, inclusive) inside `preferred` come
/// first, then higher scores, then later starts.
pub fn rank_suggestions(
    slots: Vec<TimeSlot>,
    limit: usize,
    preferred: Option<(NaiveTime, NaiveTime)>,
) -> Vec<TimeSlot> {
    let in_preferred = |slot: &TimeSlot| match preferred {
        None => true,
        Some((from, to)) => {
            let local = slot.start.time();
            let minute = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(local);
            from <= minute && minute <= to
        }
    };

    let mut ranked: Vec<(bool, TimeSlot)> = slots
        .into_iter()
        .map(|slot| (in_preferred(&slot), slot))
        .collect();
    ranked.sort_by(|(a_pref, a), (b_pref, b)| {
        b_pref
            .cmp(a_pref)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| b.start.cmp(&a.start))
    });
    ranked.into_iter().take(limit).map(|(_, slot)| slot).collect()
}
