use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, EventLike};

use crate::error::{BotError, BotResult};

/// A single calendar event, with its bounds resolved to UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub uid: String,
    pub name: String,
    pub location: Option<String>,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn is_happening_at(&self, at: DateTime<Utc>) -> bool {
        self.begin <= at && at <= self.end
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.begin < end && self.end >= start
    }
}

/// Events of a calendar, ordered by start time
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<CalendarEvent>,
}

impl Timeline {
    pub fn from_events(mut events: Vec<CalendarEvent>) -> Self {
        events.sort_by(|a, b| a.begin.cmp(&b.begin).then_with(|| a.end.cmp(&b.end)));
        Self { events }
    }

    /// Parse ICS text. Floating times and all-day dates are read in `tz`.
    pub fn parse(ics: &str, tz: Tz) -> BotResult<Self> {
        let calendar: Calendar = ics.parse().map_err(BotError::CalendarParse)?;

        let events = calendar
            .components
            .iter()
            .filter_map(|component| match component {
                CalendarComponent::Event(event) => Some(event),
                _ => None,
            })
            .filter_map(|event| {
                let start = event.get_start()?;
                let all_day = matches!(start, DatePerhapsTime::Date(_));
                let begin = resolve(start, tz)?;
                let end = event
                    .get_end()
                    .and_then(|end| resolve(end, tz))
                    .unwrap_or_else(|| {
                        if all_day {
                            begin + Duration::days(1)
                        } else {
                            begin
                        }
                    });

                let name = event
                    .property_value("SUMMARY")
                    .unwrap_or_default()
                    .to_string();
                let uid = event
                    .property_value("UID")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}@{}", name, begin.timestamp()));

                Some(CalendarEvent {
                    uid,
                    name,
                    location: non_empty(event.property_value("LOCATION")),
                    begin,
                    end,
                })
            })
            .collect();

        Ok(Self::from_events(events))
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in progress at `at`, in start order
    pub fn now(&self, at: DateTime<Utc>) -> impl Iterator<Item = &CalendarEvent> {
        self.events.iter().filter(move |e| e.is_happening_at(at))
    }

    /// Events overlapping the local day (in `tz`) containing `at`
    pub fn today(&self, at: DateTime<Utc>, tz: Tz) -> Vec<&CalendarEvent> {
        let date = at.with_timezone(&tz).date_naive();
        let Some(start) = date.and_hms_opt(0, 0, 0).and_then(|d| local_to_utc(d, tz)) else {
            return Vec::new();
        };
        let end = start + Duration::days(1);

        self.events
            .iter()
            .filter(|e| e.overlaps(start, end))
            .collect()
    }

    /// The event to announce at `at`, if any.
    ///
    /// Returns nothing while `last_seen` is still one of the events in
    /// progress, so an event is announced once even when it overlaps others.
    pub fn next_new_event(
        &self,
        last_seen: Option<&str>,
        at: DateTime<Utc>,
    ) -> Option<&CalendarEvent> {
        let current: Vec<&CalendarEvent> = self.now(at).collect();
        let first = current.first()?;

        if let Some(last) = last_seen {
            if current.iter().any(|e| e.uid == last) {
                return None;
            }
        }

        Some(first)
    }
}

fn resolve(value: DatePerhapsTime, tz: Tz) -> Option<DateTime<Utc>> {
    match value {
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => local_to_utc(naive, tz),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let zone = tzid.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!("Unknown TZID '{}', using {}", tzid, tz);
                tz
            });
            local_to_utc(date_time, zone)
        }
        DatePerhapsTime::Date(date) => local_to_utc(date.and_hms_opt(0, 0, 0)?, tz),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Ambiguous times take the earlier instant. Times skipped by a DST
/// transition are moved forward by one hour.
fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    let resolved = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()?;
            tracing::warn!(
                "Local time {} does not exist in {}, using {}",
                naive,
                tz,
                shifted
            );
            shifted
        }
    };
    Some(resolved.with_timezone(&Utc))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
