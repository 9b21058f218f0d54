use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, Context as SerenityContext};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::announcer;
use crate::app::App;
use crate::calendar::{CalendarEvent, CalendarSource};
use crate::state::StateStore;

/// Runs the refresh and event-check loops of every calendar
pub struct PollingScheduler {
    ctx: SerenityContext,
    app: Arc<App>,
}

impl PollingScheduler {
    pub fn new(ctx: SerenityContext, app: Arc<App>) -> Self {
        Self { ctx, app }
    }

    pub fn start(self) -> Vec<JoinHandle<()>> {
        tracing::info!(
            "Starting polling scheduler for {} calendar(s)",
            self.app.calendars.len()
        );

        let mut handles = Vec::with_capacity(self.app.calendars.len() * 2);
        for calendar in &self.app.calendars {
            let update_app = self.app.clone();
            let update_calendar = calendar.clone();
            handles.push(tokio::spawn(async move {
                Self::run_update_loop(update_app, update_calendar).await
            }));

            let check_ctx = self.ctx.clone();
            let check_app = self.app.clone();
            let check_calendar = calendar.clone();
            handles.push(tokio::spawn(async move {
                Self::run_check_loop(check_ctx, check_app, check_calendar).await
            }));
        }

        handles
    }

    async fn run_update_loop(app: Arc<App>, calendar: Arc<CalendarSource>) {
        let interval = app.config.calendar_update_interval();
        let mut ticker = time::interval(interval);

        tracing::info!(
            "Calendar '{}' update loop started (interval: {:?})",
            calendar.name(),
            interval
        );

        loop {
            ticker.tick().await;
            tracing::debug!("Updating calendar '{}'", calendar.name());

            // Errors are logged by refresh; keep polling.
            let _ = calendar.refresh().await;
        }
    }

    async fn run_check_loop(ctx: SerenityContext, app: Arc<App>, calendar: Arc<CalendarSource>) {
        let interval = app.config.event_check_interval();
        let mut ticker = time::interval(interval);

        tracing::info!(
            "Calendar '{}' event check loop started (interval: {:?})",
            calendar.name(),
            interval
        );

        loop {
            ticker.tick().await;
            tracing::debug!("Checking calendar '{}' for a new event", calendar.name());

            Self::check_event(&ctx, &app, &calendar).await;
        }
    }

    async fn check_event(ctx: &SerenityContext, app: &Arc<App>, calendar: &Arc<CalendarSource>) {
        let Some(event) = claim_new_event(&app.state, calendar, Utc::now()).await else {
            return;
        };

        let channel = ChannelId::new(calendar.config().channel_id);
        let task_ctx = ctx.clone();
        let task_app = app.clone();
        let task_calendar = calendar.clone();
        tokio::spawn(async move {
            let name = event.name.clone();
            if let Err(e) =
                announcer::announce(&task_ctx, task_app, task_calendar, channel, event).await
            {
                tracing::error!("Failed to announce '{}': {}", name, e);
            }
        });
    }
}

/// The event of `calendar` to announce at `at`, recorded as announced.
///
/// The announcement runs for the whole reaction window, so the uid is
/// recorded before it is posted. A failed write is logged and the event is
/// still returned; the in-memory state already holds the uid.
pub async fn claim_new_event(
    state: &StateStore,
    calendar: &CalendarSource,
    at: DateTime<Utc>,
) -> Option<CalendarEvent> {
    let last_event = state.last_event(calendar.name()).await;
    let event = calendar
        .current_new_event(last_event.as_deref(), at)
        .await?;

    tracing::info!("New event found on '{}': {}", calendar.name(), event.name);

    if let Err(e) = state.set_last_event(calendar.name(), &event.uid).await {
        tracing::error!(
            "Could not save last event of '{}': {:?}",
            calendar.name(),
            e
        );
    }

    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalendarConfig;
    use std::collections::BTreeMap;
    use std::path::Path;

    const ICS: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//test//EN\r\n\
BEGIN:VEVENT\r\n\
UID:algo-1\r\n\
DTSTAMP:20240101T000000Z\r\n\
DTSTART:20240115T080000Z\r\n\
DTEND:20240115T100000Z\r\n\
SUMMARY:Algorithms\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:net-1\r\n\
DTSTAMP:20240101T000000Z\r\n\
DTSTART:20240115T090000Z\r\n\
DTEND:20240115T110000Z\r\n\
SUMMARY:Networks\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    async fn cached_source(dir: &Path) -> CalendarSource {
        let config = CalendarConfig {
            name: "main".to_string(),
            url: "http://127.0.0.1:9/calendar.ics".to_string(),
            channel_id: 1,
            headers: BTreeMap::new(),
            role_mention: None,
            check_in: true,
        };
        let source =
            CalendarSource::new(config, dir, chrono_tz::Europe::Paris, reqwest::Client::new());
        std::fs::write(source.cache_path(), ICS).unwrap();
        assert_eq!(source.load_cached().await, 2);
        source
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_new_event_is_claimed_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = cached_source(dir.path()).await;
        let state_path = dir.path().join("data.json");
        let state = StateStore::load(&state_path);

        let first = claim_new_event(&state, &source, utc("2024-01-15T08:30:00Z")).await;
        assert_eq!(first.map(|e| e.uid), Some("algo-1".to_string()));

        // Next tick, same event still in progress
        assert!(claim_new_event(&state, &source, utc("2024-01-15T08:32:00Z"))
            .await
            .is_none());

        // Persisted before the announcement, so a restart does not repeat it
        let reloaded = StateStore::load(&state_path);
        assert_eq!(reloaded.last_event("main").await.as_deref(), Some("algo-1"));
        assert!(claim_new_event(&reloaded, &source, utc("2024-01-15T09:30:00Z"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_next_event_is_claimed_after_previous_ends() {
        let dir = tempfile::tempdir().unwrap();
        let source = cached_source(dir.path()).await;
        let state = StateStore::load(dir.path().join("data.json"));

        assert!(claim_new_event(&state, &source, utc("2024-01-15T08:30:00Z"))
            .await
            .is_some());

        let next = claim_new_event(&state, &source, utc("2024-01-15T10:30:00Z")).await;
        assert_eq!(next.map(|e| e.uid), Some("net-1".to_string()));
        assert_eq!(state.last_event("main").await.as_deref(), Some("net-1"));
    }

    #[tokio::test]
    async fn test_nothing_claimed_between_events() {
        let dir = tempfile::tempdir().unwrap();
        let source = cached_source(dir.path()).await;
        let state = StateStore::load(dir.path().join("data.json"));

        assert!(claim_new_event(&state, &source, utc("2024-01-15T12:00:00Z"))
            .await
            .is_none());
        assert!(state.snapshot().await.calendars.is_empty());
        assert!(!dir.path().join("data.json").exists());
    }

    #[tokio::test]
    async fn test_failed_write_still_claims_event() {
        let dir = tempfile::tempdir().unwrap();
        let source = cached_source(dir.path()).await;
        let state = StateStore::load(dir.path().join("missing-dir").join("data.json"));

        let event = claim_new_event(&state, &source, utc("2024-01-15T08:30:00Z")).await;
        assert!(event.is_some());
        assert!(claim_new_event(&state, &source, utc("2024-01-15T08:32:00Z"))
            .await
            .is_none());
    }
}
