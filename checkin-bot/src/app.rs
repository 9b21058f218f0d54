use chrono_tz::Tz;
use std::sync::Arc;

use crate::api::CheckInApi;
use crate::calendar::CalendarSource;
use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::roster::Roster;
use crate::state::StateStore;

/// Everything the scheduler, the announcer and the commands share
pub struct App {
    pub config: BotConfig,
    pub tz: Tz,
    pub roster: Roster,
    pub api: CheckInApi,
    pub state: StateStore,
    pub calendars: Vec<Arc<CalendarSource>>,
}

impl App {
    pub fn new(config: BotConfig, roster: Roster, state: StateStore) -> BotResult<Self> {
        let tz = config.tz()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BotError::Config(format!("cannot build HTTP client: {}", e)))?;

        let calendars = config
            .calendars
            .iter()
            .map(|calendar| {
                Arc::new(CalendarSource::new(
                    calendar.clone(),
                    &config.files.cache_dir,
                    tz,
                    client.clone(),
                ))
            })
            .collect();

        Ok(Self {
            api: CheckInApi::new(&config.api, client),
            tz,
            roster,
            state,
            calendars,
            config,
        })
    }

    /// Load the cached copy of every calendar
    pub async fn load_caches(&self) {
        for calendar in &self.calendars {
            calendar.load_cached().await;
        }
    }

    /// The calendar called `name`, or the first one when no name is given
    pub fn calendar(&self, name: Option<&str>) -> BotResult<Arc<CalendarSource>> {
        match name {
            Some(name) => self
                .calendars
                .iter()
                .find(|c| c.name() == name)
                .cloned()
                .ok_or_else(|| BotError::UnknownCalendar(name.to_string())),
            None => self
                .calendars
                .first()
                .cloned()
                .ok_or_else(|| BotError::Config("no calendar configured".to_string())),
        }
    }

    /// Calendars matching `name`, or all of them
    pub fn calendars_named(&self, name: Option<&str>) -> BotResult<Vec<Arc<CalendarSource>>> {
        match name {
            Some(_) => Ok(vec![self.calendar(name)?]),
            None => Ok(self.calendars.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(dir: &std::path::Path) -> App {
        let mut config = BotConfig::example();
        config.files.cache_dir = dir.join("calendars");
        let mut second = config.calendars[0].clone();
        second.name = "lab".to_string();
        config.calendars.push(second);

        App::new(config, Roster::default(), StateStore::load(dir.join("data.json"))).unwrap()
    }

    #[test]
    fn test_calendar_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        assert_eq!(app.calendar(None).unwrap().name(), "main");
        assert_eq!(app.calendar(Some("lab")).unwrap().name(), "lab");
        assert!(matches!(
            app.calendar(Some("nope")),
            Err(BotError::UnknownCalendar(_))
        ));

        assert_eq!(app.calendars_named(None).unwrap().len(), 2);
        assert_eq!(app.calendars_named(Some("lab")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_caches_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        app.load_caches().await;
        for calendar in &app.calendars {
            assert_eq!(calendar.event_count().await, 0);
        }
    }
}
