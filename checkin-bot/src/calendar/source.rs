use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::timeline::{CalendarEvent, Timeline};
use crate::config::CalendarConfig;
use crate::error::{BotError, BotResult};

/// Outcome of the last download attempt
#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    pub last_attempt: Option<DateTime<Utc>>,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// A watched ICS feed and the events last read from it
pub struct CalendarSource {
    config: CalendarConfig,
    cache_path: PathBuf,
    tz: Tz,
    client: reqwest::Client,
    timeline: RwLock<Timeline>,
    status: RwLock<RefreshStatus>,
}

impl CalendarSource {
    pub fn new(config: CalendarConfig, cache_dir: &Path, tz: Tz, client: reqwest::Client) -> Self {
        let cache_path = cache_dir.join(format!("{}.ics", sanitize_for_filename(&config.name)));
        Self {
            config,
            cache_path,
            tz,
            client,
            timeline: RwLock::new(Timeline::default()),
            status: RwLock::new(RefreshStatus::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Load the copy saved by the last successful refresh.
    ///
    /// A missing or unreadable cache leaves the timeline empty.
    pub async fn load_cached(&self) -> usize {
        let timeline = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(content) => match Timeline::parse(&content, self.tz) {
                Ok(timeline) => timeline,
                Err(e) => {
                    tracing::warn!("Ignoring cached calendar {}: {}", self.cache_path.display(), e);
                    Timeline::default()
                }
            },
            Err(e) => {
                tracing::debug!("No cached calendar at {}: {}", self.cache_path.display(), e);
                Timeline::default()
            }
        };

        let count = timeline.len();
        *self.timeline.write().await = timeline;
        tracing::info!("Loaded {} cached event(s) for calendar '{}'", count, self.name());
        count
    }

    /// Download the feed, replace the timeline and save the raw feed to the cache.
    pub async fn refresh(&self) -> BotResult<usize> {
        let result = self.try_refresh().await;

        let mut status = self.status.write().await;
        status.last_attempt = Some(Utc::now());
        match &result {
            Ok(count) => {
                status.succeeded = true;
                status.error = None;
                tracing::info!("Calendar '{}' updated ({} events)", self.name(), count);
            }
            Err(e) => {
                status.succeeded = false;
                status.error = Some(e.to_string());
                tracing::error!("Could not update calendar '{}': {}", self.name(), e);
            }
        }

        result
    }

    async fn try_refresh(&self) -> BotResult<usize> {
        let body = self.fetch().await?;
        let timeline = Timeline::parse(&body, self.tz)?;
        let count = timeline.len();

        let mut guard = self.timeline.write().await;
        if let Some(dir) = self.cache_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| BotError::io(dir, e))?;
        }
        tokio::fs::write(&self.cache_path, &body)
            .await
            .map_err(|e| BotError::io(&self.cache_path, e))?;
        *guard = timeline;

        Ok(count)
    }

    async fn fetch(&self) -> BotResult<String> {
        let fetch_err = |source| BotError::CalendarFetch {
            calendar: self.config.name.clone(),
            source,
        };

        let mut request = self.client.get(&self.config.url);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;

        response.text().await.map_err(fetch_err)
    }

    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }

    pub async fn event_count(&self) -> usize {
        self.timeline.read().await.len()
    }

    /// The event that should be announced now, given the last announced uid
    pub async fn current_new_event(
        &self,
        last_seen: Option<&str>,
        at: DateTime<Utc>,
    ) -> Option<CalendarEvent> {
        self.timeline
            .read()
            .await
            .next_new_event(last_seen, at)
            .cloned()
    }

    pub async fn events_now(&self, at: DateTime<Utc>) -> Vec<CalendarEvent> {
        self.timeline.read().await.now(at).cloned().collect()
    }

    pub async fn events_today(&self, at: DateTime<Utc>) -> Vec<CalendarEvent> {
        self.timeline
            .read()
            .await
            .today(at, self.tz)
            .into_iter()
            .cloned()
            .collect()
    }
}

fn sanitize_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
