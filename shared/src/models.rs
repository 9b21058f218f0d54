use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An enrolled student, as stored in the students file.
///
/// The file stores each student as a `[username, last_name, first_name]`
/// array keyed by Discord user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct Student {
    /// Username known to the check-in API
    pub username: String,
    pub last_name: String,
    pub first_name: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<(String, String, String)> for Student {
    fn from((username, last_name, first_name): (String, String, String)) -> Self {
        Self {
            username,
            last_name,
            first_name,
        }
    }
}

impl From<Student> for (String, String, String) {
    fn from(student: Student) -> Self {
        (student.username, student.last_name, student.first_name)
    }
}

/// A course as listed by the check-in API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
}

/// Persisted state for a single calendar
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarState {
    /// UID of the last event announced for this calendar
    #[serde(default)]
    pub last_event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announced_at: Option<DateTime<Utc>>,
}

/// Everything the bot persists between restarts, keyed by calendar name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotState {
    #[serde(default)]
    pub calendars: HashMap<String, CalendarState>,
}

impl BotState {
    pub fn last_event(&self, calendar: &str) -> Option<&str> {
        self.calendars
            .get(calendar)
            .and_then(|state| state.last_event.as_deref())
    }

    pub fn record_event(&mut self, calendar: &str, uid: &str, at: DateTime<Utc>) {
        let state = self.calendars.entry(calendar.to_string()).or_default();
        state.last_event = Some(uid.to_string());
        state.announced_at = Some(at);
    }
}
