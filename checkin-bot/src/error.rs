//! Error type for the check-in bot.
//!
//! Library code returns `BotResult`; the binary and the command layer wrap
//! these in `anyhow::Error` with extra context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Calendar feed could not be downloaded
    #[error("Failed to fetch calendar '{calendar}': {source}")]
    CalendarFetch {
        calendar: String,
        #[source]
        source: reqwest::Error,
    },

    /// Calendar feed is not valid ICS
    #[error("Failed to parse calendar: {0}")]
    CalendarParse(String),

    /// Reading or writing a file on disk
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Check-in API call failed
    #[error("Check-in API error: {0}")]
    Api(String),

    #[error("Unknown calendar '{0}'")]
    UnknownCalendar(String),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),
}

impl BotError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        BotError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Api(err.to_string())
    }
}

pub type BotResult<T> = Result<T, BotError>;
