use chrono_tz::Tz;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BotError, BotResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot: DiscordConfig,

    #[serde(default)]
    pub checkin: CheckInConfig,

    pub api: ApiConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub embed: EmbedConfig,

    /// IANA timezone used to display event times
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How often to look for a newly started event (seconds)
    #[serde(default = "default_event_check_interval")]
    pub event_check_interval_secs: u64,

    /// How often to download the calendars again (seconds)
    #[serde(default = "default_calendar_update_interval")]
    pub calendar_update_interval_secs: u64,

    /// Calendars to watch
    pub calendars: Vec<CalendarConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token. `DISCORD_TOKEN` takes precedence when set.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Discord user ids allowed to run admin commands
    #[serde(default)]
    pub admins: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfig {
    #[serde(default = "default_reaction_emoji")]
    pub reaction_emoji: String,

    #[serde(default = "default_cancelled_emoji")]
    pub cancelled_emoji: String,

    /// How long the announcement accepts reactions (seconds)
    #[serde(default = "default_reaction_timeout")]
    pub reaction_timeout_secs: u64,

    /// Pause between two course check-ins for the same student (milliseconds)
    #[serde(default = "default_course_pause")]
    pub course_pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the check-in API, e.g. `https://api.tld/api/`
    pub base_url: String,

    #[serde(default = "default_courses_endpoint")]
    pub courses_endpoint: String,

    #[serde(default = "default_check_in_endpoint")]
    pub check_in_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// JSON map of Discord user id to `[username, last_name, first_name]`
    #[serde(default = "default_students_file")]
    pub students_file: PathBuf,

    /// Persisted bot state (last announced event per calendar)
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Directory holding the last downloaded copy of each calendar
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    #[serde(default = "default_embed_description")]
    pub description: String,

    #[serde(default = "default_embed_finished_description")]
    pub finished_description: String,

    #[serde(default = "default_embed_color")]
    pub color: u32,

    #[serde(default)]
    pub thumbnail: Option<String>,

    #[serde(default = "default_footer_text")]
    pub footer_text: String,

    #[serde(default)]
    pub footer_icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Unique name, also the key of this calendar's persisted state
    pub name: String,

    /// URL of the ICS feed
    pub url: String,

    /// Channel announcements are posted to
    pub channel_id: u64,

    /// Extra HTTP headers sent when downloading the feed
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Role mentioned alongside each announcement
    #[serde(default)]
    pub role_mention: Option<u64>,

    /// Whether reactions trigger check-ins for this calendar
    #[serde(default = "default_true")]
    pub check_in: bool,
}

fn default_timezone() -> String {
    "Europe/Paris".to_string()
}

fn default_event_check_interval() -> u64 {
    120 // 2 minutes
}

fn default_calendar_update_interval() -> u64 {
    12 * 60 * 60 // 12 hours
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_reaction_emoji() -> String {
    "📌".to_string()
}

fn default_cancelled_emoji() -> String {
    "❌".to_string()
}

fn default_reaction_timeout() -> u64 {
    30 * 60 // 30 minutes
}

fn default_course_pause() -> u64 {
    1000
}

fn default_courses_endpoint() -> String {
    "courses".to_string()
}

fn default_check_in_endpoint() -> String {
    "check-in".to_string()
}

fn default_students_file() -> PathBuf {
    PathBuf::from("./students.json")
}

fn default_data_file() -> PathBuf {
    PathBuf::from("./data.json")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./calendars")
}

fn default_embed_description() -> String {
    "N'oubliez pas de pointer !\nOu réagissez avec l'émoji 📌".to_string()
}

fn default_embed_finished_description() -> String {
    ":x: Le cours est terminé, il n'est plus possible de pointer".to_string()
}

fn default_embed_color() -> u32 {
    0x0079d6
}

fn default_footer_text() -> String {
    "Check-in bot".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            prefix: default_prefix(),
            admins: Vec::new(),
        }
    }
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            reaction_emoji: default_reaction_emoji(),
            cancelled_emoji: default_cancelled_emoji(),
            reaction_timeout_secs: default_reaction_timeout(),
            course_pause_ms: default_course_pause(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            students_file: default_students_file(),
            data_file: default_data_file(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            description: default_embed_description(),
            finished_description: default_embed_finished_description(),
            color: default_embed_color(),
            thumbnail: None,
            footer_text: default_footer_text(),
            footer_icon: None,
        }
    }
}

impl CheckInConfig {
    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_secs(self.reaction_timeout_secs)
    }

    pub fn course_pause(&self) -> Duration {
        Duration::from_millis(self.course_pause_ms)
    }
}

impl ApiConfig {
    pub fn courses_url(&self) -> String {
        join_url(&self.base_url, &self.courses_endpoint)
    }

    pub fn check_in_url(&self) -> String {
        join_url(&self.base_url, &self.check_in_endpoint)
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

impl BotConfig {
    pub fn load(path: &Path) -> BotResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> BotResult<Self> {
        let config: BotConfig =
            toml::from_str(content).map_err(|e| BotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BotResult<()> {
        if self.calendars.is_empty() {
            return Err(BotError::Config(
                "at least one [[calendars]] entry is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for calendar in &self.calendars {
            if calendar.channel_id == 0 {
                return Err(BotError::Config(format!(
                    "calendar '{}' needs a channel_id",
                    calendar.name
                )));
            }
            if calendar.role_mention == Some(0) {
                return Err(BotError::Config(format!(
                    "calendar '{}' has an invalid role_mention",
                    calendar.name
                )));
            }
            for (name, value) in &calendar.headers {
                if HeaderName::from_bytes(name.as_bytes()).is_err() {
                    return Err(BotError::Config(format!(
                        "calendar '{}' has an invalid header name '{}'",
                        calendar.name, name
                    )));
                }
                if HeaderValue::from_str(value).is_err() {
                    return Err(BotError::Config(format!(
                        "calendar '{}' has an invalid value for header '{}'",
                        calendar.name, name
                    )));
                }
            }
            if !names.insert(calendar.name.as_str()) {
                return Err(BotError::Config(format!(
                    "duplicate calendar name '{}'",
                    calendar.name
                )));
            }
        }

        if self.event_check_interval_secs == 0 || self.calendar_update_interval_secs == 0 {
            return Err(BotError::Config("intervals must be non-zero".to_string()));
        }

        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> BotResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| BotError::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Token from the environment, falling back to the config file
    pub fn token(&self) -> BotResult<String> {
        std::env::var("DISCORD_TOKEN")
            .ok()
            .or_else(|| self.bot.token.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::Config("DISCORD_TOKEN must be set".to_string()))
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.bot.admins.contains(&user_id)
    }

    pub fn event_check_interval(&self) -> Duration {
        Duration::from_secs(self.event_check_interval_secs)
    }

    pub fn calendar_update_interval(&self) -> Duration {
        Duration::from_secs(self.calendar_update_interval_secs)
    }

    pub fn example() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "User-Agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
        );

        BotConfig {
            bot: DiscordConfig {
                token: None,
                prefix: default_prefix(),
                admins: vec![111111111111111111],
            },
            checkin: CheckInConfig::default(),
            api: ApiConfig {
                base_url: "https://api.tld/api/".to_string(),
                courses_endpoint: default_courses_endpoint(),
                check_in_endpoint: default_check_in_endpoint(),
            },
            files: FilesConfig::default(),
            embed: EmbedConfig::default(),
            timezone: default_timezone(),
            event_check_interval_secs: default_event_check_interval(),
            calendar_update_interval_secs: default_calendar_update_interval(),
            calendars: vec![CalendarConfig {
                name: "main".to_string(),
                url: "https://domain.tld/calendar.ics".to_string(),
                channel_id: 222222222222222222,
                headers,
                role_mention: None,
                check_in: true,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [api]
        base_url = "https://api.tld/api/"

        [[calendars]]
        name = "main"
        url = "https://domain.tld/calendar.ics"
        channel_id = 42
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BotConfig::parse(MINIMAL).expect("should parse");
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.checkin.reaction_emoji, "📌");
        assert_eq!(config.checkin.cancelled_emoji, "❌");
        assert_eq!(config.checkin.reaction_timeout(), Duration::from_secs(1800));
        assert_eq!(config.event_check_interval(), Duration::from_secs(120));
        assert_eq!(config.calendar_update_interval(), Duration::from_secs(43200));
        assert_eq!(config.embed.color, 0x0079d6);
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Paris);
        assert!(config.calendars[0].check_in);
        assert!(config.calendars[0].headers.is_empty());
    }

    #[test]
    fn test_api_urls_are_joined() {
        let config = BotConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.api.courses_url(), "https://api.tld/api/courses");
        assert_eq!(config.api.check_in_url(), "https://api.tld/api/check-in");
    }

    #[test]
    fn test_rejects_missing_calendars() {
        let content = r#"
            calendars = []
            [api]
            base_url = "https://api.tld/api"
        "#;
        assert!(BotConfig::parse(content).is_err());
    }

    #[test]
    fn test_rejects_duplicate_calendar_names() {
        let content = format!(
            "{}\n[[calendars]]\nname = \"main\"\nurl = \"https://x\"\nchannel_id = 1\n",
            MINIMAL
        );
        let err = BotConfig::parse(&content).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_zero_channel() {
        let content = MINIMAL.replace("channel_id = 42", "channel_id = 0");
        assert!(BotConfig::parse(&content).is_err());
    }

    #[test]
    fn test_validates_calendar_headers() {
        let good = format!("{}\n[calendars.headers]\nUser-Agent = \"checkin-bot\"\n", MINIMAL);
        let config = BotConfig::parse(&good).expect("valid header");
        assert_eq!(config.calendars[0].headers["User-Agent"], "checkin-bot");

        let bad_name = format!("{}\n[calendars.headers]\n\"Bad Header\" = \"x\"\n", MINIMAL);
        let err = BotConfig::parse(&bad_name).unwrap_err();
        assert!(err.to_string().contains("invalid header name"));

        let bad_value = format!("{}\n[calendars.headers]\nAccept = \"a\\nb\"\n", MINIMAL);
        let err = BotConfig::parse(&bad_value).unwrap_err();
        assert!(err.to_string().contains("invalid value for header"));
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let content = format!("timezone = \"Mars/Olympus\"\n{}", MINIMAL);
        assert!(BotConfig::parse(&content).is_err());
    }

    #[test]
    fn test_admin_check() {
        let content = format!("[bot]\nadmins = [7, 9]\n{}", MINIMAL);
        let config = BotConfig::parse(&content).unwrap();
        assert!(config.is_admin(7));
        assert!(!config.is_admin(8));
    }

    #[test]
    fn test_example_round_trips_through_toml() {
        let example = BotConfig::example();
        let text = toml::to_string(&example).expect("should serialize");
        let parsed = BotConfig::parse(&text).expect("example should be valid");
        assert_eq!(parsed.calendars[0].name, "main");
    }
}
