use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serenity::all::{CreateEmbed, CreateEmbedFooter};

use crate::calendar::CalendarEvent;
use crate::config::EmbedConfig;

/// Contents of an event announcement, before it becomes a Discord embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCard {
    pub title: String,
    pub description: String,
    pub schedule: String,
    pub location: String,
    pub tally: String,
}

impl EventCard {
    pub fn new(
        event: &CalendarEvent,
        checked_in: usize,
        enrolled: usize,
        finished: bool,
        config: &EmbedConfig,
        tz: Tz,
    ) -> Self {
        let description = if finished {
            config.finished_description.clone()
        } else {
            config.description.clone()
        };

        Self {
            title: event.name.clone(),
            description,
            schedule: format_schedule(event.begin, event.end, tz),
            location: event.location.clone().unwrap_or_else(|| "-".to_string()),
            tally: format!("{}/{}", checked_in, enrolled),
        }
    }

    pub fn to_embed(&self, config: &EmbedConfig) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(&self.title)
            .description(&self.description)
            .colour(config.color)
            .field("Heure", &self.schedule, true)
            .field("Salle", &self.location, true)
            .field("Pointage", &self.tally, true);

        if let Some(thumbnail) = &config.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }

        let mut footer = CreateEmbedFooter::new(&config.footer_text);
        if let Some(icon) = &config.footer_icon {
            footer = footer.icon_url(icon);
        }
        embed.footer(footer)
    }
}

/// `De 08h30 à 10h00`, in local time
pub fn format_schedule(begin: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "De {} à {}",
        begin.with_timezone(&tz).format("%Hh%M"),
        end.with_timezone(&tz).format("%Hh%M")
    )
}

/// Message content posted with the embed
pub fn role_mention(role_id: Option<u64>) -> Option<String> {
    role_id.map(|id| format!("<@&{}>", id))
}

pub fn check_in_status_message(success: bool, course_name: &str) -> String {
    if success {
        format!(":white_check_mark: Pointage pour le cours de {} réussi !", course_name)
    } else {
        format!(":x: Erreur lors du pointage pour le cours de {}.", course_name)
    }
}
