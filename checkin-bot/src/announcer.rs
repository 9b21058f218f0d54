//! Posting event announcements and running their check-in window.

use futures::StreamExt;
use serenity::all::{
    ChannelId, Context as SerenityContext, CreateMessage, EditMessage, MessageId, Reaction,
    ReactionType,
};
use shared::Course;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::app::App;
use crate::calendar::{CalendarEvent, CalendarSource};
use crate::checkin::{run_check_in, CheckInSession};
use crate::embed::{role_mention, EventCard};
use crate::error::BotResult;

/// A posted announcement and its check-in state
pub struct Announcement {
    pub event: CalendarEvent,
    pub channel: ChannelId,
    pub message: MessageId,
    pub courses: Vec<Course>,
    pub session: Mutex<CheckInSession>,
    /// Signalled once every enrolled student has checked in
    pub completed: Notify,
}

impl Announcement {
    /// Re-render the embed from the current tally
    pub async fn refresh_embed(&self, ctx: &SerenityContext, app: &App) -> BotResult<()> {
        let card = {
            let session = self.session.lock().await;
            let (checked_in, enrolled) = session.tally();
            EventCard::new(
                &self.event,
                checked_in,
                enrolled,
                session.is_finished(),
                &app.config.embed,
                app.tz,
            )
        };

        self.channel
            .edit_message(
                ctx,
                self.message,
                EditMessage::new().embed(card.to_embed(&app.config.embed)),
            )
            .await?;
        Ok(())
    }
}

/// Announce `event` in `channel` and, if enabled, collect check-in reactions
/// until everyone has checked in or the reaction window closes.
pub async fn announce(
    ctx: &SerenityContext,
    app: Arc<App>,
    calendar: Arc<CalendarSource>,
    channel: ChannelId,
    event: CalendarEvent,
) -> BotResult<()> {
    let enrolled = app.roster.len();
    let card = EventCard::new(&event, 0, enrolled, false, &app.config.embed, app.tz);

    let mut builder = CreateMessage::new().embed(card.to_embed(&app.config.embed));
    if let Some(mention) = role_mention(calendar.config().role_mention) {
        builder = builder.content(mention);
    }

    let message = channel.send_message(ctx, builder).await?;
    tracing::info!(
        "Announced '{}' from calendar '{}' in channel {}",
        event.name,
        calendar.name(),
        channel
    );

    let emoji = app.config.checkin.reaction_emoji.clone();
    message
        .react(ctx, ReactionType::Unicode(emoji.clone()))
        .await?;

    if !calendar.config().check_in {
        return Ok(());
    }
    if app.roster.is_empty() {
        tracing::warn!("No enrolled students, skipping check-in for '{}'", event.name);
        return Ok(());
    }

    let courses = app.api.get_courses().await;
    let announcement = Arc::new(Announcement {
        event,
        channel,
        message: message.id,
        courses,
        session: Mutex::new(CheckInSession::new(enrolled)),
        completed: Notify::new(),
    });

    let filter_app = app.clone();
    let filter_emoji = emoji;
    let mut reactions = Box::pin(
        message
            .await_reactions(ctx)
            .timeout(app.config.checkin.reaction_timeout())
            .filter(move |reaction| is_check_in_reaction(reaction, &filter_app, &filter_emoji))
            .stream(),
    );

    let timed_out = loop {
        tokio::select! {
            reaction = reactions.next() => {
                let Some(reaction) = reaction else {
                    break true;
                };
                let Some(user) = reaction.user_id else {
                    continue;
                };
                if !announcement.session.lock().await.begin(user.get()) {
                    continue;
                }
                tokio::spawn(run_check_in(ctx.clone(), app.clone(), announcement.clone(), user));
            }
            _ = announcement.completed.notified() => {
                break false;
            }
        }
    };

    announcement.session.lock().await.close();

    if timed_out {
        tracing::info!("Check-in window closed for '{}'", announcement.event.name);
        announcement.refresh_embed(ctx, &app).await?;
        message
            .react(ctx, ReactionType::Unicode(app.config.checkin.cancelled_emoji.clone()))
            .await?;
    } else {
        tracing::info!("Everyone checked in for '{}'", announcement.event.name);
    }

    Ok(())
}

fn is_check_in_reaction(reaction: &Reaction, app: &App, emoji: &str) -> bool {
    let enrolled = reaction
        .user_id
        .map(|user| app.roster.contains(user.get()))
        .unwrap_or(false);
    enrolled && matches!(&reaction.emoji, ReactionType::Unicode(e) if e == emoji)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::roster::Roster;
    use crate::state::StateStore;
    use serde_json::json;

    const ENROLLED: u64 = 111111111111111111;

    fn app(dir: &std::path::Path) -> App {
        let mut config = BotConfig::example();
        config.files.cache_dir = dir.join("calendars");
        let roster = Roster::parse(&format!(r#"{{"{}": ["jdoe", "Doe", "Jane"]}}"#, ENROLLED)).unwrap();
        App::new(config, roster, StateStore::load(dir.join("data.json"))).unwrap()
    }

    fn reaction(user: u64, emoji: serde_json::Value) -> Reaction {
        serde_json::from_value(json!({
            "channel_id": "222222222222222222",
            "message_id": "333333333333333333",
            "user_id": user.to_string(),
            "emoji": emoji,
            "burst": false,
            "burst_colors": [],
            "type": 0
        }))
        .unwrap()
    }

    #[test]
    fn test_enrolled_user_with_configured_emoji_counts() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let r = reaction(ENROLLED, json!({"id": null, "name": "📌"}));
        assert!(is_check_in_reaction(&r, &app, "📌"));
    }

    #[test]
    fn test_unenrolled_user_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let r = reaction(444444444444444444, json!({"id": null, "name": "📌"}));
        assert!(!is_check_in_reaction(&r, &app, "📌"));
    }

    #[test]
    fn test_other_emoji_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let unicode = reaction(ENROLLED, json!({"id": null, "name": "👍"}));
        assert!(!is_check_in_reaction(&unicode, &app, "📌"));

        let custom = reaction(
            ENROLLED,
            json!({"id": "555555555555555555", "name": "📌", "animated": false}),
        );
        assert!(!is_check_in_reaction(&custom, &app, "📌"));
    }
}
