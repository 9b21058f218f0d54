use chrono::Utc;
use shared::CalendarState;
use std::sync::Arc;

use crate::announcer;
use crate::app::App;

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;

// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub app: Arc<App>,
}

/// Which events the debug command picks from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    Now,
    Today,
}

impl DebugMode {
    pub fn parse(mode: Option<&str>) -> Self {
        match mode.unwrap_or("now") {
            "now" | "n" => DebugMode::Now,
            _ => DebugMode::Today,
        }
    }
}

pub async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(ctx.data().app.config.is_admin(ctx.author().id.get()))
}

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![update(), debug(), status()]
}

/// Download the calendars again
#[poise::command(prefix_command, slash_command)]
pub async fn update(
    ctx: Context<'_>,
    #[description = "Calendar to update (all when omitted)"] calendar: Option<String>,
) -> Result<(), Error> {
    let app = ctx.data().app.clone();
    let calendars = app.calendars_named(calendar.as_deref())?;

    let mut lines = Vec::with_capacity(calendars.len());
    for calendar in calendars {
        let line = match calendar.refresh().await {
            Ok(count) => format!(
                ":white_check_mark: Successfully updated `{}` ({} events).",
                calendar.name(),
                count
            ),
            Err(_) => format!(":x: Failed to update `{}`.", calendar.name()),
        };
        lines.push(line);
    }

    ctx.say(lines.join("\n")).await?;
    Ok(())
}

/// Announce the current (or today's first) event here, with check-in
#[poise::command(prefix_command, slash_command, check = "is_admin")]
pub async fn debug(
    ctx: Context<'_>,
    #[description = "`now`/`n` or `today`/`t`"] mode: Option<String>,
    #[description = "Calendar to read from (first when omitted)"] calendar: Option<String>,
) -> Result<(), Error> {
    let app = ctx.data().app.clone();
    let source = app.calendar(calendar.as_deref())?;

    let now = Utc::now();
    let events = match DebugMode::parse(mode.as_deref()) {
        DebugMode::Now => source.events_now(now).await,
        DebugMode::Today => source.events_today(now).await,
    };

    let Some(event) = events.into_iter().next() else {
        ctx.say(format!("No event found in `{}`.", source.name())).await?;
        return Ok(());
    };

    ctx.say(format!("Announcing **{}**.", event.name)).await?;

    let serenity_ctx = ctx.serenity_context().clone();
    let channel = ctx.channel_id();
    tokio::spawn(async move {
        let name = event.name.clone();
        if let Err(e) = announcer::announce(&serenity_ctx, app, source, channel, event).await {
            tracing::error!("Debug announcement of '{}' failed: {}", name, e);
        }
    });

    Ok(())
}

/// Show the state of every calendar
#[poise::command(prefix_command, slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let app = &ctx.data().app;
    let state = app.state.snapshot().await;

    let mut lines = vec![format!("Enrolled students: {}", app.roster.len())];
    for calendar in &app.calendars {
        let refresh = calendar.status().await;
        let refreshed = match (refresh.last_attempt, refresh.succeeded) {
            (None, _) => "never updated".to_string(),
            (Some(at), true) => format!("updated {}", at.format("%Y-%m-%d %H:%M UTC")),
            (Some(at), false) => format!(
                "update failed {} ({})",
                at.format("%Y-%m-%d %H:%M UTC"),
                refresh.error.unwrap_or_default()
            ),
        };
        let last_event = last_announced(state.calendars.get(calendar.name()));

        lines.push(format!(
            "`{}`: {} events, {}, last announced: {}",
            calendar.name(),
            calendar.event_count().await,
            refreshed,
            last_event
        ));
    }

    ctx.say(lines.join("\n")).await?;
    Ok(())
}

fn last_announced(state: Option<&CalendarState>) -> String {
    match state.map(|s| (s.last_event.as_deref(), s.announced_at)) {
        Some((Some(uid), Some(at))) => format!("{} ({})", uid, at.format("%Y-%m-%d %H:%M UTC")),
        Some((Some(uid), None)) => uid.to_string(),
        _ => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_mode_parsing() {
        assert_eq!(DebugMode::parse(None), DebugMode::Now);
        assert_eq!(DebugMode::parse(Some("now")), DebugMode::Now);
        assert_eq!(DebugMode::parse(Some("n")), DebugMode::Now);
        assert_eq!(DebugMode::parse(Some("today")), DebugMode::Today);
        assert_eq!(DebugMode::parse(Some("t")), DebugMode::Today);
        assert_eq!(DebugMode::parse(Some("whatever")), DebugMode::Today);
    }

    #[test]
    fn test_last_announced() {
        assert_eq!(last_announced(None), "none");
        assert_eq!(last_announced(Some(&CalendarState::default())), "none");

        let mut state = CalendarState {
            last_event: Some("algo-1".to_string()),
            announced_at: None,
        };
        assert_eq!(last_announced(Some(&state)), "algo-1");

        state.announced_at = Some("2024-01-15T08:02:00Z".parse().unwrap());
        assert_eq!(last_announced(Some(&state)), "algo-1 (2024-01-15 08:02 UTC)");
    }

    #[test]
    fn test_all_commands_registered() {
        let names: Vec<_> = all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["update", "debug", "status"]);
    }
}
