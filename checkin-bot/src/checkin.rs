use serenity::all::{Context as SerenityContext, CreateMessage, UserId};
use shared::Course;
use std::collections::HashSet;
use std::sync::Arc;

use crate::announcer::Announcement;
use crate::app::App;
use crate::embed::check_in_status_message;

/// Who has checked in for one announcement
#[derive(Debug, Clone)]
pub struct CheckInSession {
    enrolled: usize,
    checked_in: HashSet<u64>,
    in_flight: HashSet<u64>,
    finished: bool,
}

impl CheckInSession {
    pub fn new(enrolled: usize) -> Self {
        Self {
            enrolled,
            checked_in: HashSet::new(),
            in_flight: HashSet::new(),
            finished: false,
        }
    }

    /// Claim a check-in for `user`. Fails if one is already running or done.
    pub fn begin(&mut self, user: u64) -> bool {
        if self.finished || self.checked_in.contains(&user) {
            return false;
        }
        self.in_flight.insert(user)
    }

    pub fn mark_checked_in(&mut self, user: u64) {
        self.checked_in.insert(user);
    }

    pub fn finish(&mut self, user: u64, success: bool) {
        self.in_flight.remove(&user);
        if success {
            self.checked_in.insert(user);
        }
    }

    /// `(checked in, enrolled)`
    pub fn tally(&self) -> (usize, usize) {
        (self.checked_in.len(), self.enrolled)
    }

    pub fn is_complete(&self) -> bool {
        self.enrolled > 0 && self.checked_in.len() >= self.enrolled
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Close the session; later reactions are ignored
    pub fn close(&mut self) {
        self.finished = true;
    }
}

/// Check one student in to every course, DM them the outcome and update the tally.
pub async fn run_check_in(
    ctx: SerenityContext,
    app: Arc<App>,
    announcement: Arc<Announcement>,
    user: UserId,
) {
    let user_key = user.get();
    let Some(student) = app.roster.get(user_key) else {
        announcement.session.lock().await.finish(user_key, false);
        return;
    };
    tracing::debug!("{} reacted", student.display_name());

    let mut any_success = false;
    for (i, course) in announcement.courses.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(app.config.checkin.course_pause()).await;
        }

        let success = app.api.check_in(&student.username, course.id).await;
        if success {
            any_success = true;
            announcement.session.lock().await.mark_checked_in(user_key);
        }
        send_check_in_status(&ctx, user, success, course, &student.display_name()).await;
    }

    if announcement.courses.is_empty() {
        tracing::warn!("No course to check {} in to", student.display_name());
    }

    let complete = {
        let mut session = announcement.session.lock().await;
        session.finish(user_key, any_success);
        session.is_complete()
    };

    if let Err(e) = announcement.refresh_embed(&ctx, &app).await {
        tracing::error!("Failed to update announcement tally: {}", e);
    }

    if complete {
        announcement.completed.notify_one();
    }
}

async fn send_check_in_status(
    ctx: &SerenityContext,
    user: UserId,
    success: bool,
    course: &Course,
    display_name: &str,
) {
    if success {
        tracing::debug!("Successfully checked-in {} for course {}", display_name, course.name);
    } else {
        tracing::error!("Error checking-in {} for course {}", display_name, course.name);
    }

    let message = CreateMessage::new().content(check_in_status_message(success, &course.name));
    let sent = match user.create_dm_channel(ctx).await {
        Ok(channel) => channel.id.send_message(ctx, message).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        tracing::warn!("Could not DM {}: {}", display_name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_rejects_duplicates() {
        let mut session = CheckInSession::new(2);
        assert!(session.begin(1));
        assert!(!session.begin(1), "already in flight");

        session.finish(1, true);
        assert!(!session.begin(1), "already checked in");
        assert_eq!(session.tally(), (1, 2));
    }

    #[test]
    fn test_failed_check_in_can_be_retried() {
        let mut session = CheckInSession::new(2);
        assert!(session.begin(1));
        session.finish(1, false);
        assert_eq!(session.tally(), (0, 2));
        assert!(session.begin(1));
    }

    #[test]
    fn test_partial_success_counts() {
        let mut session = CheckInSession::new(1);
        assert!(session.begin(1));
        session.mark_checked_in(1);
        assert_eq!(session.tally(), (1, 1));
        session.finish(1, false);
        assert_eq!(session.tally(), (1, 1));
        assert!(!session.begin(1), "already checked in");
        assert!(session.is_complete());
    }

    #[test]
    fn test_completion() {
        let mut session = CheckInSession::new(2);
        assert!(!session.is_complete());

        session.begin(1);
        session.finish(1, true);
        assert!(!session.is_complete());

        session.begin(2);
        session.finish(2, true);
        assert!(session.is_complete());
    }

    #[test]
    fn test_empty_roster_is_never_complete() {
        assert!(!CheckInSession::new(0).is_complete());
    }

    #[test]
    fn test_closed_session_ignores_reactions() {
        let mut session = CheckInSession::new(3);
        session.close();
        assert!(session.is_finished());
        assert!(!session.begin(1));
    }
}
