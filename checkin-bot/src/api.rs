//! Client for the external check-in API.
//!
//! Failures never propagate to the caller: they are logged and reported as an
//! empty course list or a failed check-in.

use shared::{CheckInRequest, CheckInResponse, Course, CoursesResponse};
use validator::Validate;

use crate::config::ApiConfig;
use crate::error::{BotError, BotResult};

#[derive(Clone)]
pub struct CheckInApi {
    client: reqwest::Client,
    courses_url: String,
    check_in_url: String,
}

impl CheckInApi {
    pub fn new(config: &ApiConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            courses_url: config.courses_url(),
            check_in_url: config.check_in_url(),
        }
    }

    /// Courses currently open for check-in
    pub async fn get_courses(&self) -> Vec<Course> {
        match self.try_get_courses().await {
            Ok(courses) => {
                tracing::debug!(
                    "Got {} course(s): {}",
                    courses.len(),
                    courses
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                courses
            }
            Err(e) => {
                tracing::error!("Failed to fetch courses: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_get_courses(&self) -> BotResult<Vec<Course>> {
        let response: CoursesResponse = self
            .client
            .get(&self.courses_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.into_courses())
    }

    /// Check `username` in to `course_id`. Returns whether the API accepted it.
    pub async fn check_in(&self, username: &str, course_id: i64) -> bool {
        match self.try_check_in(username, course_id).await {
            Ok(success) => success,
            Err(e) => {
                tracing::error!("Check-in of {} for course {} failed: {}", username, course_id, e);
                false
            }
        }
    }

    async fn try_check_in(&self, username: &str, course_id: i64) -> BotResult<bool> {
        let payload = CheckInRequest::new(course_id, username);
        payload
            .validate()
            .map_err(|e| BotError::Api(format!("invalid check-in request: {}", e)))?;

        let response = self
            .client
            .post(&self.check_in_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("POST to check-in, status code: {}", status);
        tracing::debug!("{}", body);

        if !status.is_success() {
            return Err(BotError::Api(format!("check-in returned {}", status)));
        }

        let parsed: CheckInResponse = serde_json::from_str(&body)?;
        Ok(parsed.success)
    }
}
