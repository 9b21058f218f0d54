use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Course;

// ============================================================================
// Courses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CoursesResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub courses: Vec<Course>,
}

impl CoursesResponse {
    /// Courses listed by the API, or nothing when it reported a failure
    pub fn into_courses(self) -> Vec<Course> {
        if self.success {
            self.courses
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// Check-in
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CheckInRequest {
    /// The API expects the course id as a string
    #[serde(rename = "courseID")]
    #[validate(length(min = 1))]
    pub course_id: String,

    #[validate(length(min = 1, max = 200))]
    pub username: String,
}

impl CheckInRequest {
    pub fn new(course_id: i64, username: impl Into<String>) -> Self {
        Self {
            course_id: course_id.to_string(),
            username: username.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckInResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
