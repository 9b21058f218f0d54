//! Types shared between the check-in bot and the check-in API wire format.

pub mod api;
pub mod models;

pub use api::{CheckInRequest, CheckInResponse, CoursesResponse};
pub use models::{BotState, CalendarState, Course, Student};
