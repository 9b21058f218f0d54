mod source;
mod timeline;

pub use source::{CalendarSource, RefreshStatus};
pub use timeline::{CalendarEvent, Timeline};
