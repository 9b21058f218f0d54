//! Discord bot announcing calendar events and running reaction check-ins.

pub mod announcer;
pub mod api;
pub mod app;
pub mod calendar;
pub mod checkin;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod roster;
pub mod scheduler;
pub mod state;

pub use error::{BotError, BotResult};
