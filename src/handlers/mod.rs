pub mod assistant;
pub mod auth;
pub mod calendar;
pub mod health;
pub mod logs;
pub mod profile;
pub mod ws;
