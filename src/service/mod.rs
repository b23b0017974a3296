pub mod auth;
pub mod reaper;
pub mod session;
