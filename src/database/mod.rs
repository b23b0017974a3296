pub mod memory;
pub mod session;
pub mod sqlite_repository;
pub mod user;
