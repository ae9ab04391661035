//! Application services
//!
//! - `user`: account lifecycle on top of the user repository
//! - `cache`: moka caches for user lookups
//! - `cleanup`: daily removal of stale registrations

pub mod cache;
pub mod cleanup;
pub mod user;

pub use cache::UserCache;
pub use cleanup::spawn_cleanup_task;
pub use user::{AccountUpdate, ServiceError, ServiceResult, UserService};
