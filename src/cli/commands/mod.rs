//! CLI command implementations

pub mod config;
pub mod entry;
pub mod purge;
pub mod user;

pub use config::execute as config;
pub use entry::{get, put, remove};
pub use purge::execute as purge;
pub use user::execute as user;
