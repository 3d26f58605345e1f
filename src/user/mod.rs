//! Per-user storage
//!
//! Preferences and user-scoped cache entries live in the user's own
//! attribute record. Each user has a single writer, so nothing here needs
//! concurrency control.

mod attributes;
mod store;

pub use attributes::{AttributeStore, Attributes, FileAttributeStore, MemoryAttributeStore};
pub use store::{PerUserDocument, PerUserStore, UserField};
