//! Domain data model consumed by the persistence pipeline

pub mod change_set;
pub mod resource;

pub use change_set::ChangeSet;
pub use resource::{Resource, MEMBER_IDS};
