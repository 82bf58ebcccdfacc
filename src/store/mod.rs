//! Session persistence.
//!
//! A [`SessionRecord`] captures a session's chain position; a
//! [`SessionStore`] backend keeps the serialized records keyed by peer id.

mod file;
mod memory;
mod record;
mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::{SessionRecord, RECORD_VERSION};
pub use traits::SessionStore;
