pub mod entities;
pub mod memory;
pub mod store;

pub use entities::{Attachment, JournalEntry, LifeEvent, Role, Tag, TagKind, TagPatch, Turn};
pub use memory::MemoryArchive;
pub use store::ArchiveStore;
