//! Desired-state storage.

mod error;
mod event;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use event::StoreEvent;
pub use memory::MemoryStore;
pub use traits::ResourceStore;
